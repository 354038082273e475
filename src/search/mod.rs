//! Hybrid legal search.
//!
//! Combines three strategies in priority order: exact-article direct
//! lookup, filtered semantic vector search, and an explicit not-found
//! answer, with a post-retrieval enrichment join from the metadata
//! catalog.

pub mod article;
pub mod hybrid;

pub use article::{ArticleRef, parse_article_ref};
pub use hybrid::{HybridLegalSearch, SearchParams};
