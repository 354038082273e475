//! Hybrid retrieval over the legal corpus.
//!
//! Strategy selection in priority order:
//!
//! 1. Exact-article fast path: resolve `<법령명> 제N조` against the
//!    catalog and fetch those chunks directly, bypassing similarity
//!    search entirely. Direct hits score 1.0.
//! 2. Filtered semantic search: embed the query and run the vector
//!    index with the metadata predicate applied before scoring.
//! 3. Explicit not-found: an exact-article query naming an unknown law
//!    returns one error-marker record and never falls through to
//!    generic search.
//!
//! Every returned record then passes through an additive enrichment
//! join against the catalog. Enrichment never filters and never
//! touches relevance scores; its failures are logged and swallowed.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::article::parse_article_ref;
use crate::catalog::{LawInfo, MetadataCatalog, MetadataFilter};
use crate::core::record::{DataSource, SearchOutcome, SearchRecord};
use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::index::{IndexedChunk, ScoredChunk, VectorIndex};

/// Default result limit.
pub const DEFAULT_LIMIT: usize = 10;
/// Hard ceiling on the result limit.
pub const MAX_LIMIT: usize = 50;

/// Optional structured parameters for one search call.
///
/// Deserialized from the team planner's tool-parameter JSON; unknown
/// fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    /// Category bucket filter. Honored whenever supplied.
    #[serde(default)]
    pub category: Option<String>,
    /// Document-kind filter. Honored only when explicitly supplied.
    #[serde(default)]
    pub doc_type: Option<String>,
    /// Tenant-protection flag filter.
    #[serde(default)]
    pub is_tenant_protection: Option<bool>,
    /// Tax-related flag filter.
    #[serde(default)]
    pub is_tax_related: Option<bool>,
    /// Result limit, clamped to [1, 50].
    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchParams {
    fn clamped_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn filter(&self) -> MetadataFilter {
        MetadataFilter::build(
            self.doc_type.as_deref(),
            self.category.as_deref(),
            self.is_tenant_protection,
            self.is_tax_related,
            true,
        )
    }
}

/// Hybrid search over catalog + vector index.
pub struct HybridLegalSearch {
    catalog: Arc<dyn MetadataCatalog>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl HybridLegalSearch {
    /// Creates a search engine over the given capabilities.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn MetadataCatalog>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            catalog,
            index,
            embedder,
        }
    }

    /// Answers a natural-language legal query with the best available
    /// strategy.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Embedding`] when the query cannot be
    /// embedded (fatal for the call) and [`EngineError::Storage`] on
    /// store connectivity failure. An empty result set is success.
    pub fn search(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<SearchOutcome, EngineError> {
        if let Some(article) = parse_article_ref(query) {
            let chunk_ids = self
                .catalog
                .article_chunk_ids(&article.law_title, &article.article_number)?;

            if !chunk_ids.is_empty() {
                debug!(
                    law = %article.law_title,
                    article = %article.article_number,
                    chunks = chunk_ids.len(),
                    "article fast path hit"
                );
                let chunks = self.index.get(&chunk_ids)?;
                let mut records: Vec<SearchRecord> =
                    chunks.into_iter().map(direct_record).collect();
                self.enrich(&mut records);
                return Ok(SearchOutcome::success(records, DataSource::Direct, query));
            }

            if self.catalog.law_exists(&article.law_title)? {
                // Law known, article missing: semantic search scoped
                // to that law.
                debug!(
                    law = %article.law_title,
                    article = %article.article_number,
                    "article absent, falling back to scoped semantic search"
                );
                let filter = params.filter().for_law(&article.law_title);
                let mut records =
                    self.semantic(query, &filter, params.clamped_limit())?;
                self.enrich(&mut records);
                return Ok(SearchOutcome::success(records, DataSource::Semantic, query));
            }

            // Unknown law: answer explicitly, never fall through to
            // generic search.
            let record = SearchRecord::law_not_found(&article.law_title, query);
            return Ok(SearchOutcome::success(
                vec![record],
                DataSource::NotFound,
                query,
            ));
        }

        let mut records = self.semantic(query, &params.filter(), params.clamped_limit())?;
        self.enrich(&mut records);
        Ok(SearchOutcome::success(records, DataSource::Semantic, query))
    }

    fn semantic(
        &self,
        query: &str,
        filter: &MetadataFilter,
        limit: usize,
    ) -> Result<Vec<SearchRecord>, EngineError> {
        let embedding = self.embedder.encode(query)?;
        let scored = self.index.query(&embedding, filter, limit)?;
        Ok(scored.into_iter().map(semantic_record).collect())
    }

    /// Additive enrichment join: fills missing law-level fields from
    /// the catalog. Never removes records, never changes scores;
    /// lookup failures are logged and swallowed.
    fn enrich(&self, records: &mut [SearchRecord]) {
        for record in records.iter_mut() {
            match self.catalog.law_info(&record.law_title) {
                Ok(Some(info)) => apply_enrichment(record, &info),
                Ok(None) => {}
                Err(e) => {
                    warn!(law = %record.law_title, error = %e, "enrichment lookup failed");
                }
            }
        }
    }
}

fn apply_enrichment(record: &mut SearchRecord, info: &LawInfo) {
    if record.total_articles.is_none() {
        record.total_articles = info.total_articles;
    }
    if record.enforcement_date.is_none() {
        record.enforcement_date.clone_from(&info.enforcement_date);
    }
    if record.law_number.is_none() {
        record.law_number.clone_from(&info.law_number);
    }
    if record.last_article.is_none() {
        record.last_article.clone_from(&info.last_article);
    }
}

fn direct_record(chunk: IndexedChunk) -> SearchRecord {
    SearchRecord {
        doc_id: chunk.doc_id,
        law_title: chunk.meta.law_title,
        article_number: chunk.meta.article_number,
        article_title: chunk.meta.article_title,
        content: chunk.content,
        category: chunk.meta.category,
        doc_type: chunk.meta.doc_type,
        relevance_score: 1.0,
        total_articles: None,
        enforcement_date: None,
        law_number: None,
        last_article: None,
    }
}

fn semantic_record(chunk: ScoredChunk) -> SearchRecord {
    let relevance_score = chunk.relevance();
    SearchRecord {
        doc_id: chunk.doc_id,
        law_title: chunk.meta.law_title,
        article_number: chunk.meta.article_number,
        article_title: chunk.meta.article_title,
        content: chunk.content,
        category: chunk.meta.category,
        doc_type: chunk.meta.doc_type,
        relevance_score,
        total_articles: None,
        enforcement_date: None,
        law_number: None,
        last_article: None,
    }
}
