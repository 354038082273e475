//! Search result records and tool output status.
//!
//! A [`SearchRecord`] is one retrieved slice of a legal document with
//! its structured metadata and optional enrichment fields. Records are
//! immutable results of one search call.

use serde::{Deserialize, Serialize};

/// Status of a tool invocation's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// The tool ran to completion (possibly with zero records).
    Success,
    /// The tool failed.
    Error,
}

/// Which retrieval strategy produced a search outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Exact-article fast path: chunks fetched directly by ID.
    Direct,
    /// Filtered semantic vector search.
    Semantic,
    /// The referenced law does not exist in the catalog.
    NotFound,
}

impl DataSource {
    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Semantic => "semantic",
            Self::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Doc type used for explicit "law not found" records.
pub const ERROR_DOC_TYPE: &str = "error";

/// One retrieved legal text chunk with metadata and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    /// Stable chunk identifier.
    pub doc_id: String,
    /// Law title (normalized form).
    pub law_title: String,
    /// Article number like `제7조` or `제7조의2`, when the chunk is an
    /// article.
    #[serde(default)]
    pub article_number: Option<String>,
    /// Article heading, when present.
    #[serde(default)]
    pub article_title: Option<String>,
    /// Chunk text.
    pub content: String,
    /// Domain category bucket.
    pub category: String,
    /// Document kind (statute, enforcement decree, ...).
    pub doc_type: String,
    /// Relevance in [0, 1]; 1.0 on the direct path.
    pub relevance_score: f32,
    /// Enrichment: total article count of the law.
    #[serde(default)]
    pub total_articles: Option<u32>,
    /// Enrichment: enforcement date (ISO-8601 date string).
    #[serde(default)]
    pub enforcement_date: Option<String>,
    /// Enrichment: official law number.
    #[serde(default)]
    pub law_number: Option<String>,
    /// Enrichment: last article number of the law.
    #[serde(default)]
    pub last_article: Option<String>,
}

impl SearchRecord {
    /// Builds the explicit "law not found" record for an exact-article
    /// query whose law is absent from the catalog.
    #[must_use]
    pub fn law_not_found(law_title: &str, query: &str) -> Self {
        Self {
            doc_id: String::new(),
            law_title: law_title.to_string(),
            article_number: None,
            article_title: None,
            content: format!(
                "'{law_title}' 법령을 찾을 수 없습니다. 법령명을 확인해 주세요. (질의: {query})"
            ),
            category: String::new(),
            doc_type: ERROR_DOC_TYPE.to_string(),
            relevance_score: 0.0,
            total_articles: None,
            enforcement_date: None,
            law_number: None,
            last_article: None,
        }
    }

    /// Returns `true` for the "law not found" marker record.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.doc_type == ERROR_DOC_TYPE
    }

    /// Citation string for source lists, e.g. `주택임대차보호법 제7조`.
    #[must_use]
    pub fn citation(&self) -> String {
        match &self.article_number {
            Some(article) => format!("{} {article}", self.law_title),
            None => self.law_title.clone(),
        }
    }
}

/// Result of one `HybridLegalSearch` call.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Call status. An empty result set is still `success`.
    pub status: ToolStatus,
    /// Retrieved records.
    pub data: Vec<SearchRecord>,
    /// `data.len()`.
    pub count: usize,
    /// Strategy that produced the records.
    pub data_source: DataSource,
    /// The query as searched.
    pub query: String,
}

impl SearchOutcome {
    /// Builds a successful outcome from records.
    #[must_use]
    pub fn success(data: Vec<SearchRecord>, data_source: DataSource, query: &str) -> Self {
        Self {
            status: ToolStatus::Success,
            count: data.len(),
            data,
            data_source,
            query: query.to_string(),
        }
    }
}
