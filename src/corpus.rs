//! Corpus ingestion.
//!
//! Loads a JSONL export of the legal corpus into the catalog and the
//! vector index: one chunk per line with structured metadata, plus
//! law-level enrichment fields carried on any of its chunks.

use std::io::BufRead;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::catalog::{ChunkMeta, LawInfo, SqliteCatalog};
use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::index::{IndexedChunk, MemoryVectorIndex};

/// One corpus line.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusChunk {
    /// Stable chunk identifier.
    pub doc_id: String,
    /// Law title (decorated form accepted).
    pub law_title: String,
    /// Article number, when the chunk is an article.
    #[serde(default)]
    pub article_number: Option<String>,
    /// Article heading.
    #[serde(default)]
    pub article_title: Option<String>,
    /// Chunk text.
    pub content: String,
    /// Category bucket.
    pub category: String,
    /// Document kind.
    pub doc_type: String,
    /// Deleted/repealed flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Tenant-protection flag.
    #[serde(default)]
    pub is_tenant_protection: bool,
    /// Tax-related flag.
    #[serde(default)]
    pub is_tax_related: bool,
    /// Position within the law.
    #[serde(default)]
    pub seq: i64,
    /// Law-level: official law number.
    #[serde(default)]
    pub law_number: Option<String>,
    /// Law-level: enforcement date.
    #[serde(default)]
    pub enforcement_date: Option<String>,
    /// Law-level: total article count.
    #[serde(default)]
    pub total_articles: Option<u32>,
    /// Law-level: last article number.
    #[serde(default)]
    pub last_article: Option<String>,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// Chunks stored and indexed.
    pub chunks: usize,
    /// Distinct laws registered.
    pub laws: usize,
    /// Lines skipped (parse or embed failure).
    pub failures: usize,
}

/// Ingests a JSONL corpus file into the catalog and index.
///
/// Malformed lines are counted and skipped, not fatal. Law rows are
/// registered on first sight of each title; later chunks of the same
/// law only add article mappings.
///
/// # Errors
///
/// Returns [`EngineError::Ingest`] when the file cannot be read and
/// [`EngineError::Storage`] on catalog write failure.
pub fn ingest_jsonl(
    path: &Path,
    catalog: &SqliteCatalog,
    index: &MemoryVectorIndex,
    embedder: &dyn Embedder,
) -> Result<IngestReport, EngineError> {
    let file = std::fs::File::open(path).map_err(|e| EngineError::Ingest {
        message: format!("cannot open {}: {e}", path.display()),
    })?;
    let reader = std::io::BufReader::new(file);

    let mut report = IngestReport::default();
    let mut seen_laws: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| EngineError::Ingest {
            message: format!("read failed at line {}: {e}", line_no + 1),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let chunk: CorpusChunk = match serde_json::from_str(&line) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed corpus line");
                report.failures += 1;
                continue;
            }
        };

        let normalized = crate::catalog::normalize_law_title(&chunk.law_title);
        if seen_laws.insert(normalized) {
            catalog.insert_law(
                &chunk.law_title,
                &LawInfo {
                    total_articles: chunk.total_articles,
                    last_article: chunk.last_article.clone(),
                    law_number: chunk.law_number.clone(),
                    enforcement_date: chunk.enforcement_date.clone(),
                    category: Some(chunk.category.clone()),
                },
            )?;
            report.laws += 1;
        }

        let embedding = match embedder.encode(&chunk.content) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(doc_id = %chunk.doc_id, error = %e, "embedding failed, chunk skipped");
                report.failures += 1;
                continue;
            }
        };

        let meta = ChunkMeta {
            law_title: chunk.law_title.clone(),
            article_number: chunk.article_number.clone(),
            article_title: chunk.article_title.clone(),
            category: chunk.category.clone(),
            doc_type: chunk.doc_type.clone(),
            is_deleted: chunk.is_deleted,
            is_tenant_protection: chunk.is_tenant_protection,
            is_tax_related: chunk.is_tax_related,
        };
        catalog.insert_chunk(&chunk.doc_id, &meta, &chunk.content, chunk.seq, &embedding)?;
        index.insert(IndexedChunk {
            doc_id: chunk.doc_id,
            content: chunk.content,
            meta: ChunkMeta {
                law_title: crate::catalog::normalize_law_title(&meta.law_title),
                ..meta
            },
            embedding,
        });
        report.chunks += 1;
    }

    debug!(
        chunks = report.chunks,
        laws = report.laws,
        failures = report.failures,
        "corpus ingestion finished"
    );
    Ok(report)
}
