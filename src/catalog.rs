//! Structured metadata catalog over the legal corpus.
//!
//! Read-only exact-match lookups: does a law exist, which chunks hold a
//! given article, and enrichment info per law. Backed by sqlite; all
//! reads are thread-safe and side-effect free. Missing data returns
//! empty/`None`; only store connectivity failures surface as errors.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Structured metadata carried by every indexed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Normalized law title.
    pub law_title: String,
    /// Article number (`제7조`, `제7조의2`) when the chunk is an article.
    #[serde(default)]
    pub article_number: Option<String>,
    /// Article heading, when present.
    #[serde(default)]
    pub article_title: Option<String>,
    /// Domain category bucket.
    pub category: String,
    /// Document kind (법률, 시행령, 시행규칙, 대법원규칙, 용어집, 기타).
    pub doc_type: String,
    /// Whether the provision has been deleted/repealed.
    #[serde(default)]
    pub is_deleted: bool,
    /// Tenant-protection flag.
    #[serde(default)]
    pub is_tenant_protection: bool,
    /// Tax-related flag.
    #[serde(default)]
    pub is_tax_related: bool,
}

/// Enrichment info for one law.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawInfo {
    /// Total article count.
    pub total_articles: Option<u32>,
    /// Last article number.
    pub last_article: Option<String>,
    /// Official law number.
    pub law_number: Option<String>,
    /// Enforcement date (ISO-8601 date string).
    pub enforcement_date: Option<String>,
    /// Category the law belongs to.
    pub category: Option<String>,
}

/// Vendor-agnostic predicate over [`ChunkMeta`], applied by the vector
/// index **before** similarity scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// Restrict to one document kind. Only set when explicitly
    /// requested; never inferred from vague terms.
    pub doc_type: Option<String>,
    /// Restrict to one category bucket (the primary corpus narrower).
    pub category: Option<String>,
    /// Restrict by tenant-protection flag.
    pub is_tenant_protection: Option<bool>,
    /// Restrict by tax-related flag.
    pub is_tax_related: Option<bool>,
    /// Exclude deleted/repealed provisions. Defaults to `true`.
    pub exclude_deleted: bool,
    /// Restrict to one law (article fast-path fallback).
    pub law_title: Option<String>,
}

impl Default for MetadataFilter {
    fn default() -> Self {
        Self {
            doc_type: None,
            category: None,
            is_tenant_protection: None,
            is_tax_related: None,
            exclude_deleted: true,
            law_title: None,
        }
    }
}

impl MetadataFilter {
    /// Builds a filter from optional structured parameters.
    #[must_use]
    pub fn build(
        doc_type: Option<&str>,
        category: Option<&str>,
        is_tenant_protection: Option<bool>,
        is_tax_related: Option<bool>,
        exclude_deleted: bool,
    ) -> Self {
        Self {
            doc_type: doc_type.map(str::to_string),
            category: category.map(str::to_string),
            is_tenant_protection,
            is_tax_related,
            exclude_deleted,
            law_title: None,
        }
    }

    /// Returns a copy restricted to the given law title.
    #[must_use]
    pub fn for_law(mut self, law_title: &str) -> Self {
        self.law_title = Some(law_title.to_string());
        self
    }

    /// Evaluates the predicate conjunction against chunk metadata.
    #[must_use]
    pub fn matches(&self, meta: &ChunkMeta) -> bool {
        if self.exclude_deleted && meta.is_deleted {
            return false;
        }
        if let Some(ref dt) = self.doc_type
            && meta.doc_type != *dt
        {
            return false;
        }
        if let Some(ref cat) = self.category
            && meta.category != *cat
        {
            return false;
        }
        if let Some(flag) = self.is_tenant_protection
            && meta.is_tenant_protection != flag
        {
            return false;
        }
        if let Some(flag) = self.is_tax_related
            && meta.is_tax_related != flag
        {
            return false;
        }
        if let Some(ref law) = self.law_title
            && normalize_law_title(&meta.law_title) != normalize_law_title(law)
        {
            return false;
        }
        true
    }
}

/// Normalizes a law title for comparison: strips parenthesized suffix
/// decorations (`주택임대차보호법(법률)(제19356호)` →
/// `주택임대차보호법`) and collapses whitespace.
#[must_use]
pub fn normalize_law_title(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0_usize;
    for c in raw.chars() {
        match c {
            '(' | '（' => depth += 1,
            ')' | '）' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                if !c.is_whitespace() {
                    out.push(c);
                }
            }
            _ => {}
        }
    }
    out
}

/// Read-only structured lookups over the legal corpus.
///
/// Pure reads, safe for concurrent team access. String comparisons use
/// [`normalize_law_title`].
pub trait MetadataCatalog: Send + Sync {
    /// Fuzzy existence check on normalized law titles.
    fn law_exists(&self, title: &str) -> Result<bool, EngineError>;

    /// Ordered chunk identifiers for `(law, article)`. Empty when the
    /// pair is absent.
    fn article_chunk_ids(
        &self,
        title: &str,
        article_number: &str,
    ) -> Result<Vec<String>, EngineError>;

    /// Enrichment info for a law, or `None` when unknown.
    fn law_info(&self, title: &str) -> Result<Option<LawInfo>, EngineError>;
}

/// Sqlite-backed catalog. One connection behind a mutex; catalog reads
/// are short point lookups.
pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

impl SqliteCatalog {
    /// Opens (or creates) a catalog database at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on connection or schema failure.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory catalog (tests, ephemeral runs).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on schema failure.
    pub fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), EngineError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS laws (
                law_title        TEXT PRIMARY KEY,
                raw_title        TEXT NOT NULL,
                law_number       TEXT,
                enforcement_date TEXT,
                category         TEXT,
                total_articles   INTEGER,
                last_article     TEXT
            );
            CREATE TABLE IF NOT EXISTS chunks (
                doc_id               TEXT PRIMARY KEY,
                law_title            TEXT NOT NULL,
                article_number       TEXT,
                article_title        TEXT,
                content              TEXT NOT NULL,
                category             TEXT NOT NULL,
                doc_type             TEXT NOT NULL,
                is_deleted           INTEGER NOT NULL DEFAULT 0,
                is_tenant_protection INTEGER NOT NULL DEFAULT 0,
                is_tax_related       INTEGER NOT NULL DEFAULT 0,
                seq                  INTEGER NOT NULL DEFAULT 0,
                embedding            BLOB
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_law_article
                ON chunks(law_title, article_number, seq);",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Storage(rusqlite::Error::InvalidQuery))
    }

    /// Resolves a (possibly decorated) title to the canonical stored
    /// title: exact normalized match first, then substring containment
    /// either way, shortest candidate wins.
    fn resolve_law(&self, title: &str) -> Result<Option<String>, EngineError> {
        let norm = normalize_law_title(title);
        if norm.is_empty() {
            return Ok(None);
        }
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT law_title FROM laws")?;
        let titles = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        if titles.iter().any(|t| *t == norm) {
            return Ok(Some(norm));
        }
        let mut candidates: Vec<&String> = titles
            .iter()
            .filter(|t| t.contains(&norm) || norm.contains(t.as_str()))
            .collect();
        candidates.sort_by_key(|t| (t.len(), t.as_str()));
        Ok(candidates.first().map(|t| (*t).clone()))
    }

    /// Inserts or replaces a law row. Title is normalized on the way in.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on write failure.
    pub fn insert_law(
        &self,
        raw_title: &str,
        info: &LawInfo,
    ) -> Result<(), EngineError> {
        let norm = normalize_law_title(raw_title);
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO laws
                (law_title, raw_title, law_number, enforcement_date, category,
                 total_articles, last_article)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                norm,
                raw_title,
                info.law_number,
                info.enforcement_date,
                info.category,
                info.total_articles,
                info.last_article,
            ],
        )?;
        Ok(())
    }

    /// Inserts or replaces a chunk row with its embedding.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on write failure.
    pub fn insert_chunk(
        &self,
        doc_id: &str,
        meta: &ChunkMeta,
        content: &str,
        seq: i64,
        embedding: &[f32],
    ) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO chunks
                (doc_id, law_title, article_number, article_title, content,
                 category, doc_type, is_deleted, is_tenant_protection,
                 is_tax_related, seq, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                doc_id,
                normalize_law_title(&meta.law_title),
                meta.article_number,
                meta.article_title,
                content,
                meta.category,
                meta.doc_type,
                i32::from(meta.is_deleted),
                i32::from(meta.is_tenant_protection),
                i32::from(meta.is_tax_related),
                seq,
                encode_embedding(embedding),
            ],
        )?;
        Ok(())
    }

    /// Loads every chunk with its embedding, in `(law_title, seq)`
    /// order, for seeding an in-memory vector index at startup.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on read failure.
    pub fn load_chunks(&self) -> Result<Vec<StoredChunk>, EngineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc_id, law_title, article_number, article_title, content,
                    category, doc_type, is_deleted, is_tenant_protection,
                    is_tax_related, embedding
             FROM chunks ORDER BY law_title, seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredChunk {
                doc_id: row.get(0)?,
                meta: ChunkMeta {
                    law_title: row.get(1)?,
                    article_number: row.get(2)?,
                    article_title: row.get(3)?,
                    category: row.get(5)?,
                    doc_type: row.get(6)?,
                    is_deleted: row.get::<_, i32>(7)? != 0,
                    is_tenant_protection: row.get::<_, i32>(8)? != 0,
                    is_tax_related: row.get::<_, i32>(9)? != 0,
                },
                content: row.get(4)?,
                embedding: row
                    .get::<_, Option<Vec<u8>>>(10)?
                    .map(|blob| decode_embedding(&blob))
                    .unwrap_or_default(),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(EngineError::from)
    }

    /// Number of chunks in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Storage`] on read failure.
    pub fn chunk_count(&self) -> Result<usize, EngineError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// One chunk row loaded from the catalog, embedding included.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    /// Stable chunk identifier.
    pub doc_id: String,
    /// Structured metadata.
    pub meta: ChunkMeta,
    /// Chunk text.
    pub content: String,
    /// Embedding vector (empty when the chunk was stored unembedded).
    pub embedding: Vec<f32>,
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl MetadataCatalog for SqliteCatalog {
    fn law_exists(&self, title: &str) -> Result<bool, EngineError> {
        Ok(self.resolve_law(title)?.is_some())
    }

    fn article_chunk_ids(
        &self,
        title: &str,
        article_number: &str,
    ) -> Result<Vec<String>, EngineError> {
        let Some(canonical) = self.resolve_law(title)? else {
            return Ok(Vec::new());
        };
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc_id FROM chunks
             WHERE law_title = ?1 AND article_number = ?2
             ORDER BY seq, doc_id",
        )?;
        let ids = stmt
            .query_map(params![canonical, article_number], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn law_info(&self, title: &str) -> Result<Option<LawInfo>, EngineError> {
        let Some(canonical) = self.resolve_law(title)? else {
            return Ok(None);
        };
        let conn = self.lock()?;
        conn.query_row(
            "SELECT total_articles, last_article, law_number, enforcement_date, category
             FROM laws WHERE law_title = ?1",
            params![canonical],
            |row| {
                Ok(LawInfo {
                    total_articles: row.get(0)?,
                    last_article: row.get(1)?,
                    law_number: row.get(2)?,
                    enforcement_date: row.get(3)?,
                    category: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(EngineError::from)
    }
}
