//! Shared test harness: scripted LLM client, counting vector index,
//! stub teams, and a seeded corpus.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use jibsa::catalog::{ChunkMeta, LawInfo, SqliteCatalog};
use jibsa::config::SupervisorConfig;
use jibsa::core::state::{TeamResult, TeamStatus};
use jibsa::core::TeamKind;
use jibsa::embedding::{Embedder, HashEmbedder};
use jibsa::error::EngineError;
use jibsa::index::{IndexedChunk, MemoryVectorIndex, ScoredChunk, VectorIndex};
use jibsa::llm::message::{ChatRequest, ChatResponse, TokenUsage};
use jibsa::llm::LlmClient;
use jibsa::memory::{SessionMemory, SqliteMemoryStore};
use jibsa::prompt::PromptSet;
use jibsa::search::HybridLegalSearch;
use jibsa::supervisor::{MemoryCheckpointStore, Supervisor};
use jibsa::team::{SearchTeam, TeamContext, TeamExecutor, TeamSet};
use jibsa::tools::{LegalSearchTool, Tool, ToolRegistry};
use jibsa::MetadataFilter;

/// Scripted intent: greeting.
pub const GREETING_INTENT: &str = r#"{"intent_type": "GREETING", "confidence": 0.99, "entities": {}, "keywords": [], "is_in_scope": true}"#;
/// Scripted intent: legal consult with lease keywords.
pub const LEGAL_INTENT: &str = r#"{"intent_type": "LEGAL_CONSULT", "confidence": 0.92, "entities": {}, "keywords": ["전세금", "인상"], "is_in_scope": true}"#;
/// Scripted stage-2 plan: one search step.
pub const SEARCH_PLAN: &str = r#"{"steps": [{"team": "search", "subquery": "전세금 인상 한도", "depends_on": []}], "execution_mode": "sequential", "skip_execution": false}"#;
/// Scripted tool plan: legal_search with the lease category filter.
pub const TOOL_PLAN_LEASE: &str = r#"{"selected_tools": ["legal_search"], "tool_parameters": {"legal_search": {"category": "2_임대차_전세_월세", "limit": 10}}, "search_strategy": "lease category search"}"#;
/// Scripted tool plan: legal_search with no filters.
pub const TOOL_PLAN_PLAIN: &str = r#"{"selected_tools": ["legal_search"], "tool_parameters": {}, "search_strategy": "plain search"}"#;
/// Scripted synthesis answer.
pub const SYNTH_ANSWER: &str =
    "주택임대차보호법 제7조에 따라 증액 청구는 약정 차임의 20분의 1(5%)을 초과할 수 없습니다.";

/// LLM client that pops scripted responses in order. `<error>` yields
/// an API error; exhausted scripts yield `{}`.
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| "{}".to_string());
        if content == "<error>" {
            return Err(EngineError::ApiRequest {
                message: "scripted failure".to_string(),
                status: Some(500),
            });
        }
        Ok(ChatResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
            },
            finish_reason: Some("stop".to_string()),
        })
    }
}

/// Vector index wrapper counting `query` and `get` calls.
pub struct CountingIndex {
    pub inner: MemoryVectorIndex,
    pub queries: AtomicUsize,
    pub gets: AtomicUsize,
}

impl CountingIndex {
    pub fn new(inner: MemoryVectorIndex) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
        }
    }
}

impl VectorIndex for CountingIndex {
    fn query(
        &self,
        embedding: &[f32],
        filter: &MetadataFilter,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, EngineError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(embedding, filter, k)
    }

    fn get(&self, ids: &[String]) -> Result<Vec<IndexedChunk>, EngineError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(ids)
    }
}

/// Team stub that sleeps, then (optionally) succeeds. Used to drive
/// team timeouts and partial-failure turns.
pub struct SleepyTeam {
    pub team: TeamKind,
    pub sleep: Duration,
    pub records: usize,
}

#[async_trait]
impl TeamExecutor for SleepyTeam {
    fn kind(&self) -> TeamKind {
        self.team
    }

    async fn execute(&self, _subquery: &str, _ctx: &TeamContext) -> TeamResult {
        tokio::time::sleep(self.sleep).await;
        let mut collected_data = std::collections::BTreeMap::new();
        let data: Vec<serde_json::Value> = (0..self.records)
            .map(|i| serde_json::json!({"row": i}))
            .collect();
        collected_data.insert("stub_tool".to_string(), data);
        TeamResult {
            team: self.team,
            status: if self.records > 0 {
                TeamStatus::Success
            } else {
                TeamStatus::Failed
            },
            collected_data,
            summary: format!("{} stub finished", self.team),
            error: None,
            duration: self.sleep,
        }
    }
}

/// Seeds the lease-law corpus into a catalog + counting index pair.
pub fn seeded_corpus() -> (Arc<SqliteCatalog>, Arc<CountingIndex>) {
    let catalog = SqliteCatalog::in_memory().expect("in-memory catalog");
    catalog
        .insert_law(
            "주택임대차보호법(법률)(제19356호)",
            &LawInfo {
                total_articles: Some(32),
                last_article: Some("제32조".to_string()),
                law_number: Some("제19356호".to_string()),
                enforcement_date: Some("2023-07-19".to_string()),
                category: Some("2_임대차_전세_월세".to_string()),
            },
        )
        .expect("law insert");

    let embedder = HashEmbedder::new();
    let index = MemoryVectorIndex::new();
    let chunks: [(&str, Option<&str>, &str, &str, bool); 5] = [
        (
            "lease-7",
            Some("제7조"),
            "2_임대차_전세_월세",
            "차임 증액청구는 약정한 차임등의 20분의 1의 금액을 초과하지 못한다.",
            false,
        ),
        (
            "lease-3",
            Some("제3조"),
            "2_임대차_전세_월세",
            "임대차는 그 등기가 없는 경우에도 주택의 인도와 주민등록을 마친 때에 대항력이 생긴다.",
            false,
        ),
        (
            "lease-6-3",
            Some("제6조의3"),
            "2_임대차_전세_월세",
            "임차인은 계약갱신을 요구할 수 있고 임대인은 정당한 사유 없이 거절하지 못한다.",
            false,
        ),
        (
            "gloss-1",
            None,
            "4_기타",
            "전세권: 전세금을 지급하고 타인의 부동산을 점유하여 사용·수익하는 권리.",
            false,
        ),
        (
            "lease-old",
            Some("제2조"),
            "2_임대차_전세_월세",
            "삭제된 조문.",
            true,
        ),
    ];
    for (seq, (doc_id, article, category, content, deleted)) in chunks.into_iter().enumerate() {
        let meta = ChunkMeta {
            law_title: "주택임대차보호법".to_string(),
            article_number: article.map(String::from),
            article_title: None,
            category: category.to_string(),
            doc_type: "법률".to_string(),
            is_deleted: deleted,
            is_tenant_protection: true,
            is_tax_related: false,
        };
        let vector = embedder.encode(content).expect("encode");
        catalog
            .insert_chunk(doc_id, &meta, content, seq as i64, &vector)
            .expect("chunk insert");
        index.insert(IndexedChunk {
            doc_id: doc_id.to_string(),
            content: content.to_string(),
            meta,
            embedding: vector,
        });
    }
    (Arc::new(catalog), Arc::new(CountingIndex::new(index)))
}

/// Everything a supervisor test needs to assert against.
pub struct Harness {
    pub supervisor: Supervisor,
    pub client: Arc<ScriptedClient>,
    pub store: Arc<SqliteMemoryStore>,
    pub checkpoints: Arc<MemoryCheckpointStore>,
    pub index: Arc<CountingIndex>,
}

/// Builds a full engine over the seeded corpus with a scripted LLM and
/// the given extra teams alongside the real search team.
pub fn harness_with_teams(
    responses: Vec<&str>,
    extra_teams: Vec<Arc<dyn TeamExecutor>>,
    config: SupervisorConfig,
) -> Harness {
    let client = Arc::new(ScriptedClient::new(responses));
    let (catalog, index) = seeded_corpus();

    let search = Arc::new(HybridLegalSearch::new(
        Arc::clone(&catalog) as Arc<dyn jibsa::MetadataCatalog>,
        Arc::clone(&index) as Arc<dyn VectorIndex>,
        Arc::new(HashEmbedder::new()) as Arc<dyn Embedder>,
    ));
    let registry = Arc::new(ToolRegistry::new(vec![
        Arc::new(LegalSearchTool::new(search)) as Arc<dyn Tool>,
    ]));
    let search_team = Arc::new(SearchTeam::new(
        Arc::clone(&client) as Arc<dyn LlmClient>,
        registry,
        &config,
        PromptSet::defaults(),
    )) as Arc<dyn TeamExecutor>;

    let mut teams = vec![search_team];
    teams.extend(extra_teams);

    let store = Arc::new(SqliteMemoryStore::in_memory().expect("memory store"));
    let memory = SessionMemory::from_store(Arc::clone(&store), config.recent_messages);
    let checkpoints = Arc::new(MemoryCheckpointStore::new());

    let supervisor = Supervisor::new(
        Arc::clone(&client) as Arc<dyn LlmClient>,
        TeamSet::new(teams),
        memory,
        Arc::clone(&checkpoints) as Arc<dyn jibsa::CheckpointStore>,
        config,
    );

    Harness {
        supervisor,
        client,
        store,
        checkpoints,
        index,
    }
}

/// Harness with only the search team and default test config.
pub fn harness(responses: Vec<&str>) -> Harness {
    harness_with_teams(responses, Vec::new(), test_config())
}

/// Short-timeout configuration for tests.
pub fn test_config() -> SupervisorConfig {
    SupervisorConfig::builder()
        .api_key("test")
        .team_timeout(Duration::from_millis(400))
        .tool_timeout(Duration::from_millis(300))
        .build()
        .expect("config")
}
