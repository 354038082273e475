//! CLI command implementations.
//!
//! Wires the engine's capabilities together for each command and
//! formats the results.

// Allow direct printing in the CLI output layer
#![allow(clippy::print_stdout)]

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::catalog::{MetadataCatalog, SqliteCatalog};
use crate::cli::parser::{Cli, Commands};
use crate::config::SupervisorConfig;
use crate::corpus::ingest_jsonl;
use crate::embedding::create_embedder;
use crate::index::{MemoryVectorIndex, VectorIndex};
use crate::llm::create_client;
use crate::memory::{SessionMemory, SqliteMemoryStore};
use crate::search::HybridLegalSearch;
use crate::supervisor::{SqliteCheckpointStore, Supervisor};
use crate::team::{SearchTeam, TeamSet};
use crate::tools::{ContractTemplateTool, LegalSearchTool, Tool, ToolRegistry};

/// Default database path relative to the working directory.
const DEFAULT_DB_PATH: &str = ".jibsa/jibsa.db";

fn resolve_db_path(cli: &Cli) -> PathBuf {
    cli.db_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

fn open_catalog(path: &PathBuf) -> anyhow::Result<SqliteCatalog> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    SqliteCatalog::open(path).context("cannot open catalog database")
}

/// Builds the full engine from the catalog database and environment
/// configuration.
fn build_supervisor(db_path: &PathBuf) -> anyhow::Result<Supervisor> {
    let config = SupervisorConfig::from_env().context("engine configuration")?;
    let llm = create_client(&config).context("LLM client")?;

    let catalog = Arc::new(open_catalog(db_path)?);
    let chunks = catalog.load_chunks().context("loading corpus chunks")?;
    if chunks.is_empty() {
        anyhow::bail!(
            "corpus is empty at {}; run `jibsa ingest <corpus.jsonl>` first",
            db_path.display()
        );
    }
    let index = Arc::new(MemoryVectorIndex::from_chunks(chunks));
    let embedder: Arc<dyn crate::embedding::Embedder> =
        Arc::from(create_embedder().context("embedder")?);

    let search = Arc::new(HybridLegalSearch::new(
        Arc::clone(&catalog) as Arc<dyn MetadataCatalog>,
        Arc::clone(&index) as Arc<dyn VectorIndex>,
        embedder,
    ));
    let registry = Arc::new(ToolRegistry::new(vec![
        Arc::new(LegalSearchTool::new(search)) as Arc<dyn Tool>,
        Arc::new(ContractTemplateTool::new()) as Arc<dyn Tool>,
    ]));

    let prompts = crate::prompt::PromptSet::load(config.prompt_dir.as_deref());
    let search_team = Arc::new(SearchTeam::new(
        Arc::clone(&llm),
        registry,
        &config,
        prompts,
    )) as Arc<dyn crate::team::TeamExecutor>;
    let teams = TeamSet::new(vec![search_team]);

    let store = Arc::new(
        SqliteMemoryStore::open(db_path).context("cannot open session store")?,
    );
    let memory = SessionMemory::from_store(store, config.recent_messages);
    let checkpoints = Arc::new(
        SqliteCheckpointStore::open(db_path).context("cannot open checkpoint store")?,
    );

    Ok(Supervisor::new(llm, teams, memory, checkpoints, config))
}

fn print_outcome(outcome: &crate::core::TurnOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    println!("{}", outcome.answer);
    if !outcome.sources.is_empty() {
        println!("\n출처:");
        for source in &outcome.sources {
            println!("  - {source}");
        }
    }
    println!(
        "\n[{} | {}ms | teams: {} | tokens: {}]",
        match outcome.status {
            crate::core::TurnStatus::Completed => "completed",
            crate::core::TurnStatus::Partial => "partial",
            crate::core::TurnStatus::Failed => "failed",
            crate::core::TurnStatus::Cancelled => "cancelled",
        },
        outcome.execution_time_ms,
        outcome
            .teams_used
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(","),
        outcome.total_tokens,
    );
    Ok(())
}

/// Executes the parsed CLI command.
///
/// # Errors
///
/// Returns an error for configuration, storage, or engine failures;
/// the binary maps it to a non-zero exit code.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let db_path = resolve_db_path(&cli);

    match cli.command {
        Commands::Ingest { corpus } => {
            let catalog = open_catalog(&db_path)?;
            let index = MemoryVectorIndex::new();
            let embedder = create_embedder().context("embedder")?;
            let report = ingest_jsonl(&corpus, &catalog, &index, &*embedder)
                .context("corpus ingestion")?;
            println!(
                "ingested {} chunks across {} laws into {} ({} failures)",
                report.chunks,
                report.laws,
                db_path.display(),
                report.failures,
            );
            Ok(())
        }

        Commands::Query { text, session, json } => {
            let supervisor = build_supervisor(&db_path)?;
            let outcome = supervisor
                .process_query(&text, &session, None, None)
                .await
                .context("query failed")?;
            print_outcome(&outcome, json)
        }

        Commands::Chat { session } => {
            let supervisor = build_supervisor(&db_path)?;
            println!("jibsa chat — 세션 '{session}' (빈 줄 입력 시 종료)");
            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush().ok();
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let line = line.trim();
                if line.is_empty() {
                    break;
                }
                match supervisor.process_query(line, &session, None, None).await {
                    Ok(outcome) => print_outcome(&outcome, false)?,
                    Err(e) => println!("오류: {e}"),
                }
            }
            Ok(())
        }
    }
}
