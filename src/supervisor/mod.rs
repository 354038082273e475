//! Top-level supervisor state machine.
//!
//! Coordinates one turn end to end:
//!
//! ```text
//! initialize → persist_user_turn → plan → route
//!     → execute teams (sequential | parallel | mixed)
//!     → aggregate → synthesize → persist_assistant_turn
//! ```
//!
//! Progress events stream at node boundaries, checkpoints record step
//! durations, and a cancellation token is honored between nodes and
//! between teams. Team failures are contained: the turn degrades, it
//! does not abort.

pub mod aggregate;
pub mod checkpoint;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::SupervisorConfig;
use crate::core::plan::{ExecutionMode, ExecutionPlan, PlanStep, TeamKind};
use crate::core::progress::{NullSink, ProgressEvent, ProgressSink, ProgressStage};
use crate::core::state::{SupervisorState, TeamResult, TurnOutcome, TurnStatus};
use crate::error::EngineError;
use crate::llm::message::{ChatRequest, TokenMeter, system_message, user_message};
use crate::llm::LlmClient;
use crate::memory::SessionMemory;
use crate::planner::PlanningAgent;
use crate::prompt::{
    CANCELLED_TEMPLATE, CLARIFY_TEMPLATE, PromptSet, build_synthesizer_prompt, fast_path_response,
};
use crate::team::{TeamContext, TeamSet};

pub use aggregate::{AggregatedResults, aggregate, degraded_summary};
pub use checkpoint::{
    CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore, StepTimer, TurnCheckpoint,
};

/// The supervisor engine. One instance serves many sessions; turns
/// within one session are serialized by a per-session lock.
pub struct Supervisor {
    llm: Arc<dyn LlmClient>,
    planner: PlanningAgent,
    teams: TeamSet,
    memory: SessionMemory,
    checkpoints: Arc<dyn CheckpointStore>,
    config: SupervisorConfig,
    prompts: PromptSet,
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Supervisor {
    /// Creates the supervisor over its capabilities.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        teams: TeamSet,
        memory: SessionMemory,
        checkpoints: Arc<dyn CheckpointStore>,
        config: SupervisorConfig,
    ) -> Self {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let planner = PlanningAgent::new(Arc::clone(&llm), &config, prompts.clone());
        Self {
            llm,
            planner,
            teams,
            memory,
            checkpoints,
            config,
            prompts,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Processes one user query in the given session.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InputRejected`] for invalid input (before
    /// any persistence or LLM call) and [`EngineError::Storage`] when
    /// the message store is unreachable. Team and synthesis failures
    /// are contained in the returned [`TurnOutcome`], never raised.
    pub async fn process_query(
        &self,
        query: &str,
        session_id: &str,
        progress: Option<Arc<dyn ProgressSink>>,
        cancel: Option<CancellationToken>,
    ) -> Result<TurnOutcome, EngineError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(EngineError::InputRejected {
                reason: "query is empty".to_string(),
            });
        }
        if query.len() > self.config.max_query_len {
            return Err(EngineError::InputRejected {
                reason: format!(
                    "query exceeds maximum length ({} bytes, max {})",
                    query.len(),
                    self.config.max_query_len
                ),
            });
        }

        let progress = progress.unwrap_or_else(|| Arc::new(NullSink));
        let cancel = cancel.unwrap_or_default();

        // Per-session serialization.
        let session_lock = self.session_lock(session_id);
        let _turn_guard = session_lock.lock().await;

        self.run_turn(trimmed, session_id, &*progress, &cancel).await
    }

    fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.session_locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    #[allow(clippy::too_many_lines)]
    async fn run_turn(
        &self,
        query: &str,
        session_id: &str,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome, EngineError> {
        let timer = StepTimer::new(session_id, &*self.checkpoints);
        let deadline = Instant::now() + self.config.turn_timeout;
        let meter = TokenMeter::new();
        let mut state = SupervisorState::new(query, session_id);

        // -- initialize -------------------------------------------------
        self.emit(progress, session_id, &timer, "initialize", "세션 준비", "supervisor", ProgressStage::Planning, 5);
        let history = self.memory.begin_turn(session_id)?;
        timer.checkpoint("initialize", "ok");

        // -- persist_user_turn ------------------------------------------
        // Before any heavy work, so the user message survives later
        // failures.
        self.memory.record_user(session_id, query)?;
        timer.checkpoint("persist_user_turn", "ok");

        // -- plan -------------------------------------------------------
        self.emit(progress, session_id, &timer, "plan", "의도 분석", "supervisor", ProgressStage::Planning, 20);
        let (intent, plan) = self.planner.plan(query, &history, &meter).await;
        debug!(intent = %intent.intent_type, steps = plan.steps.len(), "plan ready");
        state.intent = Some(intent.clone());
        state.plan = Some(plan.clone());
        timer.checkpoint("plan", "ok");

        // -- route ------------------------------------------------------
        self.emit(progress, session_id, &timer, "route", "실행 경로 결정", "supervisor", ProgressStage::Planning, 30);
        if plan.skip_execution || plan.steps.is_empty() {
            let answer = fast_path_response(intent.intent_type)
                .unwrap_or(CLARIFY_TEMPLATE)
                .to_string();
            state.final_response.clone_from(&answer);
            self.memory.record_assistant(session_id, &answer)?;
            timer.checkpoint("synthesize", "ok");
            self.emit(progress, session_id, &timer, "completed", "완료", "supervisor", ProgressStage::Completed, 100);
            return Ok(TurnOutcome {
                answer,
                sources: Vec::new(),
                data: std::collections::BTreeMap::new(),
                execution_time_ms: timer.elapsed_ms(),
                teams_used: Vec::new(),
                intent: Some(intent.intent_type),
                status: TurnStatus::Completed,
                total_tokens: meter.total(),
            });
        }

        // -- execute ----------------------------------------------------
        let cancelled = self
            .execute_plan(&plan, &intent.keywords, &mut state, &meter, deadline, progress, cancel)
            .await;
        timer.checkpoint("execute", if cancelled { "cancelled" } else { "ok" });

        // -- aggregate --------------------------------------------------
        self.emit(progress, session_id, &timer, "aggregate", "결과 통합", "supervisor", ProgressStage::Analyzing, 80);
        let aggregated = aggregate(&state.team_results);
        timer.checkpoint("aggregate", "ok");

        // -- synthesize -------------------------------------------------
        self.emit(progress, session_id, &timer, "synthesize", "답변 생성", "supervisor", ProgressStage::Generating, 95);
        let turn_timed_out = Instant::now() >= deadline;
        let mut status = if cancelled {
            TurnStatus::Cancelled
        } else if turn_timed_out {
            TurnStatus::Failed
        } else {
            state.derive_status()
        };

        let answer = if cancelled {
            CANCELLED_TEMPLATE.to_string()
        } else if turn_timed_out || status == TurnStatus::Failed {
            degraded_summary(query, &aggregated)
        } else {
            match self.synthesize(query, &aggregated, &meter).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) | Err(_) => {
                    warn!("synthesis failed or empty, returning deterministic summary");
                    if status == TurnStatus::Completed {
                        status = TurnStatus::Partial;
                    }
                    degraded_summary(query, &aggregated)
                }
            }
        };
        state.final_response.clone_from(&answer);
        timer.checkpoint("synthesize", "ok");

        // -- persist_assistant_turn -------------------------------------
        // Every terminal state with user-visible output persists.
        self.memory.record_assistant(session_id, &answer)?;
        timer.checkpoint("persist_assistant_turn", "ok");

        let (final_step, final_stage) = match status {
            TurnStatus::Completed | TurnStatus::Partial => ("completed", ProgressStage::Completed),
            TurnStatus::Failed | TurnStatus::Cancelled => ("failed", ProgressStage::Failed),
        };
        self.emit(progress, session_id, &timer, final_step, "완료", "supervisor", final_stage, 100);

        Ok(TurnOutcome {
            answer,
            sources: aggregated.sources.clone(),
            data: aggregated.data_by_team(),
            execution_time_ms: timer.elapsed_ms(),
            teams_used: state.team_results.keys().copied().collect(),
            intent: Some(intent.intent_type),
            status,
            total_tokens: meter.total(),
        })
    }

    /// Runs the plan's steps per its execution mode. Returns `true`
    /// when the turn was cancelled mid-execution.
    #[allow(clippy::too_many_arguments)]
    async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        keywords: &[String],
        state: &mut SupervisorState,
        meter: &TokenMeter,
        deadline: Instant,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> bool {
        let levels: Vec<Vec<usize>> = match plan.execution_mode {
            ExecutionMode::Sequential => (0..plan.steps.len()).map(|i| vec![i]).collect(),
            ExecutionMode::Parallel => vec![(0..plan.steps.len()).collect()],
            ExecutionMode::Mixed => plan.dependency_levels(),
        };

        let total_steps = plan.steps.len().max(1);
        let mut done_steps = 0_usize;

        for level in levels {
            if cancel.is_cancelled() {
                self.mark_remaining_skipped(plan, state, "cancelled");
                return true;
            }

            let results = self
                .run_level(plan, &level, keywords, state, meter, deadline, cancel)
                .await;

            let mut saw_cancel = false;
            for result in results {
                saw_cancel |= result.error.as_deref() == Some("cancelled");
                let team = result.team;
                state.record_team(result);
                done_steps += 1;
                let pct = u8::try_from(40 + 30 * done_steps / total_steps).unwrap_or(70);
                let stage = if team == TeamKind::Search {
                    ProgressStage::Searching
                } else {
                    ProgressStage::Analyzing
                };
                progress.emit(
                    &state.session_id,
                    ProgressEvent::new(
                        "execute",
                        &format!("{team} 팀 완료"),
                        team.as_str(),
                        stage,
                        pct,
                        elapsed_ms_since(state.started),
                    ),
                );
            }
            if saw_cancel {
                self.mark_remaining_skipped(plan, state, "cancelled");
                return true;
            }
        }
        false
    }

    /// Runs one dependency level's steps concurrently (bounded).
    #[allow(clippy::too_many_arguments)]
    async fn run_level(
        &self,
        plan: &ExecutionPlan,
        level: &[usize],
        keywords: &[String],
        state: &SupervisorState,
        meter: &TokenMeter,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Vec<TeamResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_team_parallelism));
        let mut ready: Vec<TeamResult> = Vec::new();
        let mut handles = Vec::with_capacity(level.len());

        for &idx in level {
            let step: &PlanStep = &plan.steps[idx];
            let team = step.team;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                ready.push(TeamResult::failed(
                    team,
                    "turn timeout before team start",
                    Duration::ZERO,
                ));
                continue;
            }

            let Some(executor) = self.teams.get(team) else {
                ready.push(TeamResult::failed(
                    team,
                    format!("no executor registered for team '{team}'"),
                    Duration::ZERO,
                ));
                continue;
            };

            let ctx = TeamContext {
                session_id: state.session_id.clone(),
                keywords: keywords.to_vec(),
                prior_summaries: step
                    .depends_on
                    .iter()
                    .filter_map(|&dep| plan.steps.get(dep))
                    .filter_map(|dep_step| state.team_results.get(&dep_step.team))
                    .map(|r| r.summary.clone())
                    .collect(),
                meter: meter.clone(),
            };
            let subquery = step.subquery.clone();
            let team_timeout = self.config.team_timeout.min(remaining);
            let sem = Arc::clone(&semaphore);
            let token = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return TeamResult::failed(team, "scheduler shut down", Duration::ZERO);
                    }
                };
                let started = Instant::now();
                tokio::select! {
                    () = token.cancelled() => {
                        TeamResult::failed(team, "cancelled", started.elapsed())
                    }
                    outcome = tokio::time::timeout(team_timeout, executor.execute(&subquery, &ctx)) => {
                        outcome.unwrap_or_else(|_| {
                            TeamResult::failed(
                                team,
                                format!("timed out after {}s", team_timeout.as_secs()),
                                started.elapsed(),
                            )
                        })
                    }
                }
            }));
        }

        let mut results = ready;
        for joined in futures_util::future::join_all(handles).await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(error = %e, "team task join failed");
                }
            }
        }
        results
    }

    /// Marks planned-but-unexecuted teams as skipped after cancellation.
    fn mark_remaining_skipped(
        &self,
        plan: &ExecutionPlan,
        state: &mut SupervisorState,
        reason: &str,
    ) {
        for team in plan.teams() {
            if !state.team_results.contains_key(&team) {
                state.record_team(TeamResult::skipped(team, reason));
            }
        }
    }

    async fn synthesize(
        &self,
        query: &str,
        aggregated: &AggregatedResults,
        meter: &TokenMeter,
    ) -> Result<String, EngineError> {
        let user_msg = build_synthesizer_prompt(query, aggregated);
        let request = ChatRequest {
            model: self.config.synthesizer_model.clone(),
            messages: vec![
                system_message(&self.prompts.synthesizer),
                user_message(&user_msg),
            ],
            temperature: Some(0.1),
            max_tokens: Some(self.config.synthesizer_max_tokens),
            json_mode: false,
        };
        let response = self.llm.complete(&request).await?;
        meter.add(response.usage);
        Ok(response.content)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        progress: &dyn ProgressSink,
        session_id: &str,
        timer: &StepTimer<'_>,
        step: &str,
        label: &str,
        agent: &str,
        stage: ProgressStage,
        pct: u8,
    ) {
        progress.emit(
            session_id,
            ProgressEvent::new(step, label, agent, stage, pct, timer.elapsed_ms()),
        );
    }
}

fn elapsed_ms_since(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("llm", &self.llm.name())
            .field("teams", &self.teams)
            .field("config", &self.config)
            .finish()
    }
}
