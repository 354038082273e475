//! Search team executor.
//!
//! Internal state machine with four nodes:
//!
//! 1. **PLAN** — LLM picks tools and structured parameters for the
//!    subquery (lenient parse, rule-based fallback).
//! 2. **EXECUTE** — selected tools run concurrently under a semaphore
//!    with a per-tool timeout; failures are contained per tool.
//! 3. **PROCESS** — outputs fold into `collected_data` keyed by tool
//!    name; a data-quality score tracks how many tools produced data.
//! 4. **DECIDE** — rule-based status; the LLM is consulted only when
//!    the tool mix is genuinely ambiguous, which keeps the extra call
//!    off the common path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{TeamContext, TeamExecutor};
use crate::config::SupervisorConfig;
use crate::core::plan::TeamKind;
use crate::core::record::ToolStatus;
use crate::core::state::{TeamResult, TeamStatus};
use crate::llm::json::parse_json_response;
use crate::llm::message::{ChatRequest, system_message, user_message};
use crate::llm::LlmClient;
use crate::prompt::{PromptSet, build_decide_prompt, build_tool_plan_prompt};
use crate::tools::{ToolOutput, ToolRegistry};

/// Records at or above which the decide node returns without an LLM.
const DECIDE_SUFFICIENT_RECORDS: usize = 5;

/// Forbidden doc_type value the planner prompt also bans; stripped
/// defensively from parsed plans.
const FORBIDDEN_DOC_TYPE: &str = "기타";

/// Tool selection produced by the PLAN node.
#[derive(Debug, Clone, Deserialize)]
struct ToolPlan {
    #[serde(default)]
    selected_tools: Vec<String>,
    #[serde(default)]
    tool_parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    search_strategy: String,
}

/// Verdict of the ambiguous-decide LLM call.
#[derive(Debug, Clone, Deserialize)]
struct DecideVerdict {
    sufficient: bool,
    #[serde(default)]
    reason: String,
}

/// The Search team: tool planning, bounded concurrent retrieval,
/// result folding, rule-based decision.
pub struct SearchTeam {
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    model: String,
    plan_max_tokens: u32,
    tool_timeout: Duration,
    max_tool_parallelism: usize,
    prompts: PromptSet,
}

impl SearchTeam {
    /// Creates the team over the shared LLM client and tool registry.
    #[must_use]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        config: &SupervisorConfig,
        prompts: PromptSet,
    ) -> Self {
        Self {
            llm,
            registry,
            model: config.planner_model.clone(),
            plan_max_tokens: config.plan_max_tokens,
            tool_timeout: config.tool_timeout,
            max_tool_parallelism: config.max_tool_parallelism,
            prompts,
        }
    }

    /// PLAN node. One LLM attempt; any failure falls back to running
    /// every registered tool with empty parameters.
    async fn plan(&self, subquery: &str, ctx: &TeamContext) -> ToolPlan {
        let user_msg =
            build_tool_plan_prompt(subquery, &ctx.keywords, &self.registry.descriptions());
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.prompts.tool_plan),
                user_message(&user_msg),
            ],
            temperature: Some(0.0),
            max_tokens: Some(self.plan_max_tokens),
            json_mode: true,
        };

        let plan = match self.llm.complete(&request).await {
            Ok(response) => {
                ctx.meter.add(response.usage);
                match parse_json_response::<ToolPlan>(&response.content) {
                    Ok(plan) => Some(plan),
                    Err(e) => {
                        warn!(error = %e, "tool plan parse failed, using fallback");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "tool plan request failed, using fallback");
                None
            }
        };

        plan.map_or_else(|| self.fallback_plan(), |p| self.sanitize_plan(p))
    }

    /// Runs every registered tool with empty parameters.
    fn fallback_plan(&self) -> ToolPlan {
        ToolPlan {
            selected_tools: self.registry.names().iter().map(ToString::to_string).collect(),
            tool_parameters: BTreeMap::new(),
            search_strategy: "fallback: all registered tools".to_string(),
        }
    }

    /// Drops unknown tools and forbidden parameter values.
    fn sanitize_plan(&self, mut plan: ToolPlan) -> ToolPlan {
        plan.selected_tools.retain(|name| {
            let known = self.registry.get(name).is_some();
            if !known {
                warn!(tool = %name, "planner selected unknown tool, dropped");
            }
            known
        });
        plan.selected_tools.dedup();
        if plan.selected_tools.is_empty() {
            return self.fallback_plan();
        }
        for params in plan.tool_parameters.values_mut() {
            if let Some(map) = params.as_object_mut()
                && map.get("doc_type").and_then(|v| v.as_str()) == Some(FORBIDDEN_DOC_TYPE)
            {
                map.remove("doc_type");
            }
        }
        plan
    }

    /// EXECUTE node. Tools run concurrently under the semaphore; each
    /// failure or timeout is recorded against its own tool only.
    async fn run_tools(
        &self,
        subquery: &str,
        plan: &ToolPlan,
    ) -> Vec<(String, Result<ToolOutput, String>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_tool_parallelism));
        let mut handles = Vec::with_capacity(plan.selected_tools.len());

        for name in &plan.selected_tools {
            let Some(tool) = self.registry.get(name) else {
                continue;
            };
            let sem = Arc::clone(&semaphore);
            let params = plan
                .tool_parameters
                .get(name)
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            let query = subquery.to_string();
            let name = name.clone();
            let timeout = self.tool_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return (name, Err(format!("semaphore closed: {e}"))),
                };
                let started = Instant::now();
                let result = tokio::time::timeout(timeout, tool.execute(&query, &params)).await;
                let outcome = match result {
                    Ok(Ok(output)) => Ok(output),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!(
                        "timed out after {}s",
                        timeout.as_secs()
                    )),
                };
                debug!(
                    tool = %name,
                    ok = outcome.is_ok(),
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "tool finished"
                );
                (name, outcome)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => results.push(pair),
                Err(e) => results.push(("<join>".to_string(), Err(format!("task join failed: {e}")))),
            }
        }
        results
    }

    /// DECIDE node for the ambiguous middle: 1..4 records from two or
    /// more tools that disagree on emptiness.
    async fn decide_ambiguous(
        &self,
        subquery: &str,
        counts: &[(String, usize)],
        ctx: &TeamContext,
    ) -> TeamStatus {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(&self.prompts.decide),
                user_message(&build_decide_prompt(subquery, counts)),
            ],
            temperature: Some(0.0),
            max_tokens: Some(128),
            json_mode: true,
        };
        match self.llm.complete(&request).await {
            Ok(response) => {
                ctx.meter.add(response.usage);
                match parse_json_response::<DecideVerdict>(&response.content) {
                    Ok(verdict) => {
                        debug!(sufficient = verdict.sufficient, reason = %verdict.reason, "decide verdict");
                        if verdict.sufficient {
                            TeamStatus::Success
                        } else {
                            TeamStatus::Partial
                        }
                    }
                    Err(_) => TeamStatus::Partial,
                }
            }
            Err(e) => {
                warn!(error = %e, "decide call failed, degrading to partial");
                TeamStatus::Partial
            }
        }
    }
}

#[async_trait::async_trait]
impl TeamExecutor for SearchTeam {
    fn kind(&self) -> TeamKind {
        TeamKind::Search
    }

    async fn execute(&self, subquery: &str, ctx: &TeamContext) -> TeamResult {
        let started = Instant::now();

        // PLAN
        let plan = self.plan(subquery, ctx).await;
        debug!(
            tools = ?plan.selected_tools,
            strategy = %plan.search_strategy,
            "search team plan"
        );

        // EXECUTE
        let results = self.run_tools(subquery, &plan).await;

        // PROCESS
        let mut collected_data: BTreeMap<String, Vec<serde_json::Value>> = BTreeMap::new();
        let mut tool_errors: Vec<String> = Vec::new();
        let mut tools_run = 0_usize;
        let mut tools_with_data = 0_usize;

        for (name, outcome) in results {
            tools_run += 1;
            match outcome {
                Ok(output) => {
                    if output.status == ToolStatus::Success && output.count > 0 {
                        tools_with_data += 1;
                    }
                    collected_data.entry(name).or_default().extend(output.data);
                }
                Err(message) => {
                    tool_errors.push(format!("{name}: {message}"));
                    collected_data.entry(name).or_default();
                }
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let data_quality_score = if tools_run == 0 {
            0.0
        } else {
            tools_with_data as f32 / tools_run as f32
        };

        let total_records: usize = collected_data.values().map(Vec::len).sum();
        let counts: Vec<(String, usize)> = collected_data
            .iter()
            .map(|(name, records)| (name.clone(), records.len()))
            .collect();

        // DECIDE
        let status = if total_records >= DECIDE_SUFFICIENT_RECORDS {
            TeamStatus::Success
        } else if total_records == 0 {
            TeamStatus::Failed
        } else {
            let empties = counts.iter().filter(|(_, c)| *c == 0).count();
            let ambiguous = counts.len() >= 2 && empties > 0;
            if ambiguous {
                self.decide_ambiguous(subquery, &counts, ctx).await
            } else {
                TeamStatus::Success
            }
        };

        let error = if status == TeamStatus::Failed {
            Some(if tool_errors.is_empty() {
                "no records retrieved".to_string()
            } else {
                tool_errors.join("; ")
            })
        } else if tool_errors.is_empty() {
            None
        } else {
            Some(tool_errors.join("; "))
        };

        let summary = format!(
            "retrieved {total_records} records from {tools_run} tools \
             (quality {data_quality_score:.2}); strategy: {}",
            plan.search_strategy
        );

        TeamResult {
            team: TeamKind::Search,
            status,
            collected_data,
            summary,
            error,
            duration: started.elapsed(),
        }
    }
}
