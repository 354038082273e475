//! Two-stage planning agent.
//!
//! Stage 1 classifies intent; a fast-path gate short-circuits
//! out-of-scope and trivial inputs before any team work. Stage 2
//! selects execution teams and decomposes compound queries into
//! dependent steps. Every LLM output parses against a strict schema
//! with one simplified-prompt retry, then a rule-based fallback, so
//! planning itself never fails a turn.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::SupervisorConfig;
use crate::core::intent::{Intent, IntentType};
use crate::core::plan::{ExecutionMode, ExecutionPlan, PlanStep, TeamKind};
use crate::error::EngineError;
use crate::llm::json::parse_json_response;
use crate::llm::message::{ChatRequest, TokenMeter, system_message, user_message};
use crate::llm::LlmClient;
use crate::memory::StoredMessage;
use crate::prompt::{
    INTENT_RETRY_SYSTEM_PROMPT, PromptSet, TEAM_SELECT_RETRY_SYSTEM_PROMPT, build_intent_prompt,
    build_team_select_prompt,
};

/// Keyword table for the rule-based team fallback. Checked in order;
/// first match set wins for the non-search teams.
const ANALYSIS_KEYWORDS: [&str; 5] = ["시세", "시장", "분석", "가격", "매매가"];
/// Document-team trigger keywords.
const DOCUMENT_KEYWORDS: [&str; 4] = ["초안", "작성", "써줘", "만들어"];
/// Review-team trigger keywords.
const REVIEW_KEYWORDS: [&str; 3] = ["검토", "봐줘", "확인해"];

/// Produces `(intent, plan)` for a query.
pub struct PlanningAgent {
    llm: Arc<dyn LlmClient>,
    intent_model: String,
    planner_model: String,
    intent_max_tokens: u32,
    plan_max_tokens: u32,
    prompts: PromptSet,
}

impl PlanningAgent {
    /// Creates the agent over the shared LLM client.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, config: &SupervisorConfig, prompts: PromptSet) -> Self {
        Self {
            llm,
            intent_model: config.intent_model.clone(),
            planner_model: config.planner_model.clone(),
            intent_max_tokens: config.intent_max_tokens,
            plan_max_tokens: config.plan_max_tokens,
            prompts,
        }
    }

    /// Runs both planning stages. Infallible: classification failures
    /// degrade to [`IntentType::Unclear`] and stage 2 failures to the
    /// rule-based fallback, so the supervisor always gets a routable
    /// plan.
    pub async fn plan(
        &self,
        query: &str,
        history: &[StoredMessage],
        meter: &TokenMeter,
    ) -> (Intent, ExecutionPlan) {
        // Stage 1: intent classification.
        let intent = self.classify_intent(query, history, meter).await;

        // Fast-path gate: trivial inputs never reach stage 2, saving
        // a full LLM round-trip.
        if intent.intent_type.is_fast_path() {
            debug!(intent = %intent.intent_type, "fast-path gate, skipping team selection");
            return (intent, ExecutionPlan::skipped());
        }

        // Stage 2: team selection and decomposition.
        let plan = self.select_teams(query, &intent, meter).await;
        (intent, plan)
    }

    async fn classify_intent(
        &self,
        query: &str,
        history: &[StoredMessage],
        meter: &TokenMeter,
    ) -> Intent {
        let user_msg = build_intent_prompt(query, history);

        match self
            .json_call::<Intent>(
                &self.intent_model,
                &self.prompts.intent,
                INTENT_RETRY_SYSTEM_PROMPT,
                &user_msg,
                self.intent_max_tokens,
                meter,
            )
            .await
        {
            Ok(intent) => intent.normalized(),
            Err(e) => {
                warn!(error = %e, "intent classification failed twice, treating as UNCLEAR");
                Intent::unclear()
            }
        }
    }

    async fn select_teams(
        &self,
        query: &str,
        intent: &Intent,
        meter: &TokenMeter,
    ) -> ExecutionPlan {
        let user_msg = build_team_select_prompt(query, intent);

        let plan = self
            .json_call::<ExecutionPlan>(
                &self.planner_model,
                &self.prompts.team_select,
                TEAM_SELECT_RETRY_SYSTEM_PROMPT,
                &user_msg,
                self.plan_max_tokens,
                meter,
            )
            .await;

        match plan {
            Ok(plan) if !plan.steps.is_empty() => plan.sanitized(),
            Ok(_) => {
                debug!("planner returned no steps, using rule-based fallback");
                Self::fallback_plan(query, intent)
            }
            Err(e) => {
                warn!(error = %e, "team selection failed twice, using rule-based fallback");
                Self::fallback_plan(query, intent)
            }
        }
    }

    /// One strict-schema call with a single simplified-prompt retry.
    async fn json_call<T: serde::de::DeserializeOwned>(
        &self,
        model: &str,
        system: &str,
        retry_system: &str,
        user_msg: &str,
        max_tokens: u32,
        meter: &TokenMeter,
    ) -> Result<T, EngineError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![system_message(system), user_message(user_msg)],
            temperature: Some(0.0),
            max_tokens: Some(max_tokens),
            json_mode: true,
        };

        let first_err = match self.llm.complete(&request).await {
            Ok(response) => {
                meter.add(response.usage);
                match parse_json_response::<T>(&response.content) {
                    Ok(parsed) => return Ok(parsed),
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        debug!(error = %first_err, "first attempt failed, retrying with simplified prompt");

        let retry = ChatRequest {
            model: model.to_string(),
            messages: vec![system_message(retry_system), user_message(user_msg)],
            temperature: Some(0.0),
            max_tokens: Some(max_tokens),
            json_mode: true,
        };
        let response = self.llm.complete(&retry).await?;
        meter.add(response.usage);
        parse_json_response::<T>(&response.content)
    }

    /// Rule-based fallback: maps intent type and keywords to teams,
    /// wiring consumers after producers.
    fn fallback_plan(query: &str, intent: &Intent) -> ExecutionPlan {
        let haystack: String = {
            let mut h = query.to_string();
            for k in &intent.keywords {
                h.push(' ');
                h.push_str(k);
            }
            h
        };
        let wants = |needles: &[&str]| needles.iter().any(|n| haystack.contains(n));

        let mut steps = vec![PlanStep {
            team: TeamKind::Search,
            subquery: query.to_string(),
            depends_on: Vec::new(),
        }];

        let needs_analysis = matches!(
            intent.intent_type,
            IntentType::MarketInquiry | IntentType::Comprehensive
        ) || wants(&ANALYSIS_KEYWORDS);
        if needs_analysis {
            steps.push(PlanStep {
                team: TeamKind::Analysis,
                subquery: query.to_string(),
                depends_on: vec![0],
            });
        }

        if wants(&DOCUMENT_KEYWORDS) || intent.intent_type == IntentType::ContractReview {
            let dep = steps.len() - 1;
            steps.push(PlanStep {
                team: TeamKind::Document,
                subquery: query.to_string(),
                depends_on: vec![dep],
            });
        }

        if wants(&REVIEW_KEYWORDS) && intent.intent_type == IntentType::ContractReview {
            let dep = steps.len() - 1;
            steps.push(PlanStep {
                team: TeamKind::Review,
                subquery: query.to_string(),
                depends_on: vec![dep],
            });
        }

        let execution_mode = if steps.len() > 1 {
            ExecutionMode::Mixed
        } else {
            ExecutionMode::Sequential
        };

        ExecutionPlan {
            steps,
            execution_mode,
            skip_execution: false,
        }
    }
}

impl std::fmt::Debug for PlanningAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningAgent")
            .field("intent_model", &self.intent_model)
            .field("planner_model", &self.planner_model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::message::{ChatResponse, TokenUsage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedClient {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: responses.into_iter().map(String::from).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, EngineError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self
                .responses
                .get(idx)
                .cloned()
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
                    prompt_tokens: 5,
                    completion_tokens: 5,
                    total_tokens: 10,
                },
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    fn agent(responses: Vec<&str>) -> (PlanningAgent, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(responses));
        let config = SupervisorConfig::builder()
            .api_key("test")
            .build()
            .unwrap_or_else(|_| unreachable!());
        let agent = PlanningAgent::new(
            Arc::clone(&client) as Arc<dyn LlmClient>,
            &config,
            PromptSet::defaults(),
        );
        (agent, client)
    }

    const GREETING_INTENT: &str =
        r#"{"intent_type": "GREETING", "confidence": 0.99, "entities": {}, "keywords": [], "is_in_scope": true}"#;
    const LEGAL_INTENT: &str = r#"{"intent_type": "LEGAL_CONSULT", "confidence": 0.9, "entities": {}, "keywords": ["전세금", "인상"], "is_in_scope": true}"#;
    const SEARCH_PLAN: &str = r#"{"steps": [{"team": "search", "subquery": "전세금 인상 한도", "depends_on": []}], "execution_mode": "sequential", "skip_execution": false}"#;

    #[tokio::test]
    async fn test_fast_path_skips_stage_two() {
        let (agent, client) = agent(vec![GREETING_INTENT]);
        let meter = TokenMeter::new();
        let (intent, plan) = agent.plan("안녕하세요", &[], &meter).await;
        assert_eq!(intent.intent_type, IntentType::Greeting);
        assert!(plan.skip_execution);
        assert!(plan.steps.is_empty());
        // Exactly one LLM call total.
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_two_stage_plan() {
        let (agent, client) = agent(vec![LEGAL_INTENT, SEARCH_PLAN]);
        let meter = TokenMeter::new();
        let (intent, plan) = agent.plan("전세금 인상 한도는 얼마야?", &[], &meter).await;
        assert_eq!(intent.intent_type, IntentType::LegalConsult);
        assert!(!plan.skip_execution);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].team, TeamKind::Search);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(meter.total(), 20);
    }

    #[tokio::test]
    async fn test_intent_retry_then_success() {
        let (agent, client) = agent(vec!["garbled", LEGAL_INTENT, SEARCH_PLAN]);
        let meter = TokenMeter::new();
        let (intent, _plan) = agent.plan("전세금 인상 한도", &[], &meter).await;
        assert_eq!(intent.intent_type, IntentType::LegalConsult);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_intent_double_failure_degrades_to_unclear() {
        let (agent, _client) = agent(vec!["junk", "more junk"]);
        let meter = TokenMeter::new();
        let (intent, plan) = agent.plan("???", &[], &meter).await;
        assert_eq!(intent.intent_type, IntentType::Unclear);
        assert!(plan.skip_execution);
    }

    #[tokio::test]
    async fn test_stage_two_failure_uses_rule_fallback() {
        let (agent, _client) = agent(vec![LEGAL_INTENT, "<error>", "<error>"]);
        let meter = TokenMeter::new();
        let (_intent, plan) = agent.plan("전세금 인상 한도", &[], &meter).await;
        assert!(!plan.skip_execution);
        assert_eq!(plan.steps[0].team, TeamKind::Search);
    }

    #[tokio::test]
    async fn test_rule_fallback_market_adds_analysis() {
        let intent = Intent {
            intent_type: IntentType::MarketInquiry,
            confidence: 0.8,
            entities: std::collections::BTreeMap::new(),
            keywords: vec!["시세".to_string()],
            is_in_scope: true,
        };
        let plan = PlanningAgent::fallback_plan("강남구 아파트 시세 분석해줘", &intent);
        let teams = plan.teams();
        assert!(teams.contains(&TeamKind::Search));
        assert!(teams.contains(&TeamKind::Analysis));
        assert_eq!(plan.execution_mode, ExecutionMode::Mixed);
        // Analysis depends on search.
        assert_eq!(plan.steps[1].depends_on, vec![0]);
    }

    #[tokio::test]
    async fn test_rule_fallback_compound_chains_document() {
        let intent = Intent {
            intent_type: IntentType::Comprehensive,
            confidence: 0.8,
            entities: std::collections::BTreeMap::new(),
            keywords: vec!["시세".to_string(), "초안".to_string()],
            is_in_scope: true,
        };
        let plan =
            PlanningAgent::fallback_plan("강남 시세 알려주고 임대차 계약서 초안 써줘", &intent);
        assert!(plan.steps.len() >= 3);
        assert_eq!(plan.steps[2].team, TeamKind::Document);
        // Document wired after the analysis step.
        assert_eq!(plan.steps[2].depends_on, vec![1]);
    }

    #[tokio::test]
    async fn test_idempotent_plan_for_fixed_responses() {
        let meter = TokenMeter::new();
        let (agent_a, _) = agent(vec![LEGAL_INTENT, SEARCH_PLAN]);
        let (agent_b, _) = agent(vec![LEGAL_INTENT, SEARCH_PLAN]);
        let (_, plan_a) = agent_a.plan("전세금 인상 한도", &[], &meter).await;
        let (_, plan_b) = agent_b.plan("전세금 인상 한도", &[], &meter).await;
        assert_eq!(
            serde_json::to_value(&plan_a).unwrap_or_default(),
            serde_json::to_value(&plan_b).unwrap_or_default()
        );
    }
}
