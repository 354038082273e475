//! System prompts and template builders for the engine's LLM calls.
//!
//! Prompts are the core instructions behind intent classification,
//! team selection, tool planning, and synthesis. Template builders
//! format user messages with query context; fixed response templates
//! cover the fast-path intents without an LLM call.

use std::fmt::Write;
use std::path::Path;

use crate::core::intent::{Intent, IntentType};
use crate::memory::StoredMessage;
use crate::supervisor::aggregate::AggregatedResults;

/// System prompt for intent classification (planning stage 1).
pub const INTENT_SYSTEM_PROMPT: &str = r#"You are an intent classifier for a Korean real-estate assistant. Classify the user's query into exactly one intent type and extract structured slots.

## Intent Types

- LEGAL_CONSULT: questions about real-estate law, tenant rights, deposits, lease protection, registration, taxes as legal rules (전세금, 보증금, 임대차, 계약갱신, 대항력, 등기 ...)
- MARKET_INQUIRY: price levels, market trends, transaction volumes for regions or complexes (시세, 가격, 매매가, 전세가 ...)
- CONTRACT_REVIEW: reviewing or drafting a specific contract or clause (계약서 검토, 초안, 특약 ...)
- COMPREHENSIVE: the query needs two or more of the above (e.g. market data AND a contract draft)
- GREETING: social opening with no task content (안녕하세요, 고마워 ...)
- IRRELEVANT: outside the real-estate domain entirely
- UNCLEAR: too vague or fragmentary to classify

## Output Format (JSON)

```json
{
  "intent_type": "LEGAL_CONSULT",
  "confidence": 0.0,
  "entities": {"law": "...", "region": "...", "amount": "..."},
  "keywords": ["keyword1", "keyword2"],
  "is_in_scope": true
}
```

## Rules

- Return ONLY the JSON object, no surrounding text.
- confidence is your own calibrated estimate in [0, 1].
- entities holds only slots actually present in the query; omit empty ones.
- keywords are the query's salient content words in original order, Korean as-is.
- When the previous conversation turns are provided, resolve pronouns and ellipsis against them before classifying."#;

/// Simplified retry prompt after one intent parse failure.
pub const INTENT_RETRY_SYSTEM_PROMPT: &str = r#"Classify the query for a Korean real-estate assistant. Reply with ONLY this JSON, nothing else:
{"intent_type": "LEGAL_CONSULT" | "MARKET_INQUIRY" | "CONTRACT_REVIEW" | "COMPREHENSIVE" | "GREETING" | "IRRELEVANT" | "UNCLEAR", "confidence": 0.5, "entities": {}, "keywords": [], "is_in_scope": true}"#;

/// System prompt for team selection and decomposition (stage 2).
pub const TEAM_SELECT_SYSTEM_PROMPT: &str = r#"You are an execution planner for a Korean real-estate assistant. Given a classified query, select the execution teams and lay out their steps.

## Teams

- search: retrieves statutes and standard contract clauses from the legal corpus
- analysis: analyzes market data and retrieved material
- document: drafts documents (contracts, notices)
- review: reviews an existing document the user provided

## Output Format (JSON)

```json
{
  "steps": [
    {"team": "search", "subquery": "...", "depends_on": []},
    {"team": "analysis", "subquery": "...", "depends_on": [0]}
  ],
  "execution_mode": "sequential" | "parallel" | "mixed",
  "skip_execution": false
}
```

## Rules

- Return ONLY the JSON object.
- Decompose compound queries into focused subqueries, one per step, wiring
  depends_on so a consumer runs after its producer (document after analysis,
  analysis after search).
- Single-topic queries get exactly one step with the query unchanged.
- Use "sequential" for one step or a strict chain, "parallel" for
  independent steps, "mixed" when some steps depend on others.
- LEGAL_CONSULT almost always needs just the search team.
- MARKET_INQUIRY needs search then analysis."#;

/// Simplified retry prompt after one team-selection parse failure.
pub const TEAM_SELECT_RETRY_SYSTEM_PROMPT: &str = r#"Select execution teams for the query. Reply with ONLY this JSON shape, nothing else:
{"steps": [{"team": "search", "subquery": "<the query>", "depends_on": []}], "execution_mode": "sequential", "skip_execution": false}"#;

/// System prompt for the search team's tool planning node.
pub const TOOL_PLAN_SYSTEM_PROMPT: &str = r#"You are a retrieval planner for a Korean legal search team. Pick the tools to run for the subquery and the structured parameters for each.

## Filter Guide

- category narrows the corpus and should be set whenever the topic is clear:
  - "1_공통_매매_일반": sale transactions, brokerage, registration, general rules
  - "2_임대차_전세_월세": lease, jeonse, wolse, deposits, tenant protection (전세, 월세, 보증금, 임대차, 갱신)
  - "3_공급_및_관리_매매_분양": housing supply, management, subscription, 분양
  - "4_기타": glossary and miscellaneous material
- doc_type ("법률", "시행령", "시행규칙", "대법원규칙", "용어집") may be set ONLY
  when the user explicitly names that document kind. NEVER set doc_type from
  vague domain words, and NEVER use doc_type="기타".
- is_tenant_protection / is_tax_related only when the subquery is explicitly
  about those topics.
- limit defaults to 10; raise it only for broad survey questions.

## Output Format (JSON)

```json
{
  "selected_tools": ["legal_search"],
  "tool_parameters": {
    "legal_search": {"category": "2_임대차_전세_월세", "limit": 10}
  },
  "search_strategy": "one line on what you are retrieving and why"
}
```

## Rules

- Return ONLY the JSON object.
- Select only tools from the provided tool list.
- Prefer fewer, well-filtered calls over many broad ones."#;

/// System prompt for the search team's ambiguous-decide node.
pub const DECIDE_SYSTEM_PROMPT: &str = r#"You judge whether a retrieval round gathered enough material to answer a subquery. Reply with ONLY this JSON:
{"sufficient": true | false, "reason": "one line"}"#;

/// System prompt for the final synthesis call.
pub const SYNTHESIZER_SYSTEM_PROMPT: &str = r#"You are a Korean real-estate assistant composing the final answer from team results.

## Instructions

1. Answer the user's question directly in polite Korean (합니다체), leading with the conclusion.
2. Ground every legal statement in the retrieved provisions; quote the decisive phrase (e.g. "20분의 1을 초과하지 못한다") and name the law and article.
3. When market or analysis data is present, weave it in with concrete figures.
4. If some teams failed, answer from what succeeded and say plainly what is missing.
5. If the retrieved material does not answer the question, say so; never invent provisions, figures, or article numbers.
6. Close with a one-line caveat that this is general information, not legal advice, when the answer interprets law.

## Rules

- Korean output only.
- No markdown headers; short paragraphs and simple lists are fine.
- Cite sources inline as 법령명 조문 (e.g. 주택임대차보호법 제7조)."#;

/// Fixed response for GREETING intents (no LLM call).
pub const GREETING_TEMPLATE: &str = "안녕하세요! 부동산 법률·시세·계약 관련 질문을 도와드리는 집사입니다. \
     전세금 인상 한도, 계약갱신요구권, 표준계약서 조항 같은 내용을 물어보세요.";

/// Fixed response for IRRELEVANT intents (no LLM call).
pub const OUT_OF_SCOPE_TEMPLATE: &str = "죄송하지만 부동산 관련 질문만 도와드릴 수 있어요. \
     임대차, 매매, 시세, 계약서 관련 내용이라면 무엇이든 물어보세요.";

/// Fixed response for UNCLEAR intents (no LLM call).
pub const CLARIFY_TEMPLATE: &str = "질문을 조금 더 구체적으로 말씀해 주시겠어요? \
     예를 들어 \"전세금 인상 한도가 얼마인가요?\" 또는 \
     \"주택임대차보호법 제7조 내용 알려주세요\"처럼 물어보시면 정확히 안내해 드릴 수 있습니다.";

/// Fixed response when the turn is cancelled mid-flight.
pub const CANCELLED_TEMPLATE: &str = "요청 처리가 중단되었습니다. 다시 질문해 주시면 이어서 도와드리겠습니다.";

/// Returns the fixed fast-path response for an intent, when one applies.
#[must_use]
pub const fn fast_path_response(intent_type: IntentType) -> Option<&'static str> {
    match intent_type {
        IntentType::Greeting => Some(GREETING_TEMPLATE),
        IntentType::Irrelevant => Some(OUT_OF_SCOPE_TEMPLATE),
        IntentType::Unclear => Some(CLARIFY_TEMPLATE),
        _ => None,
    }
}

/// Default prompt directory under user config.
const DEFAULT_PROMPT_DIR: &str = ".config/jibsa/prompts";

/// Filenames for each prompt template.
const INTENT_FILENAME: &str = "intent.md";
/// Filename for the team selection prompt template.
const TEAM_SELECT_FILENAME: &str = "team_select.md";
/// Filename for the tool planning prompt template.
const TOOL_PLAN_FILENAME: &str = "tool_plan.md";
/// Filename for the decide prompt template.
const DECIDE_FILENAME: &str = "decide.md";
/// Filename for the synthesizer prompt template.
const SYNTHESIZER_FILENAME: &str = "synthesizer.md";

/// A set of system prompts for every LLM call in the engine.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from config, environment, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// System prompt for intent classification.
    pub intent: String,
    /// System prompt for team selection.
    pub team_select: String,
    /// System prompt for tool planning.
    pub tool_plan: String,
    /// System prompt for the ambiguous-decide call.
    pub decide: String,
    /// System prompt for synthesis.
    pub synthesizer: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from config)
    /// 2. `JIBSA_PROMPT_DIR` environment variable
    /// 3. `~/.config/jibsa/prompts/`
    ///
    /// Each file is loaded independently — a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(std::path::PathBuf::from)
            .or_else(|| {
                std::env::var("JIBSA_PROMPT_DIR")
                    .ok()
                    .map(std::path::PathBuf::from)
            })
            .or_else(|| dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR)));

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            intent: load_file(INTENT_FILENAME, INTENT_SYSTEM_PROMPT),
            team_select: load_file(TEAM_SELECT_FILENAME, TEAM_SELECT_SYSTEM_PROMPT),
            tool_plan: load_file(TOOL_PLAN_FILENAME, TOOL_PLAN_SYSTEM_PROMPT),
            decide: load_file(DECIDE_FILENAME, DECIDE_SYSTEM_PROMPT),
            synthesizer: load_file(SYNTHESIZER_FILENAME, SYNTHESIZER_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            intent: INTENT_SYSTEM_PROMPT.to_string(),
            team_select: TEAM_SELECT_SYSTEM_PROMPT.to_string(),
            tool_plan: TOOL_PLAN_SYSTEM_PROMPT.to_string(),
            decide: DECIDE_SYSTEM_PROMPT.to_string(),
            synthesizer: SYNTHESIZER_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Builds the user message for intent classification.
#[must_use]
pub fn build_intent_prompt(query: &str, history: &[StoredMessage]) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str("<history>\n");
        for msg in history {
            let _ = writeln!(prompt, "{}: {}", msg.role.as_str(), msg.content);
        }
        prompt.push_str("</history>\n\n");
    }
    let _ = write!(prompt, "<query>{query}</query>");
    prompt
}

/// Builds the user message for team selection.
#[must_use]
pub fn build_team_select_prompt(query: &str, intent: &Intent) -> String {
    let keywords = intent.keywords.join(", ");
    format!(
        "<query>{query}</query>\n\n\
         <intent>\n\
         - type: {}\n\
         - confidence: {:.2}\n\
         - keywords: {keywords}\n\
         </intent>\n\n\
         Lay out the execution steps.",
        intent.intent_type, intent.confidence
    )
}

/// Builds the user message for the search team's tool planning node.
#[must_use]
pub fn build_tool_plan_prompt(
    subquery: &str,
    keywords: &[String],
    tools: &[(&str, &str)],
) -> String {
    let mut prompt = String::from("<tools>\n");
    for (name, description) in tools {
        let _ = writeln!(prompt, "- {name}: {description}");
    }
    prompt.push_str("</tools>\n\n");
    if !keywords.is_empty() {
        let _ = writeln!(prompt, "<keywords>{}</keywords>\n", keywords.join(", "));
    }
    let _ = write!(prompt, "<subquery>{subquery}</subquery>\n\nPlan the retrieval.");
    prompt
}

/// Builds the user message for the ambiguous-decide call.
#[must_use]
pub fn build_decide_prompt(subquery: &str, per_tool_counts: &[(String, usize)]) -> String {
    let mut prompt = format!("<subquery>{subquery}</subquery>\n\n<tool_results>\n");
    for (tool, count) in per_tool_counts {
        let _ = writeln!(prompt, "- {tool}: {count} records");
    }
    prompt.push_str("</tool_results>");
    prompt
}

/// Builds the user message for the final synthesis call.
#[must_use]
pub fn build_synthesizer_prompt(query: &str, aggregated: &AggregatedResults) -> String {
    let mut prompt = format!("<query>{query}</query>\n\n<team_results>\n");
    for (team, result) in &aggregated.per_team {
        let _ = writeln!(
            prompt,
            "<team name=\"{team}\" status=\"{:?}\" records=\"{}\">",
            result.status,
            result.records_total()
        );
        let _ = writeln!(prompt, "{}", result.summary);
        for (tool, records) in &result.collected_data {
            let json = serde_json::to_string_pretty(records)
                .unwrap_or_else(|_| "[]".to_string());
            let _ = writeln!(prompt, "<tool name=\"{tool}\">\n{json}\n</tool>");
        }
        prompt.push_str("</team>\n");
    }
    prompt.push_str("</team_results>\n\nCompose the final answer.");
    prompt
}
