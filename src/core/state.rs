//! Per-turn supervisor state and team results.
//!
//! [`SupervisorState`] lives for exactly one turn and is owned by the
//! supervisor; team executors receive a read-only context slice and
//! hand back their own [`TeamResult`].

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::intent::{Intent, IntentType};
use super::plan::{ExecutionPlan, TeamKind};

/// Outcome status of one team execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamStatus {
    /// All tools produced usable data.
    Success,
    /// Some tools produced data, others failed or came back empty.
    Partial,
    /// No usable data (all tools failed, zero records, or timeout).
    Failed,
    /// The team never ran (cancellation or routing).
    Skipped,
}

/// Result handed back by one team execution.
#[derive(Debug, Clone, Serialize)]
pub struct TeamResult {
    /// Which team produced this result.
    pub team: TeamKind,
    /// Outcome status.
    pub status: TeamStatus,
    /// Tool outputs keyed by tool name. `BTreeMap` so read iteration
    /// order is deterministic regardless of completion order.
    pub collected_data: BTreeMap<String, Vec<serde_json::Value>>,
    /// One-line account of what the team did.
    pub summary: String,
    /// Failure description when `status` is `failed`/`partial`.
    pub error: Option<String>,
    /// Wall-clock duration of the team execution.
    #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
    pub duration: Duration,
}

fn serialize_duration_ms<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl TeamResult {
    /// A failed result with the given error message.
    #[must_use]
    pub fn failed(team: TeamKind, error: impl Into<String>, duration: Duration) -> Self {
        let error = error.into();
        Self {
            team,
            status: TeamStatus::Failed,
            collected_data: BTreeMap::new(),
            summary: format!("{team} team failed: {error}"),
            error: Some(error),
            duration,
        }
    }

    /// A skipped result (team never ran).
    #[must_use]
    pub fn skipped(team: TeamKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            team,
            status: TeamStatus::Skipped,
            collected_data: BTreeMap::new(),
            summary: format!("{team} team skipped: {reason}"),
            error: Some(reason),
            duration: Duration::ZERO,
        }
    }

    /// Total record count across all tools.
    #[must_use]
    pub fn records_total(&self) -> usize {
        self.collected_data.values().map(Vec::len).sum()
    }

    /// Folds another result for the same team into this one. Data is
    /// appended per tool; status degrades to the worse of the two.
    pub fn merge(&mut self, other: Self) {
        for (tool, mut records) in other.collected_data {
            self.collected_data.entry(tool).or_default().append(&mut records);
        }
        self.duration += other.duration;
        if severity(other.status) > severity(self.status) {
            self.status = other.status;
        }
        if self.error.is_none() {
            self.error = other.error;
        }
    }
}

const fn severity(status: TeamStatus) -> u8 {
    match status {
        TeamStatus::Success => 0,
        TeamStatus::Partial => 1,
        TeamStatus::Skipped => 2,
        TeamStatus::Failed => 3,
    }
}

/// Terminal status of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatus {
    /// All planned work succeeded and a response was produced.
    Completed,
    /// Some teams failed but a response was produced from the rest.
    Partial,
    /// No usable result (all teams failed or the turn timed out).
    Failed,
    /// Externally cancelled; partial results preserved.
    Cancelled,
}

/// The single source of truth passed between supervisor nodes for one
/// turn.
#[derive(Debug)]
pub struct SupervisorState {
    /// The user query as received.
    pub query: String,
    /// Session this turn belongs to.
    pub session_id: String,
    /// Classified intent, set by the plan node.
    pub intent: Option<Intent>,
    /// Execution plan, set by the plan node.
    pub plan: Option<ExecutionPlan>,
    /// Teams currently executing.
    pub active_teams: Vec<TeamKind>,
    /// Teams that finished with success/partial status.
    pub completed_teams: Vec<TeamKind>,
    /// Teams that failed or were skipped.
    pub failed_teams: Vec<TeamKind>,
    /// Results keyed by team.
    pub team_results: BTreeMap<TeamKind, TeamResult>,
    /// Final user-facing response; non-empty iff the turn completed.
    pub final_response: String,
    /// Contained errors observed along the way.
    pub error_log: Vec<String>,
    /// Turn start instant.
    pub started: Instant,
}

impl SupervisorState {
    /// Fresh state for one turn.
    #[must_use]
    pub fn new(query: &str, session_id: &str) -> Self {
        Self {
            query: query.to_string(),
            session_id: session_id.to_string(),
            intent: None,
            plan: None,
            active_teams: Vec::new(),
            completed_teams: Vec::new(),
            failed_teams: Vec::new(),
            team_results: BTreeMap::new(),
            final_response: String::new(),
            error_log: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Records a team result, maintaining the completed/failed sets
    /// (disjoint, both subsets of the planned teams).
    pub fn record_team(&mut self, result: TeamResult) {
        let team = result.team;
        self.active_teams.retain(|&t| t != team);
        self.completed_teams.retain(|&t| t != team);
        self.failed_teams.retain(|&t| t != team);
        match result.status {
            TeamStatus::Success | TeamStatus::Partial => self.completed_teams.push(team),
            TeamStatus::Failed | TeamStatus::Skipped => {
                if let Some(ref err) = result.error {
                    self.error_log.push(format!("{team}: {err}"));
                }
                self.failed_teams.push(team);
            }
        }
        match self.team_results.entry(team) {
            std::collections::btree_map::Entry::Occupied(mut e) => e.get_mut().merge(result),
            std::collections::btree_map::Entry::Vacant(e) => {
                e.insert(result);
            }
        }
    }

    /// Derives the terminal status from the recorded team outcomes.
    /// Skip-path turns (no planned teams) complete trivially.
    #[must_use]
    pub fn derive_status(&self) -> TurnStatus {
        if self.completed_teams.is_empty() && self.failed_teams.is_empty() {
            return TurnStatus::Completed;
        }
        if self.failed_teams.is_empty() {
            TurnStatus::Completed
        } else if self.completed_teams.is_empty() {
            TurnStatus::Failed
        } else {
            TurnStatus::Partial
        }
    }
}

/// Final result of [`Supervisor::process_query`](crate::supervisor::Supervisor::process_query).
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// Final natural-language answer.
    pub answer: String,
    /// Citation strings derived from search records.
    pub sources: Vec<String>,
    /// Collected data keyed by team name.
    pub data: BTreeMap<String, Vec<serde_json::Value>>,
    /// Total wall-clock time for the turn.
    pub execution_time_ms: u64,
    /// Teams that actually executed.
    pub teams_used: Vec<TeamKind>,
    /// Classified intent type, when planning ran.
    pub intent: Option<IntentType>,
    /// Terminal status.
    pub status: TurnStatus,
    /// Total LLM tokens consumed across the turn.
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(team: TeamKind, status: TeamStatus) -> TeamResult {
        TeamResult {
            team,
            status,
            collected_data: BTreeMap::new(),
            summary: String::new(),
            error: matches!(status, TeamStatus::Failed).then(|| "boom".to_string()),
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_record_team_maintains_disjoint_sets() {
        let mut state = SupervisorState::new("q", "s1");
        state.record_team(result(TeamKind::Search, TeamStatus::Success));
        state.record_team(result(TeamKind::Analysis, TeamStatus::Failed));
        assert_eq!(state.completed_teams, vec![TeamKind::Search]);
        assert_eq!(state.failed_teams, vec![TeamKind::Analysis]);
        assert!(state.completed_teams.iter().all(|t| !state.failed_teams.contains(t)));
    }

    #[test]
    fn test_record_team_twice_keeps_one_membership() {
        let mut state = SupervisorState::new("q", "s1");
        state.record_team(result(TeamKind::Search, TeamStatus::Failed));
        state.record_team(result(TeamKind::Search, TeamStatus::Success));
        // Second run merged; merged status degrades to worst.
        assert_eq!(state.completed_teams.len() + state.failed_teams.len(), 1);
        assert_eq!(state.team_results.len(), 1);
    }

    #[test]
    fn test_derive_status() {
        let mut state = SupervisorState::new("q", "s1");
        assert_eq!(state.derive_status(), TurnStatus::Completed);
        state.record_team(result(TeamKind::Search, TeamStatus::Success));
        assert_eq!(state.derive_status(), TurnStatus::Completed);
        state.record_team(result(TeamKind::Analysis, TeamStatus::Failed));
        assert_eq!(state.derive_status(), TurnStatus::Partial);
        let mut all_failed = SupervisorState::new("q", "s1");
        all_failed.record_team(result(TeamKind::Search, TeamStatus::Failed));
        assert_eq!(all_failed.derive_status(), TurnStatus::Failed);
    }

    #[test]
    fn test_merge_appends_data_and_degrades_status() {
        let mut a = result(TeamKind::Search, TeamStatus::Success);
        a.collected_data
            .insert("legal_search".to_string(), vec![serde_json::json!({"doc_id": "c1"})]);
        let mut b = result(TeamKind::Search, TeamStatus::Failed);
        b.collected_data
            .insert("legal_search".to_string(), vec![serde_json::json!({"doc_id": "c2"})]);
        a.merge(b);
        assert_eq!(a.status, TeamStatus::Failed);
        assert_eq!(a.records_total(), 2);
    }

    #[test]
    fn test_team_result_serializes_duration_ms() {
        let r = result(TeamKind::Search, TeamStatus::Success);
        let json = serde_json::to_value(&r).unwrap_or_default();
        assert_eq!(json["duration_ms"], 10);
        assert_eq!(json["team"], "search");
    }
}
