//! Execution teams.
//!
//! A team is a pluggable execution unit behind one uniform async
//! contract. The supervisor treats all teams polymorphically; the
//! Search team ships here as the exemplar, the others (Analysis,
//! Document, Review) are host-supplied capabilities implementing the
//! same trait.

pub mod search_team;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::plan::TeamKind;
use crate::core::state::TeamResult;
use crate::llm::message::TokenMeter;

pub use search_team::SearchTeam;

/// Read-only context slice a team receives from the supervisor.
#[derive(Debug, Clone, Default)]
pub struct TeamContext {
    /// Session the turn belongs to.
    pub session_id: String,
    /// Keywords extracted by the intent classifier.
    pub keywords: Vec<String>,
    /// Summaries of dependency teams' results, in dependency order.
    pub prior_summaries: Vec<String>,
    /// Shared token accounting for the turn.
    pub meter: TokenMeter,
}

/// Capability trait for execution teams.
///
/// `execute` never fails for downstream-recoverable errors: tool
/// failures, timeouts, and empty results are folded into the returned
/// [`TeamResult`]. Only programming errors may panic.
#[async_trait]
pub trait TeamExecutor: Send + Sync {
    /// Which team this executor implements.
    fn kind(&self) -> TeamKind;

    /// Runs the team's internal workflow for one subquery.
    async fn execute(&self, subquery: &str, ctx: &TeamContext) -> TeamResult;
}

/// Immutable team registry, keyed by [`TeamKind`].
#[derive(Clone, Default)]
pub struct TeamSet {
    teams: BTreeMap<TeamKind, Arc<dyn TeamExecutor>>,
}

impl TeamSet {
    /// Builds the set from the executors available at process start.
    #[must_use]
    pub fn new(executors: Vec<Arc<dyn TeamExecutor>>) -> Self {
        let teams = executors.into_iter().map(|e| (e.kind(), e)).collect();
        Self { teams }
    }

    /// Looks up an executor.
    #[must_use]
    pub fn get(&self, kind: TeamKind) -> Option<Arc<dyn TeamExecutor>> {
        self.teams.get(&kind).cloned()
    }

    /// Registered team kinds in deterministic order.
    #[must_use]
    pub fn kinds(&self) -> Vec<TeamKind> {
        self.teams.keys().copied().collect()
    }
}

impl std::fmt::Debug for TeamSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamSet").field("teams", &self.kinds()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::TeamStatus;
    use std::time::Duration;

    struct StubTeam(TeamKind);

    #[async_trait]
    impl TeamExecutor for StubTeam {
        fn kind(&self) -> TeamKind {
            self.0
        }

        async fn execute(&self, _subquery: &str, _ctx: &TeamContext) -> TeamResult {
            TeamResult {
                team: self.0,
                status: TeamStatus::Success,
                collected_data: BTreeMap::new(),
                summary: "stub".to_string(),
                error: None,
                duration: Duration::ZERO,
            }
        }
    }

    #[test]
    fn test_team_set_lookup() {
        let set = TeamSet::new(vec![
            Arc::new(StubTeam(TeamKind::Search)),
            Arc::new(StubTeam(TeamKind::Analysis)),
        ]);
        assert!(set.get(TeamKind::Search).is_some());
        assert!(set.get(TeamKind::Document).is_none());
        assert_eq!(set.kinds(), vec![TeamKind::Search, TeamKind::Analysis]);
    }
}
