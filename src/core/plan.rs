//! Execution plan types.
//!
//! The planner produces an [`ExecutionPlan`]; the supervisor consumes
//! it. Plans are immutable once routed. Mixed-mode execution runs
//! steps in topological order over `depends_on`, parallel within each
//! level.

use serde::{Deserialize, Serialize};

/// A pluggable execution team.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TeamKind {
    /// Legal corpus retrieval.
    Search,
    /// Analysis over retrieved data.
    Analysis,
    /// Document generation.
    Document,
    /// Contract/document review.
    Review,
}

impl TeamKind {
    /// Parses a team name (case-insensitive). Returns `None` for
    /// unknown names.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "search" => Some(Self::Search),
            "analysis" => Some(Self::Analysis),
            "document" => Some(Self::Document),
            "review" => Some(Self::Review),
            _ => None,
        }
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Analysis => "analysis",
            Self::Document => "document",
            Self::Review => "review",
        }
    }
}

impl std::fmt::Display for TeamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the plan's steps are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Strictly ordered, one step at a time.
    Sequential,
    /// All steps concurrently, bounded, with a barrier at the end.
    Parallel,
    /// Topological order over `depends_on`, parallel within levels.
    Mixed,
}

fn default_mode() -> ExecutionMode {
    ExecutionMode::Sequential
}

/// One planned unit of team work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Team to run.
    pub team: TeamKind,
    /// Subquery for this step (the full query when not decomposed).
    pub subquery: String,
    /// Indices of steps this one depends on.
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

/// Routing decision produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Ordered steps.
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Scheduling mode.
    #[serde(default = "default_mode")]
    pub execution_mode: ExecutionMode,
    /// When `true`, no teams run and the turn answers from a template.
    #[serde(default)]
    pub skip_execution: bool,
}

impl ExecutionPlan {
    /// A trivial plan for fast-path intents: no steps, no execution.
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            steps: Vec::new(),
            execution_mode: ExecutionMode::Sequential,
            skip_execution: true,
        }
    }

    /// A single-step sequential plan over the whole query.
    #[must_use]
    pub fn single(team: TeamKind, subquery: impl Into<String>) -> Self {
        Self {
            steps: vec![PlanStep {
                team,
                subquery: subquery.into(),
                depends_on: Vec::new(),
            }],
            execution_mode: ExecutionMode::Sequential,
            skip_execution: false,
        }
    }

    /// Distinct teams named by the plan, in step order.
    #[must_use]
    pub fn teams(&self) -> Vec<TeamKind> {
        let mut seen = Vec::new();
        for step in &self.steps {
            if !seen.contains(&step.team) {
                seen.push(step.team);
            }
        }
        seen
    }

    /// Drops self-references and out-of-range `depends_on` indices.
    /// The plan is immutable after routing, so this runs once at
    /// construction.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let len = self.steps.len();
        for (idx, step) in self.steps.iter_mut().enumerate() {
            step.depends_on.retain(|&d| d < len && d != idx);
            step.depends_on.sort_unstable();
            step.depends_on.dedup();
        }
        self
    }

    /// Groups step indices into dependency levels for mixed-mode
    /// scheduling: every step in level N has all dependencies in
    /// levels < N. Steps caught in a dependency cycle are appended as
    /// singleton levels in index order, degrading them to sequential
    /// execution.
    #[must_use]
    pub fn dependency_levels(&self) -> Vec<Vec<usize>> {
        let n = self.steps.len();
        let mut placed = vec![false; n];
        let mut levels: Vec<Vec<usize>> = Vec::new();
        let mut remaining = n;

        while remaining > 0 {
            let mut level: Vec<usize> = Vec::new();
            for (idx, step) in self.steps.iter().enumerate() {
                if placed[idx] {
                    continue;
                }
                let ready = step
                    .depends_on
                    .iter()
                    .all(|&d| d >= n || placed.get(d).copied().unwrap_or(true));
                if ready {
                    level.push(idx);
                }
            }
            if level.is_empty() {
                // Cycle: emit the lowest unplaced index alone.
                if let Some(idx) = placed.iter().position(|&p| !p) {
                    level.push(idx);
                }
            }
            for &idx in &level {
                placed[idx] = true;
            }
            remaining -= level.len();
            levels.push(level);
        }

        levels
    }
}
