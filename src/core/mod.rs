//! Core domain types shared across the engine.
//!
//! These types are the vocabulary of the pipeline: intents, execution
//! plans, team results, search records, turn state, and progress events.
//! They carry no I/O; every capability module consumes and produces them.

pub mod intent;
pub mod plan;
pub mod progress;
pub mod record;
pub mod state;

pub use intent::{Intent, IntentType};
pub use plan::{ExecutionMode, ExecutionPlan, PlanStep, TeamKind};
pub use progress::{ChannelSink, NullSink, ProgressEvent, ProgressSink, ProgressStage};
pub use record::{DataSource, SearchOutcome, SearchRecord, ToolStatus};
pub use state::{SupervisorState, TeamResult, TeamStatus, TurnOutcome, TurnStatus};
