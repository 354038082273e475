//! Progress events streamed to the host at node boundaries.
//!
//! Emission is best-effort: a failed or absent sink never aborts a
//! turn. The host supplies a [`ProgressSink`]; two implementations
//! ship here for tests and simple embeddings.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Coarse pipeline stage for a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    /// Intent classification and team selection.
    Planning,
    /// Retrieval teams running.
    Searching,
    /// Analysis teams running.
    Analyzing,
    /// Synthesis of the final response.
    Generating,
    /// Turn finished successfully.
    Completed,
    /// Turn failed.
    Failed,
}

/// One step-level progress event.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// Node name (`initialize`, `plan`, `execute`, ...).
    pub step: String,
    /// Human-readable label.
    pub label: String,
    /// Emitting agent (`supervisor` or a team name).
    pub agent: String,
    /// Coarse stage.
    pub status: ProgressStage,
    /// Completion estimate in [0, 100].
    pub progress: u8,
    /// Milliseconds since the turn started.
    pub elapsed_ms: u64,
}

impl ProgressEvent {
    /// Builds an event, clamping `progress` to 100.
    #[must_use]
    pub fn new(
        step: &str,
        label: &str,
        agent: &str,
        status: ProgressStage,
        progress: u8,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            step: step.to_string(),
            label: label.to_string(),
            agent: agent.to_string(),
            status,
            progress: progress.min(100),
            elapsed_ms,
        }
    }
}

/// Host-supplied progress channel. Implementations must not block and
/// must swallow their own failures.
pub trait ProgressSink: Send + Sync {
    /// Delivers one event for the given session. Best-effort.
    fn emit(&self, session_id: &str, event: ProgressEvent);
}

/// Sink that drops everything. Default when the host passes none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _session_id: &str, _event: ProgressEvent) {}
}

/// Sink that forwards events over an unbounded tokio channel. Send
/// failures (receiver dropped) are logged and ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(String, ProgressEvent)>,
}

impl ChannelSink {
    /// Creates a sink and its receiving end.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(String, ProgressEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, session_id: &str, event: ProgressEvent) {
        if self.tx.send((session_id.to_string(), event)).is_err() {
            debug!(session_id, "progress receiver dropped, event discarded");
        }
    }
}
