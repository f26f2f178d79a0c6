//! Session events and status snapshots

use serde::Serialize;

/// Why a synthesis request did not reach the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NotEnoughTurns,
    AlreadyRunning,
}

/// Result of one synthesis request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SynthesisOutcome {
    Skipped(SkipReason),
    /// The result replaced the committed plan
    Applied,
    /// The gateway produced nothing usable; the plan is untouched
    NoUpdate,
    /// A commit or reset happened while the call was in flight
    Discarded,
}

/// What replaced the committed plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanSource {
    Synthesis,
    Edit,
}

/// Broadcast to subscribers whenever session state changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TurnAppended { index: usize },
    SynthesisStarted,
    SynthesisFinished(SynthesisOutcome),
    PlanChanged { source: PlanSource },
    EditOpened,
    EditClosed { committed: bool },
    SessionReset,
}

/// Point-in-time view of the session for presentation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub turns: usize,
    pub has_plan: bool,
    pub plan_revision: u64,
    pub sending: bool,
    pub synthesizing: bool,
    pub editing: bool,
    /// Set when an open edit was taken from an older plan revision
    pub edit_stale: bool,
}
