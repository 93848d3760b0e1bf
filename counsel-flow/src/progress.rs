use serde::{Deserialize, Serialize};

use crate::stage::StageKind;

/// Observable states of one pipeline run. On the success path the run moves
/// strictly forward and each entered state is announced exactly once, giving
/// five events: normalizing, analyzing, planning, contingency planning, done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    /// Extracting and merging the structured profile.
    Normalizing,
    /// Scholarship matching and financial analysis in flight.
    Analyzing,
    /// Improvement planning and application strategy in flight.
    Planning,
    /// Fallback-path planning in flight.
    ContingencyPlanning,
    /// Report assembled and returned.
    Done,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn label(self) -> &'static str {
        match self {
            PipelineState::Idle => "Waiting for input",
            PipelineState::Normalizing => "Reviewing your profile details",
            PipelineState::Analyzing => "Matching scholarships and analyzing finances",
            PipelineState::Planning => "Building your improvement plan and application strategy",
            PipelineState::ContingencyPlanning => "Preparing backup options",
            PipelineState::Done => "Assembling your advisory report",
            PipelineState::Failed => "Analysis failed",
            PipelineState::Cancelled => "Analysis cancelled",
        }
    }
}

/// One progress notification, emitted on every state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub state: PipelineState,
    pub label: String,
    /// Populated on entry to `Failed`.
    pub failed_stage: Option<StageKind>,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn entered(state: PipelineState) -> Self {
        Self {
            state,
            label: state.label().to_string(),
            failed_stage: None,
            error: None,
        }
    }

    pub fn failed(stage: StageKind, error: impl ToString) -> Self {
        Self {
            state: PipelineState::Failed,
            label: PipelineState::Failed.label().to_string(),
            failed_stage: Some(stage),
            error: Some(error.to_string()),
        }
    }
}

/// Consumer of pipeline progress. Called inline between transitions, so
/// implementations must be cheap and non-blocking; events are for real-time
/// display and are not assumed to be durably stored.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Sink that drops every event.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}
