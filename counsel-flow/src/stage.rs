use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{
    ContingencyOption, FinancialBreakdown, ImprovementAction, ScholarshipCandidate,
    TimelineMilestone,
};
use crate::profile::Profile;

/// The closed set of analysis stages. Adding a stage means adding a variant
/// here and registering an implementation; the orchestrator's control flow
/// does not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageKind {
    ScholarshipMatch,
    FinancialAnalysis,
    ImprovementPlan,
    ApplicationStrategy,
    Contingency,
}

impl StageKind {
    pub const ALL: [StageKind; 5] = [
        StageKind::ScholarshipMatch,
        StageKind::FinancialAnalysis,
        StageKind::ImprovementPlan,
        StageKind::ApplicationStrategy,
        StageKind::Contingency,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::ScholarshipMatch => "scholarship_match",
            StageKind::FinancialAnalysis => "financial_analysis",
            StageKind::ImprovementPlan => "improvement_plan",
            StageKind::ApplicationStrategy => "application_strategy",
            StageKind::Contingency => "contingency",
        }
    }

    /// Upstream stages whose results are required inputs. The contingency
    /// stage lists all four so it runs last, but it is the designated
    /// fallback and consumes failed results instead of propagating them.
    pub fn dependencies(self) -> &'static [StageKind] {
        match self {
            StageKind::ScholarshipMatch | StageKind::FinancialAnalysis => &[],
            StageKind::ImprovementPlan => &[StageKind::ScholarshipMatch],
            StageKind::ApplicationStrategy => {
                &[StageKind::ScholarshipMatch, StageKind::FinancialAnalysis]
            }
            StageKind::Contingency => &[
                StageKind::ScholarshipMatch,
                StageKind::FinancialAnalysis,
                StageKind::ImprovementPlan,
                StageKind::ApplicationStrategy,
            ],
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a stage could not produce its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum StageError {
    /// The profile had no usable structured field to reason about.
    /// Recoverable by asking the user for more detail.
    #[error("profile has no usable fields to reason about")]
    InsufficientInput,

    /// A required upstream stage failed; this stage was not invoked.
    #[error("required upstream stage failed: {0}")]
    UpstreamFailed(StageKind),

    /// The stage call exceeded its time budget.
    #[error("stage exceeded its {0}s time budget")]
    Timeout(u64),

    /// Unexpected internal fault. The orchestrator fails the whole run for
    /// this class because its scope is unbounded.
    #[error("unrecoverable execution failure: {0}")]
    Unrecoverable(String),
}

impl StageError {
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, StageError::Unrecoverable(_))
    }
}

/// Stage-specific payload, one variant per stage kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StagePayload {
    Scholarships(Vec<ScholarshipCandidate>),
    Financial(FinancialBreakdown),
    Improvement(Vec<ImprovementAction>),
    Strategy(Vec<TimelineMilestone>),
    Contingency(Vec<ContingencyOption>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Succeeded(StagePayload),
    Failed(StageError),
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub kind: StageKind,
    pub status: StageStatus,
}

impl StageResult {
    pub fn pending(kind: StageKind) -> Self {
        Self {
            kind,
            status: StageStatus::Pending,
        }
    }

    pub fn succeeded(kind: StageKind, payload: StagePayload) -> Self {
        Self {
            kind,
            status: StageStatus::Succeeded(payload),
        }
    }

    pub fn failed(kind: StageKind, error: StageError) -> Self {
        Self {
            kind,
            status: StageStatus::Failed(error),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, StageStatus::Succeeded(_))
    }

    pub fn payload(&self) -> Option<&StagePayload> {
        match &self.status {
            StageStatus::Succeeded(payload) => Some(payload),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&StageError> {
        match &self.status {
            StageStatus::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Immutable snapshot of stage results handed to downstream stages and the
/// report assembler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageResults {
    results: BTreeMap<StageKind, StageResult>,
}

impl StageResults {
    pub fn insert(&mut self, result: StageResult) {
        self.results.insert(result.kind, result);
    }

    pub fn get(&self, kind: StageKind) -> Option<&StageResult> {
        self.results.get(&kind)
    }

    pub fn payload(&self, kind: StageKind) -> Option<&StagePayload> {
        self.get(kind).and_then(StageResult::payload)
    }

    /// Ranked scholarship list, when the matcher succeeded.
    pub fn scholarships(&self) -> Option<&[ScholarshipCandidate]> {
        match self.payload(StageKind::ScholarshipMatch) {
            Some(StagePayload::Scholarships(candidates)) => Some(candidates),
            _ => None,
        }
    }

    /// Financial breakdown, when the analyst succeeded.
    pub fn financial(&self) -> Option<&FinancialBreakdown> {
        match self.payload(StageKind::FinancialAnalysis) {
            Some(StagePayload::Financial(breakdown)) => Some(breakdown),
            _ => None,
        }
    }

    /// First dependency in `deps` order that ended in failure.
    pub fn first_failed_dependency(&self, deps: &[StageKind]) -> Option<StageKind> {
        deps.iter()
            .copied()
            .find(|dep| matches!(self.get(*dep), Some(result) if result.error().is_some()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageResult> {
        self.results.values()
    }
}

/// One analytical role in the pipeline. Implementations receive an immutable
/// profile snapshot plus the results of their declared upstream stages, and
/// must be structurally idempotent: identical inputs give identical section
/// counts and ranking order even when narrative text varies.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(
        &self,
        profile: &Profile,
        upstream: &StageResults,
    ) -> std::result::Result<StagePayload, StageError>;
}
