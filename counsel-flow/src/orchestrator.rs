use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::{CounselError, Result};
use crate::profile::Profile;
use crate::progress::{PipelineState, ProgressEvent, ProgressSink};
use crate::report::{Report, assemble};
use crate::stage::{Stage, StageError, StageKind, StageResult, StageResults};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Independent time budget for each stage call. An overrun fails that
    /// stage without blocking its siblings.
    pub stage_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
        }
    }
}

/// Terminal result of one pipeline run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed { report: Report },
    /// An unrecoverable fault; no report is produced for this class.
    Failed { stage: StageKind, error: StageError },
    Cancelled,
}

/// Sequences the analysis stages, enforcing dependency order with a barrier
/// between groups, collecting results, emitting progress events, and
/// converting every stage-level failure into a [`StageResult`] instead of an
/// escaping error. Stages are never retried here: re-submitting the message
/// is the caller's explicit retry, since stage reasoning may be
/// nondeterministic.
pub struct Orchestrator {
    stages: DashMap<StageKind, Arc<dyn Stage>>,
    config: OrchestratorConfig,
}

enum StageRun {
    Finished(StageResult),
    Cancelled,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            stages: DashMap::new(),
            config,
        }
    }

    pub fn register(&self, stage: Arc<dyn Stage>) -> &Self {
        self.stages.insert(stage.kind(), stage);
        self
    }

    pub fn with_stages(
        config: OrchestratorConfig,
        stages: impl IntoIterator<Item = Arc<dyn Stage>>,
    ) -> Self {
        let orchestrator = Self::new(config);
        for stage in stages {
            orchestrator.register(stage);
        }
        orchestrator
    }

    fn stage(&self, kind: StageKind) -> Result<Arc<dyn Stage>> {
        self.stages
            .get(&kind)
            .map(|entry| entry.clone())
            .ok_or_else(|| CounselError::StageNotRegistered(kind.to_string()))
    }

    /// Run the full pipeline over an already-normalized profile snapshot.
    pub async fn run(
        &self,
        profile: &Profile,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<RunOutcome> {
        progress.emit(ProgressEvent::entered(PipelineState::Normalizing));
        info!(has_signal = profile.has_signal(), "pipeline run started");

        let mut results = StageResults::default();
        for kind in StageKind::ALL {
            results.insert(StageResult::pending(kind));
        }

        if cancel.is_cancelled() {
            return self.cancelled(progress);
        }

        // Scholarship matching and financial analysis only need the profile
        // and run concurrently; the barrier below waits for both.
        progress.emit(ProgressEvent::entered(PipelineState::Analyzing));
        let (scholarship, financial) = tokio::join!(
            self.run_stage(StageKind::ScholarshipMatch, profile, &results, cancel),
            self.run_stage(StageKind::FinancialAnalysis, profile, &results, cancel),
        );
        match (scholarship?, financial?) {
            (StageRun::Finished(a), StageRun::Finished(b)) => {
                results.insert(a);
                results.insert(b);
            }
            _ => return self.cancelled(progress),
        }
        if let Some(outcome) = self.check_unrecoverable(&results, progress) {
            return Ok(outcome);
        }

        // Both planners gate on the first group's results.
        progress.emit(ProgressEvent::entered(PipelineState::Planning));
        let (improvement, strategy) = tokio::join!(
            self.run_stage(StageKind::ImprovementPlan, profile, &results, cancel),
            self.run_stage(StageKind::ApplicationStrategy, profile, &results, cancel),
        );
        match (improvement?, strategy?) {
            (StageRun::Finished(a), StageRun::Finished(b)) => {
                results.insert(a);
                results.insert(b);
            }
            _ => return self.cancelled(progress),
        }
        if let Some(outcome) = self.check_unrecoverable(&results, progress) {
            return Ok(outcome);
        }

        progress.emit(ProgressEvent::entered(PipelineState::ContingencyPlanning));
        match self
            .run_stage(StageKind::Contingency, profile, &results, cancel)
            .await?
        {
            StageRun::Finished(result) => results.insert(result),
            StageRun::Cancelled => return self.cancelled(progress),
        }
        if let Some(outcome) = self.check_unrecoverable(&results, progress) {
            return Ok(outcome);
        }

        if cancel.is_cancelled() {
            return self.cancelled(progress);
        }

        let report = assemble(profile, &results);
        progress.emit(ProgressEvent::entered(PipelineState::Done));
        info!(is_partial = report.is_partial, "pipeline run completed");
        Ok(RunOutcome::Completed { report })
    }

    async fn run_stage(
        &self,
        kind: StageKind,
        profile: &Profile,
        upstream: &StageResults,
        cancel: &CancelToken,
    ) -> Result<StageRun> {
        // A failed dependency short-circuits the stage without invoking its
        // logic. The contingency stage is the designated fallback and
        // consumes failed upstream results instead.
        if kind != StageKind::Contingency {
            if let Some(dep) = upstream.first_failed_dependency(kind.dependencies()) {
                warn!(stage = %kind, dependency = %dep, "skipping stage, upstream failed");
                return Ok(StageRun::Finished(StageResult::failed(
                    kind,
                    StageError::UpstreamFailed(dep),
                )));
            }
        }

        let stage = self.stage(kind)?;
        let budget = self.config.stage_timeout;
        info!(stage = %kind, "stage started");

        // Spawned so a panicking stage is isolated and reported as an
        // unrecoverable fault rather than tearing down the run.
        let task = tokio::spawn({
            let profile = profile.clone();
            let upstream = upstream.clone();
            async move { stage.run(&profile, &upstream).await }
        });
        let abort = task.abort_handle();

        tokio::select! {
            _ = cancel.cancelled() => {
                abort.abort();
                info!(stage = %kind, "stage cancelled");
                Ok(StageRun::Cancelled)
            }
            joined = timeout(budget, task) => {
                let result = match joined {
                    Err(_) => {
                        abort.abort();
                        warn!(stage = %kind, budget_secs = budget.as_secs(), "stage timed out");
                        StageResult::failed(kind, StageError::Timeout(budget.as_secs()))
                    }
                    Ok(Err(join_error)) => StageResult::failed(
                        kind,
                        StageError::Unrecoverable(format!("stage task aborted: {join_error}")),
                    ),
                    Ok(Ok(Err(error))) => {
                        warn!(stage = %kind, error = %error, "stage failed");
                        StageResult::failed(kind, error)
                    }
                    Ok(Ok(Ok(payload))) => {
                        info!(stage = %kind, "stage succeeded");
                        StageResult::succeeded(kind, payload)
                    }
                };
                Ok(StageRun::Finished(result))
            }
        }
    }

    fn cancelled(&self, progress: &dyn ProgressSink) -> Result<RunOutcome> {
        info!("pipeline run cancelled");
        progress.emit(ProgressEvent::entered(PipelineState::Cancelled));
        Ok(RunOutcome::Cancelled)
    }

    fn check_unrecoverable(
        &self,
        results: &StageResults,
        progress: &dyn ProgressSink,
    ) -> Option<RunOutcome> {
        let (stage, error) = results.iter().find_map(|result| match result.error() {
            Some(error) if error.is_unrecoverable() => Some((result.kind, error.clone())),
            _ => None,
        })?;
        warn!(stage = %stage, error = %error, "pipeline run failed");
        progress.emit(ProgressEvent::failed(stage, &error));
        Some(RunOutcome::Failed { stage, error })
    }
}
