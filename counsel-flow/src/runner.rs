//! TurnRunner – the session state manager. Loads (or creates) a session,
//! decides whether a message warrants a fresh analysis, runs the pipeline,
//! and persists the updated session exactly once on success.
//!
//! Concurrent turns on the same session are serialized by a per-session
//! lock: one pipeline run per session at a time, so report updates never
//! interleave.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::normalizer::normalize;
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::progress::ProgressSink;
use crate::report::Report;
use crate::session::Session;
use crate::stage::{StageError, StageKind};
use crate::storage::SessionStorage;

/// Result of applying one user turn to a session.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// The message carried new profile information and a fresh report was
    /// produced; the session has been updated.
    Analyzed(Report),
    /// The message added no profile fields: the pipeline was not re-run and
    /// the stored report is exposed for the response layer to answer from.
    FollowUp(Report),
    /// The run was cancelled; nothing was persisted.
    Cancelled,
    /// An unrecoverable fault; nothing was persisted and no report exists
    /// for this turn.
    Failed { stage: StageKind, error: StageError },
}

#[derive(Clone)]
pub struct TurnRunner {
    orchestrator: Arc<Orchestrator>,
    storage: Arc<dyn SessionStorage>,
    turn_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TurnRunner {
    pub fn new(orchestrator: Arc<Orchestrator>, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            orchestrator,
            storage,
            turn_locks: Arc::new(DashMap::new()),
        }
    }

    /// Apply one user message to the session, creating it on first contact.
    pub async fn apply_turn(
        &self,
        session_id: &str,
        raw_message: &str,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<TurnOutcome> {
        let lock = self
            .turn_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut session = self
            .storage
            .get(session_id)
            .await?
            .unwrap_or_else(|| Session::new(session_id));

        let merged = normalize(raw_message, session.profile.as_ref());

        // A turn that adds no structured fields is a question about the
        // existing report, not a request for re-analysis.
        if let (Some(prior), Some(report)) = (&session.profile, &session.latest_report) {
            if merged.same_fields(prior) {
                info!(session_id, "no new profile fields, serving stored report");
                return Ok(TurnOutcome::FollowUp(report.clone()));
            }
        }

        match self.orchestrator.run(&merged, progress, cancel).await? {
            RunOutcome::Completed { report } => {
                session.record_run(merged, report.clone());
                self.storage.save(session).await?;
                Ok(TurnOutcome::Analyzed(report))
            }
            RunOutcome::Cancelled => Ok(TurnOutcome::Cancelled),
            RunOutcome::Failed { stage, error } => Ok(TurnOutcome::Failed { stage, error }),
        }
    }

    /// The stored report for a session, if any; used by the response layer
    /// to answer follow-up questions without re-analysis.
    pub async fn latest_report(&self, session_id: &str) -> Result<Option<Report>> {
        Ok(self
            .storage
            .get(session_id)
            .await?
            .and_then(|session| session.latest_report))
    }
}
