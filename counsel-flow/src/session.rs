use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::Profile;
use crate::report::Report;

/// Durable per-conversation state: the evolving profile plus the latest
/// report and the append-only history of earlier ones.
///
/// Created on the first user message; mutated exactly once per successful
/// pipeline run. Destruction (session timeout) is owned by the transport
/// layer, not this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// `None` until the first message has been normalized.
    pub profile: Option<Profile>,
    /// `None` until the first pipeline run completes.
    pub latest_report: Option<Report>,
    /// Earlier reports, oldest first. Lets follow-up turns answer "what
    /// changed" questions.
    pub report_history: Vec<Report>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            profile: None,
            latest_report: None,
            report_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Install a fresh analysis outcome; the previous report moves to
    /// history.
    pub fn record_run(&mut self, profile: Profile, report: Report) {
        if let Some(previous) = self.latest_report.take() {
            self.report_history.push(previous);
        }
        self.profile = Some(profile);
        self.latest_report = Some(report);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::assemble;
    use crate::stage::StageResults;

    #[test]
    fn record_run_moves_previous_report_to_history() {
        let mut session = Session::new("s1");
        assert!(session.latest_report.is_none());

        let first = assemble(&Profile::from_raw("a"), &StageResults::default());
        session.record_run(Profile::from_raw("a"), first.clone());
        assert!(session.report_history.is_empty());

        let second = assemble(&Profile::from_raw("b"), &StageResults::default());
        session.record_run(Profile::from_raw("b"), second);
        assert_eq!(session.report_history.len(), 1);
        assert_eq!(session.report_history[0].overview, first.overview);
    }
}
