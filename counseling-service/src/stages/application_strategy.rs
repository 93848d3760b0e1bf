use async_trait::async_trait;
use counsel_flow::{
    Profile, Reasoner, Stage, StageError, StageKind, StagePayload, StageResults, TimelineMilestone,
};
use std::sync::Arc;
use tracing::info;

use super::utils::{narrative, profile_summary};

/// Lays the matched scholarships and the cost picture onto an ordered
/// application timeline with relative deadlines.
pub struct ApplicationStrategyStage {
    reasoner: Arc<dyn Reasoner>,
}

impl ApplicationStrategyStage {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Stage for ApplicationStrategyStage {
    fn kind(&self) -> StageKind {
        StageKind::ApplicationStrategy
    }

    async fn run(
        &self,
        profile: &Profile,
        upstream: &StageResults,
    ) -> Result<StagePayload, StageError> {
        if !profile.has_signal() {
            return Err(StageError::InsufficientInput);
        }

        let candidates = upstream.scholarships().unwrap_or(&[]);
        let mut milestones = Vec::new();

        let shortlist_tasks = if candidates.is_empty() {
            vec!["Build a shortlist of awards matching your profile".to_string()]
        } else {
            candidates
                .iter()
                .map(|candidate| format!("Confirm eligibility criteria for {}", candidate.name))
                .collect()
        };
        milestones.push(TimelineMilestone {
            milestone: "Confirm the target list".to_string(),
            deadline: "Month 1".to_string(),
            tasks: shortlist_tasks,
        });

        let missing_english = !["IELTS", "TOEFL", "PTE", "DUOLINGO"]
            .iter()
            .any(|test| profile.test_scores.contains_key(*test));
        let missing_admission = !["SAT", "ACT", "GRE", "GMAT"]
            .iter()
            .any(|test| profile.test_scores.contains_key(*test));
        if missing_english || missing_admission {
            let mut tasks = Vec::new();
            if missing_english {
                tasks.push("Book and sit an English proficiency test".to_string());
            }
            if missing_admission {
                tasks.push("Book and sit a standardized admission test".to_string());
            }
            milestones.push(TimelineMilestone {
                milestone: "Close testing gaps".to_string(),
                deadline: "Month 2-3".to_string(),
                tasks,
            });
        }

        let essay_fallback = "Draft a personal essay around your strongest evidence".to_string();
        let essay_prompt = format!(
            "Student profile: {}.\nIn one sentence, what should the central theme of this student's scholarship essay be?",
            profile_summary(profile)
        );
        milestones.push(TimelineMilestone {
            milestone: "Prepare application materials".to_string(),
            deadline: "Month 3-4".to_string(),
            tasks: vec![
                narrative(self.reasoner.as_ref(), &essay_prompt, &essay_fallback).await,
                "Request two academic recommendation letters".to_string(),
                "Order certified transcripts and translations".to_string(),
            ],
        });

        let submission_tasks = if candidates.is_empty() {
            vec!["Submit applications for the shortlisted awards".to_string()]
        } else {
            candidates
                .iter()
                .map(|candidate| format!("Submit the {} application", candidate.name))
                .collect()
        };
        milestones.push(TimelineMilestone {
            milestone: "Submit scholarship applications".to_string(),
            deadline: "Month 5".to_string(),
            tasks: submission_tasks,
        });

        let financing_tasks = match upstream.financial() {
            Some(breakdown) if !breakdown.funding_options.is_empty() => breakdown
                .funding_options
                .iter()
                .map(|option| format!("Prepare supporting documents for {}", option.name))
                .collect(),
            _ => vec!["Assemble proof-of-funds documentation".to_string()],
        };
        milestones.push(TimelineMilestone {
            milestone: "Line up financing evidence".to_string(),
            deadline: "Month 5-6".to_string(),
            tasks: financing_tasks,
        });

        milestones.push(TimelineMilestone {
            milestone: "Visa and pre-departure".to_string(),
            deadline: "Month 7-8".to_string(),
            tasks: vec![
                "Apply for the student visa once an offer is in hand".to_string(),
                "Arrange housing and health insurance".to_string(),
            ],
        });

        info!(milestones = milestones.len(), "application strategy complete");
        Ok(StagePayload::Strategy(milestones))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{
        financial_results, rich_profile, scholarship_results, scripted_reasoner,
    };
    use counsel_flow::normalize;

    #[tokio::test]
    async fn timeline_is_ordered_and_references_matched_awards() {
        let mut upstream = scholarship_results();
        for result in financial_results().iter() {
            upstream.insert(result.clone());
        }

        let stage = ApplicationStrategyStage::new(scripted_reasoner("Write about the internship."));
        let payload = stage.run(&rich_profile(), &upstream).await.unwrap();

        let StagePayload::Strategy(milestones) = payload else {
            panic!("unexpected payload variant");
        };
        assert!(milestones.len() >= 5);
        assert_eq!(milestones[0].milestone, "Confirm the target list");
        assert_eq!(milestones.last().unwrap().milestone, "Visa and pre-departure");
        assert!(milestones.iter().all(|milestone| !milestone.tasks.is_empty()));

        let submission = milestones
            .iter()
            .find(|milestone| milestone.milestone == "Submit scholarship applications")
            .unwrap();
        assert!(submission.tasks.iter().any(|task| task.contains("Alpha Award")));
    }

    #[tokio::test]
    async fn testing_gap_milestone_appears_only_when_needed() {
        let stage = ApplicationStrategyStage::new(scripted_reasoner("theme"));

        let complete = stage
            .run(&rich_profile(), &scholarship_results())
            .await
            .unwrap();
        let StagePayload::Strategy(complete) = complete else {
            panic!("unexpected payload variant");
        };
        assert!(
            !complete
                .iter()
                .any(|milestone| milestone.milestone == "Close testing gaps")
        );

        let untested = normalize("I want to study Design in France, GPA 3.4/4", None);
        let gappy = stage.run(&untested, &StageResults::default()).await.unwrap();
        let StagePayload::Strategy(gappy) = gappy else {
            panic!("unexpected payload variant");
        };
        let gaps = gappy
            .iter()
            .find(|milestone| milestone.milestone == "Close testing gaps")
            .unwrap();
        assert_eq!(gaps.tasks.len(), 2);
    }

    #[tokio::test]
    async fn empty_profile_is_insufficient_input() {
        let stage = ApplicationStrategyStage::new(scripted_reasoner("unused"));
        let result = stage
            .run(&Profile::from_raw("yo"), &StageResults::default())
            .await;
        assert_eq!(result.unwrap_err(), StageError::InsufficientInput);
    }
}
