use async_trait::async_trait;
use counsel_flow::{
    ImprovementAction, Profile, Reasoner, Stage, StageError, StageKind, StagePayload, StageResults,
};
use std::sync::Arc;
use tracing::info;

use super::utils::{narrative, profile_summary};

const ENGLISH_TESTS: [&str; 4] = ["IELTS", "TOEFL", "PTE", "DUOLINGO"];
const ADMISSION_TESTS: [&str; 4] = ["SAT", "ACT", "GRE", "GMAT"];

/// Turns profile weaknesses into a prioritized action list, anchored to the
/// scholarships the matcher put forward.
pub struct ImprovementPlanStage {
    reasoner: Arc<dyn Reasoner>,
}

impl ImprovementPlanStage {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Stage for ImprovementPlanStage {
    fn kind(&self) -> StageKind {
        StageKind::ImprovementPlan
    }

    async fn run(
        &self,
        profile: &Profile,
        upstream: &StageResults,
    ) -> Result<StagePayload, StageError> {
        if !profile.has_signal() {
            return Err(StageError::InsufficientInput);
        }

        let targets = upstream
            .scholarships()
            .map(|candidates| {
                candidates
                    .iter()
                    .take(3)
                    .map(|candidate| candidate.name.clone())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_else(|| "your target scholarships".to_string());

        let mut actions = Vec::new();

        match profile.gpa {
            None => actions.push(ImprovementAction {
                title: "Document your academic record".to_string(),
                detail: "Collect transcripts and report your GPA so awards can assess eligibility."
                    .to_string(),
                horizon: "next 2 weeks".to_string(),
            }),
            Some(gpa) if gpa.normalized() < 3.6 => actions.push(ImprovementAction {
                title: "Raise your GPA".to_string(),
                detail: format!(
                    "Competitive awards such as {targets} expect roughly 3.6+ on the 4.0 scale; prioritize coursework this term."
                ),
                horizon: "current semester".to_string(),
            }),
            Some(_) => {}
        }

        let has_english = ENGLISH_TESTS
            .iter()
            .any(|test| profile.test_scores.contains_key(*test));
        if !has_english {
            actions.push(ImprovementAction {
                title: "Take an English proficiency test".to_string(),
                detail: "Most international awards require IELTS or TOEFL; book a sitting early."
                    .to_string(),
                horizon: "next 3 months".to_string(),
            });
        } else if profile
            .test_scores
            .get("IELTS")
            .is_some_and(|score| *score < 7.0)
            || profile
                .test_scores
                .get("TOEFL")
                .is_some_and(|score| *score < 100.0)
        {
            actions.push(ImprovementAction {
                title: "Retake your English test".to_string(),
                detail: "A band above the common cutoff widens the pool of eligible awards."
                    .to_string(),
                horizon: "next 3 months".to_string(),
            });
        }

        let has_admission_test = ADMISSION_TESTS
            .iter()
            .any(|test| profile.test_scores.contains_key(*test));
        if !has_admission_test {
            actions.push(ImprovementAction {
                title: "Sit a standardized admission test".to_string(),
                detail: "An SAT, ACT or GRE score unlocks the merit awards that require one."
                    .to_string(),
                horizon: "next 4 months".to_string(),
            });
        }

        if profile.extracurriculars.len() < 2 {
            actions.push(ImprovementAction {
                title: "Deepen extracurricular involvement".to_string(),
                detail: "Take a sustained, named role in one or two activities rather than many shallow ones."
                    .to_string(),
                horizon: "next 6 months".to_string(),
            });
        }

        if profile.internships.is_empty() {
            actions.push(ImprovementAction {
                title: "Gain practical experience".to_string(),
                detail: "A short internship or research assistantship strengthens field-specific awards."
                    .to_string(),
                horizon: "next 6 months".to_string(),
            });
        }

        actions.push(ImprovementAction {
            title: "Tailor your application materials".to_string(),
            detail: format!("Align essays and references with the priorities of {targets}."),
            horizon: "before submission".to_string(),
        });

        if let Some(first) = actions.first_mut() {
            let prompt = format!(
                "Student profile: {}.\nIn two sentences, give concrete advice for this action: {}.",
                profile_summary(profile),
                first.title
            );
            first.detail = narrative(self.reasoner.as_ref(), &prompt, &first.detail).await;
        }

        info!(actions = actions.len(), "improvement planning complete");
        Ok(StagePayload::Improvement(actions))
    }
}
