use async_trait::async_trait;
use counsel_flow::{
    ContingencyOption, Profile, Reasoner, Stage, StageError, StageKind, StagePayload, StageResults,
};
use std::sync::Arc;
use tracing::info;

use super::catalog::cheapest_alternatives;
use super::utils::{narrative, profile_summary};

/// Produces fallback paths. This is the one stage that must succeed from the
/// raw profile alone: it runs after everything else and still has to return
/// at least one option when every upstream stage failed.
pub struct ContingencyStage {
    reasoner: Arc<dyn Reasoner>,
}

impl ContingencyStage {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Stage for ContingencyStage {
    fn kind(&self) -> StageKind {
        StageKind::Contingency
    }

    async fn run(
        &self,
        profile: &Profile,
        upstream: &StageResults,
    ) -> Result<StagePayload, StageError> {
        let mut options = Vec::new();

        for (country, tuition) in cheapest_alternatives(profile.target_country.as_deref(), 2) {
            options.push(ContingencyOption {
                title: format!("Lower-cost destination: {}", title_case(country)),
                description: format!(
                    "Comparable programs with tuition around ${tuition:.0}/year and established international intakes."
                ),
                trigger: "funding falls short at the primary destination".to_string(),
            });
        }

        if let Some(candidates) = upstream.scholarships() {
            if let Some(safest) = candidates
                .iter()
                .max_by_key(|candidate| candidate.success_likelihood)
            {
                options.push(ContingencyOption {
                    title: format!("Safety-first round: {}", safest.name),
                    description: format!(
                        "Of the matched awards this one carries the best odds ({}%); submit it even if the reach options are rejected.",
                        safest.success_likelihood
                    ),
                    trigger: "reach applications are declined".to_string(),
                });
            }
        }

        options.push(ContingencyOption {
            title: "Gap semester to strengthen the profile".to_string(),
            description: gap_description(profile),
            trigger: "no offer arrives for the coming intake".to_string(),
        });
        options.push(ContingencyOption {
            title: "Start locally, transfer or exchange later".to_string(),
            description: "Enroll at a home university with credit-transfer agreements and apply abroad from a stronger position."
                .to_string(),
            trigger: "studying abroad is not affordable this year".to_string(),
        });

        if let Some(first) = options.first_mut() {
            let prompt = format!(
                "Student profile: {}.\nIn two sentences, explain this backup plan in encouraging, concrete terms: {}.",
                profile_summary(profile),
                first.title
            );
            first.description =
                narrative(self.reasoner.as_ref(), &prompt, &first.description).await;
        }

        info!(options = options.len(), "contingency planning complete");
        Ok(StagePayload::Contingency(options))
    }
}

fn gap_description(profile: &Profile) -> String {
    let mut focus = Vec::new();
    if profile.gpa.is_none() {
        focus.push("documenting your academic record");
    }
    if profile.test_scores.is_empty() {
        focus.push("sitting the standard tests");
    }
    if profile.internships.is_empty() {
        focus.push("gaining work experience");
    }
    if focus.is_empty() {
        focus.push("sharpening essays and recommendations");
    }
    format!(
        "Use six months for {}, then reapply with a stronger file.",
        focus.join(", ")
    )
}

fn title_case(words: &str) -> String {
    words
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{rich_profile, scholarship_results, scripted_reasoner};
    use counsel_flow::{StageResult, StageResults};

    fn all_failed() -> StageResults {
        let mut results = StageResults::default();
        for kind in [
            StageKind::ScholarshipMatch,
            StageKind::FinancialAnalysis,
            StageKind::ImprovementPlan,
            StageKind::ApplicationStrategy,
        ] {
            results.insert(StageResult::failed(kind, StageError::InsufficientInput));
        }
        results
    }

    #[tokio::test]
    async fn succeeds_on_a_raw_profile_when_everything_upstream_failed() {
        let stage = ContingencyStage::new(scripted_reasoner("You have solid options."));
        let payload = stage
            .run(&Profile::from_raw("hi"), &all_failed())
            .await
            .unwrap();

        let StagePayload::Contingency(options) = payload else {
            panic!("unexpected payload variant");
        };
        assert!(!options.is_empty());
        assert!(
            options
                .iter()
                .any(|option| option.title.contains("Gap semester"))
        );
    }

    #[tokio::test]
    async fn references_the_most_attainable_award_when_matching_succeeded() {
        let stage = ContingencyStage::new(scripted_reasoner("note"));
        let payload = stage
            .run(&rich_profile(), &scholarship_results())
            .await
            .unwrap();

        let StagePayload::Contingency(options) = payload else {
            panic!("unexpected payload variant");
        };
        assert!(
            options
                .iter()
                .any(|option| option.title.starts_with("Safety-first round"))
        );
    }

    #[tokio::test]
    async fn alternative_destinations_exclude_the_current_target() {
        let stage = ContingencyStage::new(scripted_reasoner("note"));
        let mut profile = Profile::from_raw("Germany please");
        profile.target_country = Some("Germany".to_string());

        let payload = stage.run(&profile, &StageResults::default()).await.unwrap();
        let StagePayload::Contingency(options) = payload else {
            panic!("unexpected payload variant");
        };
        assert!(
            !options
                .iter()
                .any(|option| option.title.contains("Germany"))
        );
    }
}
