use async_trait::async_trait;
use counsel_flow::{
    Profile, Reasoner, ScholarshipCandidate, Stage, StageError, StageKind, StagePayload,
    StageResults, rank_candidates,
};
use std::sync::Arc;
use tracing::info;

use super::catalog::{ScholarshipSpec, scholarship_catalog};
use super::utils::{narrative, profile_summary};

/// Fit scores at or above this are worth recommending on their own; weaker
/// entries only pad the list up to the minimum.
const FAIR_FLOOR: u8 = 45;
const MIN_CANDIDATES: usize = 3;
const MAX_CANDIDATES: usize = 5;

/// Scores the scholarship catalog against the profile with weighted
/// criteria (location 20, academics 30, tests 25, extracurriculars 15,
/// field 10) and returns the top 3-5 candidates in deterministic order.
pub struct ScholarshipMatchStage {
    reasoner: Arc<dyn Reasoner>,
}

impl ScholarshipMatchStage {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Stage for ScholarshipMatchStage {
    fn kind(&self) -> StageKind {
        StageKind::ScholarshipMatch
    }

    async fn run(
        &self,
        profile: &Profile,
        _upstream: &StageResults,
    ) -> Result<StagePayload, StageError> {
        if !profile.has_signal() {
            return Err(StageError::InsufficientInput);
        }

        let scored: Vec<ScholarshipCandidate> = scholarship_catalog()
            .iter()
            .map(|spec| score_against(profile, spec))
            .collect();
        let ordered = rank_candidates(scored);

        let mut selected: Vec<ScholarshipCandidate> = ordered
            .iter()
            .filter(|candidate| candidate.fit_score >= FAIR_FLOOR)
            .take(MAX_CANDIDATES)
            .cloned()
            .collect();
        // Pad with the next-best entries so sparse profiles still get a
        // usable shortlist.
        for candidate in &ordered {
            if selected.len() >= MIN_CANDIDATES {
                break;
            }
            if !selected.iter().any(|kept| kept.name == candidate.name) {
                selected.push(candidate.clone());
            }
        }
        let mut selected = rank_candidates(selected);

        info!(
            count = selected.len(),
            top = %selected[0].name,
            "scholarship matching complete"
        );

        if let Some(top) = selected.first_mut() {
            let prompt = format!(
                "Student profile: {}.\nIn two sentences, how should this student position an application for the {} scholarship?",
                profile_summary(profile),
                top.name
            );
            top.submission_strategy =
                narrative(self.reasoner.as_ref(), &prompt, &top.submission_strategy).await;
        }

        Ok(StagePayload::Scholarships(selected))
    }
}

fn score_against(profile: &Profile, spec: &ScholarshipSpec) -> ScholarshipCandidate {
    let mut fit = 0.0f64;
    let mut missing: Vec<String> = Vec::new();

    // location fit (20)
    fit += match (&profile.target_country, spec.host_country) {
        (_, "Any") => 16.0,
        (Some(country), host) if country.eq_ignore_ascii_case(host) => 20.0,
        (None, _) => 10.0,
        (Some(_), host) => {
            missing.push(format!("award tied to {host}"));
            4.0
        }
    };

    // academics (30)
    fit += match (profile.gpa.map(|gpa| gpa.normalized()), spec.min_gpa) {
        (_, min) if min <= 0.0 => 20.0,
        (Some(gpa), min) if gpa >= min => 30.0,
        (Some(gpa), min) if gpa >= min - 0.2 => {
            missing.push(format!("GPA slightly below the {min:.1} bar"));
            22.0
        }
        (Some(_), min) => {
            missing.push(format!("GPA below the {min:.1} requirement"));
            10.0
        }
        (None, _) => {
            missing.push("GPA not provided".to_string());
            8.0
        }
    };

    // standardized tests (25)
    if spec.required_tests.is_empty() {
        fit += 18.0 + (profile.test_scores.len().min(3) as f64) * 2.0;
    } else {
        let share = 25.0 / spec.required_tests.len() as f64;
        for (test, min_score) in spec.required_tests {
            match profile.test_scores.get(*test) {
                Some(score) if *score >= *min_score => fit += share,
                Some(score) if *score >= *min_score * 0.9 => {
                    missing.push(format!("{test} just below the {min_score} cutoff"));
                    fit += share * 0.75;
                }
                Some(_) => {
                    missing.push(format!("{test} well below the {min_score} cutoff"));
                    fit += share * 0.3;
                }
                None => missing.push(format!("{test} score required")),
            }
        }
    }

    // extracurriculars (15)
    fit += if !spec.values_extracurriculars {
        10.0
    } else {
        match profile.extracurriculars.len() {
            0 => {
                missing.push("no extracurricular record".to_string());
                3.0
            }
            1 | 2 => 11.0,
            _ => 15.0,
        }
    };

    // field alignment (10)
    fit += match (&profile.field_of_study, spec.fields) {
        (_, fields) if fields.is_empty() => 10.0,
        (Some(field), fields) => {
            let field = field.to_lowercase();
            if fields.iter().any(|keyword| field.contains(keyword)) {
                10.0
            } else {
                missing.push("award targets another field".to_string());
                0.0
            }
        }
        (None, _) => 4.0,
    };

    let fit = fit.round().clamp(0.0, 100.0) as u8;
    let mut success = i32::from(fit) - (missing.len() as i32) * 8;
    if spec.values_internships && !profile.internships.is_empty() {
        success += 5;
    }
    let success = success.clamp(1, 95) as u8;

    ScholarshipCandidate {
        name: spec.name.to_string(),
        fit_score: fit,
        success_likelihood: success,
        rank: 0,
        submission_strategy: submission_strategy(fit, &missing),
    }
}

fn submission_strategy(fit: u8, missing: &[String]) -> String {
    let lead = if fit >= 80 && missing.len() <= 1 {
        "Strong match: apply in the earliest round with your full profile."
    } else if fit >= 65 && missing.len() <= 2 {
        "Good match: prepare a focused application and close the small gaps first."
    } else if fit >= FAIR_FLOOR {
        "Fair match: keep as a solid backup while strengthening your profile."
    } else {
        "Outside the usual criteria: apply only alongside stronger options."
    };
    match missing.first() {
        Some(gap) => format!("{lead} Main gap to address: {gap}."),
        None => lead.to_string(),
    }
}
