use async_trait::async_trait;
use counsel_flow::{
    CostEstimate, FinancialBreakdown, FundingCategory, FundingOption, Profile, Reasoner, Stage,
    StageError, StageKind, StagePayload, StageResults,
};
use std::sync::Arc;
use tracing::info;

use super::catalog::{
    base_tuition_usd, field_multiplier, government_support_usd, institution_country,
    living_cost_usd,
};
use super::utils::{narrative, profile_summary};

/// Builds the structured cost picture: tuition from the per-country baseline
/// and field multiplier, living costs from the location table, and the
/// funding options available at the destination.
pub struct FinancialAnalysisStage {
    reasoner: Arc<dyn Reasoner>,
}

impl FinancialAnalysisStage {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }
}

#[async_trait]
impl Stage for FinancialAnalysisStage {
    fn kind(&self) -> StageKind {
        StageKind::FinancialAnalysis
    }

    async fn run(
        &self,
        profile: &Profile,
        _upstream: &StageResults,
    ) -> Result<StagePayload, StageError> {
        if !profile.has_signal() {
            return Err(StageError::InsufficientInput);
        }

        let country = resolve_country(profile);
        let location = country.as_deref().unwrap_or("the destination");
        let years = program_years(profile);

        let tuition_annual = country
            .as_deref()
            .map(base_tuition_usd)
            .unwrap_or(base_tuition_usd(""))
            * profile
                .field_of_study
                .as_deref()
                .map(field_multiplier)
                .unwrap_or(1.0);
        let tuition = CostEstimate {
            label: "Tuition".to_string(),
            annual_usd: tuition_annual,
            years,
            total_usd: tuition_annual * f64::from(years),
            assumptions: format!(
                "{location} baseline adjusted for {}",
                profile.field_of_study.as_deref().unwrap_or("a general program")
            ),
        };

        let living_annual = country.as_deref().map(living_cost_usd).unwrap_or(living_cost_usd(""));
        let living = CostEstimate {
            label: "Living costs".to_string(),
            annual_usd: living_annual,
            years,
            total_usd: living_annual * f64::from(years),
            assumptions: format!("typical student budget in {location}"),
        };

        let funding_options = self.funding_options(profile, country.as_deref()).await;

        info!(
            country = %location,
            years,
            tuition_annual,
            options = funding_options.len(),
            "financial analysis complete"
        );

        Ok(StagePayload::Financial(FinancialBreakdown {
            tuition,
            living,
            funding_options,
        }))
    }
}

impl FinancialAnalysisStage {
    async fn funding_options(
        &self,
        profile: &Profile,
        country: Option<&str>,
    ) -> Vec<FundingOption> {
        let mut options = Vec::new();

        if let Some(country) = country {
            let (grant_annual, loan_annual) = government_support_usd(country);
            if grant_annual > 0.0 {
                options.push(FundingOption {
                    name: format!("{country} government grants"),
                    category: FundingCategory::Grant,
                    annual_usd: grant_annual,
                    notes: "needs-based, applied for separately from admission".to_string(),
                });
            }
            if loan_annual > 0.0 {
                let prompt = format!(
                    "Student profile: {}.\nIn two sentences, what should this student know before taking a study loan in {country}?",
                    profile_summary(profile)
                );
                let fallback =
                    "check repayment terms and whether international students qualify".to_string();
                options.push(FundingOption {
                    name: format!("{country} student loans"),
                    category: FundingCategory::Loan,
                    annual_usd: loan_annual,
                    notes: narrative(self.reasoner.as_ref(), &prompt, &fallback).await,
                });
            }
        }

        options.push(FundingOption {
            name: "Merit-based scholarships".to_string(),
            category: FundingCategory::Scholarship,
            annual_usd: 15000.0,
            notes: "typical award level across the matched programs".to_string(),
        });
        options.push(FundingOption {
            name: "Part-time work-study".to_string(),
            category: FundingCategory::WorkStudy,
            annual_usd: 6000.0,
            notes: "subject to local visa work-hour limits".to_string(),
        });

        options
    }
}

fn resolve_country(profile: &Profile) -> Option<String> {
    profile.target_country.clone().or_else(|| {
        profile
            .target_institution
            .as_deref()
            .and_then(institution_country)
            .map(str::to_string)
    })
}

/// Graduate-level test evidence implies a shorter program.
fn program_years(profile: &Profile) -> u32 {
    if profile.test_scores.contains_key("GRE") || profile.test_scores.contains_key("GMAT") {
        2
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{failing_reasoner, rich_profile, scripted_reasoner};
    use counsel_flow::normalize;

    #[tokio::test]
    async fn builds_structured_estimates_for_a_known_destination() {
        let stage = FinancialAnalysisStage::new(scripted_reasoner("mind the interest rate"));
        let payload = stage
            .run(&rich_profile(), &StageResults::default())
            .await
            .unwrap();

        let StagePayload::Financial(breakdown) = payload else {
            panic!("unexpected payload variant");
        };
        // Singapore baseline with the computer-science multiplier
        assert!((breakdown.tuition.annual_usd - 22000.0).abs() < 1e-6);
        assert_eq!(breakdown.tuition.years, 4);
        assert!((breakdown.tuition.total_usd - 88000.0).abs() < 1e-6);
        assert!((breakdown.living.annual_usd - 14000.0).abs() < 1e-6);
        assert!(breakdown.funding_options.len() >= 2);
    }

    #[tokio::test]
    async fn graduate_test_evidence_shortens_the_program() {
        let profile = normalize("I want a Physics program in Germany, GRE 325, GPA 3.6/4", None);
        let stage = FinancialAnalysisStage::new(scripted_reasoner("note"));
        let payload = stage.run(&profile, &StageResults::default()).await.unwrap();

        let StagePayload::Financial(breakdown) = payload else {
            panic!("unexpected payload variant");
        };
        assert_eq!(breakdown.tuition.years, 2);
        // Germany offers both grants and loans in the support table
        assert!(breakdown
            .funding_options
            .iter()
            .any(|option| option.category == FundingCategory::Grant));
        assert!(breakdown
            .funding_options
            .iter()
            .any(|option| option.category == FundingCategory::Loan));
    }

    #[tokio::test]
    async fn institution_hint_fills_in_a_missing_country() {
        let profile = normalize("Aiming for NUS, GPA 3.8/4", None);
        let stage = FinancialAnalysisStage::new(scripted_reasoner("note"));
        let payload = stage.run(&profile, &StageResults::default()).await.unwrap();

        let StagePayload::Financial(breakdown) = payload else {
            panic!("unexpected payload variant");
        };
        assert!(breakdown.tuition.assumptions.contains("Singapore"));
    }

    #[tokio::test]
    async fn empty_profile_is_insufficient_input() {
        let stage = FinancialAnalysisStage::new(scripted_reasoner("unused"));
        let result = stage
            .run(&Profile::from_raw("hello"), &StageResults::default())
            .await;
        assert_eq!(result.unwrap_err(), StageError::InsufficientInput);
    }

    #[tokio::test]
    async fn reasoner_failure_keeps_the_breakdown_structured() {
        let profile = normalize("Business studies in Canada, GPA 3.5/4, IELTS 7.0", None);
        let stage = FinancialAnalysisStage::new(failing_reasoner());
        let payload = stage.run(&profile, &StageResults::default()).await.unwrap();

        let StagePayload::Financial(breakdown) = payload else {
            panic!("unexpected payload variant");
        };
        let loan = breakdown
            .funding_options
            .iter()
            .find(|option| option.category == FundingCategory::Loan)
            .expect("Canada has a loan option");
        assert!(loan.notes.contains("repayment"));
    }
}
