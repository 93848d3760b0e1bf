use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ContingencyOption, FinancialBreakdown, ImprovementAction, ScholarshipCandidate,
    TimelineMilestone,
};
use crate::profile::Profile;
use crate::stage::{StageKind, StagePayload, StageResults, StageStatus};

/// One section of the final report: either the verbatim payload of a
/// succeeded stage or an explicit marker saying why it is missing. Sections
/// are never silently omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportSection<T> {
    Available { content: T },
    Unavailable { reason: String },
}

impl<T> ReportSection<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, ReportSection::Available { .. })
    }

    pub fn content(&self) -> Option<&T> {
        match self {
            ReportSection::Available { content } => Some(content),
            ReportSection::Unavailable { .. } => None,
        }
    }
}

/// The aggregated advisory document returned to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub overview: String,
    pub scholarships: ReportSection<Vec<ScholarshipCandidate>>,
    pub financial: ReportSection<FinancialBreakdown>,
    pub improvement_plan: ReportSection<Vec<ImprovementAction>>,
    pub application_timeline: ReportSection<Vec<TimelineMilestone>>,
    pub contingency_options: ReportSection<Vec<ContingencyOption>>,
    /// Set when any feeding stage failed; the affected sections say why.
    pub is_partial: bool,
    pub generated_at: DateTime<Utc>,
}

/// Merge the stage results into a report. Pure: payloads are taken verbatim
/// from succeeded stages (no re-sorting), failed stages become explicit
/// unavailable markers.
pub fn assemble(profile: &Profile, results: &StageResults) -> Report {
    let scholarships = section(results, StageKind::ScholarshipMatch, |payload| match payload {
        StagePayload::Scholarships(candidates) => Some(candidates.clone()),
        _ => None,
    });
    let financial = section(results, StageKind::FinancialAnalysis, |payload| match payload {
        StagePayload::Financial(breakdown) => Some(breakdown.clone()),
        _ => None,
    });
    let improvement_plan = section(results, StageKind::ImprovementPlan, |payload| match payload {
        StagePayload::Improvement(actions) => Some(actions.clone()),
        _ => None,
    });
    let application_timeline =
        section(results, StageKind::ApplicationStrategy, |payload| match payload {
            StagePayload::Strategy(milestones) => Some(milestones.clone()),
            _ => None,
        });
    let contingency_options = section(results, StageKind::Contingency, |payload| match payload {
        StagePayload::Contingency(options) => Some(options.clone()),
        _ => None,
    });

    let is_partial = !(scholarships.is_available()
        && financial.is_available()
        && improvement_plan.is_available()
        && application_timeline.is_available()
        && contingency_options.is_available());

    Report {
        overview: compose_overview(profile, results, is_partial),
        scholarships,
        financial,
        improvement_plan,
        application_timeline,
        contingency_options,
        is_partial,
        generated_at: Utc::now(),
    }
}

fn section<T>(
    results: &StageResults,
    kind: StageKind,
    extract: impl Fn(&StagePayload) -> Option<T>,
) -> ReportSection<T> {
    match results.get(kind).map(|result| &result.status) {
        Some(StageStatus::Succeeded(payload)) => match extract(payload) {
            Some(content) => ReportSection::Available { content },
            None => ReportSection::Unavailable {
                reason: format!("{kind} returned an unexpected payload"),
            },
        },
        Some(StageStatus::Failed(error)) => ReportSection::Unavailable {
            reason: error.to_string(),
        },
        Some(StageStatus::Pending) | None => ReportSection::Unavailable {
            reason: format!("{kind} did not run"),
        },
    }
}

fn compose_overview(profile: &Profile, results: &StageResults, is_partial: bool) -> String {
    let mut lines = Vec::new();

    lines.push(match (&profile.target_institution, &profile.field_of_study) {
        (Some(institution), Some(field)) => {
            format!("Advisory summary for studying {field} at {institution}.")
        }
        (Some(institution), None) => format!("Advisory summary for applying to {institution}."),
        (None, Some(field)) => format!("Advisory summary for studying {field} abroad."),
        (None, None) => "Advisory summary for your study-abroad plans.".to_string(),
    });

    if let Some(candidates) = results.scholarships() {
        if let Some(top) = candidates.first() {
            lines.push(format!(
                "{} scholarships matched your profile; the strongest fit is {} ({}/100).",
                candidates.len(),
                top.name,
                top.fit_score
            ));
        }
    }

    if is_partial {
        let degraded: Vec<&str> = results
            .iter()
            .filter(|result| !result.is_succeeded())
            .map(|result| result.kind.name())
            .collect();
        lines.push(format!(
            "Parts of the analysis could not be completed ({}). Sharing more about your background and retrying will fill them in.",
            degraded.join(", ")
        ));
    }

    lines.join(" ")
}

impl Report {
    /// Render the six-section document handed to the transport layer.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Study Abroad Advisory Report\n\n");
        if self.is_partial {
            out.push_str("> **Partial report** — one or more sections could not be completed.\n\n");
        }

        out.push_str("## Overview\n\n");
        out.push_str(&self.overview);
        out.push_str("\n\n## Top Scholarship Matches\n\n");
        match &self.scholarships {
            ReportSection::Available { content } => {
                for candidate in content {
                    out.push_str(&format!(
                        "{}. **{}** — fit {}/100, success likelihood {}/100\n   {}\n",
                        candidate.rank,
                        candidate.name,
                        candidate.fit_score,
                        candidate.success_likelihood,
                        candidate.submission_strategy
                    ));
                }
            }
            ReportSection::Unavailable { reason } => push_unavailable(&mut out, reason),
        }

        out.push_str("\n## Financial Analysis\n\n");
        match &self.financial {
            ReportSection::Available { content } => {
                for estimate in [&content.tuition, &content.living] {
                    out.push_str(&format!(
                        "- {}: ${:.0}/year over {} years (${:.0} total) — {}\n",
                        estimate.label,
                        estimate.annual_usd,
                        estimate.years,
                        estimate.total_usd,
                        estimate.assumptions
                    ));
                }
                out.push_str("- Funding options:\n");
                for option in &content.funding_options {
                    out.push_str(&format!(
                        "  - {} (~${:.0}/year): {}\n",
                        option.name, option.annual_usd, option.notes
                    ));
                }
            }
            ReportSection::Unavailable { reason } => push_unavailable(&mut out, reason),
        }

        out.push_str("\n## Profile Improvement Plan\n\n");
        match &self.improvement_plan {
            ReportSection::Available { content } => {
                for action in content {
                    out.push_str(&format!(
                        "- **{}** ({}): {}\n",
                        action.title, action.horizon, action.detail
                    ));
                }
            }
            ReportSection::Unavailable { reason } => push_unavailable(&mut out, reason),
        }

        out.push_str("\n## Application Strategy & Timeline\n\n");
        match &self.application_timeline {
            ReportSection::Available { content } => {
                for milestone in content {
                    out.push_str(&format!("- **{}** ({})\n", milestone.milestone, milestone.deadline));
                    for task in &milestone.tasks {
                        out.push_str(&format!("  - {task}\n"));
                    }
                }
            }
            ReportSection::Unavailable { reason } => push_unavailable(&mut out, reason),
        }

        out.push_str("\n## Contingency Plan\n\n");
        match &self.contingency_options {
            ReportSection::Available { content } => {
                for option in content {
                    out.push_str(&format!(
                        "- **{}** — {} (when: {})\n",
                        option.title, option.description, option.trigger
                    ));
                }
            }
            ReportSection::Unavailable { reason } => push_unavailable(&mut out, reason),
        }

        out
    }
}

fn push_unavailable(out: &mut String, reason: &str) {
    out.push_str(&format!("_Section unavailable: {reason}_\n"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CostEstimate, FundingCategory, FundingOption};
    use crate::stage::{StageError, StageResult};

    fn candidates() -> Vec<ScholarshipCandidate> {
        vec![
            ScholarshipCandidate {
                name: "Global Merit Award".to_string(),
                fit_score: 88,
                success_likelihood: 70,
                rank: 1,
                submission_strategy: "Lead with research output".to_string(),
            },
            ScholarshipCandidate {
                name: "Science Excellence Grant".to_string(),
                fit_score: 75,
                success_likelihood: 64,
                rank: 2,
                submission_strategy: "Emphasize test scores".to_string(),
            },
            ScholarshipCandidate {
                name: "Regional Leaders Fund".to_string(),
                fit_score: 61,
                success_likelihood: 58,
                rank: 3,
                submission_strategy: "Highlight community work".to_string(),
            },
        ]
    }

    fn breakdown() -> FinancialBreakdown {
        FinancialBreakdown {
            tuition: CostEstimate {
                label: "Tuition".to_string(),
                annual_usd: 20000.0,
                years: 4,
                total_usd: 80000.0,
                assumptions: "country baseline".to_string(),
            },
            living: CostEstimate {
                label: "Living costs".to_string(),
                annual_usd: 14000.0,
                years: 4,
                total_usd: 56000.0,
                assumptions: "location estimate".to_string(),
            },
            funding_options: vec![FundingOption {
                name: "Government grant".to_string(),
                category: FundingCategory::Grant,
                annual_usd: 3000.0,
                notes: "needs separate application".to_string(),
            }],
        }
    }

    fn all_succeeded() -> StageResults {
        let mut results = StageResults::default();
        results.insert(StageResult::succeeded(
            StageKind::ScholarshipMatch,
            StagePayload::Scholarships(candidates()),
        ));
        results.insert(StageResult::succeeded(
            StageKind::FinancialAnalysis,
            StagePayload::Financial(breakdown()),
        ));
        results.insert(StageResult::succeeded(
            StageKind::ImprovementPlan,
            StagePayload::Improvement(vec![ImprovementAction {
                title: "Retake IELTS".to_string(),
                detail: "Target 8.0".to_string(),
                horizon: "next 3 months".to_string(),
            }]),
        ));
        results.insert(StageResult::succeeded(
            StageKind::ApplicationStrategy,
            StagePayload::Strategy(vec![TimelineMilestone {
                milestone: "Submit applications".to_string(),
                deadline: "Month 6".to_string(),
                tasks: vec!["Finalize essays".to_string()],
            }]),
        ));
        results.insert(StageResult::succeeded(
            StageKind::Contingency,
            StagePayload::Contingency(vec![ContingencyOption {
                title: "Gap year".to_string(),
                description: "Strengthen profile and reapply".to_string(),
                trigger: "all applications rejected".to_string(),
            }]),
        ));
        results
    }

    #[test]
    fn all_succeeded_yields_complete_report() {
        let report = assemble(&Profile::from_raw("msg"), &all_succeeded());
        assert!(!report.is_partial);
        assert!(report.scholarships.is_available());
        assert!(report.financial.is_available());
        assert!(report.improvement_plan.is_available());
        assert!(report.application_timeline.is_available());
        assert!(report.contingency_options.is_available());
    }

    #[test]
    fn one_failed_stage_marks_exactly_one_section_unavailable() {
        let mut results = all_succeeded();
        results.insert(StageResult::failed(
            StageKind::FinancialAnalysis,
            StageError::Timeout(30),
        ));

        let report = assemble(&Profile::from_raw("msg"), &results);
        assert!(report.is_partial);

        let unavailable = [
            report.scholarships.is_available(),
            report.financial.is_available(),
            report.improvement_plan.is_available(),
            report.application_timeline.is_available(),
            report.contingency_options.is_available(),
        ]
        .iter()
        .filter(|available| !**available)
        .count();
        assert_eq!(unavailable, 1);
        assert!(!report.financial.is_available());
    }

    #[test]
    fn candidate_order_passes_through_unchanged() {
        let mut shuffled = candidates();
        shuffled.swap(0, 2);
        let mut results = all_succeeded();
        results.insert(StageResult::succeeded(
            StageKind::ScholarshipMatch,
            StagePayload::Scholarships(shuffled.clone()),
        ));

        let report = assemble(&Profile::from_raw("msg"), &results);
        assert_eq!(report.scholarships.content(), Some(&shuffled));
    }

    #[test]
    fn markdown_names_all_six_sections() {
        let report = assemble(&Profile::from_raw("msg"), &all_succeeded());
        let rendered = report.to_markdown();
        for header in [
            "## Overview",
            "## Top Scholarship Matches",
            "## Financial Analysis",
            "## Profile Improvement Plan",
            "## Application Strategy & Timeline",
            "## Contingency Plan",
        ] {
            assert!(rendered.contains(header), "missing header {header}");
        }
        assert!(!rendered.contains("Partial report"));
    }

    #[test]
    fn partial_report_carries_explicit_marker() {
        let mut results = all_succeeded();
        results.insert(StageResult::failed(
            StageKind::ScholarshipMatch,
            StageError::InsufficientInput,
        ));
        let report = assemble(&Profile::from_raw("hi"), &results);
        let rendered = report.to_markdown();
        assert!(rendered.contains("Partial report"));
        assert!(rendered.contains("Section unavailable"));
    }
}
