//! Typed payloads produced by the analysis stages and carried into the report.

use serde::{Deserialize, Serialize};

/// A scholarship the matcher considers worth applying to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScholarshipCandidate {
    pub name: String,
    /// Compatibility with the profile, 0-100, higher is better.
    pub fit_score: u8,
    /// Estimated likelihood of a successful application, 0-100.
    pub success_likelihood: u8,
    /// 1-based position in the recommended order.
    pub rank: u32,
    pub submission_strategy: String,
}

/// Order candidates by descending fit score, ties broken by descending
/// success likelihood and then input order, and assign contiguous 1-based
/// ranks. Stable sort keeps input order for full ties.
pub fn rank_candidates(mut candidates: Vec<ScholarshipCandidate>) -> Vec<ScholarshipCandidate> {
    candidates.sort_by(|a, b| {
        b.fit_score
            .cmp(&a.fit_score)
            .then(b.success_likelihood.cmp(&a.success_likelihood))
    });
    for (idx, candidate) in candidates.iter_mut().enumerate() {
        candidate.rank = (idx + 1) as u32;
    }
    candidates
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub label: String,
    pub annual_usd: f64,
    pub years: u32,
    pub total_usd: f64,
    /// What the figure is based on (country table, field multiplier, ...).
    pub assumptions: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingCategory {
    Scholarship,
    Grant,
    Loan,
    WorkStudy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingOption {
    pub name: String,
    pub category: FundingCategory,
    pub annual_usd: f64,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialBreakdown {
    pub tuition: CostEstimate,
    pub living: CostEstimate,
    pub funding_options: Vec<FundingOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementAction {
    pub title: String,
    pub detail: String,
    /// Rough time frame to complete the action ("next 3 months").
    pub horizon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineMilestone {
    pub milestone: String,
    /// Absolute or relative deadline ("Month 4-5", "8 weeks before intake").
    pub deadline: String,
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyOption {
    pub title: String,
    pub description: String,
    /// The situation in which this fallback becomes the recommended path.
    pub trigger: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, fit: u8, success: u8) -> ScholarshipCandidate {
        ScholarshipCandidate {
            name: name.to_string(),
            fit_score: fit,
            success_likelihood: success,
            rank: 0,
            submission_strategy: String::new(),
        }
    }

    #[test]
    fn ranks_are_contiguous_and_ordered_by_fit() {
        let ranked = rank_candidates(vec![
            candidate("b", 70, 50),
            candidate("a", 90, 40),
            candidate("c", 55, 80),
        ]);
        assert_eq!(
            ranked.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
        assert_eq!(ranked.iter().map(|c| c.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn fit_ties_break_on_success_likelihood_then_input_order() {
        let ranked = rank_candidates(vec![
            candidate("first", 80, 60),
            candidate("second", 80, 75),
            candidate("third", 80, 60),
        ]);
        assert_eq!(
            ranked.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["second", "first", "third"]
        );
    }

    #[test]
    fn ranking_is_deterministic_across_runs() {
        let input = vec![
            candidate("x", 64, 64),
            candidate("y", 64, 64),
            candidate("z", 91, 12),
        ];
        assert_eq!(rank_candidates(input.clone()), rank_candidates(input));
    }
}
