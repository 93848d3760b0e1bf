mod application_strategy;
mod catalog;
mod contingency;
mod financial_analysis;
mod improvement_plan;
mod scholarship_match;
mod utils;

pub use application_strategy::ApplicationStrategyStage;
pub use contingency::ContingencyStage;
pub use financial_analysis::FinancialAnalysisStage;
pub use improvement_plan::ImprovementPlanStage;
pub use scholarship_match::ScholarshipMatchStage;
pub use utils::OpenRouterReasoner;

use counsel_flow::{Reasoner, Stage};
use std::sync::Arc;

/// The full stage set wired to one reasoning backend.
pub fn build_stages(reasoner: Arc<dyn Reasoner>) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(ScholarshipMatchStage::new(reasoner.clone())),
        Arc::new(FinancialAnalysisStage::new(reasoner.clone())),
        Arc::new(ImprovementPlanStage::new(reasoner.clone())),
        Arc::new(ApplicationStrategyStage::new(reasoner.clone())),
        Arc::new(ContingencyStage::new(reasoner)),
    ]
}
