pub mod cancel;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod profile;
pub mod progress;
pub mod reasoner;
pub mod report;
pub mod runner;
pub mod session;
pub mod stage;
pub mod storage;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use error::{CounselError, Result};
pub use models::{
    ContingencyOption, CostEstimate, FinancialBreakdown, FundingCategory, FundingOption,
    ImprovementAction, ScholarshipCandidate, TimelineMilestone, rank_candidates,
};
pub use normalizer::normalize;
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunOutcome};
pub use profile::{Gpa, Profile};
pub use progress::{NullSink, PipelineState, ProgressEvent, ProgressSink};
pub use reasoner::Reasoner;
pub use report::{Report, ReportSection, assemble};
pub use runner::{TurnOutcome, TurnRunner};
pub use session::Session;
pub use stage::{Stage, StageError, StageKind, StagePayload, StageResult, StageResults, StageStatus};
pub use storage::{InMemorySessionStorage, PostgresSessionStorage, SessionStorage};

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::models::{
        ContingencyOption, CostEstimate, FinancialBreakdown, FundingCategory, FundingOption,
        ImprovementAction, ScholarshipCandidate, TimelineMilestone,
    };
    use crate::normalizer::normalize;
    use crate::orchestrator::{Orchestrator, OrchestratorConfig};
    use crate::profile::Profile;
    use crate::progress::{PipelineState, ProgressEvent, ProgressSink};
    use crate::stage::{Stage, StageError, StageKind, StagePayload, StageResults};

    #[derive(Clone)]
    pub enum Script {
        Succeed,
        Fail(StageError),
        Delay(Duration),
        Panic,
    }

    /// Stage double that follows a fixed script and counts invocations.
    pub struct ScriptedStage {
        kind: StageKind,
        script: Script,
        invocations: AtomicUsize,
    }

    impl ScriptedStage {
        pub fn new(kind: StageKind, script: Script) -> Arc<Self> {
            Arc::new(Self {
                kind,
                script,
                invocations: AtomicUsize::new(0),
            })
        }

        pub fn invocation_count(&self) -> usize {
            self.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Stage for ScriptedStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn run(
            &self,
            _profile: &Profile,
            _upstream: &StageResults,
        ) -> std::result::Result<StagePayload, StageError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Succeed => Ok(payload_for(self.kind)),
                Script::Fail(error) => Err(error.clone()),
                Script::Delay(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(payload_for(self.kind))
                }
                Script::Panic => panic!("scripted stage panic"),
            }
        }
    }

    pub fn payload_for(kind: StageKind) -> StagePayload {
        match kind {
            StageKind::ScholarshipMatch => StagePayload::Scholarships(vec![
                ScholarshipCandidate {
                    name: "Alpha Award".to_string(),
                    fit_score: 90,
                    success_likelihood: 70,
                    rank: 1,
                    submission_strategy: "apply early".to_string(),
                },
                ScholarshipCandidate {
                    name: "Beta Grant".to_string(),
                    fit_score: 75,
                    success_likelihood: 60,
                    rank: 2,
                    submission_strategy: "emphasize scores".to_string(),
                },
                ScholarshipCandidate {
                    name: "Gamma Fund".to_string(),
                    fit_score: 60,
                    success_likelihood: 55,
                    rank: 3,
                    submission_strategy: "backup option".to_string(),
                },
            ]),
            StageKind::FinancialAnalysis => StagePayload::Financial(FinancialBreakdown {
                tuition: CostEstimate {
                    label: "Tuition".to_string(),
                    annual_usd: 20000.0,
                    years: 4,
                    total_usd: 80000.0,
                    assumptions: "test".to_string(),
                },
                living: CostEstimate {
                    label: "Living".to_string(),
                    annual_usd: 12000.0,
                    years: 4,
                    total_usd: 48000.0,
                    assumptions: "test".to_string(),
                },
                funding_options: vec![FundingOption {
                    name: "Grant".to_string(),
                    category: FundingCategory::Grant,
                    annual_usd: 2000.0,
                    notes: "test".to_string(),
                }],
            }),
            StageKind::ImprovementPlan => StagePayload::Improvement(vec![ImprovementAction {
                title: "Improve".to_string(),
                detail: "test".to_string(),
                horizon: "soon".to_string(),
            }]),
            StageKind::ApplicationStrategy => StagePayload::Strategy(vec![TimelineMilestone {
                milestone: "Apply".to_string(),
                deadline: "Month 3".to_string(),
                tasks: vec!["essays".to_string()],
            }]),
            StageKind::Contingency => StagePayload::Contingency(vec![ContingencyOption {
                title: "Fallback".to_string(),
                description: "test".to_string(),
                trigger: "rejection".to_string(),
            }]),
        }
    }

    /// One scripted stage per kind; unscripted kinds succeed.
    pub fn scripted_stages(scripts: Vec<(StageKind, Script)>) -> Vec<Arc<ScriptedStage>> {
        StageKind::ALL
            .into_iter()
            .map(|kind| {
                let script = scripts
                    .iter()
                    .find(|(scripted, _)| *scripted == kind)
                    .map(|(_, script)| script.clone())
                    .unwrap_or(Script::Succeed);
                ScriptedStage::new(kind, script)
            })
            .collect()
    }

    pub fn orchestrator_with(
        scripts: Vec<(StageKind, Script)>,
    ) -> (Orchestrator, Vec<Arc<ScriptedStage>>) {
        let stages = scripted_stages(scripts);
        let orchestrator = Orchestrator::with_stages(
            OrchestratorConfig {
                stage_timeout: Duration::from_millis(200),
            },
            stages.iter().map(|stage| stage.clone() as Arc<dyn Stage>),
        );
        (orchestrator, stages)
    }

    /// Sink that records every event for assertions.
    pub struct CollectingSink {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl CollectingSink {
        pub fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        pub fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn states(&self) -> Vec<PipelineState> {
            self.events().iter().map(|event| event.state).collect()
        }
    }

    impl ProgressSink for CollectingSink {
        fn emit(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    pub fn sample_profile() -> Profile {
        normalize(
            "I want to study Computer Science at NUS in Singapore. \
             My GPA is 9.8/10, SAT 1550, IELTS 7.5. \
             I was communications lead on a 200-person charity project \
             and did a 3-month Computer Vision internship.",
            None,
        )
    }
}
