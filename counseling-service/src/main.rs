mod stages;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use counsel_flow::{
    CancelToken, InMemorySessionStorage, Orchestrator, OrchestratorConfig,
    PostgresSessionStorage, ProgressEvent, ProgressSink, Report, Session, SessionStorage,
    TurnOutcome, TurnRunner,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::stages::{OpenRouterReasoner, build_stages};

/// Progress fan-out and cancellation handles for in-flight runs, keyed by
/// session id.
struct ProgressRegistry {
    channels: DashMap<String, broadcast::Sender<ProgressEvent>>,
    active_runs: DashMap<String, CancelToken>,
}

impl ProgressRegistry {
    fn new() -> Self {
        Self {
            channels: DashMap::new(),
            active_runs: DashMap::new(),
        }
    }

    fn sender(&self, session_id: &str) -> broadcast::Sender<ProgressEvent> {
        self.channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(64).0)
            .clone()
    }

    fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ProgressEvent> {
        self.sender(session_id).subscribe()
    }

    fn begin_run(&self, session_id: &str) -> CancelToken {
        let token = CancelToken::new();
        self.active_runs
            .insert(session_id.to_string(), token.clone());
        token
    }

    fn end_run(&self, session_id: &str) {
        self.active_runs.remove(session_id);
    }

    fn cancel(&self, session_id: &str) -> bool {
        match self.active_runs.get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Bridges pipeline progress onto the per-session broadcast channel; events
/// with no subscribers are simply dropped.
struct BroadcastSink {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressSink for BroadcastSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Clone)]
struct AppState {
    runner: TurnRunner,
    storage: Arc<dyn SessionStorage>,
    progress: Arc<ProgressRegistry>,
}

#[derive(Debug, Deserialize)]
struct CounselRequest {
    session_id: Option<String>,
    message: String,
    /// Opaque references to uploaded files; appended to the message text as
    /// extra unstructured context.
    #[serde(default)]
    attachments: Vec<String>,
}

#[derive(Debug, Serialize)]
struct CounselResponse {
    session_id: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_partial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Initialize structured JSON tracing based on environment variables
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "counseling_service=debug,counsel_flow=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            // Human-readable logging for development
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            // Structured JSON logging for production
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    request.headers_mut().insert(
        "x-correlation-id",
        HeaderValue::from_str(&correlation_id).unwrap(),
    );

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

fn stage_timeout_from_env() -> Duration {
    std::env::var("STAGE_TIMEOUT_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(30))
}

#[tokio::main]
async fn main() {
    init_tracing();

    // Required for the LLM-backed narrative in every stage
    if std::env::var("OPENROUTER_API_KEY").is_err() {
        error!("OPENROUTER_API_KEY not set");
        std::process::exit(1);
    }

    // Check for DATABASE_URL and use PostgreSQL if available, otherwise use in-memory
    let storage: Arc<dyn SessionStorage> = if let Ok(database_url) = std::env::var("DATABASE_URL") {
        info!("Using PostgreSQL session storage");
        match PostgresSessionStorage::connect(&database_url).await {
            Ok(postgres_storage) => Arc::new(postgres_storage),
            Err(e) => {
                error!(
                    "Failed to connect to PostgreSQL: {}. Falling back to in-memory storage.",
                    e
                );
                Arc::new(InMemorySessionStorage::new())
            }
        }
    } else {
        info!("Using in-memory session storage (set DATABASE_URL to use PostgreSQL)");
        Arc::new(InMemorySessionStorage::new())
    };

    let config = OrchestratorConfig {
        stage_timeout: stage_timeout_from_env(),
    };
    let orchestrator = Arc::new(Orchestrator::with_stages(
        config,
        build_stages(Arc::new(OpenRouterReasoner)),
    ));
    let runner = TurnRunner::new(orchestrator, storage.clone());

    let app_state = AppState {
        runner,
        storage,
        progress: Arc::new(ProgressRegistry::new()),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/counsel", post(counsel))
        .route("/session/{id}", get(get_session))
        .route("/session/{id}/report", get(get_report))
        .route("/session/{id}/progress", get(progress_stream))
        .route("/session/{id}/cancel", post(cancel_run))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await.unwrap();

    info!("Server running on http://{bind_addr}");

    axum::serve(listener, app).await.unwrap();
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "Study Abroad Counseling Service",
        "version": "1.0.0",
        "description": "Multi-stage advisory pipeline: scholarship matching, financial analysis, improvement planning, application strategy, contingency planning",
        "endpoints": {
            "POST /counsel": "Submit a profile message and receive the advisory report",
            "GET /session/{id}": "Get session state",
            "GET /session/{id}/report": "Get the latest report",
            "GET /session/{id}/progress": "Stream pipeline progress (SSE)",
            "POST /session/{id}/cancel": "Cancel the in-flight analysis"
        }
    }))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn counsel(
    State(state): State<AppState>,
    Json(request): Json<CounselRequest>,
) -> Result<Json<CounselResponse>, StatusCode> {
    let session_id_provided = request.session_id.is_some();
    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if session_id_provided {
        if Uuid::parse_str(&session_id).is_err() {
            error!(session_id = %session_id, "Invalid session ID format");
            return Err(StatusCode::BAD_REQUEST);
        }
        // A provided but unknown session id is a client error, not a reason
        // to silently start a new conversation.
        match state.storage.get(&session_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                error!(session_id = %session_id, "Session not found");
                return Err(StatusCode::NOT_FOUND);
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Failed to get session");
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    let mut message = request.message;
    for attachment in &request.attachments {
        message.push_str(&format!("\n[attachment] {attachment}"));
    }

    info!(
        session_id = %session_id,
        content_length = message.len(),
        attachments = request.attachments.len(),
        "Processing counseling request"
    );

    let sink = BroadcastSink {
        tx: state.progress.sender(&session_id),
    };
    let cancel = state.progress.begin_run(&session_id);
    let outcome = state
        .runner
        .apply_turn(&session_id, &message, &sink, &cancel)
        .await;
    state.progress.end_run(&session_id);

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to apply turn");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let response = match outcome {
        TurnOutcome::Analyzed(report) => CounselResponse {
            session_id,
            status: "analyzed".to_string(),
            is_partial: Some(report.is_partial),
            report_markdown: Some(report.to_markdown()),
            message: None,
        },
        TurnOutcome::FollowUp(report) => CounselResponse {
            session_id,
            status: "follow_up".to_string(),
            is_partial: Some(report.is_partial),
            report_markdown: Some(report.to_markdown()),
            message: Some(
                "No new profile details found; answering from your existing report.".to_string(),
            ),
        },
        TurnOutcome::Cancelled => CounselResponse {
            session_id,
            status: "cancelled".to_string(),
            is_partial: None,
            report_markdown: None,
            message: Some("The analysis was cancelled before completion.".to_string()),
        },
        TurnOutcome::Failed { stage, error } => {
            warn!(session_id = %session_id, stage = %stage, error = %error, "Pipeline run failed");
            CounselResponse {
                session_id,
                status: "failed".to_string(),
                is_partial: None,
                report_markdown: None,
                message: Some(
                    "Something went wrong while preparing your report. Please try again."
                        .to_string(),
                ),
            }
        }
    };

    Ok(Json(response))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, StatusCode> {
    match state.storage.get(&session_id).await {
        Ok(Some(session)) => Ok(Json(session)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to get session");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Report>, StatusCode> {
    match state.runner.latest_report(&session_id).await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to get report");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Server-sent events with one message per pipeline state transition.
async fn progress_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.progress.subscribe(&session_id);
    let stream = BroadcastStream::new(receiver).filter_map(|event| match event {
        Ok(event) => Event::default().json_data(&event).ok().map(Ok::<_, Infallible>),
        // Lagged subscribers skip ahead; progress is display-only.
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn cancel_run(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> StatusCode {
    if state.progress.cancel(&session_id) {
        info!(session_id = %session_id, "Cancellation requested");
        StatusCode::ACCEPTED
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::scripted_reasoner;
    use counsel_flow::PipelineState;
    use std::sync::Mutex;

    struct CollectingSink {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl CollectingSink {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn states(&self) -> Vec<PipelineState> {
            self.events.lock().unwrap().iter().map(|e| e.state).collect()
        }
    }

    impl ProgressSink for CollectingSink {
        fn emit(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn test_runner() -> (TurnRunner, Arc<InMemorySessionStorage>) {
        let orchestrator = Arc::new(Orchestrator::with_stages(
            OrchestratorConfig::default(),
            build_stages(scripted_reasoner("Lead with your strongest evidence.")),
        ));
        let storage = Arc::new(InMemorySessionStorage::new());
        (TurnRunner::new(orchestrator, storage.clone()), storage)
    }

    const RICH_MESSAGE: &str = "I want to study Computer Science at NUS in Singapore. \
        My GPA is 9.8/10, SAT 1550, IELTS 7.5. \
        I was communications lead on a 200-person charity project \
        and did a 3-month Computer Vision internship.";

    #[tokio::test]
    async fn rich_profile_runs_the_full_pipeline_to_a_complete_report() {
        let (runner, _storage) = test_runner();
        let sink = CollectingSink::new();

        let outcome = runner
            .apply_turn("s1", RICH_MESSAGE, &sink, &CancelToken::new())
            .await
            .unwrap();

        let report = match outcome {
            TurnOutcome::Analyzed(report) => report,
            other => panic!("expected a fresh report, got {other:?}"),
        };
        assert!(!report.is_partial);

        let candidates = report.scholarships.content().unwrap();
        assert!((3..=5).contains(&candidates.len()));
        for (idx, candidate) in candidates.iter().enumerate() {
            assert_eq!(candidate.rank, (idx + 1) as u32);
        }

        assert_eq!(
            sink.states(),
            vec![
                PipelineState::Normalizing,
                PipelineState::Analyzing,
                PipelineState::Planning,
                PipelineState::ContingencyPlanning,
                PipelineState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn bare_greeting_degrades_to_contingency_only() {
        let (runner, _storage) = test_runner();

        let outcome = runner
            .apply_turn("s1", "hi", &counsel_flow::NullSink, &CancelToken::new())
            .await
            .unwrap();

        let report = match outcome {
            TurnOutcome::Analyzed(report) => report,
            other => panic!("expected a report, got {other:?}"),
        };
        assert!(report.is_partial);
        assert!(!report.scholarships.is_available());
        assert!(!report.financial.is_available());
        assert!(!report.improvement_plan.is_available());
        assert!(!report.application_timeline.is_available());
        let options = report.contingency_options.content().unwrap();
        assert!(!options.is_empty());
    }

    #[tokio::test]
    async fn follow_up_turn_reuses_the_stored_report() {
        let (runner, storage) = test_runner();
        runner
            .apply_turn("s1", RICH_MESSAGE, &counsel_flow::NullSink, &CancelToken::new())
            .await
            .unwrap();
        let first = storage.get("s1").await.unwrap().unwrap();

        let sink = CollectingSink::new();
        let outcome = runner
            .apply_turn(
                "s1",
                "can you explain the first recommendation?",
                &sink,
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::FollowUp(_)));
        assert!(sink.states().is_empty());
        let second = storage.get("s1").await.unwrap().unwrap();
        assert_eq!(
            first.latest_report.map(|r| r.generated_at),
            second.latest_report.map(|r| r.generated_at)
        );
    }
}
