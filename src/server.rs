use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    checks::{Check, CheckInput},
    engine::DiagnosticEngine,
    error::ScanError,
    orchestrator::{run_session, FragmentSink, Orchestrator, ScanState, SessionCommand},
    render::{self, DisplayFragment},
    types::{ScanId, ScanRequest},
};

#[derive(Clone)]
pub struct AppState {
    commands: mpsc::Sender<SessionCommand>, // to the task owning the orchestrator
    display: watch::Receiver<DisplaySnapshot>,
    engine: Arc<dyn DiagnosticEngine>,
}

/// Latest state and fragment published by the session.
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    pub state: ScanState,
    pub fragment: DisplayFragment,
}

impl Default for DisplaySnapshot {
    fn default() -> Self {
        Self {
            state: ScanState::Idle,
            fragment: DisplayFragment::Blank,
        }
    }
}

/// Sink that publishes into a `watch` channel polled by the HTTP handlers.
#[derive(Debug)]
pub struct WatchSink(pub watch::Sender<DisplaySnapshot>);

impl FragmentSink for WatchSink {
    fn present(&mut self, fragment: DisplayFragment) {
        self.0.send_modify(|s| s.fragment = fragment);
    }

    fn state_changed(&mut self, state: ScanState) {
        self.0.send_modify(|s| s.state = state);
    }

    fn publish(&mut self, state: ScanState, fragment: DisplayFragment) {
        self.0.send_modify(|s| {
            s.state = state;
            s.fragment = fragment;
        });
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Status {
    pub state: &'static str, // "idle" | "running"
    pub scan: Option<ScanId>,
}

impl From<ScanState> for Status {
    fn from(state: ScanState) -> Self {
        match state {
            ScanState::Idle => Status {
                state: "idle",
                scan: None,
            },
            ScanState::InProgress { scan } => Status {
                state: "running",
                scan: Some(scan),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FragmentResponse {
    #[serde(flatten)]
    pub status: Option<Status>,
    pub fragment: DisplayFragment,
    pub html: String,
}

impl FragmentResponse {
    fn new(fragment: DisplayFragment) -> Self {
        let html = fragment.to_html();
        Self {
            status: None,
            fragment,
            html,
        }
    }
}

#[derive(Debug, Serialize)]
struct Started {
    scan: ScanId,
}

/// Build the API router around an already running session.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/display", get(get_display))
        .route("/scan", post(post_scan))
        .route("/check", post(post_check))
        .with_state(state)
}

/// Spawn the session task that owns the orchestrator and return handles to it.
pub fn start_session(engine: Arc<dyn DiagnosticEngine>) -> AppState {
    let (display_tx, display_rx) = watch::channel(DisplaySnapshot::default());
    let (orchestrator, events) = Orchestrator::new(engine.clone(), WatchSink(display_tx));
    let (commands, commands_rx) = mpsc::channel(16);
    tokio::spawn(run_session(orchestrator, commands_rx, events));
    AppState {
        commands,
        display: display_rx,
        engine,
    }
}

pub async fn spawn_server(bind: &str, engine: Arc<dyn DiagnosticEngine>, ui_dir: PathBuf) -> Result<()> {
    let state = start_session(engine);

    let static_svc = ServeDir::new(ui_dir).append_index_html_on_directories(true);

    let app = Router::new()
        .nest("/api", router(state))
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http());

    info!("serving UI on http://{}", bind);
    axum::serve(tokio::net::TcpListener::bind(bind).await?, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let status = Status::from(app.display.borrow().state);
    (StatusCode::OK, Json(status))
}

async fn get_display(State(app): State<AppState>) -> impl IntoResponse {
    let snapshot = app.display.borrow().clone();
    let mut out = FragmentResponse::new(snapshot.fragment);
    out.status = Some(snapshot.state.into());
    (StatusCode::OK, Json(out))
}

async fn post_scan(State(app): State<AppState>, Json(req): Json<ScanRequest>) -> Response {
    let request = ScanRequest::new(req.domain, req.selector_hint);
    let (reply, rx) = oneshot::channel();
    if app
        .commands
        .send(SessionCommand::Start { request, reply })
        .await
        .is_err()
    {
        error!("scan session is gone");
        return session_gone();
    }
    match rx.await {
        Ok(Ok(scan)) => (StatusCode::ACCEPTED, Json(Started { scan })).into_response(),
        Ok(Err(e @ ScanError::MissingDomain)) => (
            StatusCode::BAD_REQUEST,
            Json(FragmentResponse::new(render::render_error(e.to_string()))),
        )
            .into_response(),
        Ok(Err(e @ ScanError::Dispatch(_))) => (
            StatusCode::BAD_GATEWAY,
            Json(FragmentResponse::new(render::render_unexpected(e))),
        )
            .into_response(),
        Err(_) => session_gone(),
    }
}

async fn post_check(State(app): State<AppState>, Json(input): Json<CheckInput>) -> Response {
    let check = match Check::try_from(input) {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(FragmentResponse::new(render::render_error(e.to_string()))),
            )
                .into_response()
        }
    };
    match app.engine.run_check(&check).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(FragmentResponse::new(render::render_check(&check, &reply))),
        )
            .into_response(),
        Err(e) => {
            error!(check = check.name(), "check failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(FragmentResponse::new(render::render_unexpected(e))),
            )
                .into_response()
        }
    }
}

fn session_gone() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(FragmentResponse::new(render::render_unexpected(
            "scan session stopped",
        ))),
    )
        .into_response()
}
