use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::Lamps;
use crate::engine::LinkStatus;
use crate::engine::SpaceState;
use crate::engine::SpaceStateMachine;
use crate::integrations::feed::RemoteSpace;
use crate::integrations::feed::SnapshotReader;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// Response for the /v1/state endpoint
#[derive(Debug, Serialize)]
struct StateResponse {
    status: SpaceState,
    hardware_link: bool,
    spaces: Vec<RemoteSpace>,
}

/// Response for the /v1/confetti endpoint
#[derive(Debug, Serialize)]
struct ConfettiResponse {
    fired: bool,
}

/// Shared application state
#[derive(Clone)]
pub struct ApiState {
    version: &'static str,
    machine: Arc<SpaceStateMachine>,
    link: LinkStatus,
    feed: SnapshotReader,
    lamps: Arc<dyn Lamps>,
}

impl ApiState {
    pub fn new(
        machine: Arc<SpaceStateMachine>,
        link: LinkStatus,
        feed: SnapshotReader,
        lamps: Arc<dyn Lamps>,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            machine,
            link,
            feed,
            lamps,
        }
    }
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/state
#[tracing::instrument(skip(state))]
async fn status(State(state): State<Arc<ApiState>>) -> Json<StateResponse> {
    tracing::debug!("Handling /v1/state request");

    Json(StateResponse {
        status: state.machine.current(),
        hardware_link: state.link.is_up(),
        spaces: state.feed.latest().spaces.clone(),
    })
}

/// Handler for POST /v1/confetti
///
/// Fires one confetti pulse by hand. Answers 409 while a pulse is already
/// running.
#[tracing::instrument(skip(state))]
async fn confetti(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<ConfettiResponse>) {
    tracing::info!("Manual confetti trigger requested");

    let fired = state.lamps.fire_confetti();
    let code = if fired {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    };
    (code, Json(ConfettiResponse { fired }))
}

/// Create the API router with all endpoints
fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/state", get(status))
        .route("/v1/confetti", post(confetti))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP status API
///
/// Binds to `listen:port` and serves until `shutdown_rx` fires.
pub async fn serve(
    state: ApiState,
    listen: String,
    port: u16,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = create_router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
