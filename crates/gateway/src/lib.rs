//! HTTP API gateway for agentgate.
//!
//! Exposes the health check and the v1 API: streaming and synchronous
//! turns, approval decisions and session projections.
//!
//! Built on Axum for high performance async HTTP.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, extract::State, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use agentgate_agent::{ContextComposer, TurnRunner, TurnSettings, catalog};
use agentgate_config::{AppConfig, GatewayConfig};
use agentgate_core::error::BackendError;
use agentgate_memory::{InMemoryStore, StaticContext};
use agentgate_security::{AuditSink, TracingSink};
use agentgate_session::{RetentionPolicy, SessionHub};

pub use api_v1::{ApiV1State, SharedApiState};

/// Wire up the backend, session hub, collaborators and turn runner.
pub fn build_state(config: &AppConfig) -> Result<SharedApiState, BackendError> {
    let backend = agentgate_backends::build_from_config(config)?;

    let audit: Arc<dyn AuditSink> = Arc::new(TracingSink);
    let sessions = Arc::new(
        SessionHub::new(RetentionPolicy::from_secs(
            config.sessions.idle_ttl_secs,
            config.sessions.max_sessions,
        ))
        .with_audit(audit),
    );

    let store = InMemoryStore::new();
    let context = StaticContext::new().with_memory_store(store.clone());
    let composer = ContextComposer::from_config(config).with_source(Arc::new(context));

    let runner = TurnRunner::new(backend, sessions, TurnSettings::from_config(config))
        .with_composer(composer)
        .with_artifact_store(Arc::new(store.clone()))
        .with_memory_store(Arc::new(store));

    Ok(Arc::new(ApiV1State::new(
        Arc::new(runner),
        catalog(&config.subagents),
    )))
}

/// Build the full router: health, the nested v1 API and the shared layers
/// (body limit, CORS, HTTP tracing).
pub fn build_router(state: SharedApiState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.allowed_origin))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow = if origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        match origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                warn!(origin, error = %e, "Invalid allowed_origin, cross-origin requests disabled");
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
///
/// Also runs the session sweeper for as long as the server is up.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let state = build_state(&config)?;
    let sweep_secs = config.sessions.sweep_interval_secs;
    let sweeper = (sweep_secs > 0)
        .then(|| state.runner.sessions().spawn_sweeper(Duration::from_secs(sweep_secs)));
    let app = build_router(state.clone(), &config.gateway);

    info!(
        addr = %addr,
        backend = %state.runner.backend_name(),
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app).await;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    served?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: String,
    sessions: usize,
    uptime_secs: i64,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.runner.backend_name().to_string(),
        sessions: state.sessions().store.len(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
    })
}
