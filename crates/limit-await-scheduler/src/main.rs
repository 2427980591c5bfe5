//! Limit Await Scheduler - permit plugin host
//!
//! Hosts the `LimitAwaitScheduling` plugin behind a small HTTP API. The
//! service keeps its own pod and node caches and its own waiting registry,
//! so a scheduler can delegate the permit phase to it.
//!
//! # HTTP Endpoints
//!
//! ## Health & Readiness
//! - `GET /health` - Health check
//! - `GET /ready` - Ready once the pod and node caches have synced
//!
//! ## Permit
//! - `POST /v1/permit` - Run the permit phase for a pod on a candidate node
//! - `GET /v1/waiting` - List pods currently waiting

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use limit_await_core::NodeName;
use limit_await_scheduler::k8s::{workload_unit_from_pod, ClusterCaches};
use limit_await_scheduler::{
    plugin, FrameworkHandle, LimitAwaitArgs, PermitDecision, PermitPlugin, PluginRegistry,
    WaitOutcome, WaitingPodMap, WaitingRegistry,
};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    plugin: Arc<dyn PermitPlugin>,
    waiting: Arc<WaitingPodMap>,
    caches: Arc<ClusterCaches>,
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "limit-await-scheduler",
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.caches.is_synced() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "caches not synced")
    }
}

// ============================================================================
// Permit Endpoints
// ============================================================================

/// Request body for a permit call.
#[derive(Debug, Deserialize)]
struct PermitRequest {
    /// The pod being scheduled.
    pod: Pod,
    /// The candidate node chosen for this attempt.
    node: String,
}

/// Outcome of a permit call.
#[derive(Debug, Serialize)]
struct PermitResponse {
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl PermitResponse {
    const fn new(decision: &'static str) -> Self {
        Self {
            decision,
            by: None,
            message: None,
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Run the permit phase, waiting for release if the plugin says so.
///
/// POST /v1/permit
async fn permit_handler(
    State(state): State<AppState>,
    Json(req): Json<PermitRequest>,
) -> impl IntoResponse {
    let pod = match workload_unit_from_pod(&req.pod) {
        Ok(pod) => pod,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(PermitResponse::new("error").with_message(format!("Invalid pod: {e}"))),
            );
        }
    };
    let node = match NodeName::new(req.node) {
        Ok(node) => node,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(PermitResponse::new("error").with_message(format!("Invalid node: {e}"))),
            );
        }
    };

    match state.plugin.permit(&pod, &node) {
        PermitDecision::Proceed => (StatusCode::OK, Json(PermitResponse::new("proceed"))),
        PermitDecision::Error { message } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(PermitResponse::new("error").with_message(message)),
        ),
        PermitDecision::Wait { timeout } => {
            let key = pod.key();
            let outcome = state.waiting.park(pod, node.clone(), timeout).wait().await;
            tracing::info!(pod = %key, node = %node, outcome = ?outcome, "Permit wait finished");

            match outcome {
                WaitOutcome::Allowed { by } => (
                    StatusCode::OK,
                    Json(PermitResponse {
                        decision: "allowed",
                        by: Some(by),
                        message: None,
                    }),
                ),
                WaitOutcome::Rejected { by, message } => (
                    StatusCode::CONFLICT,
                    Json(PermitResponse {
                        decision: "rejected",
                        by: Some(by),
                        message: Some(message),
                    }),
                ),
                WaitOutcome::TimedOut => (
                    StatusCode::REQUEST_TIMEOUT,
                    Json(PermitResponse::new("timed_out")),
                ),
            }
        }
    }
}

/// List the pods currently waiting.
///
/// GET /v1/waiting
async fn waiting_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.waiting.waiting_units())
}

// ============================================================================
// Router
// ============================================================================

fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & readiness
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        // Permit
        .route("/v1/permit", post(permit_handler))
        .route("/v1/waiting", get(waiting_handler))
        .with_state(state)
}

async fn shutdown_signal(waiting: Arc<WaitingPodMap>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Received shutdown signal");
    // Parked requests would otherwise hold the server open until they time out.
    waiting.reject_all("framework", "scheduler shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,limit_await=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Limit Await Scheduler");

    // Load configuration from environment
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let args = LimitAwaitArgs::from_env();
    args.validate()?;

    tracing::info!(
        parallelism = args.parallelism,
        poll_interval_ms = args.poll_interval_ms,
        permit_timeout_seconds = args.permit_timeout_seconds,
        system_namespace = %args.system_namespace,
        "Loaded plugin configuration"
    );

    // Start cluster caches
    let client = kube::Client::try_default().await?;
    let caches = Arc::new(ClusterCaches::spawn(&client));
    tracing::info!("Connected to Kubernetes cluster");

    let waiting = Arc::new(WaitingPodMap::new());
    let handle = FrameworkHandle::new(caches.pods.clone(), caches.nodes.clone(), waiting.clone());

    let registry = PluginRegistry::with_defaults();
    let plugin: Arc<dyn PermitPlugin> =
        Arc::from(registry.build(plugin::NAME, Some(&serde_json::to_value(&args)?), handle)?);

    let state = AppState {
        plugin: Arc::clone(&plugin),
        waiting: Arc::clone(&waiting),
        caches: Arc::clone(&caches),
    };

    let app = create_router(state);

    // Start server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(waiting))
        .await?;

    plugin.shutdown().await;
    caches.abort();
    tracing::info!("Limit Await Scheduler stopped");

    Ok(())
}
