//! HTTP REST API for the gateway.
//!
//! Every action in the registry is reachable by name. Besides full
//! invocation, the request and response mappings can be run on their own
//! for rule authoring.

use std::sync::Arc;

use action_mapper::ResponseEnvelope;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

use crate::executor::ActionExecutor;
use crate::types::GatewayError;

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json_body())).into_response()
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<ActionExecutor>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/actions", get(handle_list_actions))
        .route("/api/v1/actions/:name", post(handle_invoke))
        .route("/api/v1/actions/:name/request", post(handle_map_request))
        .route("/api/v1/actions/:name/response", post(handle_map_response))
        .layer(cors)
        .with_state(state)
}

/// Serve the REST API on `addr` until the process exits.
pub async fn start(addr: &str, state: Arc<ActionExecutor>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("REST API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<Arc<ActionExecutor>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "actions": state.registry().len(),
        "eval_method": state.eval_method(),
    }))
}

async fn handle_list_actions(State(state): State<Arc<ActionExecutor>>) -> Json<Value> {
    let actions = state.registry().list();
    Json(json!({
        "count": actions.len(),
        "actions": actions,
    }))
}

async fn handle_invoke(
    State(state): State<Arc<ActionExecutor>>,
    Path(name): Path<String>,
    Json(action): Json<Value>,
) -> Result<Json<Value>, GatewayError> {
    state.invoke(&name, action).await.map(Json)
}

async fn handle_map_request(
    State(state): State<Arc<ActionExecutor>>,
    Path(name): Path<String>,
    Json(action): Json<Value>,
) -> Result<Json<Value>, GatewayError> {
    let request = state.map_request(&name, &action)?;
    Ok(Json(serde_json::to_value(request)?))
}

#[derive(Debug, Deserialize)]
struct MapResponseParams {
    response: ResponseEnvelope,
    #[serde(default)]
    target: Option<Value>,
}

async fn handle_map_response(
    State(state): State<Arc<ActionExecutor>>,
    Path(name): Path<String>,
    Json(params): Json<MapResponseParams>,
) -> Result<Json<Value>, GatewayError> {
    state
        .map_response(&name, &params.response, params.target)
        .map(Json)
}
