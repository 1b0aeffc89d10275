//! REST ingress for the workflow engine
//!
//! The engine's termination contract means `/api/assist` always answers
//! 200 with a well-formed response object.

use axum::{extract::State, routing::get, routing::post, Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::models::{AssistRequest, FinalResponse};
use crate::orchestrator::WorkflowEngine;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<WorkflowEngine>,
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn assist(
    State(state): State<ApiState>,
    Json(request): Json<AssistRequest>,
) -> Json<FinalResponse> {
    info!(
        request_id = %request.request_id,
        "Received assist request"
    );

    Json(state.engine.run(request).await)
}

pub fn create_router(engine: Arc<WorkflowEngine>) -> Router {
    let state = ApiState { engine };

    Router::new()
        .route("/health", get(health))
        .route("/api/assist", post(assist))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(
    engine: Arc<WorkflowEngine>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
