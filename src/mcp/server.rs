// ABOUTME: HTTP tool dispatch server (POST /call/{tool_name}, GET / for liveness)
// ABOUTME: Maps registry outcomes onto a uniform result/error JSON envelope

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;

use super::models::{HealthResponse, ToolCallRequest, ToolCallResponse, ToolErrorResponse};
use super::tools::{ToolName, ToolRegistry};
use crate::error::MigrationError;

pub fn router(registry: Arc<ToolRegistry>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/call/{tool_name}", post(call_tool))
        .with_state(registry)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, registry: Arc<ToolRegistry>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;
    Ok(())
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "MCP Server is running.".to_string(),
    })
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ToolErrorResponse {
            error,
            status: status.as_u16(),
        }),
    )
        .into_response()
}

async fn call_tool(
    State(registry): State<Arc<ToolRegistry>>,
    Path(tool_name): Path<String>,
    body: Result<Json<ToolCallRequest>, JsonRejection>,
) -> Response {
    if let Err(e @ MigrationError::ToolNotFound(_)) = tool_name.parse::<ToolName>() {
        tracing::warn!("Rejected call for unknown tool '{}'", tool_name);
        return error_response(StatusCode::NOT_FOUND, e.to_string());
    }

    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Invalid request body for tool '{}': {}", tool_name, rejection.body_text()),
            );
        }
    };

    tracing::info!(
        "Received call for tool '{}' with params {:?}",
        tool_name,
        request.params.keys().collect::<Vec<_>>()
    );

    match registry.call(&tool_name, request.params).await {
        Ok(result) => {
            tracing::info!("Tool '{}' executed successfully", tool_name);
            (StatusCode::OK, Json(ToolCallResponse { result })).into_response()
        }
        Err(e @ MigrationError::ToolNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => {
            let msg = format!("Error executing tool '{}': {}", tool_name, e);
            tracing::error!("{}", msg);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
    }
}
