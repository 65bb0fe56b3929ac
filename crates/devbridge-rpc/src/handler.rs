//! HTTP request handlers.

use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devbridge_core::{BridgeError, CallContext, FunctionKind, Value, NO_CHANNEL};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

/// One-shot request body.
///
/// Arguments are taken from `args` when present. Otherwise any other keys are
/// passed as a single object argument.
#[derive(Debug, Deserialize)]
pub struct OneShotRequest {
    pub method: String,
    #[serde(default)]
    pub args: Option<Vec<serde_json::Value>>,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl OneShotRequest {
    fn into_args(self) -> Vec<Value> {
        match self.args {
            Some(args) => args.into_iter().map(Value::from_json).collect(),
            None if self.params.is_empty() => Vec::new(),
            None => vec![Value::from_json(serde_json::Value::Object(self.params))],
        }
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// One-shot call: run a request-response function and return its result as
/// plain JSON. No channel is created.
///
/// Any failure, including an unreadable body, answers 400 with an empty body.
pub async fn handle_api(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let outcome = match body {
        Ok(body) => one_shot(&state, &body).await,
        Err(rejection) => Err(BridgeError::InvalidParams {
            message: format!("failed to read request body: {}", rejection),
        }),
    };

    match outcome {
        Ok(serde_json::Value::Null) => StatusCode::OK.into_response(),
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            warn!("One-shot request rejected: {}", e);
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

async fn one_shot(state: &AppState, body: &[u8]) -> devbridge_core::Result<serde_json::Value> {
    let request: OneShotRequest = serde_json::from_slice(body)?;
    let method = request.method.clone();

    let function = state
        .group
        .functions()
        .get(&method)
        .filter(|f| f.kind == FunctionKind::Call)
        .cloned()
        .ok_or_else(|| BridgeError::MethodNotFound {
            method: method.clone(),
        })?;

    debug!("One-shot call: {}", method);
    let ctx = CallContext {
        channel: NO_CHANNEL,
        group: state.group.clone(),
    };
    let result = function.handler.invoke(ctx, request.into_args()).await?;
    result.to_json()
}
