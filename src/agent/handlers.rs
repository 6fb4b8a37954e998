//! HTTP surface of the node: deploy, exec, metrics

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::metrics::ExecMetrics;
use crate::error::{Error, Result};
use crate::gossip::GossipHandle;
use crate::wasm::FunctionRegistry;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Body of `POST /deploy`; `wasm` is standard base64
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub name: String,
    pub wasm: String,
}

/// Body of `POST /exec`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    pub name: String,
    pub arg: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResponse {
    pub result: u64,
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FunctionRegistry>,
    pub gossip: GossipHandle,
    pub metrics: Arc<ExecMetrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/deploy", post(deploy))
        .route("/exec", post(exec))
        .route("/metrics", get(metrics))
        .with_state(state)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.http_status(), self.to_string()).into_response()
    }
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| Error::decode(e.to_string()))
}

async fn deploy(State(state): State<AppState>, body: Bytes) -> Result<StatusCode> {
    let request: DeployRequest = decode_body(&body)?;
    let bytecode = STANDARD
        .decode(request.wasm.as_bytes())
        .map_err(|e| Error::decode(format!("wasm is not valid base64: {}", e)))?;

    let digest = hex::encode(Sha256::digest(&bytecode));
    let bytecode: Arc<[u8]> = bytecode.into();
    state.registry.register(request.name.as_str(), bytecode.clone());
    info!(
        function = %request.name,
        bytes = bytecode.len(),
        sha256 = %digest,
        functions = state.registry.len(),
        "Function deployed"
    );

    // Fire and forget; the deploy stands whether or not peers receive it
    if let Err(e) = state.gossip.broadcast(bytecode.to_vec()) {
        debug!(function = %request.name, error = %e, "Broadcast not queued");
    }

    Ok(StatusCode::OK)
}

async fn exec(State(state): State<AppState>, body: Bytes) -> Result<Json<ExecResponse>> {
    let request: ExecRequest = decode_body(&body)?;

    let registry = state.registry.clone();
    let name = request.name.clone();
    let outcome = tokio::task::spawn_blocking(move || registry.execute(&name, &[request.arg]))
        .await
        .map_err(|e| Error::Internal(format!("execution task failed: {}", e)))?;

    match outcome {
        Ok(result) => {
            state.metrics.record_exec();
            debug!(function = %request.name, arg = request.arg, result, "Executed");
            Ok(Json(ExecResponse { result }))
        }
        Err(e) => {
            warn!(function = %request.name, error = %e.format_for_log(), "Execution failed");
            Err(e)
        }
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render(),
    )
}
