//! HTTP query server for lead-conversion scores
//!
//! Serves `POST /queries.json` against one or more loaded model artifacts,
//! merging per-engine results with a configurable combine strategy. The
//! active artifacts can be swapped at runtime through `POST /reload`
//! without interrupting in-flight queries.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use leadscore_core::{
    ArtifactMetadata, CombineStrategy, CoreError, Engines, ModelArtifact, ModelHandle,
    PredictedResult, Query,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub type SharedState = Arc<AppState>;

/// Loaded engines plus the paths they reload from
pub struct AppState {
    engines: Engines,
    model_paths: Vec<PathBuf>,
    started_at: Instant,
}

impl AppState {
    /// Load and verify every artifact in `model_paths`, one engine each
    pub fn load(model_paths: Vec<PathBuf>, strategy: Box<dyn CombineStrategy>) -> Result<Self> {
        if model_paths.is_empty() {
            anyhow::bail!("at least one model path is required");
        }
        let handles = model_paths
            .iter()
            .map(|path| {
                ModelArtifact::load_json(path)
                    .map(|artifact| Arc::new(ModelHandle::new(artifact)))
                    .with_context(|| format!("failed to load model {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_engines(Engines::new(handles, strategy), model_paths))
    }

    /// Wrap already-built engines; `model_paths[i]` reloads `handles()[i]`
    pub fn from_engines(engines: Engines, model_paths: Vec<PathBuf>) -> Self {
        Self {
            engines,
            model_paths,
            started_at: Instant::now(),
        }
    }

    pub fn engines(&self) -> &Engines {
        &self.engines
    }

    /// Re-read every engine's artifact from disk. All artifacts are loaded
    /// and verified before any engine is swapped, so a failure leaves every
    /// engine on its current model.
    pub fn reload(&self) -> leadscore_core::Result<Vec<String>> {
        let handles = self.engines.handles();
        if self.model_paths.len() != handles.len() {
            return Err(CoreError::InvalidInput(
                "no model path configured for reload".to_string(),
            ));
        }
        let artifacts = self
            .model_paths
            .iter()
            .map(|path| {
                ModelArtifact::load_json(path).inspect_err(|err| {
                    warn!("Reload from {} failed, keeping active models: {}", path.display(), err)
                })
            })
            .collect::<leadscore_core::Result<Vec<_>>>()?;

        Ok(handles
            .iter()
            .zip(artifacts)
            .map(|(handle, artifact)| {
                handle.replace(artifact);
                handle.current().model_hash().to_string()
            })
            .collect())
    }

    fn model_hashes(&self) -> Vec<String> {
        self.engines
            .handles()
            .iter()
            .map(|handle| handle.current().model_hash().to_string())
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    strategy: &'static str,
    uptime_secs: u64,
    model_hashes: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelResponse {
    models: Vec<ArtifactMetadata>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReloadResponse {
    model_hashes: Vec<String>,
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    info!("Query server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .await
        .context("query server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind query listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind query listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/queries.json", post(handle_query))
        .route("/health", get(handle_health))
        .route("/model", get(handle_model))
        .route("/reload", post(handle_reload))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_query(
    State(state): State<SharedState>,
    Json(query): Json<Query>,
) -> Result<Json<PredictedResult>, ApiError> {
    state.engines.predict(&query).map(Json).map_err(|err| {
        warn!("Query {:?} failed: {}", query, err);
        ApiError::internal(format!("failed to score query: {err}"))
    })
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: leadscore_core::VERSION,
        strategy: state.engines.strategy_name(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        model_hashes: state.model_hashes(),
    })
}

async fn handle_model(State(state): State<SharedState>) -> Json<ModelResponse> {
    let models = state
        .engines
        .handles()
        .iter()
        .map(|handle| handle.current().metadata.clone())
        .collect();
    Json(ModelResponse { models })
}

async fn handle_reload(State(state): State<SharedState>) -> Result<Json<ReloadResponse>, ApiError> {
    let worker = state.clone();
    let model_hashes = tokio::task::spawn_blocking(move || worker.reload())
        .await
        .map_err(|err| ApiError::internal(format!("reload task failed: {err}")))?
        .map_err(|err| {
            ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("reload failed: {err}"))
        })?;
    info!("Reloaded models: {:?}", model_hashes);
    Ok(Json(ReloadResponse { model_hashes }))
}
