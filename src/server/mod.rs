//! HTTP API over the entity service.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::backup::{Backup, BackupError, BackupInput, BackupStore, BackupSummary};
use crate::config::Config;
use crate::error::QueryError;
use crate::exec::{LocalStore, QueryTarget};
use crate::logging::install_default_subscriber;
use crate::model::{EntityView, Permissions};
use crate::service::{Available, EntityService, Position, ScanArgs, SearchArgs, SearchHit};

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Backend or reference data could not be opened.
    #[error("failed to start service: {0}")]
    Service(#[from] QueryError),
    /// Backup table could not be prepared.
    #[error("failed to open backups: {0}")]
    Backup(#[from] BackupError),
    /// Binding or serving failed.
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared handler state.
pub type AppState = Arc<ServerState>;

/// Service and backup store shared by every handler.
pub struct ServerState {
    service: EntityService,
    backups: BackupStore,
}

impl ServerState {
    /// Wraps the service and the backup store.
    pub fn new(service: EntityService, backups: BackupStore) -> AppState {
        Arc::new(Self { service, backups })
    }
}

/// Opens everything the configuration names and serves until Ctrl-C.
pub async fn serve(config: Config) -> Result<(), ServerError> {
    if install_default_subscriber() {
        tracing::debug!("installed default log subscriber");
    }
    let addr = SocketAddr::from((config.server.host, config.server.port));
    let service = EntityService::from_config(config)?;
    let backups = backup_store_for(&service).await?;
    let state = ServerState::new(service, backups);
    let app = build_router(state.clone());
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(
        %addr,
        remote = state.service.mode().remote,
        allow_origins = ?state.service.config().server.allow_origins,
        "spawnfilter listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Backups share the local store; remote deployments without a store keep
/// them in memory.
pub async fn backup_store_for(service: &EntityService) -> Result<BackupStore, BackupError> {
    let config = service.config();
    let store = match (service.target(), config.store.path.as_deref()) {
        (QueryTarget::Local(store), _) => store.clone(),
        (QueryTarget::Remote(_), Some(path)) => {
            LocalStore::open(path, config.limits.phase_timeout(), config.dev.query_debug)?
        }
        (QueryTarget::Remote(_), None) => {
            tracing::warn!("no store.path configured; backups are kept in memory");
            LocalStore::from_connection(
                Connection::open_in_memory().map_err(QueryError::from)?,
                config.limits.phase_timeout(),
                false,
            )
        }
    };
    BackupStore::open(store, config.backups.clone()).await
}

/// Builds the router with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.service.config().server.allow_origins);

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/pokemon/scan", post(scan_handler))
        .route("/api/pokemon/available", get(available_handler))
        .route("/api/pokemon/search", post(search_handler))
        .route("/api/pokemon/:id", get(position_handler))
        .route("/api/reload", post(reload_handler))
        .route(
            "/api/users/:user/backups",
            get(list_backups_handler).post(create_backup_handler),
        )
        .route(
            "/api/users/:user/backups/:id",
            get(get_backup_handler)
                .put(update_backup_handler)
                .delete(delete_backup_handler),
        );

    if let Some(layer) = cors {
        router = router.layer(layer);
    }

    router.with_state(state).layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let trimmed = origin.trim().trim_end_matches('/');
            match HeaderValue::from_str(trimmed) {
                Ok(value) if !trimmed.is_empty() => Some(value),
                _ => {
                    tracing::warn!(%origin, "ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect();
    if allowed.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([ACCEPT, CONTENT_TYPE]),
    )
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    remote: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        remote: state.service.mode().remote,
    })
}

async fn scan_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<EntityView>>, AppError> {
    let args: ScanArgs = serde_json::from_value(body)
        .map_err(|err| QueryError::InvalidFilter(err.to_string()))?;
    Ok(Json(state.service.get_all(&args).await?))
}

async fn available_handler(State(state): State<AppState>) -> Result<Json<Available>, AppError> {
    Ok(Json(state.service.available().await?))
}

async fn position_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Position>, AppError> {
    Ok(Json(state.service.get_one(&id).await?))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    permissions: Permissions,
    #[serde(flatten)]
    args: SearchArgs,
}

async fn search_handler(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Vec<SearchHit>>, AppError> {
    let request: SearchRequest = serde_json::from_value(body)
        .map_err(|err| QueryError::InvalidFilter(err.to_string()))?;
    Ok(Json(
        state
            .service
            .search(&request.permissions, &request.args)
            .await?,
    ))
}

#[derive(Debug, Serialize)]
struct ReloadResponse {
    areas: usize,
    ranking_species: usize,
}

async fn reload_handler(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let service_state = state.clone();
    tokio::task::spawn_blocking(move || service_state.service.reload())
        .await
        .map_err(QueryError::from)??;
    let snapshot = state.service.snapshot();
    Ok(Json(ReloadResponse {
        areas: snapshot.areas.len(),
        ranking_species: snapshot.rankings.len(),
    }))
}

async fn list_backups_handler(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<BackupSummary>>, AppError> {
    Ok(Json(state.backups.list(&user).await?))
}

async fn create_backup_handler(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(input): Json<BackupInput>,
) -> Result<(StatusCode, Json<Backup>), AppError> {
    let backup = state.backups.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(backup)))
}

async fn get_backup_handler(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
) -> Result<Json<Backup>, AppError> {
    Ok(Json(state.backups.get(&user, id).await?))
}

async fn update_backup_handler(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
    Json(input): Json<BackupInput>,
) -> Result<Json<Backup>, AppError> {
    Ok(Json(state.backups.update(&user, id, input).await?))
}

async fn delete_backup_handler(
    State(state): State<AppState>,
    Path((user, id)): Path<(String, i64)>,
) -> Result<StatusCode, AppError> {
    state.backups.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Query(QueryError::InvalidBounds(_) | QueryError::InvalidFilter(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Query(QueryError::NotFound(_)) | AppError::Backup(BackupError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            AppError::Backup(BackupError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Backup(BackupError::LimitReached { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(ErrorPayload {
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    message: String,
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(err) => tracing::error!(?err, "failed to listen for shutdown signal"),
    }
}
