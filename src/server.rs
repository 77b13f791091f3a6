//! Admin HTTP API over the translation service.
//!
//! Every route except `/health` requires the admin key when `ADMIN_API_KEY`
//! is set.

use crate::error::TranslationError;
use crate::i18n::Replacements;
use crate::markdown;
use crate::security;
use crate::service::{LanguageChange, TranslationService};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

type ApiError = (StatusCode, Json<Value>);
type ApiResult = std::result::Result<Json<Value>, ApiError>;

#[derive(Clone)]
pub struct ApiState {
    service: Arc<TranslationService>,
    api_key: Option<String>,
}

impl ApiState {
    pub fn new(service: Arc<TranslationService>, api_key: Option<String>) -> Self {
        Self { service, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    key: String,
    /// Target language; ignored when `user_id` is given
    lang: Option<String>,
    user_id: Option<i64>,
    #[serde(default)]
    replacements: Replacements,
}

#[derive(Debug, Deserialize)]
struct MarkdownRequest {
    text: String,
    lang: String,
    /// Repair unbalanced markup before translating
    #[serde(default)]
    sanitize: bool,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/connection", get(connection))
        .route("/resolve", post(resolve))
        .route("/markdown", post(translate_markdown))
        .route("/languages/:code", post(enable_language).delete(disable_language))
        .route("/build", post(build_all))
        .route("/build/:code", post(build_language))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` resolves.
pub async fn serve(
    state: ApiState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind admin API to {}", addr))?;

    info!("✓ Admin API listening on {}", addr);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Admin API server error")
}

fn check_auth(headers: &HeaderMap, state: &ApiState) -> std::result::Result<(), ApiError> {
    if security::is_authorized(headers, state.api_key.as_deref()) {
        Ok(())
    } else {
        warn!("Rejected admin request with missing or invalid API key");
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid or missing API key"})),
        ))
    }
}

fn error_response(e: &TranslationError) -> ApiError {
    let status = match e {
        TranslationError::UnknownLanguage(_) => StatusCode::NOT_FOUND,
        TranslationError::CannotRemoveSource => StatusCode::BAD_REQUEST,
        TranslationError::BuildInProgress => StatusCode::CONFLICT,
        TranslationError::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ if e.is_backend() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({"error": e.to_string(), "reason": e.reason()})),
    )
}

fn change_response(change: LanguageChange) -> ApiResult {
    let body = Json(json!(change));
    if change.ok {
        return Ok(body);
    }
    let status = match change.reason.as_deref() {
        Some("unknown_language") => StatusCode::NOT_FOUND,
        Some("cannot_remove_source") => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Err((status, body))
}

/// `GET /health`
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// `GET /status`: languages, caches, backend state, last build and metrics.
async fn status(headers: HeaderMap, State(state): State<ApiState>) -> ApiResult {
    check_auth(&headers, &state)?;
    Ok(Json(json!(state.service.status().await)))
}

/// `GET /connection`: probe the translation backend.
async fn connection(headers: HeaderMap, State(state): State<ApiState>) -> ApiResult {
    check_auth(&headers, &state)?;
    Ok(Json(json!(state.service.test_connection().await)))
}

/// `POST /resolve`
async fn resolve(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult {
    check_auth(&headers, &state)?;

    let text = match (request.user_id, request.lang.as_deref()) {
        (Some(user_id), _) => {
            state
                .service
                .resolve_for_user(&request.key, user_id, &request.replacements)
                .await
        }
        (None, Some(lang)) => {
            state
                .service
                .resolve(&request.key, lang, &request.replacements)
                .await
        }
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "either lang or user_id is required"})),
            ))
        }
    };

    Ok(Json(json!({"key": request.key, "text": text})))
}

/// `POST /markdown`
async fn translate_markdown(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Json(request): Json<MarkdownRequest>,
) -> ApiResult {
    check_auth(&headers, &state)?;

    let text = if request.sanitize {
        markdown::sanitize_markdown(&request.text)
    } else {
        request.text
    };
    let translated = state.service.translate_markdown(&text, &request.lang).await;
    Ok(Json(json!({"text": translated})))
}

/// `POST /languages/:code`: enable, then build the language in the background.
async fn enable_language(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> ApiResult {
    check_auth(&headers, &state)?;

    let code = code.to_lowercase();
    let change = state.service.enable_language(&code).await;
    if change.ok {
        let service = Arc::clone(&state.service);
        tokio::spawn(async move {
            match service.build_for_language(&code).await {
                Ok(report) => info!(
                    "✓ Built translations for '{}' ({} from backend, {} from dictionary)",
                    code, report.backend_translations, report.fallback_translations
                ),
                Err(e) => error!("Build after enabling '{}' failed: {}", code, e),
            }
        });
    }
    change_response(change)
}

/// `DELETE /languages/:code`
async fn disable_language(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> ApiResult {
    check_auth(&headers, &state)?;
    change_response(state.service.disable_language(&code.to_lowercase()).await)
}

/// `POST /build`: full rebuild; 409 while another build runs.
async fn build_all(headers: HeaderMap, State(state): State<ApiState>) -> ApiResult {
    check_auth(&headers, &state)?;
    match state.service.build_all().await {
        Ok(report) => Ok(Json(json!(report))),
        Err(e) => Err(error_response(&e)),
    }
}

/// `POST /build/:code`
async fn build_language(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Path(code): Path<String>,
) -> ApiResult {
    check_auth(&headers, &state)?;
    match state.service.build_for_language(&code.to_lowercase()).await {
        Ok(report) => Ok(Json(json!(report))),
        Err(e) => Err(error_response(&e)),
    }
}
