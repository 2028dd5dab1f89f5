//! HTTP routes.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_typed_multipart::{TryFromMultipart, TypedMultipart, TypedMultipartError};
use facematch_core::catalog;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::decode::ImagePayload;
use crate::error::{ApiError, MISSING_FILES, MISSING_IMAGES};
use crate::options::{resolve, RawOptions};
use crate::pipeline::{self, PipelineError, Verifier};
use crate::response::VerificationResponse;

pub struct AppState {
    pub verifier: Arc<dyn Verifier>,
}

/// When the request reached the server, before its body was read.
#[derive(Debug, Clone, Copy)]
pub struct RequestStart(pub Instant);

#[derive(Debug, Clone, Copy)]
pub struct RouterOptions {
    pub cors: bool,
    pub max_body_bytes: usize,
}

/// JSON body of `POST /verify`.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyBody {
    #[serde(default)]
    pub img1: Option<String>,
    #[serde(default)]
    pub img2: Option<String>,
    #[serde(flatten)]
    pub options: RawOptions,
}

/// Multipart form of `POST /verify-file`.
#[derive(TryFromMultipart)]
pub struct VerifyFileForm {
    pub img1: Option<Bytes>,
    pub img2: Option<Bytes>,
    pub model_name: Option<String>,
    pub distance_metric: Option<String>,
}

pub fn create_router(state: Arc<AppState>, options: RouterOptions) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/models", get(models_handler))
        .route("/verify", post(verify_handler))
        .route("/verify-file", post(verify_file_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(options.max_body_bytes))
        .layer(middleware::from_fn(stamp_request))
        .layer(TraceLayer::new_for_http());

    if options.cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

/// Record the arrival time and give length-limit rejections the JSON error shape.
async fn stamp_request(mut request: Request, next: Next) -> Response {
    let started = Instant::now();
    request.extensions_mut().insert(RequestStart(started));

    let response = next.run(request).await;
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large(started).into_response();
    }
    response
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "facematchd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn models_handler() -> Json<Value> {
    Json(json!({ "models": catalog::list_models() }))
}

/// Compare two base64-encoded images.
async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Extension(RequestStart(started)): Extension<RequestStart>,
    body: Bytes,
) -> Result<Json<VerificationResponse>, ApiError> {
    let body: VerifyBody = serde_json::from_slice(&body)
        .map_err(|e| ApiError::failed(PipelineError::InvalidBody(e.to_string()), started))?;

    let (Some(img1), Some(img2)) = (non_empty(body.img1), non_empty(body.img2)) else {
        return Err(ApiError::MissingField(MISSING_IMAGES));
    };

    let response = pipeline::run(
        state.verifier.as_ref(),
        ImagePayload::Base64(img1),
        ImagePayload::Base64(img2),
        resolve(body.options),
        started,
    )
    .await
    .map_err(|e| ApiError::failed(e, started))?;

    Ok(Json(response))
}

/// Compare two uploaded image files. The detector backend is always the default.
async fn verify_file_handler(
    State(state): State<Arc<AppState>>,
    Extension(RequestStart(started)): Extension<RequestStart>,
    form: Result<TypedMultipart<VerifyFileForm>, TypedMultipartError>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let form = match form {
        Ok(TypedMultipart(form)) => form,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable multipart form");
            if e.into_response().status() == StatusCode::PAYLOAD_TOO_LARGE {
                return Err(ApiError::payload_too_large(started));
            }
            return Err(ApiError::MissingField(MISSING_FILES));
        }
    };

    let (Some(img1), Some(img2)) = (form.img1, form.img2) else {
        return Err(ApiError::MissingField(MISSING_FILES));
    };

    let options = resolve(RawOptions {
        model_name: form.model_name,
        distance_metric: form.distance_metric,
        detector_backend: None,
    });

    let mut response = pipeline::run(
        state.verifier.as_ref(),
        ImagePayload::Multipart(img1),
        ImagePayload::Multipart(img2),
        options,
        started,
    )
    .await
    .map_err(|e| ApiError::failed(e, started))?;

    response.detector = None;
    Ok(Json(response))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
