//! HTTP surface: `GET /ping` and `POST /predict`.

use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, get, post, web};
use futures_util::TryStreamExt;
use serde_json::json;
use thiserror::Error;

use crate::error::PredictError;
use crate::service::InferenceService;

/// Multipart part name the frontend uploads the image under.
pub const FILE_FIELD: &str = "file";

/// Shared per-process state handed to every handler.
#[derive(Debug)]
pub struct AppState {
    pub service: InferenceService,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no image upload found, expected a multipart part named `file`")]
    MissingFile,

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("upload exceeds the limit of {0} bytes")]
    TooLarge(usize),

    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error("inference worker failed: {0}")]
    Worker(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Predict(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Predict(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("predict failed: {self}");
        } else {
            tracing::warn!("rejected upload: {self}");
        }
        HttpResponse::build(status).json(json!({ "detail": self.to_string() }))
    }
}

/// CORS policy allowing exactly one frontend origin. Without an origin no
/// cross-origin request is allowed.
pub fn cors(allowed_origin: Option<&str>) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);
    match allowed_origin {
        Some(origin) => cors.allowed_origin(origin).supports_credentials(),
        None => cors,
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(ping).service(predict);
}

#[get("/ping")]
async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "Hello, I am alive!" }))
}

#[post("/predict")]
async fn predict(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let image_data = read_upload(payload, state.max_upload_bytes).await?;
    tracing::debug!(bytes = image_data.len(), "received upload");

    // Decode and forward pass are CPU bound, keep them off the async workers.
    let prediction = web::block(move || state.service.predict(&image_data))
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))??;

    tracing::info!(class = %prediction.class, confidence = prediction.confidence, "predicted");
    Ok(HttpResponse::Ok().json(prediction))
}

/// Returns the part named [`FILE_FIELD`], or failing that the first part
/// carrying a filename.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut fallback = None;
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        let is_file_field = field.name() == Some(FILE_FIELD);
        let has_filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .is_some();

        if is_file_field {
            return read_field(&mut field, limit).await;
        }
        if has_filename && fallback.is_none() {
            fallback = Some(read_field(&mut field, limit).await?);
        }
    }
    fallback.ok_or(ApiError::MissingFile)
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        if buf.len() + chunk.len() > limit {
            return Err(ApiError::TooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
