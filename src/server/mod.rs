//! HTTP boundary: axum router, request/response shapes, and the mapping
//! from serving errors to HTTP statuses.
//!
//! Client-fixable failures (unknown category, malformed image) map to
//! 400 with a `{"detail": ...}` body; internal consistency faults such
//! as a model/taxonomy mismatch map to 500 and are logged, never dressed
//! up as client errors.

pub mod registration;
pub mod startup;

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::core::ServingError;
use crate::dispatcher::{InferenceDispatcher, Prediction};
use crate::model_architectures::RandomForest;

/// Everything a request handler needs; immutable after startup, shared
/// across requests without locking.
pub struct AppState {
    pub dispatcher: InferenceDispatcher,
    pub crop_recommender: RandomForest,
    pub fertilizer_recommender: RandomForest,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict/crop", post(predict_crop))
        .route("/predict/fertilizer", post(predict_fertilizer))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    "ok"
}

/// POST /predict: multipart body with a required `image` part and an
/// optional `c_type` category part.
async fn predict(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, ApiError> {
    let mut image: Option<axum::body::Bytes> = None;
    let mut c_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServingError::prediction("read multipart body", e))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                image = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ServingError::prediction("read image part", e))?,
                );
            }
            Some("c_type") => {
                c_type = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ServingError::prediction("read c_type part", e))?,
                );
            }
            _ => {}
        }
    }

    let image = image
        .ok_or_else(|| ServingError::prediction("read multipart body", "missing 'image' part"))?;

    // The forward pass is CPU-bound; keep it off the accept loop.
    let prediction = tokio::task::spawn_blocking(move || {
        state.dispatcher.predict(&image, c_type.as_deref())
    })
    .await
    .map_err(|e| ServingError::model("inference task", e))??;

    Ok(Json(prediction))
}

#[derive(Debug, Deserialize)]
pub struct CropRequest {
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub ph: f64,
    pub rainfall: f64,
}

#[derive(Debug, Serialize)]
pub struct CropResponse {
    pub crop: String,
}

/// POST /predict/crop: recommend a crop from soil and climate readings.
async fn predict_crop(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CropRequest>,
) -> Result<Json<CropResponse>, ApiError> {
    let features = [
        req.n,
        req.p,
        req.k,
        req.temperature,
        req.humidity,
        req.ph,
        req.rainfall,
    ];
    let crop = state.crop_recommender.predict(&features)?.to_string();
    Ok(Json(CropResponse { crop }))
}

#[derive(Debug, Deserialize)]
pub struct FertilizerRequest {
    pub n: f64,
    pub p: f64,
    pub k: f64,
}

#[derive(Debug, Serialize)]
pub struct FertilizerResponse {
    pub fertilizer: String,
}

/// POST /predict/fertilizer: recommend a fertilizer from N/P/K readings.
async fn predict_fertilizer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FertilizerRequest>,
) -> Result<Json<FertilizerResponse>, ApiError> {
    let features = [req.n, req.p, req.k];
    let fertilizer = state.fertilizer_recommender.predict(&features)?.to_string();
    Ok(Json(FertilizerResponse { fertilizer }))
}

/// Serving error carried through a handler.
pub struct ApiError(pub ServingError);

impl From<ServingError> for ApiError {
    fn from(err: ServingError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        if status.is_server_error() {
            error!("internal serving fault: {}", self.0);
        }
        let body = Json(serde_json::json!({ "detail": self.0.to_string() }));
        (status, body).into_response()
    }
}
