use crate::server::SharedState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use neutro_detect::{encode_jpeg, DecodeError, PipelineError, RenderError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::instrument;

const JPEG_QUALITY: u8 = 90;
/// Detection metadata for the returned image, as a JSON header next to
/// the binary body.
pub const DETECTIONS_HEADER: &str = "x-detections";
pub const DETECTION_COUNT_HEADER: &str = "x-detection-count";

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Multipart upload failed: {0}")]
    Upload(#[from] MultipartError),
    #[error("Multipart upload is missing a `file` field")]
    MissingFile,
    #[error("Image decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),
    #[error("Image encode failed: {0}")]
    Render(#[from] RenderError),
    #[error("Detection metadata serialization failed: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("HTTP builder failed: {0}")]
    HttpBuilder(String),
}

impl From<PipelineError> for PredictError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Decode(e) => PredictError::Decode(e),
            PipelineError::Inference(e) => PredictError::Inference(e.to_string()),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match &self {
            PredictError::Upload(_) | PredictError::MissingFile => StatusCode::BAD_REQUEST,
            PredictError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictError::Inference(_)
            | PredictError::Timeout(_)
            | PredictError::Render(_)
            | PredictError::Metadata(_)
            | PredictError::HttpBuilder(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, format!("Something went wrong: {}", self)).into_response()
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Bytes, PredictError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            return Ok(field.bytes().await?);
        }
    }
    Err(PredictError::MissingFile)
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Response, PredictError> {
    state.metrics.record_request("/predict");
    let image_data = read_file_field(&mut multipart).await?;

    // Inference is CPU-bound and synchronous, so it runs on the blocking
    // pool. On timeout the worker is abandoned; its session finishes the
    // pass and returns to the pool.
    let pipeline = state.pipeline.clone();
    let started = Instant::now();
    let worker = tokio::task::spawn_blocking(move || pipeline.run(&image_data));

    let output = match tokio::time::timeout(state.timeout, worker).await {
        Err(_) => return Err(PredictError::Timeout(state.timeout)),
        Ok(Err(join_error)) => return Err(PredictError::Inference(join_error.to_string())),
        Ok(Ok(result)) => result?,
    };

    state
        .metrics
        .record_inference_duration(started.elapsed().as_millis() as u64, "/predict");
    state
        .metrics
        .record_detections(output.result.len() as u64, "/predict");

    let metadata = serde_json::to_string(&output.result.payload())?;
    let annotated = encode_jpeg(&output.annotated, JPEG_QUALITY)?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(DETECTIONS_HEADER, metadata)
        .header(DETECTION_COUNT_HEADER, output.result.len())
        .body(axum::body::Body::from(annotated))
        .map_err(|e| PredictError::HttpBuilder(e.to_string()))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_shape_errors_map_to_bad_request() {
        let response = PredictError::MissingFile.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn decode_errors_map_to_unprocessable_entity() {
        let err = neutro_detect::ingest::decode_image(b"not an image").unwrap_err();
        let response = PredictError::Decode(err).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn inference_failures_map_to_internal_error() {
        let response = PredictError::Inference("boom".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let response = PredictError::Timeout(Duration::from_secs(5)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
