use crate::server::SharedState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use neutro_detect::{encode_png, DecodeError, DetectionSummary, PipelineError, RenderError};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Tabular detection summary for the page, as a JSON header next to the
/// annotated image body.
pub const DETECTIONS_HEADER: &str = "x-detections";

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
    #[error("Detection summary serialization failed: {0}")]
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
    let image_data = read_file_field(&mut multipart).await?;

    let pipeline = state.pipeline.clone();
    let worker = tokio::task::spawn_blocking(move || pipeline.run(&image_data));

    let output = match tokio::time::timeout(state.timeout, worker).await {
        Err(_) => return Err(PredictError::Timeout(state.timeout)),
        Ok(Err(join_error)) => return Err(PredictError::Inference(join_error.to_string())),
        Ok(Ok(result)) => result?,
    };

    let summary = DetectionSummary::from_result(&output.result);
    let metadata = serde_json::to_string(&summary)?;
    let annotated = encode_png(&output.annotated)?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "image/png")
        .header(DETECTIONS_HEADER, metadata)
        .body(axum::body::Body::from(annotated))
        .map_err(|e| PredictError::HttpBuilder(e.to_string()))?;

    Ok(response)
}
