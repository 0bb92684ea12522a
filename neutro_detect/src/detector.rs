use crate::{config::InferenceConfig, detections::DetectionResult};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model call failed: {0}")]
    Ort(#[from] ort::Error),
    #[error("session mutex poisoned: {0}")]
    Session(String),
    #[error("unexpected output tensor shape {0:?}")]
    UnexpectedOutput(Vec<usize>),
}

/// The detection model as the pipeline sees it: decoded image in, boxes with
/// scores and classes out. One forward pass per call (two when the
/// parameters ask for the mirrored augmentation pass), no retries; any
/// failure is request-fatal and carries no partial result.
pub trait Detector: Send + Sync {
    fn detect(
        &self,
        image: &DynamicImage,
        params: &InferenceConfig,
    ) -> Result<DetectionResult, InferenceError>;
}
