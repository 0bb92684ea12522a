pub mod config;
pub mod detections;
pub mod detector;
pub mod ingest;
pub mod labels;
pub mod ort_detector;
pub mod pipeline;
pub mod render;
pub mod summary;

pub use detections::{DetectionPayload, DetectionResult};
pub use detector::{Detector, InferenceError};
pub use ingest::DecodeError;
pub use labels::ClassLabels;
pub use ort_detector::{ModelLoadError, OrtDetector};
pub use pipeline::{DetectionPipeline, PipelineError, PipelineOutput};
pub use render::{encode_jpeg, encode_png, LabelFont, Plotter, RenderError};
pub use summary::{DetectionSummary, NO_DETECTIONS_MESSAGE};
