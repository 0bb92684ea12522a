use crate::{
    config::InferenceConfig,
    detections::DetectionResult,
    detector::{Detector, InferenceError},
    ingest::{decode_image, DecodeError},
    render::Plotter,
};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Everything one upload produces: the detections themselves and the
/// annotated image, already converted back to red-green-blue order.
pub struct PipelineOutput {
    pub result: DetectionResult,
    pub annotated: RgbImage,
}

/// Decode, detect, annotate. One instance is shared by every request;
/// parameters are fixed at startup so repeated runs over the same bytes
/// yield the same output.
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    plotter: Plotter,
    params: InferenceConfig,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>, plotter: Plotter, params: InferenceConfig) -> Self {
        Self {
            detector,
            plotter,
            params,
        }
    }

    pub fn params(&self) -> &InferenceConfig {
        &self.params
    }

    pub fn run(&self, bytes: &[u8]) -> Result<PipelineOutput, PipelineError> {
        let image = decode_image(bytes)?;
        let result = self.detector.detect(&image, &self.params)?;

        tracing::debug!("Returning {} detections", result.len());
        for (i, detection) in result.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_name,
                detection.confidence,
                detection.bbox[0],
                detection.bbox[1],
                detection.bbox[2],
                detection.bbox[3]
            );
        }

        let annotated = self.plotter.plot(&image, &result).into_rgb();
        Ok(PipelineOutput { result, annotated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        labels::{ClassLabel, ClassLabels},
        render::LabelFont,
    };
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::{collections::BTreeMap, io::Cursor, path::Path};

    const TEST_FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../assets/DejaVuSans.ttf");

    struct MockDetector {
        detections: Vec<([f32; 4], f32, u32)>,
        fail: bool,
    }

    impl Detector for MockDetector {
        fn detect(
            &self,
            _image: &DynamicImage,
            _params: &InferenceConfig,
        ) -> Result<DetectionResult, InferenceError> {
            if self.fail {
                return Err(InferenceError::Session("mock failure".to_string()));
            }
            let mut names = BTreeMap::new();
            names.insert(0, "neutrophil".to_string());
            let mut result = DetectionResult::new(names);
            for (bbox, confidence, class_id) in &self.detections {
                result.push(*bbox, *confidence, *class_id);
            }
            Ok(result)
        }
    }

    fn pipeline_with(detector: MockDetector) -> DetectionPipeline {
        let font = LabelFont::from_file(Path::new(TEST_FONT)).unwrap();
        let labels = Arc::new(ClassLabels::from_labels(vec![ClassLabel {
            name: "neutrophil".into(),
            color: [255, 56, 56],
        }]));
        let params = InferenceConfig {
            confidence_threshold: 0.15,
            iou_threshold: 0.7,
            image_size: 640,
            augment: false,
            timeout_secs: 30,
        };
        DetectionPipeline::new(Arc::new(detector), Plotter::new(font, labels), params)
    }

    fn png_upload(width: u32, height: u32) -> Vec<u8> {
        let image = ImageBuffer::from_pixel(width, height, Rgb::<u8>([255, 255, 255]));
        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn same_bytes_produce_identical_output() {
        let pipeline = pipeline_with(MockDetector {
            detections: vec![([10., 10., 50., 50.], 0.9, 0)],
            fail: false,
        });
        let upload = png_upload(100, 100);

        let first = pipeline.run(&upload).unwrap();
        let second = pipeline.run(&upload).unwrap();

        assert_eq!(first.result.boxes(), second.result.boxes());
        assert_eq!(first.result.confidences(), second.result.confidences());
        assert_eq!(first.annotated, second.annotated);
    }

    #[test]
    fn garbage_bytes_surface_a_decode_error() {
        let pipeline = pipeline_with(MockDetector {
            detections: vec![],
            fail: false,
        });

        let outcome = pipeline.run(b"definitely not an image");
        assert!(matches!(outcome, Err(PipelineError::Decode(_))));
    }

    #[test]
    fn clean_scans_return_an_unannotated_image() {
        let pipeline = pipeline_with(MockDetector {
            detections: vec![],
            fail: false,
        });

        let output = pipeline.run(&png_upload(64, 48)).unwrap();

        assert!(output.result.is_empty());
        assert_eq!(output.annotated.dimensions(), (64, 48));
        assert!(output.annotated.pixels().all(|p| p == &Rgb([255, 255, 255])));
    }

    #[test]
    fn detector_failures_surface_as_inference_errors() {
        let pipeline = pipeline_with(MockDetector {
            detections: vec![],
            fail: true,
        });

        let outcome = pipeline.run(&png_upload(32, 32));
        assert!(matches!(outcome, Err(PipelineError::Inference(_))));
    }

    #[test]
    fn annotated_output_keeps_the_upload_dimensions() {
        let pipeline = pipeline_with(MockDetector {
            detections: vec![([5., 5., 20., 20.], 0.7, 0)],
            fail: false,
        });

        let output = pipeline.run(&png_upload(120, 80)).unwrap();
        assert_eq!(output.annotated.dimensions(), (120, 80));
    }
}
