use crate::{
    config::{DevicePreference, InferenceConfig, ModelConfig},
    detections::{BoxCoords, DetectionResult},
    detector::{Detector, InferenceError},
    labels::ClassLabels,
};
use image::{DynamicImage, GenericImageView};
use ndarray::{Array, ArrayD, Axis, Dimension, Ix3, Ix4};
use ort::{
    ep::{ExecutionProvider, TensorRT as TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("failed to load model artifact: {0}")]
    Ort(#[from] ort::Error),
}

/// A raw candidate box before suppression, in original-image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    bbox: BoxCoords,
    confidence: f32,
    class_id: u32,
}

/// The loaded detection model: a small pool of ONNX sessions handed out
/// round-robin, each behind its own mutex since `Session::run` needs
/// exclusive access. Built once at startup; device, precision, and fusion
/// are fixed for the life of the process.
pub struct OrtDetector {
    sessions: Vec<Mutex<Session>>,
    counter: AtomicUsize,
    labels: Arc<ClassLabels>,
}

impl OrtDetector {
    pub fn new(model_config: &ModelConfig, labels: Arc<ClassLabels>) -> Result<Self, ModelLoadError> {
        let accelerate = match model_config.device {
            DevicePreference::Cpu => false,
            DevicePreference::Cuda => true,
            DevicePreference::Auto => TensorRTExecutionProvider::default()
                .is_available()
                .unwrap_or(false),
        };

        let half = model_config.half && accelerate;
        if model_config.half && !accelerate {
            tracing::warn!("half precision requested but no accelerator selected, running fp32");
        }

        let mut environment = ort::init();
        if accelerate {
            environment = environment.with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_engine_cache(true)
                    .with_fp16(half)
                    .build(),
            ]);
        }
        environment.commit();

        let sessions = (0..model_config.num_instances)
            .map(|_| {
                let optimization = if model_config.fuse {
                    GraphOptimizationLevel::Level3
                } else {
                    GraphOptimizationLevel::Level1
                };
                let session = Session::builder()?
                    .with_optimization_level(optimization)?
                    .commit_from_file(model_config.get_model_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions on {} (half={}, fuse={})",
            sessions.len(),
            if accelerate { "cuda" } else { "cpu" },
            half,
            model_config.fuse
        );

        Ok(Self {
            sessions,
            counter: AtomicUsize::new(0),
            labels,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::Session(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)?;
        let outputs = session.run(ort::inputs![tensor_ref])?;

        let (shape, data) = outputs["output0"].try_extract_tensor::<f32>()?;
        let ix = shape.to_ixdyn();
        let dims = ix.slice().to_vec();
        let array = ArrayD::from_shape_vec(ix, data.to_vec())
            .map_err(|_| InferenceError::UnexpectedOutput(dims))?;

        Ok(array)
    }

    fn candidates_for(
        &self,
        image: &DynamicImage,
        params: &InferenceConfig,
    ) -> Result<Vec<Candidate>, InferenceError> {
        let (input, width, height) = image_to_tensor(image, params.image_size);
        let output = self.run_inference(&input)?;
        decode_candidates(
            &output,
            width,
            height,
            params.image_size,
            params.confidence_threshold,
        )
    }
}

impl Detector for OrtDetector {
    fn detect(
        &self,
        image: &DynamicImage,
        params: &InferenceConfig,
    ) -> Result<DetectionResult, InferenceError> {
        let mut candidates = self.candidates_for(image, params)?;

        if params.augment {
            // Second pass over the mirrored image; boxes are un-mirrored and
            // fused into the candidate set before suppression.
            let mirrored = self.candidates_for(&image.fliph(), params)?;
            let width = image.width() as f32;
            candidates.extend(mirrored.into_iter().map(|c| mirror_candidate(c, width)));
        }

        let kept = non_max_suppression(candidates, params.iou_threshold);

        let mut result = DetectionResult::new(self.labels.names_map());
        for candidate in kept {
            result.push(candidate.bbox, candidate.confidence, candidate.class_id);
        }
        Ok(result)
    }
}

/// Resize to the square inference resolution and normalize into a
/// `[1, 3, size, size]` tensor. Returns the original dimensions so decoded
/// boxes can be mapped back.
fn image_to_tensor(image: &DynamicImage, size: u32) -> (Array<f32, Ix4>, u32, u32) {
    let (width, height) = (image.width(), image.height());
    let resized = image.resize_exact(size, size, image::imageops::FilterType::CatmullRom);
    let rgb = resized.to_rgb8();

    let side = size as usize;
    let mut input = Array::zeros((1, 3, side, side));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    (input, width, height)
}

/// Decode the `[1, 4 + classes, anchors]` output into thresholded
/// candidates in original-image pixel coordinates.
fn decode_candidates(
    output: &ArrayD<f32>,
    image_width: u32,
    image_height: u32,
    inference_size: u32,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>, InferenceError> {
    let view = output
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| InferenceError::UnexpectedOutput(output.shape().to_vec()))?;

    if view.shape()[0] != 1 || view.shape()[1] < 5 {
        return Err(InferenceError::UnexpectedOutput(output.shape().to_vec()));
    }

    let size = inference_size as f32;
    let (width, height) = (image_width as f32, image_height as f32);

    // [attrs, anchors] -> iterate anchors as rows.
    let predictions = view.index_axis(Axis(0), 0);
    let predictions = predictions.t();

    let mut candidates = Vec::new();
    for row in predictions.axis_iter(Axis(0)) {
        let row: Vec<f32> = row.iter().copied().collect();
        let (class_id, confidence) = row
            .iter()
            .skip(4)
            .enumerate()
            .map(|(index, value)| (index, *value))
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
            .expect("output rows carry at least one class score");

        if confidence < confidence_threshold {
            continue;
        }

        let xc = row[0] / size * width;
        let yc = row[1] / size * height;
        let w = row[2] / size * width;
        let h = row[3] / size * height;

        candidates.push(Candidate {
            bbox: [xc - w / 2., yc - h / 2., xc + w / 2., yc + h / 2.],
            confidence,
            class_id: class_id as u32,
        });
    }

    Ok(candidates)
}

/// Map a candidate found on the horizontally mirrored image back onto the
/// original: x coordinates reflect around the image midline.
fn mirror_candidate(candidate: Candidate, image_width: f32) -> Candidate {
    let [x1, y1, x2, y2] = candidate.bbox;
    Candidate {
        bbox: [image_width - x2, y1, image_width - x1, y2],
        ..candidate
    }
}

fn intersection(a: &BoxCoords, b: &BoxCoords) -> f32 {
    // Clamp each axis so disjoint boxes score zero instead of a spurious
    // positive product.
    let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.);
    let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.);
    w * h
}

fn iou(a: &BoxCoords, b: &BoxCoords) -> f32 {
    let overlap = intersection(a, b);
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - overlap;
    if union <= 0. {
        return 0.;
    }
    overlap / union
}

/// Greedy suppression: keep the highest-confidence candidate, drop everything
/// overlapping it past the threshold, repeat. A higher threshold is more
/// permissive and retains more overlapping boxes.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::new();
    while !candidates.is_empty() {
        let best = candidates[0];
        kept.push(best);
        candidates.retain(|other| iou(&best.bbox, &other.bbox) < iou_threshold);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use ndarray::Array3;

    fn red_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([255, 0, 0])))
    }

    /// Output tensor for a single-class model: one column per anchor, rows
    /// are `[xc, yc, w, h, score]` in inference-resolution pixels.
    fn single_class_output(anchors: &[[f32; 5]]) -> ArrayD<f32> {
        let mut output = Array3::<f32>::zeros((1, 5, anchors.len()));
        for (col, anchor) in anchors.iter().enumerate() {
            for (row, value) in anchor.iter().enumerate() {
                output[[0, row, col]] = *value;
            }
        }
        output.into_dyn()
    }

    #[test]
    fn tensor_has_model_shape_and_normalized_channels() {
        let (input, width, height) = image_to_tensor(&red_image(100, 60), 640);

        assert_eq!(input.shape(), &[1, 3, 640, 640]);
        assert_eq!((width, height), (100, 60));
        assert_eq!(input[[0, 0, 10, 10]], 1.0);
        assert_eq!(input[[0, 1, 10, 10]], 0.0);
        assert_eq!(input[[0, 2, 10, 10]], 0.0);
    }

    #[test]
    fn decode_maps_boxes_back_to_image_pixels() {
        // A 640-resolution box centered at (320, 320), 64 wide and 32 tall,
        // on a 1280x640 source image.
        let output = single_class_output(&[[320., 320., 64., 32., 0.9]]);
        let candidates = decode_candidates(&output, 1280, 640, 640, 0.25).unwrap();

        assert_eq!(candidates.len(), 1);
        let bbox = candidates[0].bbox;
        assert_eq!(bbox, [576., 304., 704., 336.]);
        assert_eq!(candidates[0].class_id, 0);
    }

    #[test]
    fn decode_drops_candidates_below_the_threshold() {
        let output = single_class_output(&[
            [100., 100., 20., 20., 0.90],
            [300., 300., 20., 20., 0.10],
            [500., 500., 20., 20., 0.04],
        ]);

        let candidates = decode_candidates(&output, 640, 640, 640, 0.05).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn raising_the_confidence_threshold_never_adds_detections() {
        let output = single_class_output(&[
            [100., 100., 20., 20., 0.90],
            [200., 200., 20., 20., 0.12],
            [300., 300., 20., 20., 0.07],
            [400., 400., 20., 20., 0.30],
        ]);

        let loose = decode_candidates(&output, 640, 640, 640, 0.05).unwrap();
        let strict = decode_candidates(&output, 640, 640, 640, 0.15).unwrap();

        assert!(strict.len() <= loose.len());
        assert_eq!(loose.len(), 4);
        assert_eq!(strict.len(), 2);
    }

    #[test]
    fn decode_rejects_unexpected_output_shapes() {
        let output = Array3::<f32>::zeros((1, 3, 10)).into_dyn();
        assert!(matches!(
            decode_candidates(&output, 640, 640, 640, 0.05),
            Err(InferenceError::UnexpectedOutput(_))
        ));
    }

    fn candidate(bbox: BoxCoords, confidence: f32) -> Candidate {
        Candidate {
            bbox,
            confidence,
            class_id: 0,
        }
    }

    #[test]
    fn overlapping_boxes_are_suppressed() {
        let kept = non_max_suppression(
            vec![
                candidate([100., 100., 200., 200.], 0.9),
                candidate([105., 105., 205., 205.], 0.8),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn permissive_threshold_retains_overlapping_boxes() {
        let boxes = vec![
            candidate([100., 100., 200., 200.], 0.9),
            candidate([105., 105., 205., 205.], 0.8),
        ];

        let strict = non_max_suppression(boxes.clone(), 0.45);
        let permissive = non_max_suppression(boxes, 0.95);

        assert!(permissive.len() >= strict.len());
        assert_eq!(permissive.len(), 2);
    }

    #[test]
    fn disjoint_boxes_are_never_suppressed() {
        // Fully separated on both axes; an unclamped intersection would go
        // positive here and wrongly suppress one.
        let kept = non_max_suppression(
            vec![
                candidate([0., 0., 10., 10.], 0.9),
                candidate([500., 500., 510., 510.], 0.8),
            ],
            0.1,
        );
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn suppression_is_deterministic() {
        let boxes = vec![
            candidate([100., 100., 200., 200.], 0.9),
            candidate([300., 100., 400., 200.], 0.7),
            candidate([102., 98., 198., 202.], 0.85),
        ];

        let first = non_max_suppression(boxes.clone(), 0.5);
        let second = non_max_suppression(boxes, 0.5);
        assert_eq!(first, second);
    }

    #[test]
    fn mirrored_candidates_reflect_around_the_midline() {
        let mirrored = mirror_candidate(candidate([10., 20., 30., 40.], 0.9), 100.);
        assert_eq!(mirrored.bbox, [70., 20., 90., 40.]);
        assert_eq!(mirrored.confidence, 0.9);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0., 0., 10., 10.];
        assert!((iou(&b, &b) - 1.0).abs() < f32::EPSILON);
    }
}
