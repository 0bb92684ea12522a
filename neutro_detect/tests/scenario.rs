//! End-to-end checks against the exported model. These need two artifacts
//! that are not committed:
//!
//!   runs/detect/train/weights/best.onnx    the trained weights, exported
//!                                          with `yolo export format=onnx`
//!   tests/fixtures/three_neutrophils.png   a smear scan with three clear
//!                                          neutrophils
//!
//! Run them with `cargo test -p neutro_detect -- --ignored`.

use neutro_detect::{
    config::{DevicePreference, InferenceConfig, ModelConfig},
    labels::{ClassLabel, ClassLabels},
    Detector, OrtDetector,
};
use std::{path::PathBuf, sync::Arc};

fn workspace_path(relative: &str) -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/..")).join(relative)
}

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures")).join(name)
}

fn model_config() -> ModelConfig {
    ModelConfig {
        onnx_file: "best.onnx".to_string(),
        model_dir: workspace_path("runs/detect/train/weights"),
        device: DevicePreference::Cpu,
        half: false,
        fuse: true,
        num_instances: 1,
    }
}

fn studio_params() -> InferenceConfig {
    InferenceConfig {
        confidence_threshold: 0.15,
        iou_threshold: 0.7,
        image_size: 1280,
        augment: true,
        timeout_secs: 120,
    }
}

fn load_detector() -> OrtDetector {
    let labels = Arc::new(ClassLabels::from_labels(vec![ClassLabel {
        name: "neutrophil".into(),
        color: [255, 56, 56],
    }]));
    OrtDetector::new(&model_config(), labels).expect("model should load")
}

#[test]
#[ignore = "needs the trained weights and the sample scan on disk"]
fn three_neutrophil_scan_yields_three_boxes() {
    let detector = load_detector();
    let image = image::open(fixture_path("three_neutrophils.png"))
        .expect("fixture image should exist");

    let result = detector.detect(&image, &studio_params()).unwrap();

    assert_eq!(result.len(), 3);
    for detection in result.iter() {
        assert_eq!(detection.class_name, "neutrophil");
        assert!(
            detection.confidence >= 0.5,
            "fixture cells are unambiguous, expected confidence >= 0.5, got {}",
            detection.confidence
        );
    }
}

#[test]
#[ignore = "needs the trained weights and the sample scan on disk"]
fn detection_is_deterministic_across_runs() {
    let detector = load_detector();
    let image = image::open(fixture_path("three_neutrophils.png")).unwrap();

    let first = detector.detect(&image, &studio_params()).unwrap();
    let second = detector.detect(&image, &studio_params()).unwrap();

    assert_eq!(first.boxes(), second.boxes());
    assert_eq!(first.confidences(), second.confidences());
}
