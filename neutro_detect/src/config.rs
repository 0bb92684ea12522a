use serde::Deserialize;
use std::path::PathBuf;

/// Settings sections that can refuse to start the process.
pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

/// Which compute device the ONNX sessions should target.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// Probe the runtime for an accelerator, fall back to CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
}

impl DevicePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Cpu => "cpu",
            DevicePreference::Cuda => "cuda",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    #[serde(default)]
    pub device: DevicePreference,
    /// FP16 inference. Only honored when an accelerator ends up selected.
    #[serde(default)]
    pub half: bool,
    /// Fuse adjacent graph operators at session build time.
    #[serde(default = "default_fuse")]
    pub fuse: bool,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
}

fn default_fuse() -> bool {
    true
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl ModelConfig {
    pub fn get_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.get_model_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_model_path()));
        }
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelsConfig {
    pub labels_file: String,
    pub labels_dir: PathBuf,
}

impl LabelsConfig {
    pub fn get_path(&self) -> PathBuf {
        self.labels_dir.join(&self.labels_file)
    }
}

impl Validatable for LabelsConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Labels file not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FontConfig {
    pub font_file: String,
    pub font_dir: PathBuf,
}

impl FontConfig {
    pub fn get_path(&self) -> PathBuf {
        self.font_dir.join(&self.font_file)
    }
}

impl Validatable for FontConfig {
    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Label font not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

/// Per-request inference parameters. Fixed at startup, pure thereafter:
/// the same image through the same parameters yields the same detections.
#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    /// Detections scoring below this are dropped before anything else
    /// sees them.
    pub confidence_threshold: f32,
    /// Suppression threshold for overlapping boxes. Higher keeps more
    /// overlapping candidates.
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,
    /// Square side the image is resized to for the forward pass.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    /// Run a mirrored second pass and fuse the candidates.
    #[serde(default)]
    pub augment: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_iou() -> f32 {
    0.7
}

fn default_image_size() -> u32 {
    640
}

fn default_timeout_secs() -> u64 {
    60
}

impl Validatable for InferenceConfig {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "inference.confidence_threshold must be within 0.0..=1.0, got {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(format!(
                "inference.iou_threshold must be within 0.0..=1.0, got {}",
                self.iou_threshold
            ));
        }
        // YOLO backbones stride by 32; other sizes silently degrade.
        if self.image_size == 0 || self.image_size % 32 != 0 {
            return Err(format!(
                "inference.image_size must be a positive multiple of 32, got {}",
                self.image_size
            ));
        }
        if self.timeout_secs == 0 {
            return Err("inference.timeout_secs must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inference(confidence: f32, iou: f32, size: u32) -> InferenceConfig {
        InferenceConfig {
            confidence_threshold: confidence,
            iou_threshold: iou,
            image_size: size,
            augment: false,
            timeout_secs: 30,
        }
    }

    #[test]
    fn accepts_the_studio_profile() {
        assert!(inference(0.15, 0.7, 1280).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        assert!(inference(1.5, 0.7, 640).validate().is_err());
        assert!(inference(0.15, -0.1, 640).validate().is_err());
    }

    #[test]
    fn rejects_non_stride_image_sizes() {
        assert!(inference(0.15, 0.7, 1000).validate().is_err());
        assert!(inference(0.15, 0.7, 0).validate().is_err());
    }

    #[test]
    fn device_preference_parses_lowercase() {
        let parsed: DevicePreference = serde_json::from_str("\"cuda\"").unwrap();
        assert_eq!(parsed, DevicePreference::Cuda);
        assert_eq!(DevicePreference::default(), DevicePreference::Auto);
    }
}
