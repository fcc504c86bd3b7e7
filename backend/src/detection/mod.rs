pub mod postprocess;
pub mod preprocess;
pub mod render;

#[cfg(feature = "torch")]
pub mod model;

use crate::config::ModelConfig;
use crate::platform::DeploymentProfile;
use image::RgbImage;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A box in original-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl Detection {
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = inter_w * inter_h;
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&ModelConfig> for DetectionSettings {
    fn from(config: &ModelConfig) -> Self {
        Self {
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

#[cfg_attr(not(feature = "torch"), allow(dead_code))]
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Failed to load model {path}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("Model inference error: {0}")]
    Inference(String),
    #[error("Unexpected model output shape {0:?}")]
    OutputShape(Vec<i64>),
    #[error("Failed to read labels {path}: {source}")]
    Labels {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Model mutex poisoned")]
    Poisoned,
    #[cfg_attr(feature = "torch", allow(dead_code))]
    #[error("No inference backend compiled in; rebuild with the `torch` feature")]
    BackendUnavailable,
}

/// Runs the object-detection model over one RGB image.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError>;

    fn describe(&self) -> String {
        "detector".to_string()
    }
}

/// Class names indexed by class id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassNames(Vec<String>);

impl ClassNames {
    pub fn load(path: Option<&Path>) -> Result<Self, DetectionError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|source| DetectionError::Labels {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        Self(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn name(&self, class_id: usize) -> Cow<'_, str> {
        match self.0.get(class_id) {
            Some(name) => Cow::Borrowed(name.as_str()),
            None => Cow::Owned(format!("class {}", class_id)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn load_detector(
    config: &ModelConfig,
    profile: &DeploymentProfile,
) -> Result<Arc<dyn Detector>, DetectionError> {
    #[cfg(feature = "torch")]
    {
        if let Some(threads) = profile.torch_threads {
            tch::set_num_threads(threads);
        }
        let detector =
            model::TorchDetector::load(&config.path, profile.force_cpu, config.into())?;
        Ok(Arc::new(detector))
    }

    #[cfg(not(feature = "torch"))]
    {
        let _ = (config, profile);
        Err(DetectionError::BackendUnavailable)
    }
}
