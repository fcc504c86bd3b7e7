use crate::detection::render::Renderer;
use crate::detection::{Detection, DetectionError, Detector};
use crate::storage::{FileStore, StorageError};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
}

pub struct DetectionOutcome {
    pub jpeg: Vec<u8>,
    pub detections: Vec<Detection>,
}

/// Save, decode, detect, render, save, read back. Blocking; run it off the async workers.
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    renderer: Renderer,
    store: FileStore,
    jpeg_quality: u8,
}

impl DetectionPipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        renderer: Renderer,
        store: FileStore,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            detector,
            renderer,
            store,
            jpeg_quality,
        }
    }

    pub fn process(&self, file_name: &str, data: &[u8]) -> Result<DetectionOutcome, PipelineError> {
        self.store.save_upload(file_name, data)?;
        let mut image = self.store.load_upload(file_name)?;

        let detections = self.detector.detect(&image)?;
        log::debug!("{} detections in {}", detections.len(), file_name);

        self.renderer.render(&mut image, &detections);
        self.store.save_output(file_name, &image, self.jpeg_quality)?;
        let jpeg = self.store.read_output(file_name)?;

        Ok(DetectionOutcome { jpeg, detections })
    }
}
