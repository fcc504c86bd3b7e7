use super::postprocess::postprocess;
use super::preprocess::letterbox;
use super::{Detection, DetectionError, DetectionSettings, Detector};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tch::{CModule, Device, IValue, Kind, Tensor};

/// YOLO detector backed by a TorchScript export.
pub struct TorchDetector {
    model: Mutex<CModule>,
    device: Device,
    path: PathBuf,
    settings: DetectionSettings,
}

impl TorchDetector {
    pub fn load(
        path: &Path,
        force_cpu: bool,
        settings: DetectionSettings,
    ) -> Result<Self, DetectionError> {
        if !path.is_file() {
            return Err(DetectionError::ModelNotFound(path.to_path_buf()));
        }

        let device = if force_cpu {
            Device::Cpu
        } else {
            Device::cuda_if_available()
        };
        let mut model = CModule::load_on_device(path, device).map_err(|e| DetectionError::Load {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        model.set_eval();

        Ok(Self {
            model: Mutex::new(model),
            device,
            path: path.to_path_buf(),
            settings,
        })
    }

    fn forward(&self, input: Tensor) -> Result<Tensor, DetectionError> {
        let model = self.model.lock().map_err(|_| DetectionError::Poisoned)?;
        let output = tch::no_grad(|| model.forward_is(&[IValue::Tensor(input)]))
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        // YOLOv5 exports return a tuple whose first tensor holds the predictions.
        match output {
            IValue::Tensor(tensor) => Ok(tensor),
            IValue::TensorList(tensors) => tensors
                .into_iter()
                .next()
                .ok_or_else(|| DetectionError::Inference("empty tensor list".to_string())),
            IValue::Tuple(values) | IValue::GenericList(values) => values
                .into_iter()
                .find_map(|value| match value {
                    IValue::Tensor(tensor) => Some(tensor),
                    _ => None,
                })
                .ok_or_else(|| DetectionError::Inference("output holds no tensor".to_string())),
            other => Err(DetectionError::Inference(format!(
                "unexpected model output: {:?}",
                other
            ))),
        }
    }
}

impl Detector for TorchDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        let size = self.settings.input_size;
        let boxed = letterbox(image, size);

        let input = Tensor::from_slice(&boxed.to_chw())
            .view([1, 3, size as i64, size as i64])
            .to_device(self.device);

        let output = self
            .forward(input)?
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .contiguous();
        let shape = output.size();
        let values = Vec::<f32>::try_from(output.flatten(0, -1))
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        postprocess(
            &values,
            &shape,
            &boxed.geometry,
            image.dimensions(),
            &self.settings,
        )
    }

    fn describe(&self) -> String {
        format!("{} on {:?}", self.path.display(), self.device)
    }
}
