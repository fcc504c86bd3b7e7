use serde::Deserialize;
use shared::Platform;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_CONFIG_PATH: &str = "config/server.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    /// Overrides the platform detected from the build target.
    pub platform: Option<Platform>,
    pub frontend_dir: PathBuf,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub render: RenderConfig,
    pub profile: ProfileOverrides,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// Class names, one per line, indexed by class id.
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// TTF font used for box labels. Boxes are drawn without labels when unset.
    pub font_path: Option<PathBuf>,
    pub jpeg_quality: u8,
}

/// Per-key overrides of the platform deployment profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfileOverrides {
    pub force_cpu: Option<bool>,
    pub enforce_upload_limit: Option<bool>,
    pub max_upload_bytes: Option<usize>,
    pub pin_cpu: Option<bool>,
    pub cpu_core: Option<usize>,
    pub torch_threads: Option<i32>,
    pub log_resources: Option<bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            workers: 1,
            platform: None,
            frontend_dir: PathBuf::from("frontend/dist"),
            storage: StorageConfig::default(),
            model: ModelConfig::default(),
            render: RenderConfig::default(),
            profile: ProfileOverrides::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/yolov5.torchscript"),
            labels_path: None,
            input_size: 640,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 1000,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            jpeg_quality: 75,
        }
    }
}

impl ServerConfig {
    /// Defaults, then the YAML file (`DETECT_CONFIG` or `config/server.yaml`), then env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("DETECT_CONFIG").ok().map(PathBuf::from) {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_value("PORT", &port)?;
        }
        if let Some(workers) = lookup("DETECT_WORKERS") {
            self.workers = parse_value("DETECT_WORKERS", &workers)?;
        }
        if let Some(platform) = lookup("DETECT_PLATFORM") {
            self.platform = Some(parse_value("DETECT_PLATFORM", &platform)?);
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(path) = lookup("LABELS_PATH") {
            self.model.labels_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("FONT_PATH") {
            self.render.font_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup("UPLOAD_DIR") {
            self.storage.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            self.storage.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FRONTEND_DIR") {
            self.frontend_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(invalid("workers", self.workers));
        }
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(invalid("model.input_size", self.model.input_size));
        }
        if !(0.0..=1.0).contains(&self.model.confidence_threshold) {
            return Err(invalid(
                "model.confidence_threshold",
                self.model.confidence_threshold,
            ));
        }
        if !(0.0..=1.0).contains(&self.model.iou_threshold) {
            return Err(invalid("model.iou_threshold", self.model.iou_threshold));
        }
        if self.model.max_detections == 0 {
            return Err(invalid("model.max_detections", self.model.max_detections));
        }
        if !(1..=100).contains(&self.render.jpeg_quality) {
            return Err(invalid("render.jpeg_quality", self.render.jpeg_quality));
        }
        Ok(())
    }

    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::current)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: ServerConfig = serde_yaml::from_str(
            "port: 5000\nplatform: linux\nmodel:\n  confidence_threshold: 0.5\n",
        )
        .unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.platform, Some(Platform::Linux));
        assert_eq!(config.model.confidence_threshold, 0.5);
        assert_eq!(config.model.iou_threshold, 0.45);
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("PORT", "8081"),
                ("MODEL_PATH", "/models/best.torchscript"),
                ("DETECT_PLATFORM", "Windows"),
                ("UPLOAD_DIR", "/tmp/in"),
            ]))
            .unwrap();

        assert_eq!(config.port, 8081);
        assert_eq!(config.model.path, PathBuf::from("/models/best.torchscript"));
        assert_eq!(config.platform(), Platform::Windows);
        assert_eq!(config.storage.upload_dir, PathBuf::from("/tmp/in"));
        assert_eq!(config.bind_address(), "0.0.0.0:8081");
    }

    #[test]
    fn bad_env_value_names_the_key() {
        let mut config = ServerConfig::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.model.input_size = 600;
        assert!(config.validate().is_err());

        config.model.input_size = 640;
        config.render.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.render.jpeg_quality = 90;
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/server.yaml");
        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn missing_config_file_is_a_read_error() {
        let err = ServerConfig::from_file(Path::new("does/not/exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
