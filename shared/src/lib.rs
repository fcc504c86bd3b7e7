use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Route the upload form posts to.
pub const DETECT_ROUTE: &str = "/detect";

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Host family a server build is deployed on. Selects the deployment profile.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!(Platform::from_str("Linux").unwrap(), Platform::Linux);
        assert_eq!(Platform::from_str("WINDOWS").unwrap(), Platform::Windows);
        assert_eq!(Platform::Other.to_string(), "other");
        assert!(Platform::from_str("beos").is_err());
    }

    #[test]
    fn error_response_uses_error_key() {
        let body = serde_json::to_string(&ErrorResponse::new("No file uploaded")).unwrap();
        assert_eq!(body, r#"{"error":"No file uploaded"}"#);
    }
}
