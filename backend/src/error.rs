use crate::pipeline::PipelineError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;

const MIB: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    NoFile,
    #[error("File size exceeds {}MB limit", format_megabytes(.limit))]
    FileTooLarge { limit: usize },
    #[error("Malformed multipart payload: {0}")]
    Multipart(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("Blocking task failed: {0}")]
    Blocking(String),
}

fn format_megabytes(bytes: &usize) -> String {
    if bytes % MIB == 0 {
        (bytes / MIB).to_string()
    } else {
        format!("{:.2}", *bytes as f64 / MIB as f64)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NoFile | ApiError::FileTooLarge { .. } | ApiError::Multipart(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Pipeline(_) | ApiError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_client_error() {
            log::warn!("Rejected upload: {}", self);
            self.to_string()
        } else {
            log::error!("Detection failed: {}", self);
            "Internal server error".to_string()
        };
        HttpResponse::build(status).json(ErrorResponse::new(message))
    }
}
