use crate::error::ApiError;
use crate::pipeline::DetectionPipeline;
use crate::resources::ResourceMonitor;
use crate::storage::FileStore;
use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::header::ContentType;
use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use log::info;
use shared::{DETECT_ROUTE, IMAGE_FIELD};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pipeline: Arc<DetectionPipeline>,
    max_upload_bytes: Option<usize>,
    resources: Option<Arc<ResourceMonitor>>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<DetectionPipeline>,
        max_upload_bytes: Option<usize>,
        resources: Option<Arc<ResourceMonitor>>,
    ) -> Self {
        Self {
            pipeline,
            max_upload_bytes,
            resources,
        }
    }
}

struct ImageUpload {
    file_name: String,
    data: Vec<u8>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, frontend_dir: Option<PathBuf>) {
    cfg.service(web::resource(DETECT_ROUTE).route(web::post().to(detect)));
    if let Some(dir) = frontend_dir {
        cfg.service(Files::new("/", dir).index_file("index.html"));
    }
}

async fn detect(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, ApiError> {
    let upload = read_image_field(payload, state.max_upload_bytes).await?;
    info!(
        "Received {} ({} bytes)",
        upload.file_name,
        upload.data.len()
    );

    let started = Instant::now();
    let pipeline = state.pipeline.clone();
    let file_name = upload.file_name.clone();
    let resources = state.resources.clone();
    // Sampling refreshes sysinfo synchronously, so it stays on the blocking pool too.
    let outcome = web::block(move || {
        let outcome = pipeline.process(&upload.file_name, &upload.data);
        if let (Ok(_), Some(monitor)) = (&outcome, &resources) {
            monitor.log_snapshot();
        }
        outcome
    })
    .await
    .map_err(|e| ApiError::Blocking(e.to_string()))??;

    info!(
        "Detected {} objects in {} ({} ms)",
        outcome.detections.len(),
        file_name,
        started.elapsed().as_millis()
    );

    Ok(HttpResponse::Ok()
        .content_type(ContentType::jpeg())
        .body(outcome.jpeg))
}

/// Pulls the first `image` file field out of the form, enforcing the size limit as it streams.
async fn read_image_field(
    mut payload: Multipart,
    limit: Option<usize>,
) -> Result<ImageUpload, ApiError> {
    let mut upload = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        let is_image = field.name() == Some(IMAGE_FIELD);
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .and_then(FileStore::sanitize_file_name);

        let file_name = match file_name {
            Some(name) if is_image && upload.is_none() => name,
            _ => {
                while field
                    .try_next()
                    .await
                    .map_err(|e| ApiError::Multipart(e.to_string()))?
                    .is_some()
                {}
                continue;
            }
        };

        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| ApiError::Multipart(e.to_string()))?
        {
            data.extend_from_slice(&chunk);
            if let Some(limit) = limit {
                if data.len() > limit {
                    return Err(ApiError::FileTooLarge { limit });
                }
            }
        }

        upload = Some(ImageUpload { file_name, data });
    }

    upload.ok_or(ApiError::NoFile)
}
