mod config;
mod detection;
mod error;
mod pipeline;
mod platform;
mod resources;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use config::ServerConfig;
use detection::render::Renderer;
use detection::{ClassNames, load_detector};
use pipeline::DetectionPipeline;
use platform::DeploymentProfile;
use resources::ResourceMonitor;
use routes::{AppState, configure_routes};
use std::env;
use std::io;
use std::sync::Arc;
use storage::FileStore;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = ServerConfig::load().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        io::Error::other(e)
    })?;

    let profile = DeploymentProfile::resolve(&config);
    log::info!(
        "Platform {}: force_cpu={}, upload limit={:?}, cpu core={:?}",
        profile.platform,
        profile.force_cpu,
        profile.max_upload_bytes,
        profile.cpu_core
    );
    match profile.pin_current_thread() {
        Ok(Some(core)) => log::info!("Pinned server to CPU core {}", core),
        Ok(None) => {}
        Err(e) => log::warn!("CPU pinning skipped: {}", e),
    }

    let store = FileStore::new(&config.storage.upload_dir, &config.storage.output_dir);
    store.ensure_dirs().map_err(io::Error::other)?;
    log::info!(
        "Uploads in {}, outputs in {}",
        store.upload_dir().display(),
        store.output_dir().display()
    );

    let detector = load_detector(&config.model, &profile).map_err(|e| {
        log::error!("Failed to load model at startup: {}", e);
        io::Error::other(e)
    })?;
    log::info!("Model loaded: {}", detector.describe());

    let class_names =
        ClassNames::load(config.model.labels_path.as_deref()).map_err(io::Error::other)?;
    if !class_names.is_empty() {
        log::info!("Loaded {} class names", class_names.len());
    }
    let renderer =
        Renderer::load(class_names, config.render.font_path.as_deref()).map_err(io::Error::other)?;
    if !renderer.has_labels() {
        log::info!("No font configured; boxes are drawn without labels");
    }

    let pipeline = Arc::new(DetectionPipeline::new(
        detector,
        renderer,
        store,
        config.render.jpeg_quality,
    ));
    let resources = profile
        .log_resources
        .then(|| Arc::new(ResourceMonitor::new()));
    let state = web::Data::new(AppState::new(
        pipeline,
        profile.max_upload_bytes,
        resources,
    ));

    let frontend_dir = config
        .frontend_dir
        .is_dir()
        .then(|| config.frontend_dir.clone());
    if frontend_dir.is_none() {
        log::warn!(
            "Frontend directory {} not found; serving the API only",
            config.frontend_dir.display()
        );
    }

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(|cfg| configure_routes(cfg, frontend_dir.clone()))
    })
    .workers(config.workers)
    .bind(&bind_address)?
    .run()
    .await
}
