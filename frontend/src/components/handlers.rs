use super::super::{Model, Msg, SelectedFile};
use super::utils::first_image_file;
use crate::api;
use gloo_file::{Blob, File as GlooFile, ObjectUrl};
use gloo_storage::{LocalStorage, Storage};
use wasm_bindgen_futures::spawn_local;
use web_sys::{ClipboardEvent, DragEvent};
use yew::prelude::*;

const THEME_KEY: &str = "detect-theme";

pub fn stored_theme() -> String {
    match LocalStorage::get::<String>(THEME_KEY) {
        Ok(theme) if theme == "dark" => theme,
        _ => "light".to_string(),
    }
}

pub fn apply_theme(theme: &str) {
    let Some(body) = web_sys::window()
        .and_then(|window| window.document())
        .and_then(|document| document.body())
    else {
        return;
    };

    let classes = body.class_list();
    let result = if theme == "dark" {
        classes.add_1("dark-mode")
    } else {
        classes.remove_1("dark-mode")
    };
    if let Err(e) = result {
        log::warn!("Failed to apply theme: {:?}", e);
    }
}

pub fn handle_file_selected(model: &mut Model, file: GlooFile) -> bool {
    log::info!("Selected {} ({} bytes)", file.name(), file.size());
    let preview_url = ObjectUrl::from(file.clone());
    model.selected = Some(SelectedFile { file, preview_url });
    model.result_url = None;
    model.error = None;
    true
}

pub fn handle_detect(model: &mut Model, ctx: &Context<Model>) -> bool {
    if model.loading {
        return false;
    }
    let Some(selected) = &model.selected else {
        model.error = Some("No file selected.".into());
        return true;
    };

    model.loading = true;
    model.error = None;
    model.result_url = None;

    let file = selected.file.clone();
    let link = ctx.link().clone();
    spawn_local(async move {
        match api::detect(&file).await {
            Ok(bytes) => link.send_message(Msg::DetectionFinished(bytes)),
            Err(message) => {
                log::error!("Detection failed: {}", message);
                link.send_message(Msg::SetError(Some(message)))
            }
        }
    });

    true
}

pub fn handle_detection_finished(model: &mut Model, bytes: Vec<u8>) -> bool {
    let blob = Blob::new_with_options(bytes.as_slice(), Some("image/jpeg"));
    model.result_url = Some(ObjectUrl::from(blob));
    model.loading = false;
    true
}

pub fn handle_drop(model: &mut Model, event: DragEvent) -> bool {
    event.prevent_default();
    model.is_dragging = false;

    match event
        .data_transfer()
        .and_then(|data_transfer| data_transfer.files())
        .and_then(|files| first_image_file(&files))
    {
        Some(file) => handle_file_selected(model, file),
        None => {
            model.error = Some("Only image files can be dropped here.".into());
            true
        }
    }
}

pub fn handle_paste(ctx: &Context<Model>, event: ClipboardEvent) -> bool {
    let file = event
        .clipboard_data()
        .and_then(|data_transfer| data_transfer.files())
        .and_then(|files| first_image_file(&files));

    if let Some(file) = file {
        event.prevent_default();
        ctx.link().send_message(Msg::FileSelected(file));
    }
    false
}

pub fn handle_toggle_theme(model: &mut Model) -> bool {
    model.theme = if model.theme == "light" { "dark" } else { "light" }.to_string();
    apply_theme(&model.theme);

    if let Err(e) = LocalStorage::set(THEME_KEY, &model.theme) {
        log::warn!("Failed to persist theme: {}", e);
    }
    true
}

pub fn handle_reset(model: &mut Model) -> bool {
    model.selected = None;
    model.result_url = None;
    model.error = None;
    model.loading = false;
    true
}
