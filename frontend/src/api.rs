use gloo_file::File as GlooFile;
use gloo_net::http::Request;
use shared::{DETECT_ROUTE, ErrorResponse, IMAGE_FIELD};
use wasm_bindgen::JsValue;

/// Uploads one image and returns the annotated JPEG bytes, or a message fit for display.
pub async fn detect(file: &GlooFile) -> Result<Vec<u8>, String> {
    let form_data = web_sys::FormData::new().map_err(js_error)?;
    form_data
        .append_with_blob_and_filename(IMAGE_FIELD, file.as_ref(), &file.name())
        .map_err(js_error)?;

    let response = Request::post(DETECT_ROUTE)
        .body(form_data)
        .map_err(|e| format!("Failed to build request: {}", e))?
        .send()
        .await
        .map_err(|e| format!("Network error: {}", e))?;

    if response.ok() {
        return response
            .binary()
            .await
            .map_err(|e| format!("Failed to read response: {}", e));
    }

    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => Err(body.error),
        Err(_) => Err(format!("Server error: {}", status)),
    }
}

fn js_error(value: JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{:?}", value))
}
