use yew::prelude::*;

pub fn render_header() -> Html {
    html! {
        <header class="app-header">
            <h1><i class="fa-solid fa-crosshairs"></i> {" Object Detection"}</h1>
            <p class="subtitle">{"Upload an image via button, drag & drop, or paste"}</p>
        </header>
    }
}
