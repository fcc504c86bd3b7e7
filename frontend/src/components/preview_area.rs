use super::super::{Model, Msg};
use super::utils::{debounce, display_name};
use yew::prelude::*;

pub fn render_preview_area(model: &Model, ctx: &Context<Model>) -> Html {
    let Some(selected) = &model.selected else {
        return html! {};
    };

    let link = ctx.link().clone();
    let file_name = selected.file.name();

    html! {
        <div id="preview-container">
            <div class="image-pair">
                <figure>
                    <img id="actual-image-preview" src={selected.preview_url.to_string()} alt={file_name.clone()} />
                    <figcaption>{"Original"}</figcaption>
                </figure>
                <figure>
                    { render_result(model) }
                    <figcaption>{"Detections"}</figcaption>
                </figure>
            </div>
            <div class="button-container">
                <button
                    id="clear-btn"
                    class="analyze-btn"
                    style="background-color: var(--clear-color);"
                    onclick={debounce(300, {
                        let link = link.clone();
                        move || link.send_message(Msg::Reset)
                    })}
                >
                    <i class="fa-solid fa-trash"></i>{" Clear"}
                </button>
                <button
                    class="analyze-btn"
                    onclick={debounce(300, {
                        let link = link.clone();
                        move || link.send_message(Msg::Detect)
                    })}
                    disabled={model.loading}
                >
                    {
                        if model.loading {
                            html! { <><i class="fa-solid fa-spinner fa-spin"></i>{" Detecting..."}</> }
                        } else {
                            html! { <><i class="fa-solid fa-magnifying-glass"></i>{ format!(" Detect \"{}\"", display_name(&file_name, 20)) }</> }
                        }
                    }
                </button>
            </div>
        </div>
    }
}

fn render_result(model: &Model) -> Html {
    match &model.result_url {
        Some(url) => html! {
            <img id="result-image" src={url.to_string()} alt="Detected objects" />
        },
        None if model.loading => html! {
            <div class="loading-preview">
                <i class="fa-solid fa-spinner fa-spin fa-2x"></i>
                <p>{"Running detection..."}</p>
            </div>
        },
        None => html! {
            <div class="select-preview">
                <p>{"Press Detect to annotate this image"}</p>
            </div>
        },
    }
}
