mod api;
mod components;

use components::handlers;
use components::header::render_header;
use components::preview_area::render_preview_area;
use components::theme_toggle::render_theme_toggle;
use components::upload_section::render_upload_section;
use components::utils::render_error_message;
use gloo_events::EventListener;
use gloo_file::{File as GlooFile, ObjectUrl};
use wasm_bindgen::JsCast;
use web_sys::{ClipboardEvent, DragEvent};
use yew::prelude::*;

pub struct SelectedFile {
    pub file: GlooFile,
    pub preview_url: ObjectUrl,
}

pub enum Msg {
    FileSelected(GlooFile),
    Detect,
    DetectionFinished(Vec<u8>),
    SetError(Option<String>),
    SetDragging(bool),
    HandleDrop(DragEvent),
    HandlePaste(ClipboardEvent),
    ToggleTheme,
    Reset,
}

pub struct Model {
    pub selected: Option<SelectedFile>,
    pub result_url: Option<ObjectUrl>,
    pub loading: bool,
    pub error: Option<String>,
    pub is_dragging: bool,
    pub theme: String,
    paste_listener: Option<EventListener>,
}

impl Component for Model {
    type Message = Msg;
    type Properties = ();

    fn create(ctx: &Context<Self>) -> Self {
        let theme = handlers::stored_theme();
        handlers::apply_theme(&theme);

        let paste_listener = web_sys::window().map(|window| {
            let link = ctx.link().clone();
            EventListener::new(&window, "paste", move |event| {
                if let Some(clipboard_event) = event.dyn_ref::<ClipboardEvent>() {
                    link.send_message(Msg::HandlePaste(clipboard_event.clone()));
                }
            })
        });

        Self {
            selected: None,
            result_url: None,
            loading: false,
            error: None,
            is_dragging: false,
            theme,
            paste_listener,
        }
    }

    fn update(&mut self, ctx: &Context<Self>, msg: Self::Message) -> bool {
        match msg {
            Msg::FileSelected(file) => handlers::handle_file_selected(self, file),
            Msg::Detect => handlers::handle_detect(self, ctx),
            Msg::DetectionFinished(bytes) => handlers::handle_detection_finished(self, bytes),
            Msg::SetError(error) => {
                self.error = error;
                self.loading = false;
                true
            }
            Msg::SetDragging(is_dragging) => {
                self.is_dragging = is_dragging;
                true
            }
            Msg::HandleDrop(event) => handlers::handle_drop(self, event),
            Msg::HandlePaste(event) => handlers::handle_paste(ctx, event),
            Msg::ToggleTheme => handlers::handle_toggle_theme(self),
            Msg::Reset => handlers::handle_reset(self),
        }
    }

    fn view(&self, ctx: &Context<Self>) -> Html {
        html! {
            <div class="container">
                { render_header() }
                { render_theme_toggle(&self.theme, ctx.link()) }

                <main class="main-content">
                    { render_upload_section(self, ctx) }
                    { render_error_message(self) }
                    { render_preview_area(self, ctx) }
                </main>

                <footer class="app-footer">
                    <p>{"YOLO object detection | Fullstack Rust WASM"}</p>
                </footer>
            </div>
        }
    }

    fn destroy(&mut self, _ctx: &Context<Self>) {
        self.paste_listener.take();
    }
}

fn main() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("App starting...");
    yew::Renderer::<Model>::new().render();
}
