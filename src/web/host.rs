use gloo_events::EventListener;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, HtmlElement, Window};

use crate::composer::Viewport;
use crate::input::wasm::key_from_event;
use crate::mount::{Host, HostEvent, HostEventKind};

/// A canvas appended to a container element of the current page.
pub struct BrowserHost {
    window: Window,
    canvas: HtmlCanvasElement,
}

impl BrowserHost {
    /// Appends a full-viewport canvas to the element with id `container_id`.
    /// Returns `None` when the page has no such element.
    pub fn create(container_id: &str) -> Option<Self> {
        let window = web_sys::window()?;
        let document = window.document()?;
        let container = document.get_element_by_id(container_id)?;
        let canvas = document
            .create_element("canvas")
            .ok()?
            .dyn_into::<HtmlCanvasElement>()
            .ok()?;
        style_canvas(&canvas);
        let host = Self { window, canvas };
        let (width, height) = host.viewport().physical_size();
        host.canvas.set_width(width);
        host.canvas.set_height(height);
        container.append_child(&host.canvas).ok()?;
        Some(host)
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

fn style_canvas(canvas: &HtmlCanvasElement) {
    let element: &HtmlElement = canvas.as_ref();
    let style = element.style();
    for (property, value) in [("display", "block"), ("width", "100%"), ("height", "100vh")] {
        if let Err(err) = style.set_property(property, value) {
            log::warn!("could not set canvas {property}: {err:?}");
        }
    }
}

fn window_viewport(window: &Window) -> Viewport {
    let dimension = |value: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>| {
        value.ok().and_then(|v| v.as_f64()).unwrap_or(1.0).max(1.0) as u32
    };
    Viewport::new(dimension(window.inner_width()), dimension(window.inner_height()))
        .with_pixel_ratio(window.device_pixel_ratio() as f32)
}

impl Host for BrowserHost {
    type Listener = EventListener;

    fn viewport(&self) -> Viewport {
        window_viewport(&self.window)
    }

    fn listen(&self, kind: HostEventKind, mut handler: Box<dyn FnMut(HostEvent)>) -> EventListener {
        match kind {
            HostEventKind::Resize => {
                let window = self.window.clone();
                EventListener::new(&self.window, "resize", move |_| {
                    handler(HostEvent::Resize(window_viewport(&window)));
                })
            }
            HostEventKind::KeyDown => EventListener::new(&self.window, "keydown", move |event| {
                if let Some(key) = key_from_event(event) {
                    handler(HostEvent::KeyDown(key));
                }
            }),
        }
    }

    fn detach_surface(&self) {
        self.canvas.remove();
    }
}
