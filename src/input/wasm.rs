use wasm_bindgen::JsCast;
use web_sys::{Event, KeyboardEvent};

use super::KeyCode;

/// Extracts the key of a `keydown` event. Auto-repeated presses are kept,
/// so holding a key keeps moving the cube.
pub fn key_from_event(event: &Event) -> Option<KeyCode> {
    let event = event.dyn_ref::<KeyboardEvent>()?;
    KeyCode::from_name(&event.key())
}
