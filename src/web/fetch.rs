use js_sys::Uint8Array;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::Response;

use crate::assets::AssetSource;
use crate::error::{LoadError, LoadResult};

/// Loads assets over HTTP with the page's `fetch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchSource;

impl AssetSource for FetchSource {
    async fn fetch(&self, location: &str) -> LoadResult<Vec<u8>> {
        let failed = |reason: String| LoadError::Fetch {
            location: location.to_string(),
            reason,
        };
        let window = web_sys::window().ok_or_else(|| failed("window not available".to_string()))?;
        let response = JsFuture::from(window.fetch_with_str(location))
            .await
            .map_err(|err| failed(describe(&err)))?
            .dyn_into::<Response>()
            .map_err(|_| failed("fetch did not return a Response".to_string()))?;
        if !response.ok() {
            return Err(failed(format!("HTTP {}", response.status())));
        }
        let body = response.array_buffer().map_err(|err| failed(describe(&err)))?;
        let buffer = JsFuture::from(body).await.map_err(|err| failed(describe(&err)))?;
        Ok(Uint8Array::new(&buffer).to_vec())
    }
}

fn describe(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}
