//! Browser entry points: mounting into a page element, fetching assets and
//! driving frames with `requestAnimationFrame`.

mod fetch;
mod host;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;

use crate::animation::{AnimationLoop, LoopHandle};
use crate::assets::{install_environment, load_typeface};
use crate::config::ViewerConfig;
use crate::mount::{mount as mount_into, Mount};
use crate::render::GpuRenderer;
use crate::viewer::Viewer;

pub use fetch::FetchSource;
pub use host::BrowserHost;

type BrowserMount = Mount<BrowserHost, GpuRenderer>;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    // only fails when a logger is already installed, which then reports this
    if let Err(err) = console_log::init_with_level(log::Level::Info) {
        warn!("console logger not installed: {err}");
    }
}

/// A mounted scene, handed to the page so it can unmount it later.
#[wasm_bindgen]
pub struct ViewerHandle {
    mount: Rc<RefCell<Option<BrowserMount>>>,
}

#[wasm_bindgen]
impl ViewerHandle {
    /// Removes listeners, stops the frame loop and detaches the canvas.
    /// Calling it twice is harmless.
    pub fn unmount(&self) {
        if let Some(mounted) = self.mount.borrow_mut().take() {
            mounted.unmount();
        }
    }
}

/// Mounts the scene into the element with id `container_id`. Resolves to
/// `undefined` when there is no such element or no usable GPU.
#[wasm_bindgen]
pub async fn mount(container_id: String) -> Option<ViewerHandle> {
    let config = ViewerConfig::default();
    let assets = config.assets.clone();
    let host = BrowserHost::create(&container_id);
    let mounted = mount_into(host, config, |host, viewport| {
        let canvas = host.canvas().clone();
        async move { GpuRenderer::new(wgpu::SurfaceTarget::Canvas(canvas), viewport).await }
    })
    .await?;

    let slot = mounted.viewer().borrow().environment().clone();
    spawn_local(async move {
        install_environment(&FetchSource, &assets.environment, &slot).await;
    });

    let shared = Rc::new(RefCell::new(Some(mounted)));
    let typeface_target = shared.clone();
    spawn_local(async move {
        let face = match load_typeface(&FetchSource, &assets.typeface).await {
            Ok(face) => face,
            Err(err) => {
                warn!("typeface {} unavailable, scene left empty: {err}", assets.typeface);
                return;
            }
        };
        let mut current = typeface_target.borrow_mut();
        let Some(mounted) = current.as_mut() else {
            info!("viewer unmounted before the typeface arrived");
            return;
        };
        match mounted.populate(&face) {
            Ok(animation) => {
                let viewer = mounted.viewer().clone();
                if let Some(handle) = mounted.loop_handle() {
                    if let Err(err) = drive_frames(viewer, animation, handle) {
                        error!("animation loop not started: {err:?}");
                    }
                }
            }
            Err(err) => warn!("scene not populated: {err}"),
        }
    });

    Some(ViewerHandle { mount: shared })
}

/// Schedules one `tick` per animation frame until `handle` is cancelled.
fn drive_frames(
    viewer: Rc<RefCell<Viewer<GpuRenderer>>>,
    mut animation: AnimationLoop,
    handle: &LoopHandle,
) -> Result<()> {
    let window = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
    let pending = Rc::new(Cell::new(None::<i32>));
    let callback: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));

    let frame_window = window.clone();
    let frame_pending = pending.clone();
    let frame_callback = callback.clone();
    *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
        frame_pending.set(None);
        match viewer.borrow_mut().tick(&mut animation) {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => error!("frame failed: {err:?}"),
        }
        if let Some(closure) = frame_callback.borrow().as_ref() {
            match request_frame(&frame_window, closure) {
                Ok(id) => frame_pending.set(Some(id)),
                Err(err) => error!("{err:?}"),
            }
        }
    }) as Box<dyn FnMut()>));

    if let Some(closure) = callback.borrow().as_ref() {
        pending.set(Some(request_frame(&window, closure)?));
    }

    handle.on_cancel(move || {
        if let Some(id) = pending.take() {
            if let Err(err) = window.cancel_animation_frame(id) {
                warn!("cancelAnimationFrame failed: {err:?}");
            }
        }
        callback.borrow_mut().take();
    });
    Ok(())
}

fn request_frame(window: &web_sys::Window, closure: &Closure<dyn FnMut()>) -> Result<i32> {
    window
        .request_animation_frame(closure.as_ref().unchecked_ref())
        .map_err(|err| anyhow!("requestAnimationFrame failed: {err:?}"))
}
