//! Attaching a [`Viewer`] to a host page or window and tearing it down again.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use anyhow::Result;
use log::{debug, error, info, warn};

use crate::animation::{AnimationLoop, LoopHandle};
use crate::composer::{FrameSink, Viewport};
use crate::config::ViewerConfig;
use crate::error::LoadResult;
use crate::input::KeyCode;
use crate::typeface::Typeface;
use crate::viewer::Viewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEventKind {
    Resize,
    KeyDown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Resize(Viewport),
    KeyDown(KeyCode),
}

/// The environment a viewer is mounted into: it delivers events and owns the
/// drawing surface's place in the page.
pub trait Host {
    /// Dropping a listener unregisters it.
    type Listener;

    fn viewport(&self) -> Viewport;

    fn listen(&self, kind: HostEventKind, handler: Box<dyn FnMut(HostEvent)>) -> Self::Listener;

    /// Removes the drawing surface from the page.
    fn detach_surface(&self);
}

/// A live viewer inside a host. Unmounting, explicitly or by drop, removes
/// every listener, stops the animation loop and detaches the surface.
pub struct Mount<H: Host, S> {
    host: H,
    viewer: Rc<RefCell<Viewer<S>>>,
    listeners: Vec<H::Listener>,
    animation: Option<LoopHandle>,
    mounted: bool,
}

impl<H: Host, S: FrameSink + 'static> Mount<H, S> {
    /// Registers the resize listener. Keyboard controls follow in
    /// [`Mount::populate`].
    pub fn attach(host: H, viewer: Viewer<S>) -> Self {
        let viewer = Rc::new(RefCell::new(viewer));
        let resize_target = viewer.clone();
        let resize = host.listen(
            HostEventKind::Resize,
            Box::new(move |event| {
                if let HostEvent::Resize(viewport) = event {
                    resize_target.borrow_mut().on_resize(viewport);
                }
            }),
        );
        debug!("viewer mounted");
        Self {
            host,
            viewer,
            listeners: vec![resize],
            animation: None,
            mounted: true,
        }
    }

    pub fn viewer(&self) -> &Rc<RefCell<Viewer<S>>> {
        &self.viewer
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn loop_handle(&self) -> Option<&LoopHandle> {
        self.animation.as_ref()
    }

    /// Builds the scene from `face`, enables keyboard controls and returns the
    /// animation loop for the host's frame driver. On error nothing beyond
    /// the bootstrap state exists.
    pub fn populate(&mut self, face: &Typeface) -> LoadResult<AnimationLoop> {
        let (animation, handle) = {
            let mut viewer = self.viewer.borrow_mut();
            viewer.populate(face)?;
            AnimationLoop::start(viewer.config().controls.jitter)
        };

        let key_target = self.viewer.clone();
        let keydown = self.host.listen(
            HostEventKind::KeyDown,
            Box::new(move |event| {
                if let HostEvent::KeyDown(key) = event {
                    key_target.borrow_mut().on_key(key);
                }
            }),
        );
        self.listeners.push(keydown);
        self.animation = Some(handle);
        Ok(animation)
    }

    pub fn unmount(mut self) {
        self.teardown();
    }
}

impl<H: Host, S> Mount<H, S> {
    fn teardown(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        self.listeners.clear();
        if let Some(handle) = &self.animation {
            handle.cancel();
        }
        self.host.detach_surface();
        info!("viewer unmounted");
    }
}

impl<H: Host, S> Drop for Mount<H, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Mounts a viewer built from `config` into `host`. A missing target makes
/// setup a no-op; a sink that cannot be created detaches the surface again.
pub async fn mount<H, S, F, Fut>(host: Option<H>, config: ViewerConfig, create_sink: F) -> Option<Mount<H, S>>
where
    H: Host,
    S: FrameSink + 'static,
    F: FnOnce(&H, Viewport) -> Fut,
    Fut: Future<Output = Result<S>>,
{
    let Some(host) = host else {
        warn!("mount target missing; viewer not created");
        return None;
    };
    let viewport = host.viewport();
    match create_sink(&host, viewport).await {
        Ok(sink) => Some(Mount::attach(host, Viewer::bootstrap(config, viewport, sink))),
        Err(err) => {
            error!("failed to create renderer: {err:?}");
            host.detach_surface();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;
    use pollster::block_on;

    use super::*;
    use crate::composer::RecordingSink;
    use crate::typeface::tests::SAMPLE_TYPEFACE;

    type Handler = Box<dyn FnMut(HostEvent)>;

    /// Registry shared by every host built on the same page.
    #[derive(Default)]
    struct Page {
        next_id: Cell<usize>,
        handlers: RefCell<Vec<(usize, HostEventKind, Handler)>>,
        surfaces: Cell<usize>,
    }

    impl Page {
        fn count(&self, kind: HostEventKind) -> usize {
            self.handlers.borrow().iter().filter(|(_, k, _)| *k == kind).count()
        }

        fn dispatch(&self, event: HostEvent) {
            let kind = match event {
                HostEvent::Resize(_) => HostEventKind::Resize,
                HostEvent::KeyDown(_) => HostEventKind::KeyDown,
            };
            for (_, k, handler) in self.handlers.borrow_mut().iter_mut() {
                if *k == kind {
                    handler(event.clone());
                }
            }
        }
    }

    struct FakeHost {
        page: Rc<Page>,
        viewport: Viewport,
    }

    impl FakeHost {
        fn new(page: &Rc<Page>) -> Self {
            page.surfaces.set(page.surfaces.get() + 1);
            Self {
                page: page.clone(),
                viewport: Viewport::new(640, 480),
            }
        }
    }

    struct FakeListener {
        page: Rc<Page>,
        id: usize,
    }

    impl Drop for FakeListener {
        fn drop(&mut self) {
            self.page.handlers.borrow_mut().retain(|(id, _, _)| *id != self.id);
        }
    }

    impl Host for FakeHost {
        type Listener = FakeListener;

        fn viewport(&self) -> Viewport {
            self.viewport
        }

        fn listen(&self, kind: HostEventKind, handler: Handler) -> FakeListener {
            let id = self.page.next_id.get();
            self.page.next_id.set(id + 1);
            self.page.handlers.borrow_mut().push((id, kind, handler));
            FakeListener {
                page: self.page.clone(),
                id,
            }
        }

        fn detach_surface(&self) {
            self.page.surfaces.set(self.page.surfaces.get() - 1);
        }
    }

    fn mount_on(page: &Rc<Page>, config: ViewerConfig) -> Mount<FakeHost, RecordingSink> {
        block_on(mount(Some(FakeHost::new(page)), config, |_, _| async {
            Ok(RecordingSink::default())
        }))
        .unwrap()
    }

    fn face() -> Typeface {
        Typeface::from_json_str(SAMPLE_TYPEFACE).unwrap()
    }

    #[test]
    fn missing_target_is_a_no_op() {
        let mounted = block_on(mount::<FakeHost, RecordingSink, _, _>(
            None,
            ViewerConfig::default(),
            |_, _| async { Ok(RecordingSink::default()) },
        ));
        assert!(mounted.is_none());
    }

    #[test]
    fn sink_failure_detaches_the_surface() {
        let page = Rc::new(Page::default());
        let mounted = block_on(mount::<_, RecordingSink, _, _>(
            Some(FakeHost::new(&page)),
            ViewerConfig::default(),
            |_, _| async { Err(anyhow!("no adapter")) },
        ));
        assert!(mounted.is_none());
        assert_eq!(page.surfaces.get(), 0);
        assert!(page.handlers.borrow().is_empty());
    }

    #[test]
    fn mount_registers_resize_then_keys_after_populate() {
        let page = Rc::new(Page::default());
        let mut mounted = mount_on(&page, ViewerConfig::default());
        assert_eq!(page.count(HostEventKind::Resize), 1);
        assert_eq!(page.count(HostEventKind::KeyDown), 0);

        let _animation = mounted.populate(&face()).unwrap();
        assert_eq!(page.count(HostEventKind::KeyDown), 1);
        assert!(mounted.loop_handle().is_some());
    }

    #[test]
    fn events_reach_the_viewer() {
        let page = Rc::new(Page::default());
        let mut mounted = mount_on(&page, ViewerConfig::default());
        mounted.populate(&face()).unwrap();

        page.dispatch(HostEvent::Resize(Viewport::new(300, 100)));
        page.dispatch(HostEvent::KeyDown(KeyCode::Character('w')));

        let viewer = mounted.viewer().borrow();
        assert!((viewer.stage().camera.aspect - 3.0).abs() < 1e-6);
        assert_eq!(viewer.sink().size, Some((300, 100)));
        let cube = viewer.stage().cube_transform().unwrap().position;
        assert!((cube.y - 0.1).abs() < 1e-6);
        assert_eq!(viewer.stage().light_position(), Some(cube));
    }

    #[test]
    fn unmount_removes_everything() {
        let page = Rc::new(Page::default());
        let mut mounted = mount_on(&page, ViewerConfig::default());
        mounted.populate(&face()).unwrap();
        let handle = mounted.loop_handle().cloned().unwrap();

        mounted.unmount();
        assert_eq!(page.count(HostEventKind::Resize), 0);
        assert_eq!(page.count(HostEventKind::KeyDown), 0);
        assert_eq!(page.surfaces.get(), 0);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn repeated_mounts_do_not_accumulate_listeners() {
        let page = Rc::new(Page::default());
        for _ in 0..3 {
            let mut mounted = mount_on(&page, ViewerConfig::default());
            mounted.populate(&face()).unwrap();
            assert_eq!(page.count(HostEventKind::Resize), 1);
            assert_eq!(page.count(HostEventKind::KeyDown), 1);
            assert_eq!(page.surfaces.get(), 1);
            mounted.unmount();
        }
        assert!(page.handlers.borrow().is_empty());
    }

    #[test]
    fn dropping_a_mount_tears_it_down() {
        let page = Rc::new(Page::default());
        {
            let mut mounted = mount_on(&page, ViewerConfig::default());
            mounted.populate(&face()).unwrap();
        }
        assert!(page.handlers.borrow().is_empty());
        assert_eq!(page.surfaces.get(), 0);
    }

    #[test]
    fn empty_glyph_text_still_wires_keys_and_loop() {
        let page = Rc::new(Page::default());
        let mut config = ViewerConfig::default();
        config.glyphs[0].text = String::new();
        let mut mounted = mount_on(&page, config);
        mounted.populate(&face()).unwrap();
        assert_eq!(page.count(HostEventKind::KeyDown), 1);
        assert!(mounted.loop_handle().is_some());
        let viewer = mounted.viewer().borrow();
        assert!(viewer.stage().cube_transform().is_some());
        assert!(viewer.stage().light_position().is_some());
    }

    #[test]
    fn failed_populate_keeps_only_resize() {
        let page = Rc::new(Page::default());
        let mut mounted = mount_on(&page, ViewerConfig::default());
        let broken = Typeface::from_json_str(
            r#"{ "resolution": 1000, "glyphs": { "?": { "ha": 1, "o": "m 0 zero" } } }"#,
        )
        .unwrap();
        assert!(mounted.populate(&broken).is_err());
        assert_eq!(page.count(HostEventKind::Resize), 1);
        assert_eq!(page.count(HostEventKind::KeyDown), 0);
        assert!(mounted.loop_handle().is_none());
    }
}
