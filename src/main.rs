use std::any::Any;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{Key, NamedKey as WinitNamedKey};
use winit::window::{Window, WindowId};

use glyphglow::{
    print_final_state, AnimationLoop, FileSource, GpuRenderer, KeyCode, LoadedAssets, LoopHandle,
    NamedKey, RecordingSink, SceneSummary, Viewer, ViewerConfig, Viewport,
};

const WINDOW_SIZE: (u32, u32) = (1280, 720);

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let mut config = match &options.config {
        Some(path) => ViewerConfig::from_json_file(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(path) = &options.typeface {
        config.assets.typeface = path.clone();
    }
    if let Some(path) = &options.environment {
        config.assets.environment = path.clone();
    }

    let assets = block_on(LoadedAssets::load(&FileSource::new(), &config.assets));

    if options.summary_only {
        return run_headless(config, assets, &options);
    }
    match run_interactive(config, assets, &options) {
        Ok(()) => Ok(()),
        Err(InteractiveError::Window(err, config, assets)) => {
            eprintln!(
                "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
            );
            run_headless(config, assets, &options)
        }
        Err(InteractiveError::Other(err)) => Err(err),
    }
}

/// Builds the scene against a recording sink, replays the scripted keys and
/// frames, then prints what the scene ended up as.
fn run_headless(config: ViewerConfig, assets: LoadedAssets, options: &CliOptions) -> Result<()> {
    let viewport = Viewport::new(WINDOW_SIZE.0, WINDOW_SIZE.1);
    let mut viewer = Viewer::bootstrap(config, viewport, RecordingSink::default());
    assets.apply(&mut viewer);

    for key in options.keys.chars() {
        viewer.on_key_name(&key.to_string());
    }
    if let Some((mut animation, _handle)) = viewer.start_animation() {
        for _ in 0..options.frames {
            viewer.tick(&mut animation)?;
        }
    }

    print_final_state(&SceneSummary::of(&viewer));
    println!("Frames rendered: {}", viewer.sink().frames);
    Ok(())
}

enum InteractiveError {
    /// No window could be opened; the inputs come back for a headless run.
    Window(WindowInitError, ViewerConfig, LoadedAssets),
    Other(anyhow::Error),
}

fn run_interactive(
    config: ViewerConfig,
    assets: LoadedAssets,
    options: &CliOptions,
) -> std::result::Result<(), InteractiveError> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = match event_loop {
        Ok(Ok(event_loop)) => event_loop,
        Ok(Err(err)) => {
            return Err(InteractiveError::Window(
                WindowInitError::from_error("event loop", err),
                config,
                assets,
            ))
        }
        Err(panic) => {
            return Err(InteractiveError::Window(
                WindowInitError::from_panic("event loop", panic),
                config,
                assets,
            ))
        }
    };
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp {
        config: Some(config),
        assets: Some(assets),
        keys: options.keys.clone(),
        state: None,
        init_error: None,
        last_error: None,
    };
    if let Err(err) = event_loop.run_app(&mut app) {
        return Err(InteractiveError::Other(anyhow!("event loop failed: {err}")));
    }

    if let Some(err) = app.init_error.take() {
        if let (Some(config), Some(assets)) = (app.config.take(), app.assets.take()) {
            return Err(InteractiveError::Window(err, config, assets));
        }
        return Err(InteractiveError::Other(err.into()));
    }
    if let Some(state) = app.state.take() {
        state.shutdown();
    }
    match app.last_error {
        Some(err) => Err(InteractiveError::Other(err)),
        None => Ok(()),
    }
}

struct ViewerApp {
    config: Option<ViewerConfig>,
    assets: Option<LoadedAssets>,
    keys: String,
    state: Option<WindowState>,
    init_error: Option<WindowInitError>,
    last_error: Option<anyhow::Error>,
}

struct WindowState {
    window: Arc<Window>,
    viewer: Viewer<GpuRenderer>,
    animation: Option<(AnimationLoop, LoopHandle)>,
}

impl WindowState {
    fn create(window: Arc<Window>, config: ViewerConfig, assets: LoadedAssets, keys: &str) -> Result<Self> {
        let viewport = window_viewport(&window);
        let renderer = block_on(GpuRenderer::new(Arc::clone(&window), viewport))
            .context("failed to initialise the renderer")?;
        let mut viewer = Viewer::bootstrap(config, viewport, renderer);
        assets.apply(&mut viewer);
        for key in keys.chars() {
            viewer.on_key_name(&key.to_string());
        }
        let animation = viewer.start_animation();
        Ok(Self {
            window,
            viewer,
            animation,
        })
    }

    fn draw(&mut self) -> Result<()> {
        if let Some((animation, _)) = self.animation.as_mut() {
            self.viewer.tick(animation)?;
        }
        Ok(())
    }

    fn shutdown(self) {
        if let Some((_, handle)) = &self.animation {
            handle.cancel();
        }
        print_final_state(&SceneSummary::of(&self.viewer));
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("glyphglow")
            .with_inner_size(LogicalSize::new(WINDOW_SIZE.0 as f64, WINDOW_SIZE.1 as f64));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.init_error = Some(WindowInitError::from_error("window", err));
                event_loop.exit();
                return;
            }
        };
        let (Some(config), Some(assets)) = (self.config.take(), self.assets.take()) else {
            return;
        };
        match WindowState::create(window, config, assets, &self.keys) {
            Ok(state) => {
                info!("window opened");
                self.state = Some(state);
            }
            Err(err) => {
                self.last_error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        if window_id != state.window.id() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => {
                let viewport = window_viewport(&state.window);
                state.viewer.on_resize(viewport);
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                if let Some(key) = map_key(&event.logical_key) {
                    state.viewer.on_key(key);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(err) = state.draw() {
                    self.last_error = Some(err);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

/// Logical size plus scale factor, the way a page reports its window.
fn window_viewport(window: &Window) -> Viewport {
    let scale = window.scale_factor();
    let logical = window.inner_size().to_logical::<f64>(scale);
    Viewport::new(logical.width.round() as u32, logical.height.round() as u32)
        .with_pixel_ratio(scale as f32)
}

fn map_key(key: &Key) -> Option<KeyCode> {
    match key {
        Key::Character(text) => KeyCode::from_name(text.as_str()),
        Key::Named(named) => Some(KeyCode::Named(match named {
            WinitNamedKey::ArrowLeft => NamedKey::Left,
            WinitNamedKey::ArrowRight => NamedKey::Right,
            WinitNamedKey::ArrowUp => NamedKey::Up,
            WinitNamedKey::ArrowDown => NamedKey::Down,
            WinitNamedKey::Escape => NamedKey::Escape,
            WinitNamedKey::Enter => NamedKey::Enter,
            WinitNamedKey::Space => NamedKey::Space,
            _ => return None,
        })),
        _ => None,
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

const USAGE: &str = "Usage: glyphglow [--config <file.json>] [--typeface <file.json>] \
[--environment <file.hdr>] [--keys <keys>] [--frames <n>] [--summary-only]";

#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    config: Option<String>,
    typeface: Option<String>,
    environment: Option<String>,
    keys: String,
    frames: u32,
    summary_only: bool,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
            };
            match arg.as_str() {
                "--config" => options.config = Some(value("--config")?),
                "--typeface" => options.typeface = Some(value("--typeface")?),
                "--environment" => options.environment = Some(value("--environment")?),
                "--keys" => options.keys = value("--keys")?,
                "--frames" => {
                    let raw = value("--frames")?;
                    options.frames = raw
                        .parse()
                        .with_context(|| format!("--frames expects a count, got {raw:?}"))?;
                }
                "--summary-only" => options.summary_only = true,
                "--help" | "-h" => return Err(anyhow!(USAGE)),
                other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
            }
        }
        Ok(options)
    }
}
