//! An HDR-lit scene of extruded glyphs and a glowing cube, rendered with
//! bloom, for the browser and the desktop.
//!
//! The scene model, input handling and frame composition are plain Rust and
//! run headless; [`render::GpuRenderer`] draws them with wgpu, and the
//! `web` module mounts everything into a page when built for wasm32.

pub mod animation;
pub mod app;
pub mod assets;
pub mod camera;
pub mod composer;
pub mod config;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod input;
pub mod material;
pub mod mount;
pub mod render;
pub mod scene;
pub mod typeface;
pub mod viewer;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use animation::{AnimationLoop, LoopHandle};
pub use app::{print_final_state, LoadedAssets, SceneSummary};
pub use assets::{AssetSource, FileSource};
pub use composer::{Composer, FrameSink, RecordingSink, Viewport};
pub use config::ViewerConfig;
pub use environment::{EnvironmentMap, EnvironmentSlot};
pub use error::{LoadError, LoadResult};
pub use input::{InputController, KeyCode, NamedKey};
pub use mount::{Host, HostEvent, HostEventKind, Mount};
pub use render::GpuRenderer;
pub use scene::{Scene, Stage};
pub use typeface::Typeface;
pub use viewer::Viewer;
