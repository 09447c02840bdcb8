use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use anyhow::Result;
use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::composer::{Composer, FrameSink};
use crate::scene::Stage;

/// Cancels an [`AnimationLoop`] from outside the frame callback.
#[derive(Clone, Default)]
pub struct LoopHandle {
    state: Rc<LoopState>,
}

#[derive(Default)]
struct LoopState {
    cancelled: Cell<bool>,
    on_cancel: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl LoopHandle {
    /// Stops the loop and runs the registered cancel hooks once.
    pub fn cancel(&self) {
        if self.state.cancelled.replace(true) {
            return;
        }
        let hooks = std::mem::take(&mut *self.state.on_cancel.borrow_mut());
        for hook in hooks {
            hook();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.get()
    }

    /// Registers work to run on cancellation, such as dropping a pending
    /// frame request. Runs immediately if the loop is already cancelled.
    pub fn on_cancel(&self, hook: impl FnOnce() + 'static) {
        if self.is_cancelled() {
            hook();
        } else {
            self.state.on_cancel.borrow_mut().push(Box::new(hook));
        }
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Per-frame work: jitter the cube, then compose one frame.
#[derive(Debug)]
pub struct AnimationLoop<R = SmallRng> {
    rng: R,
    jitter: f32,
    handle: LoopHandle,
    frames: u64,
}

impl AnimationLoop<SmallRng> {
    /// Loop seeded from the clock.
    pub fn start(jitter: f32) -> (Self, LoopHandle) {
        Self::with_rng(SmallRng::seed_from_u64(clock_seed()), jitter)
    }
}

impl<R: Rng> AnimationLoop<R> {
    pub fn with_rng(rng: R, jitter: f32) -> (Self, LoopHandle) {
        let handle = LoopHandle::default();
        let animation = Self {
            rng,
            jitter,
            handle: handle.clone(),
            frames: 0,
        };
        (animation, handle)
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_cancelled()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Runs one frame. Returns `Ok(false)` once the loop was cancelled, in
    /// which case nothing is touched.
    pub fn tick(&mut self, stage: &mut Stage, composer: &Composer, sink: &mut dyn FrameSink) -> Result<bool> {
        if self.handle.is_cancelled() {
            return Ok(false);
        }
        let jitter = self.jitter;
        if let Some(transform) = stage.cube_transform_mut() {
            transform.rotation += random_offset(&mut self.rng, jitter);
        }
        composer.render(stage, sink)?;
        self.frames += 1;
        Ok(true)
    }
}

/// Independent offsets in `[-amplitude, amplitude]` for each axis.
pub fn random_offset<R: Rng>(rng: &mut R, amplitude: f32) -> Vec3 {
    if amplitude <= 0.0 {
        return Vec3::ZERO;
    }
    Vec3::new(
        rng.random_range(-amplitude..=amplitude),
        rng.random_range(-amplitude..=amplitude),
        rng.random_range(-amplitude..=amplitude),
    )
}

#[cfg(not(target_arch = "wasm32"))]
fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0x5eed)
}

#[cfg(target_arch = "wasm32")]
fn clock_seed() -> u64 {
    (js_sys::Date::now() * 1000.0) as u64
}
