//! Display-refresh driven frame loop.
//!
//! Each tick runs the caller's update+render closure and then re-submits itself
//! to the [`FramePacer`]. `stop()` cancels the pending request and bumps a
//! generation counter that every callback checks before doing any work, so a
//! callback the pacer fails to cancel is still inert.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::host::{FramePacer, FrameRequestId};
use crate::scene_graph::{AmbientScene, GalleryScene};

/// Per-tick work. Receives the refresh timestamp in milliseconds.
pub type TickFn = Box<dyn FnMut(f64)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct Inner<P: FramePacer> {
    pacer: Rc<P>,
    state: Cell<SchedulerState>,
    generation: Cell<u64>,
    pending: Cell<Option<FrameRequestId>>,
    tick: RefCell<TickFn>,
}

/// Self-rescheduling animation loop.
pub struct FrameScheduler<P: FramePacer + 'static> {
    inner: Rc<Inner<P>>,
}

impl<P: FramePacer + 'static> FrameScheduler<P> {
    pub fn new(pacer: Rc<P>, tick: TickFn) -> Self {
        Self {
            inner: Rc::new(Inner {
                pacer,
                state: Cell::new(SchedulerState::Stopped),
                generation: Cell::new(0),
                pending: Cell::new(None),
                tick: RefCell::new(tick),
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SchedulerState::Running
    }

    /// Stopped → Running. No-op if already running.
    pub fn start(&self) {
        if self.is_running() {
            return;
        }
        self.inner.state.set(SchedulerState::Running);
        let generation = self.inner.generation.get() + 1;
        self.inner.generation.set(generation);
        request_next(&self.inner, generation);
    }

    /// Running → Stopped. Cancels the pending callback; no tick runs after
    /// this returns.
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        self.inner.state.set(SchedulerState::Stopped);
        self.inner.generation.set(self.inner.generation.get() + 1);
        if let Some(id) = self.inner.pending.take() {
            self.inner.pacer.cancel_frame(id);
        }
    }
}

impl<P: FramePacer + 'static> Drop for FrameScheduler<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn request_next<P: FramePacer + 'static>(inner: &Rc<Inner<P>>, generation: u64) {
    let weak: Weak<Inner<P>> = Rc::downgrade(inner);
    let id = inner.pacer.request_frame(Box::new(move |timestamp| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.state.get() != SchedulerState::Running || inner.generation.get() != generation {
            return;
        }
        inner.pending.set(None);

        (&mut *inner.tick.borrow_mut())(timestamp);

        // The tick itself may have stopped the loop.
        if inner.state.get() == SchedulerState::Running && inner.generation.get() == generation {
            request_next(&inner, generation);
        }
    }));

    if id.is_none() {
        log::warn!("Host refused an animation frame; loop stalled");
    }
    inner.pending.set(id);
}

/// Elapsed-time clock sampled once per tick.
///
/// Clones share state, so a handle kept outside the loop observes ticks.
#[derive(Debug, Clone, Default)]
pub struct AnimationClock {
    origin_ms: Rc<Cell<Option<f64>>>,
    elapsed: Rc<Cell<f32>>,
    ticks: Rc<Cell<u64>>,
}

impl AnimationClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample a refresh timestamp. The first sample defines time zero.
    /// Returns elapsed seconds.
    pub fn advance(&self, timestamp_ms: f64) -> f32 {
        let origin = match self.origin_ms.get() {
            Some(origin) => origin,
            None => {
                self.origin_ms.set(Some(timestamp_ms));
                timestamp_ms
            }
        };
        let elapsed = ((timestamp_ms - origin).max(0.0) / 1000.0) as f32;
        self.elapsed.set(elapsed);
        self.ticks.set(self.ticks.get() + 1);
        elapsed
    }

    /// Elapsed seconds at the last sample.
    pub fn elapsed(&self) -> f32 {
        self.elapsed.get()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.get()
    }
}

/// Procedural animation for one tick: particle drift, ring spin and the slow
/// gallery spin (added on top of whatever the orbit controls do).
pub fn animate(ambient: &mut AmbientScene, gallery: &mut GalleryScene, elapsed: f32, gallery_spin: f32) {
    ambient.particles.drift(elapsed);
    ambient.ring.spin();
    gallery.items.rotation.y += gallery_spin;
}
