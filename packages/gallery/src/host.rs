//! Capabilities the gallery borrows from its host environment.
//!
//! In the browser these are backed by `web-sys` (see `wasm.rs`); tests provide
//! in-memory fakes. The core never touches the DOM directly.

use std::future::Future;
use std::pin::Pin;

use crate::error::FetchError;
use crate::texture::TextureSlot;

/// Callback invoked with the display-refresh timestamp in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Handler for one kind of input event.
pub type EventHandler = Box<dyn FnMut(InputEvent)>;

/// A future run to completion on the host's single cooperative thread.
pub type LocalTask = Pin<Box<dyn Future<Output = ()>>>;

/// Token returned by [`FramePacer::request_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequestId(pub i64);

/// Token returned by [`EventSource::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Container size in CSS pixels plus the device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub pixel_ratio: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32, pixel_ratio: f32) -> Self {
        Self { width, height, pixel_ratio }
    }

    /// Zero (or nonsensical) area; resizing to this is a no-op.
    pub fn is_empty(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0
    }

    pub fn aspect(&self) -> f32 {
        self.width / self.height
    }

    /// Backing-store size for a render surface, with the pixel ratio capped.
    pub fn physical_size(&self, max_pixel_ratio: f32) -> (u32, u32) {
        let ratio = if self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0 {
            self.pixel_ratio.min(max_pixel_ratio)
        } else {
            1.0
        };
        (
            ((self.width * ratio).round() as u32).max(1),
            ((self.height * ratio).round() as u32).max(1),
        )
    }
}

/// Bounding box of the gallery render surface in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    Wheel,
    Resize,
}

/// Input delivered to gallery handlers. Coordinates are client pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp,
    Wheel { delta_y: f32 },
    Resize,
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InputEvent::PointerDown { .. } => EventKind::PointerDown,
            InputEvent::PointerMove { .. } => EventKind::PointerMove,
            InputEvent::PointerUp => EventKind::PointerUp,
            InputEvent::Wheel { .. } => EventKind::Wheel,
            InputEvent::Resize => EventKind::Resize,
        }
    }
}

/// Outcome of one gallery load, reported once to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Entries the endpoint returned, before the cap.
    pub fetched: usize,
    /// Planes actually added to the gallery.
    pub materialized: usize,
    pub failed: bool,
}

/// Display-refresh scheduling (`requestAnimationFrame` in the browser).
pub trait FramePacer {
    /// Schedule `callback` for the next refresh. `None` if the host refused.
    fn request_frame(&self, callback: FrameCallback) -> Option<FrameRequestId>;

    /// Prevent a scheduled callback from firing. Unknown ids are ignored.
    fn cancel_frame(&self, id: FrameRequestId);
}

/// Input and resize event registration.
pub trait EventSource {
    fn listen(&self, kind: EventKind, handler: EventHandler) -> Option<ListenerId>;
    fn unlisten(&self, id: ListenerId);
}

/// Opening links outside the gallery.
pub trait Navigator {
    /// Open `url` in a new browsing context.
    fn open_in_new_context(&self, url: &str);
}

/// Fire-and-forget texture loading.
pub trait ImageLoader {
    /// Start fetching and decoding `url`; fill or fail `slot` when done.
    fn load_image(&self, url: &str, slot: TextureSlot);
}

/// The read-only records endpoint.
#[allow(async_fn_in_trait)]
pub trait RecordSource {
    /// Fetch the raw payload body.
    async fn fetch_payload(&self) -> Result<String, FetchError>;
}

/// Everything a mounted gallery needs from its environment.
pub trait Host: FramePacer + EventSource + Navigator + ImageLoader {
    type Source: RecordSource + 'static;

    /// Current container size.
    fn viewport(&self) -> Viewport;

    /// Current bounding box of the gallery surface.
    fn surface_rect(&self) -> SurfaceRect;

    fn record_source(&self) -> Self::Source;

    fn spawn_local(&self, task: LocalTask);

    /// Clears the host's loading indicator.
    fn loading_complete(&self, report: LoadReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_empty() {
        assert!(Viewport::new(0.0, 600.0, 1.0).is_empty());
        assert!(Viewport::new(800.0, 0.0, 1.0).is_empty());
        assert!(Viewport::new(f32::NAN, 10.0, 1.0).is_empty());
        assert!(!Viewport::new(800.0, 600.0, 1.0).is_empty());
    }

    #[test]
    fn test_physical_size_caps_ratio() {
        let vp = Viewport::new(400.0, 300.0, 3.0);
        assert_eq!(vp.physical_size(2.0), (800, 600));
        let vp = Viewport::new(400.0, 300.0, 1.5);
        assert_eq!(vp.physical_size(2.0), (600, 450));
        let vp = Viewport::new(400.0, 300.0, 0.0);
        assert_eq!(vp.physical_size(2.0), (400, 300));
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(InputEvent::PointerDown { x: 1.0, y: 2.0 }.kind(), EventKind::PointerDown);
        assert_eq!(InputEvent::Wheel { delta_y: 1.0 }.kind(), EventKind::Wheel);
        assert_eq!(InputEvent::Resize.kind(), EventKind::Resize);
    }
}
