//! Lazily filled texture slots shared between the loader and the renderer.
//!
//! A slot starts `Pending`. The host's image loader fills it with decoded
//! RGBA pixels at some later point (or marks it failed); the gallery renderer
//! takes the pixels on its next frame, uploads them and leaves the slot
//! `Uploaded`. Until then the plane renders with a placeholder.

use std::cell::RefCell;
use std::rc::Rc;

/// Decoded 8-bit RGBA image, rows top to bottom.
#[derive(Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.rgba.len())
            .finish()
    }
}

impl DecodedImage {
    /// Decode any format the `image` crate was built with.
    pub fn decode(bytes: &[u8]) -> anyhow::Result<Self> {
        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self { width, height, rgba: rgba.into_raw() })
    }

    /// Downscale (keeping aspect) so neither side exceeds `max_dimension`.
    pub fn fit_within(self, max_dimension: u32) -> Self {
        if self.width <= max_dimension && self.height <= max_dimension {
            return self;
        }
        let Some(buffer) = image::RgbaImage::from_raw(self.width, self.height, self.rgba) else {
            return Self { width: 1, height: 1, rgba: vec![0, 0, 0, 255] };
        };
        let scale = max_dimension as f32 / self.width.max(self.height) as f32;
        let target_width = ((self.width as f32 * scale).round() as u32).clamp(1, max_dimension);
        let target_height = ((self.height as f32 * scale).round() as u32).clamp(1, max_dimension);
        let scaled = image::imageops::thumbnail(&buffer, target_width, target_height);
        let (width, height) = scaled.dimensions();
        Self { width, height, rgba: scaled.into_raw() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TextureState {
    Pending,
    Decoded(DecodedImage),
    Uploaded,
    Failed,
}

/// Shared handle to one plane's texture state.
#[derive(Debug, Clone)]
pub struct TextureSlot(Rc<RefCell<TextureState>>);

impl Default for TextureSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureSlot {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(TextureState::Pending)))
    }

    pub fn state(&self) -> TextureState {
        self.0.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.0.borrow(), TextureState::Pending)
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(*self.0.borrow(), TextureState::Uploaded)
    }

    /// Store decoded pixels. Ignored once the slot has been uploaded.
    pub fn fill(&self, image: DecodedImage) {
        let mut state = self.0.borrow_mut();
        if !matches!(*state, TextureState::Uploaded) {
            *state = TextureState::Decoded(image);
        }
    }

    pub fn fail(&self) {
        let mut state = self.0.borrow_mut();
        if matches!(*state, TextureState::Pending) {
            *state = TextureState::Failed;
        }
    }

    /// Take decoded pixels for upload, leaving the slot `Uploaded`.
    pub fn take_for_upload(&self) -> Option<DecodedImage> {
        let mut state = self.0.borrow_mut();
        if !matches!(*state, TextureState::Decoded(_)) {
            return None;
        }
        match std::mem::replace(&mut *state, TextureState::Uploaded) {
            TextureState::Decoded(image) => Some(image),
            _ => None,
        }
    }
}
