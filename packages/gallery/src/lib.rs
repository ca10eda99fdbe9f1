pub mod camera;
pub mod composer;
pub mod config;
pub mod error;
pub mod gallery;
pub mod gpu;
pub mod host;
pub mod lifecycle;
pub mod particle_field;
pub mod picking;
pub mod records;
pub mod scene_graph;
pub mod scheduler;
pub mod texture;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use composer::{RenderSurface, SceneComposer, SceneFrame};
pub use config::GalleryConfig;
pub use host::Host;
pub use lifecycle::{CancellationToken, GalleryLifecycle};
