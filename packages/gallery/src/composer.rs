//! Two scenes, two surfaces, one viewport.
//!
//! The ambient backdrop renders first into its own surface; the gallery
//! renders second into a surface with a transparent clear so the backdrop
//! shows through. Only the gallery camera takes orbit input.

use crate::camera::OrbitControls;
use crate::config::GalleryConfig;
use crate::host::{InputEvent, Viewport};
use crate::particle_field::ParticleField;
use crate::scene_graph::{AmbientScene, GalleryScene};

/// What a surface is asked to draw.
///
/// The ambient frame is mutable so the backend can consume the particle
/// buffer's dirty flag when it uploads.
pub enum SceneFrame<'a> {
    Ambient(&'a mut AmbientScene),
    Gallery(&'a GalleryScene),
}

/// A render target attached to the host container.
pub trait RenderSurface {
    /// Resize the backing store. Never called with an empty viewport.
    fn resize(&mut self, viewport: Viewport);

    fn render(&mut self, frame: SceneFrame<'_>);

    /// Detach from the container and free GPU resources.
    fn release(&mut self);
}

/// Owner of both scene graphs and their surfaces.
pub struct SceneComposer<S: RenderSurface> {
    ambient: AmbientScene,
    gallery: GalleryScene,
    ambient_surface: S,
    gallery_surface: S,
    controls: OrbitControls,
    viewport: Viewport,
    released: bool,
}

impl<S: RenderSurface> SceneComposer<S> {
    /// Build both scenes and size both surfaces to `viewport`.
    ///
    /// An empty viewport still yields usable scenes (aspect 1); the first
    /// non-empty resize fixes them up.
    pub fn initialize(
        config: &GalleryConfig,
        viewport: Viewport,
        particles: ParticleField,
        mut ambient_surface: S,
        mut gallery_surface: S,
    ) -> Self {
        let aspect = if viewport.is_empty() { 1.0 } else { viewport.aspect() };
        if !viewport.is_empty() {
            ambient_surface.resize(viewport);
            gallery_surface.resize(viewport);
        } else {
            log::warn!("Gallery container has no area yet ({}x{})", viewport.width, viewport.height);
        }

        Self {
            ambient: AmbientScene::new(config, particles, aspect),
            gallery: GalleryScene::new(config, aspect),
            ambient_surface,
            gallery_surface,
            controls: OrbitControls::new(&config.orbit),
            viewport,
            released: false,
        }
    }

    /// Resize both surfaces and both cameras together. Returns false (and
    /// changes nothing) for an empty viewport or after release.
    pub fn resize(&mut self, viewport: Viewport) -> bool {
        if self.released || viewport.is_empty() {
            return false;
        }
        let aspect = viewport.aspect();
        self.ambient.state.camera.set_aspect(aspect);
        self.gallery.state.camera.set_aspect(aspect);
        self.ambient_surface.resize(viewport);
        self.gallery_surface.resize(viewport);
        self.viewport = viewport;
        true
    }

    /// Apply orbit input, then render ambient and gallery, in that order.
    pub fn render_frame(&mut self) {
        if self.released {
            return;
        }
        self.controls.update(&mut self.gallery.state.camera);
        self.ambient_surface.render(SceneFrame::Ambient(&mut self.ambient));
        self.gallery_surface.render(SceneFrame::Gallery(&self.gallery));
    }

    /// Feed pointer and wheel input to the gallery orbit controls.
    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::PointerDown { x, y } => self.controls.begin_drag(x, y),
            InputEvent::PointerMove { x, y } => {
                self.controls.drag_to(x, y, self.viewport.height)
            }
            InputEvent::PointerUp => self.controls.end_drag(),
            InputEvent::Wheel { delta_y } => self.controls.wheel(delta_y),
            InputEvent::Resize => {}
        }
    }

    /// Release both surfaces. Idempotent.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.ambient_surface.release();
        self.gallery_surface.release();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn ambient(&self) -> &AmbientScene {
        &self.ambient
    }

    pub fn gallery(&self) -> &GalleryScene {
        &self.gallery
    }

    /// Both scenes at once, for the per-tick animation.
    pub fn scenes_mut(&mut self) -> (&mut AmbientScene, &mut GalleryScene) {
        (&mut self.ambient, &mut self.gallery)
    }

    pub fn gallery_mut(&mut self) -> &mut GalleryScene {
        &mut self.gallery
    }

    pub fn surfaces(&self) -> (&S, &S) {
        (&self.ambient_surface, &self.gallery_surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[derive(Debug, Default)]
    struct RecordingSurface {
        size: Option<(f32, f32)>,
        frames: Vec<&'static str>,
        released: u32,
    }

    impl RenderSurface for RecordingSurface {
        fn resize(&mut self, viewport: Viewport) {
            self.size = Some((viewport.width, viewport.height));
        }

        fn render(&mut self, frame: SceneFrame<'_>) {
            self.frames.push(match frame {
                SceneFrame::Ambient(scene) => {
                    scene.particles.take_dirty();
                    "ambient"
                }
                SceneFrame::Gallery(_) => "gallery",
            });
        }

        fn release(&mut self) {
            self.released += 1;
        }
    }

    fn composer(viewport: Viewport) -> SceneComposer<RecordingSurface> {
        let config = GalleryConfig::default();
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let particles = ParticleField::generate(&config.particles, &mut rng);
        SceneComposer::initialize(
            &config,
            viewport,
            particles,
            RecordingSurface::default(),
            RecordingSurface::default(),
        )
    }

    #[test]
    fn test_initialize_sizes_both() {
        let c = composer(Viewport::new(800.0, 400.0, 1.0));
        let (a, g) = c.surfaces();
        assert_eq!(a.size, Some((800.0, 400.0)));
        assert_eq!(g.size, Some((800.0, 400.0)));
        assert_eq!(c.ambient().state.camera.aspect, 2.0);
        assert_eq!(c.gallery().state.camera.aspect, 2.0);
    }

    #[test]
    fn test_resize_updates_both_cameras() {
        let mut c = composer(Viewport::new(800.0, 400.0, 1.0));
        assert!(c.resize(Viewport::new(300.0, 600.0, 2.0)));
        assert_eq!(c.ambient().state.camera.aspect, 0.5);
        assert_eq!(c.gallery().state.camera.aspect, 0.5);
        assert!(c.resize(Viewport::new(300.0, 600.0, 2.0)));
        assert_eq!(c.surfaces().1.size, Some((300.0, 600.0)));
    }

    #[test]
    fn test_zero_area_resize_is_noop() {
        let mut c = composer(Viewport::new(800.0, 400.0, 1.0));
        assert!(!c.resize(Viewport::new(0.0, 400.0, 1.0)));
        assert!(!c.resize(Viewport::new(800.0, 0.0, 1.0)));
        assert_eq!(c.gallery().state.camera.aspect, 2.0);
        assert_eq!(c.surfaces().0.size, Some((800.0, 400.0)));
        assert_eq!(c.viewport().width, 800.0);
    }

    #[test]
    fn test_render_order_ambient_first() {
        let mut c = composer(Viewport::new(800.0, 400.0, 1.0));
        c.render_frame();
        let (a, g) = c.surfaces();
        assert_eq!(a.frames, vec!["ambient"]);
        assert_eq!(g.frames, vec!["gallery"]);
    }

    #[test]
    fn test_release_idempotent_and_final() {
        let mut c = composer(Viewport::new(800.0, 400.0, 1.0));
        c.release();
        c.release();
        c.render_frame();
        assert!(!c.resize(Viewport::new(10.0, 10.0, 1.0)));
        let (a, g) = c.surfaces();
        assert_eq!((a.released, g.released), (1, 1));
        assert!(a.frames.is_empty());
    }

    #[test]
    fn test_wheel_dollies_gallery_camera_only() {
        let mut c = composer(Viewport::new(800.0, 400.0, 1.0));
        let before = c.gallery().state.camera.position.length();
        c.handle_input(InputEvent::Wheel { delta_y: -100.0 });
        c.render_frame();
        let after = c.gallery().state.camera.position.length();
        assert!(after < before);
        assert_eq!(c.ambient().state.camera.position.z, 12.0);
    }
}
