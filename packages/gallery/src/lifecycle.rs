//! Mount/unmount coordination for one gallery instance.
//!
//! Activation order: particle field, scene composer, async gallery load,
//! input listeners, frame loop. Deactivation cancels the load token first so
//! an in-flight fetch that resolves later is discarded, then stops the loop,
//! detaches listeners and releases both surfaces.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::composer::{RenderSurface, SceneComposer};
use crate::config::GalleryConfig;
use crate::gallery::{load_gallery, materialize};
use crate::host::{EventKind, Host, InputEvent, ListenerId};
use crate::particle_field::ParticleField;
use crate::picking::route_pointer_down;
use crate::scheduler::{animate, AnimationClock, FrameScheduler};

/// Shared "still wanted" flag for asynchronous work.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Rc<Cell<bool>>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

struct ActiveGallery<H: Host + 'static, S: RenderSurface + 'static> {
    token: CancellationToken,
    composer: Rc<RefCell<SceneComposer<S>>>,
    scheduler: FrameScheduler<H>,
    clock: AnimationClock,
    listeners: Vec<ListenerId>,
}

/// One mounted gallery.
pub struct GalleryLifecycle<H: Host + 'static, S: RenderSurface + 'static> {
    host: Rc<H>,
    config: Rc<GalleryConfig>,
    active: Option<ActiveGallery<H, S>>,
}

impl<H: Host + 'static, S: RenderSurface + 'static> GalleryLifecycle<H, S> {
    pub fn new(host: Rc<H>, config: GalleryConfig) -> Self {
        Self { host, config: Rc::new(config), active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn config(&self) -> &GalleryConfig {
        &self.config
    }

    /// Bring the gallery up on the two given surfaces. A second call while
    /// active releases the extra surfaces and changes nothing.
    pub fn activate(&mut self, ambient_surface: S, gallery_surface: S) {
        if self.active.is_some() {
            log::warn!("Gallery already active; ignoring second activation");
            let (mut a, mut g) = (ambient_surface, gallery_surface);
            a.release();
            g.release();
            return;
        }

        let particles = {
            let mut rng = match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            ParticleField::generate(&self.config.particles, &mut rng)
        };

        let viewport = self.host.viewport();
        let composer = Rc::new(RefCell::new(SceneComposer::initialize(
            &self.config,
            viewport,
            particles,
            ambient_surface,
            gallery_surface,
        )));

        let token = CancellationToken::new();
        self.spawn_load(&composer, &token);

        let listeners = self.register_listeners(&composer, &token);

        let clock = AnimationClock::new();
        let scheduler = {
            let composer = composer.clone();
            let clock = clock.clone();
            let spin = self.config.gallery_spin;
            FrameScheduler::new(
                self.host.clone(),
                Box::new(move |timestamp| {
                    let elapsed = clock.advance(timestamp);
                    let mut composer = composer.borrow_mut();
                    let (ambient, gallery) = composer.scenes_mut();
                    animate(ambient, gallery, elapsed, spin);
                    composer.render_frame();
                }),
            )
        };
        scheduler.start();

        log::info!(
            "Gallery activated ({}x{} @{}x)",
            viewport.width,
            viewport.height,
            viewport.pixel_ratio
        );
        self.active = Some(ActiveGallery { token, composer, scheduler, clock, listeners });
    }

    /// Tear everything down. Safe to call repeatedly and before the records
    /// fetch has resolved.
    pub fn deactivate(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        active.token.cancel();
        active.scheduler.stop();
        for id in &active.listeners {
            self.host.unlisten(*id);
        }
        active.composer.borrow_mut().release();
        log::info!("Gallery deactivated after {} frames", active.clock.ticks());
    }

    /// Handle to the live composer, if active.
    pub fn composer(&self) -> Option<Rc<RefCell<SceneComposer<S>>>> {
        self.active.as_ref().map(|a| a.composer.clone())
    }

    /// Handle to the animation clock, if active. Keeps reading after
    /// deactivation.
    pub fn clock(&self) -> Option<AnimationClock> {
        self.active.as_ref().map(|a| a.clock.clone())
    }

    fn spawn_load(&self, composer: &Rc<RefCell<SceneComposer<S>>>, token: &CancellationToken) {
        let source = self.host.record_source();
        let host: Weak<H> = Rc::downgrade(&self.host);
        let composer = Rc::downgrade(composer);
        let token = token.clone();
        let config = self.config.clone();

        self.host.spawn_local(Box::pin(async move {
            let report = load_gallery(&source, &token, |batch| {
                let (Some(host), Some(composer)) = (host.upgrade(), composer.upgrade()) else {
                    return 0;
                };
                let mut composer = composer.borrow_mut();
                materialize(batch, &config, &*host, &mut composer.gallery_mut().items)
            })
            .await;

            if let (Some(report), Some(host)) = (report, host.upgrade()) {
                host.loading_complete(report);
            }
        }));
    }

    fn register_listeners(
        &self,
        composer: &Rc<RefCell<SceneComposer<S>>>,
        token: &CancellationToken,
    ) -> Vec<ListenerId> {
        let mut ids = Vec::new();

        for kind in [EventKind::PointerDown, EventKind::PointerMove, EventKind::PointerUp, EventKind::Wheel] {
            let host: Weak<H> = Rc::downgrade(&self.host);
            let composer = Rc::downgrade(composer);
            let token = token.clone();
            let handler = Box::new(move |event: InputEvent| {
                if token.is_cancelled() {
                    return;
                }
                let (Some(host), Some(composer)) = (host.upgrade(), composer.upgrade()) else {
                    return;
                };
                let mut composer = composer.borrow_mut();
                if let InputEvent::PointerDown { x, y } = event {
                    let gallery = composer.gallery();
                    route_pointer_down(
                        &*host,
                        &gallery.state.camera,
                        &gallery.items,
                        &host.surface_rect(),
                        x,
                        y,
                    );
                }
                composer.handle_input(event);
            });
            match self.host.listen(kind, handler) {
                Some(id) => ids.push(id),
                None => log::warn!("Host refused {:?} listener", kind),
            }
        }

        let host: Weak<H> = Rc::downgrade(&self.host);
        let composer = Rc::downgrade(composer);
        let token = token.clone();
        let on_resize = Box::new(move |_event: InputEvent| {
            if token.is_cancelled() {
                return;
            }
            if let (Some(host), Some(composer)) = (host.upgrade(), composer.upgrade()) {
                let viewport = host.viewport();
                if !composer.borrow_mut().resize(viewport) {
                    log::debug!("Ignoring resize to {}x{}", viewport.width, viewport.height);
                }
            }
        });
        match self.host.listen(EventKind::Resize, on_resize) {
            Some(id) => ids.push(id),
            None => log::warn!("Host refused resize listener"),
        }

        ids
    }
}

impl<H: Host + 'static, S: RenderSurface + 'static> Drop for GalleryLifecycle<H, S> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
