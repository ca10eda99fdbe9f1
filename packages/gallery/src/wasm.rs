//! Browser entry point: `web-sys` backed host capabilities and canvas surfaces.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{EventTarget, HtmlCanvasElement, HtmlElement, Window};

use crate::composer::{RenderSurface, SceneFrame};
use crate::config::GalleryConfig;
use crate::error::{FetchError, FetchErrorKind};
use crate::gpu::renderer::{LoadMode, SceneRenderer};
use crate::host::{
    EventHandler, EventKind, EventSource, FrameCallback, FramePacer, FrameRequestId, Host,
    ImageLoader, InputEvent, ListenerId, LoadReport, LocalTask, Navigator, RecordSource,
    SurfaceRect, Viewport,
};
use crate::lifecycle::GalleryLifecycle;
use crate::records;
use crate::texture::{DecodedImage, TextureSlot};

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

fn js_error(context: &str, value: JsValue) -> JsValue {
    JsValue::from_str(&format!("{}: {:?}", context, value))
}

fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))
}

// ============================================================================
// Canvas Surface
// ============================================================================

/// One absolutely positioned canvas with its own GPU device.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    renderer: SceneRenderer,
    max_pixel_ratio: f32,
}

impl CanvasSurface {
    /// Create a canvas, append it to `container` and set up rendering.
    pub async fn create(
        container: &HtmlElement,
        label: &str,
        viewport: Viewport,
        max_pixel_ratio: f32,
    ) -> Result<Self, JsValue> {
        let document = window()?
            .document()
            .ok_or_else(|| JsValue::from_str("No document available"))?;
        let canvas: HtmlCanvasElement = document
            .create_element("canvas")
            .map_err(|e| js_error("Failed to create canvas", e))?
            .dyn_into()
            .map_err(|_| JsValue::from_str("Created element is not a canvas"))?;

        canvas.set_class_name(label);
        let style = canvas.style();
        style.set_property("position", "absolute")?;
        style.set_property("inset", "0")?;
        style.set_property("width", "100%")?;
        style.set_property("height", "100%")?;

        // Configuring a surface with a zero extent panics; the first real
        // resize fixes the size up.
        let (width, height) = viewport.physical_size(max_pixel_ratio);
        let (width, height) = (width.max(1), height.max(1));
        canvas.set_width(width);
        canvas.set_height(height);

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        let target = wgpu::SurfaceTarget::Canvas(canvas.clone());
        let surface = instance
            .create_surface(target)
            .map_err(|e| JsValue::from_str(&format!("Failed to create surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::None,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| JsValue::from_str("Failed to find an appropriate adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(label),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| JsValue::from_str(&format!("Failed to create device: {}", e)))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f: &wgpu::TextureFormat| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| JsValue::from_str("Surface reports no formats"))?;
        // Both layers need a see-through background.
        let alpha_mode = if surface_caps.alpha_modes.contains(&wgpu::CompositeAlphaMode::PreMultiplied) {
            wgpu::CompositeAlphaMode::PreMultiplied
        } else {
            surface_caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: surface_caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let renderer = SceneRenderer::new(
            std::sync::Arc::new(device),
            std::sync::Arc::new(queue),
            config.format,
            config.width,
            config.height,
            LoadMode::Clear(wgpu::Color::TRANSPARENT),
        );

        // Attach last so a failed setup leaves the container untouched.
        container.append_child(&canvas)?;
        Ok(Self { canvas, surface, config, renderer, max_pixel_ratio })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

impl RenderSurface for CanvasSurface {
    fn resize(&mut self, viewport: Viewport) {
        let (width, height) = viewport.physical_size(self.max_pixel_ratio);
        if width == 0 || height == 0 {
            return;
        }
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(self.renderer.device(), &self.config);
        self.renderer.resize(width, height);
    }

    fn render(&mut self, frame: SceneFrame<'_>) {
        match self.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.renderer.render(&view, frame);
                output.present();
            }
            Err(wgpu::SurfaceError::Lost) => {
                self.surface.configure(self.renderer.device(), &self.config);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Surface out of memory");
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
            }
        }
    }

    fn release(&mut self) {
        self.canvas.remove();
    }
}

// ============================================================================
// Web Host
// ============================================================================

struct Listener {
    target: EventTarget,
    event: &'static str,
    closure: Closure<dyn FnMut(web_sys::Event)>,
}

/// Records endpoint fetched with `window.fetch`.
pub struct WebRecordSource {
    endpoint: String,
}

impl RecordSource for WebRecordSource {
    async fn fetch_payload(&self) -> Result<String, FetchError> {
        let window = web_sys::window()
            .ok_or_else(|| FetchError::new(FetchErrorKind::Network, "no window"))?;
        let response: web_sys::Response = JsFuture::from(window.fetch_with_str(&self.endpoint))
            .await
            .map_err(|e| FetchError::new(FetchErrorKind::Network, format!("{:?}", e)))?
            .dyn_into()
            .map_err(|_| FetchError::new(FetchErrorKind::Network, "fetch did not yield a Response"))?;

        if !response.ok() {
            return Err(FetchError::status(response.status(), &self.endpoint));
        }

        let text = response
            .text()
            .map_err(|e| FetchError::new(FetchErrorKind::Body, format!("{:?}", e)))?;
        JsFuture::from(text)
            .await
            .map_err(|e| FetchError::new(FetchErrorKind::Body, format!("{:?}", e)))?
            .as_string()
            .ok_or_else(|| FetchError::new(FetchErrorKind::Decode, "response body is not text"))
    }
}

/// Host capabilities backed by the page's window and the gallery canvas.
pub struct WebHost {
    window: Window,
    container: HtmlElement,
    gallery_canvas: HtmlCanvasElement,
    endpoint: String,
    on_loaded: Option<js_sys::Function>,
    listeners: RefCell<HashMap<u64, Listener>>,
    next_listener: Cell<u64>,
}

impl WebHost {
    pub fn new(
        container: HtmlElement,
        gallery_canvas: HtmlCanvasElement,
        endpoint: String,
        on_loaded: Option<js_sys::Function>,
    ) -> Result<Self, JsValue> {
        Ok(Self {
            window: window()?,
            container,
            gallery_canvas,
            endpoint,
            on_loaded,
            listeners: RefCell::new(HashMap::new()),
            next_listener: Cell::new(1),
        })
    }

    fn target_for(&self, kind: EventKind) -> (EventTarget, &'static str) {
        let canvas: &EventTarget = self.gallery_canvas.as_ref();
        let window: &EventTarget = self.window.as_ref();
        match kind {
            EventKind::PointerDown => (canvas.clone(), "pointerdown"),
            EventKind::PointerMove => (canvas.clone(), "pointermove"),
            // Drags may end outside the canvas.
            EventKind::PointerUp => (window.clone(), "pointerup"),
            EventKind::Wheel => (canvas.clone(), "wheel"),
            EventKind::Resize => (window.clone(), "resize"),
        }
    }
}

fn translate_event(kind: EventKind, event: &web_sys::Event) -> Option<InputEvent> {
    match kind {
        EventKind::PointerDown | EventKind::PointerMove => {
            let mouse = event.dyn_ref::<web_sys::MouseEvent>()?;
            let (x, y) = (mouse.client_x() as f32, mouse.client_y() as f32);
            Some(if kind == EventKind::PointerDown {
                InputEvent::PointerDown { x, y }
            } else {
                InputEvent::PointerMove { x, y }
            })
        }
        EventKind::PointerUp => Some(InputEvent::PointerUp),
        EventKind::Wheel => {
            let wheel = event.dyn_ref::<web_sys::WheelEvent>()?;
            event.prevent_default();
            Some(InputEvent::Wheel { delta_y: wheel.delta_y() as f32 })
        }
        EventKind::Resize => Some(InputEvent::Resize),
    }
}

impl FramePacer for WebHost {
    fn request_frame(&self, callback: FrameCallback) -> Option<FrameRequestId> {
        let closure = Closure::once_into_js(move |timestamp: f64| callback(timestamp));
        match self.window.request_animation_frame(closure.unchecked_ref()) {
            Ok(id) => Some(FrameRequestId(id as i64)),
            Err(e) => {
                log::error!("requestAnimationFrame failed: {:?}", e);
                None
            }
        }
    }

    fn cancel_frame(&self, id: FrameRequestId) {
        if let Err(e) = self.window.cancel_animation_frame(id.0 as i32) {
            log::warn!("cancelAnimationFrame failed: {:?}", e);
        }
    }
}

impl EventSource for WebHost {
    fn listen(&self, kind: EventKind, mut handler: EventHandler) -> Option<ListenerId> {
        let (target, event) = self.target_for(kind);
        let closure = Closure::wrap(Box::new(move |e: web_sys::Event| {
            if let Some(input) = translate_event(kind, &e) {
                handler(input);
            }
        }) as Box<dyn FnMut(web_sys::Event)>);

        if let Err(e) = target.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref()) {
            log::error!("Failed to add {} listener: {:?}", event, e);
            return None;
        }

        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().insert(id, Listener { target, event, closure });
        Some(ListenerId(id))
    }

    fn unlisten(&self, id: ListenerId) {
        let Some(listener) = self.listeners.borrow_mut().remove(&id.0) else {
            return;
        };
        if let Err(e) = listener
            .target
            .remove_event_listener_with_callback(listener.event, listener.closure.as_ref().unchecked_ref())
        {
            log::warn!("Failed to remove {} listener: {:?}", listener.event, e);
        }
    }
}

impl Navigator for WebHost {
    fn open_in_new_context(&self, url: &str) {
        if let Err(e) = self.window.open_with_url_and_target(url, "_blank") {
            log::warn!("Failed to open {}: {:?}", url, e);
        }
    }
}

async fn fetch_image(url: &str) -> Result<DecodedImage, JsValue> {
    let response: web_sys::Response = JsFuture::from(window()?.fetch_with_str(url)).await?.dyn_into()?;
    if !response.ok() {
        return Err(JsValue::from_str(&format!("status {}", response.status())));
    }
    let buffer = JsFuture::from(response.array_buffer()?).await?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    DecodedImage::decode(&bytes).map_err(|e| JsValue::from_str(&e.to_string()))
}

impl ImageLoader for WebHost {
    fn load_image(&self, url: &str, slot: TextureSlot) {
        let url = url.to_string();
        wasm_bindgen_futures::spawn_local(async move {
            match fetch_image(&url).await {
                Ok(image) => slot.fill(image),
                Err(e) => {
                    log::warn!("Texture {} failed to load: {:?}", url, e);
                    slot.fail();
                }
            }
        });
    }
}

impl Host for WebHost {
    type Source = WebRecordSource;

    fn viewport(&self) -> Viewport {
        Viewport::new(
            self.container.client_width() as f32,
            self.container.client_height() as f32,
            self.window.device_pixel_ratio() as f32,
        )
    }

    fn surface_rect(&self) -> SurfaceRect {
        let rect = self.gallery_canvas.get_bounding_client_rect();
        SurfaceRect {
            left: rect.left() as f32,
            top: rect.top() as f32,
            width: rect.width() as f32,
            height: rect.height() as f32,
        }
    }

    fn record_source(&self) -> WebRecordSource {
        WebRecordSource { endpoint: self.endpoint.clone() }
    }

    fn spawn_local(&self, task: LocalTask) {
        wasm_bindgen_futures::spawn_local(task);
    }

    fn loading_complete(&self, report: LoadReport) {
        let Some(callback) = &self.on_loaded else {
            return;
        };
        let payload = js_sys::Object::new();
        let _ = js_sys::Reflect::set(&payload, &"fetched".into(), &(report.fetched as u32).into());
        let _ = js_sys::Reflect::set(&payload, &"materialized".into(), &(report.materialized as u32).into());
        let _ = js_sys::Reflect::set(&payload, &"failed".into(), &report.failed.into());
        if let Err(e) = callback.call1(&JsValue::NULL, &payload) {
            log::warn!("onLoaded callback threw: {:?}", e);
        }
    }
}

// ============================================================================
// Exports
// ============================================================================

/// A mounted gallery. Call `unmount()` when the container goes away.
#[wasm_bindgen]
pub struct GalleryHandle {
    lifecycle: Option<GalleryLifecycle<WebHost, CanvasSurface>>,
}

#[wasm_bindgen]
impl GalleryHandle {
    pub fn unmount(&mut self) {
        if let Some(mut lifecycle) = self.lifecycle.take() {
            lifecycle.deactivate();
        }
    }

    #[wasm_bindgen(getter)]
    pub fn active(&self) -> bool {
        self.lifecycle.as_ref().is_some_and(|l| l.is_active())
    }
}

/// Mount the gallery into `container`.
///
/// `config_json` may override any tuning constant; `on_loaded` is called once
/// with `{ fetched, materialized, failed }` when the records have been placed.
#[wasm_bindgen]
pub async fn mount_gallery(
    container: HtmlElement,
    config_json: Option<String>,
    on_loaded: Option<js_sys::Function>,
) -> Result<GalleryHandle, JsValue> {
    init_panic_hook();

    let config = match config_json.as_deref() {
        Some(json) => GalleryConfig::from_json(json).map_err(|e| JsValue::from_str(&format!("Invalid gallery config: {:#}", e)))?,
        None => GalleryConfig::default(),
    };

    let viewport = Viewport::new(
        container.client_width() as f32,
        container.client_height() as f32,
        window()?.device_pixel_ratio() as f32,
    );

    // Ambient first so the gallery canvas stacks above it and receives input.
    let ambient = CanvasSurface::create(&container, "gallery-ambient", viewport, config.max_pixel_ratio).await?;
    let _ = ambient.canvas().style().set_property("pointer-events", "none");
    let gallery = match CanvasSurface::create(&container, "gallery-main", viewport, config.max_pixel_ratio).await {
        Ok(surface) => surface,
        Err(e) => {
            ambient.canvas().remove();
            return Err(e);
        }
    };
    let _ = gallery.canvas().style().set_property("cursor", "pointer");

    let host = match WebHost::new(container, gallery.canvas().clone(), config.source.endpoint.clone(), on_loaded) {
        Ok(host) => Rc::new(host),
        Err(e) => {
            ambient.canvas().remove();
            gallery.canvas().remove();
            return Err(e);
        }
    };

    let mut lifecycle = GalleryLifecycle::new(host, config);
    lifecycle.activate(ambient, gallery);
    Ok(GalleryHandle { lifecycle: Some(lifecycle) })
}

/// Marketplace URL for static collect links on the page.
#[wasm_bindgen(js_name = collectUrl)]
pub fn collect_url(contract: Option<String>, token_id: Option<String>) -> String {
    let source = GalleryConfig::default().source;
    records::collect_url(
        &source.marketplace_url,
        &source.default_contract,
        contract.as_deref(),
        token_id.as_deref(),
    )
}
