use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use crate::composer::{RenderSurface, SceneComposer, SceneFrame};
use crate::config::{hex_rgb, GalleryConfig};
use crate::error::{FetchError, FetchErrorKind};
use crate::gallery::{load_gallery, materialize, plan_layout};
use crate::gpu::renderer::{srgb_to_linear, LoadMode, SceneRenderer};
use crate::host::{ImageLoader, RecordSource, Viewport};
use crate::lifecycle::CancellationToken;
use crate::particle_field::ParticleField;
use crate::records::parse_records;
use crate::scheduler::{animate, AnimationClock};
use crate::texture::{DecodedImage, TextureSlot};

/// Backdrop colour of the page the gallery normally sits on.
const PAGE_BACKGROUND: u32 = 0x061022;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the ring layout computed for a records payload as JSON
    Layout {
        /// Records payload: a local JSON file or an http(s) URL
        #[arg(long)]
        records: String,

        /// Gallery config JSON overriding the defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Render one frame of the gallery to a PNG
    Snapshot {
        /// Records payload: a local JSON file or an http(s) URL
        #[arg(long)]
        records: String,

        /// Output PNG path
        #[arg(long)]
        out: PathBuf,

        /// Output width
        #[arg(long, default_value_t = 1280)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 640)]
        height: u32,

        /// Animation frames (at 60 fps) to advance before capturing
        #[arg(long, default_value_t = 0)]
        frames: u32,

        /// Particle field seed
        #[arg(long)]
        seed: Option<u64>,

        /// Gallery config JSON overriding the defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Layout { records, config } => {
            let config = load_config(config.as_deref())?;
            let payload = read_location(&records)?;
            let batch = parse_records(&payload);
            let plan = plan_layout(&batch.records, &config);
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Snapshot { records, out, width, height, frames, seed, config } => {
            let mut config = load_config(config.as_deref())?;
            if seed.is_some() {
                config.seed = seed;
            }
            pollster::block_on(render_snapshot(&records, &out, width, height, frames, &config))?;
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<GalleryConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            GalleryConfig::from_json(&json)
        }
        None => Ok(GalleryConfig::default()),
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

fn read_location(location: &str) -> Result<String> {
    LocationSource { location: location.to_string() }
        .read_text()
        .map_err(anyhow::Error::from)
}

fn read_bytes(location: &str) -> Result<Vec<u8>, FetchError> {
    if !is_remote(location) {
        return std::fs::read(location)
            .map_err(|e| FetchError::with_source(FetchErrorKind::Network, location, e));
    }
    let response = reqwest::blocking::get(location)
        .map_err(|e| FetchError::with_source(FetchErrorKind::Network, location, e))?;
    if !response.status().is_success() {
        return Err(FetchError::status(response.status().as_u16(), location));
    }
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| FetchError::with_source(FetchErrorKind::Body, location, e))
}

/// Records payload from a file path or URL.
struct LocationSource {
    location: String,
}

impl LocationSource {
    fn read_text(&self) -> Result<String, FetchError> {
        let bytes = read_bytes(&self.location)?;
        String::from_utf8(bytes)
            .map_err(|e| FetchError::with_source(FetchErrorKind::Decode, &self.location, e))
    }
}

impl RecordSource for LocationSource {
    async fn fetch_payload(&self) -> Result<String, FetchError> {
        self.read_text()
    }
}

/// Loads and decodes images before returning, so every plane has its
/// texture by the first frame.
struct BlockingImageLoader;

impl ImageLoader for BlockingImageLoader {
    fn load_image(&self, url: &str, slot: TextureSlot) {
        let decoded = read_bytes(url)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| DecodedImage::decode(&bytes));
        match decoded {
            Ok(image) => slot.fill(image),
            Err(e) => {
                log::warn!("Texture {} failed to load: {:#}", url, e);
                slot.fail();
            }
        }
    }
}

/// Both scenes draw into the same offscreen texture, ambient first.
struct OffscreenSurface {
    renderer: SceneRenderer,
    target: Rc<wgpu::TextureView>,
}

impl RenderSurface for OffscreenSurface {
    fn resize(&mut self, viewport: Viewport) {
        let (width, height) = viewport.physical_size(1.0);
        self.renderer.resize(width, height);
    }

    fn render(&mut self, frame: SceneFrame<'_>) {
        self.renderer.render(&self.target, frame);
    }

    fn release(&mut self) {}
}

async fn render_snapshot(
    records: &str,
    out: &Path,
    width: u32,
    height: u32,
    frames: u32,
    config: &GalleryConfig,
) -> Result<()> {
    if width == 0 || height == 0 {
        anyhow::bail!("Snapshot size must be non-zero, got {}x{}", width, height);
    }

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None, // Headless
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow::anyhow!("No adapter found"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await?;
    let device = Arc::new(device);
    let queue = Arc::new(queue);

    let texture_desc = wgpu::TextureDescriptor {
        label: Some("Snapshot Target"),
        size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    };
    let texture = device.create_texture(&texture_desc);
    let target = Rc::new(texture.create_view(&wgpu::TextureViewDescriptor::default()));

    let [r, g, b] = hex_rgb(PAGE_BACKGROUND);
    let background = wgpu::Color {
        r: srgb_to_linear(r) as f64,
        g: srgb_to_linear(g) as f64,
        b: srgb_to_linear(b) as f64,
        a: 1.0,
    };
    let ambient_surface = OffscreenSurface {
        renderer: SceneRenderer::new(device.clone(), queue.clone(), texture_desc.format, width, height, LoadMode::Clear(background)),
        target: target.clone(),
    };
    let gallery_surface = OffscreenSurface {
        renderer: SceneRenderer::new(device.clone(), queue.clone(), texture_desc.format, width, height, LoadMode::Preserve),
        target,
    };

    let particles = {
        use rand::SeedableRng;
        let mut rng = match config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_os_rng(),
        };
        ParticleField::generate(&config.particles, &mut rng)
    };

    let viewport = Viewport::new(width as f32, height as f32, 1.0);
    let mut composer = SceneComposer::initialize(config, viewport, particles, ambient_surface, gallery_surface);

    let source = LocationSource { location: records.to_string() };
    let token = CancellationToken::new();
    let report = load_gallery(&source, &token, |batch| {
        materialize(batch, config, &BlockingImageLoader, &mut composer.gallery_mut().items)
    })
    .await;
    if let Some(report) = report {
        println!(
            "Loaded {} records, placed {} on the ring{}",
            report.fetched,
            report.materialized,
            if report.failed { " (fetch failed)" } else { "" }
        );
    }

    let clock = AnimationClock::new();
    for frame in 0..=frames {
        let elapsed = clock.advance(frame as f64 * 1000.0 / 60.0);
        let (ambient, gallery) = composer.scenes_mut();
        animate(ambient, gallery, elapsed, config.gallery_spin);
    }
    composer.render_frame();

    // Buffer for reading back data
    let u32_size = std::mem::size_of::<u32>() as u32;
    let unpadded_bytes_per_row = u32_size * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row_padding = (align - unpadded_bytes_per_row % align) % align;
    let padded_bytes_per_row = unpadded_bytes_per_row + padded_bytes_per_row_padding;

    let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Output Buffer"),
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: None });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &output_buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        texture_desc.size,
    );
    queue.submit(Some(encoder.finish()));

    let buffer_slice = output_buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
        let _ = tx.send(v);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()?.context("Failed to map snapshot buffer")?;

    let data = buffer_slice.get_mapped_range();
    let mut unpadded_data = Vec::with_capacity((width * height * 4) as usize);
    for row in 0..height {
        let start = (row * padded_bytes_per_row) as usize;
        let end = start + (width * 4) as usize;
        unpadded_data.extend_from_slice(&data[start..end]);
    }
    drop(data);
    output_buffer.unmap();

    image::save_buffer(out, &unpadded_data, width, height, image::ColorType::Rgba8)
        .with_context(|| format!("Failed to write {:?}", out))?;

    composer.release();
    println!("Wrote {:?}", out);
    Ok(())
}
