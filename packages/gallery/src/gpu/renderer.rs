//! GPU renderer for one scene.
//!
//! Each [`SceneRenderer`] draws either the ambient backdrop (particles + ring)
//! or the gallery (textured planes) into a colour view it is handed per frame.
//! Draws share one dynamic uniform buffer, one 256-byte slot per draw.

use std::collections::HashMap;
use std::iter;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::composer::SceneFrame;
use crate::gpu::mesh::{self, Vertex, PARTICLE_QUAD_VERTICES};
use crate::gpu::pipeline::{self, DEPTH_FORMAT};
use crate::scene_graph::{AmbientScene, EntityId, GalleryScene};
use crate::texture::DecodedImage;

/// Maximum number of draws per frame (ring + particles, or every plane).
const MAX_DRAWS_PER_FRAME: usize = 64;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

/// Shown on planes whose image has not arrived (or failed).
const PLACEHOLDER_TEXEL: [u8; 4] = [22, 38, 64, 255];

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct DrawUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    base_color: [f32; 4],
    emissive: [f32; 4],
    ambient: [f32; 4],
    light_dir: [f32; 4],
    light_color: [f32; 4],
    params: [f32; 4],
    // Padding to reach 256-byte alignment (224 bytes of data + 32 bytes padding)
    _padding: [f32; 8],
}

impl DrawUniforms {
    fn new(view_proj: Mat4, model: Mat4) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            base_color: [1.0; 4],
            emissive: [0.0; 4],
            ambient: [0.0; 4],
            light_dir: [0.0, 1.0, 0.0, 0.0],
            light_color: [0.0; 4],
            params: [0.0; 4],
            _padding: [0.0; 8],
        }
    }
}

/// How a renderer treats the previous contents of its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadMode {
    Clear(wgpu::Color),
    /// Draw over whatever is already there (compositing into a shared target).
    Preserve,
}

/// Shared geometry for a mesh type.
struct MeshGeometry {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
}

impl MeshGeometry {
    fn upload(device: &wgpu::Device, label: &str, vertices: &[Vertex], indices: &[u32]) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", label)),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", label)),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { vertex_buffer, index_buffer, num_indices: indices.len() as u32 }
    }
}

struct ParticleBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

pub struct SceneRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    size: wgpu::Extent3d,
    load: LoadMode,

    depth_view: wgpu::TextureView,

    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    particle_pipeline: wgpu::RenderPipeline,
    ring_pipeline: wgpu::RenderPipeline,
    plane_pipeline: wgpu::RenderPipeline,

    plane_geometry: MeshGeometry,
    ring_geometry: Option<MeshGeometry>,
    particles: Option<ParticleBuffer>,

    placeholder: wgpu::BindGroup,
    textures: HashMap<EntityId, wgpu::BindGroup>,
}

impl SceneRenderer {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        load: LoadMode,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };

        // Large uniform buffer for dynamic uniform binding (one slot per draw)
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_DRAWS_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                },
                count: None,
            }],
            label: Some("draw_bind_group_layout"),
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniforms>() as u64),
                }),
            }],
            label: Some("draw_bind_group"),
        });

        let texture_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("plane_texture_bind_group_layout"),
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Plane Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let mesh_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout],
            push_constant_ranges: &[],
        });
        let plane_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Plane Pipeline Layout"),
            bind_group_layouts: &[&uniform_bind_group_layout, &texture_bind_group_layout],
            push_constant_ranges: &[],
        });

        let particle_pipeline = pipeline::create_particle_pipeline(&device, &mesh_layout, format);
        let ring_pipeline = pipeline::create_ring_pipeline(&device, &mesh_layout, format);
        let plane_pipeline = pipeline::create_plane_pipeline(&device, &plane_layout, format);

        let (plane_vertices, plane_indices) = mesh::create_plane_geometry();
        let plane_geometry = MeshGeometry::upload(&device, "Plane", &plane_vertices, &plane_indices);

        let depth_view = create_depth_view(&device, size);

        let placeholder_image = DecodedImage { width: 1, height: 1, rgba: PLACEHOLDER_TEXEL.to_vec() };
        let placeholder = create_texture_bind_group(
            &device,
            &queue,
            &texture_bind_group_layout,
            &sampler,
            &placeholder_image,
            "Placeholder Texture",
        );

        Self {
            device,
            queue,
            format,
            size,
            load,
            depth_view,
            uniform_buffer,
            uniform_bind_group,
            texture_bind_group_layout,
            sampler,
            particle_pipeline,
            ring_pipeline,
            plane_pipeline,
            plane_geometry,
            ring_geometry: None,
            particles: None,
            placeholder,
            textures: HashMap::new(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.size.width, self.size.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 && (width != self.size.width || height != self.size.height) {
            self.size = wgpu::Extent3d { width, height, depth_or_array_layers: 1 };
            self.depth_view = create_depth_view(&self.device, self.size);
        }
    }

    /// Number of plane textures currently resident.
    pub fn resident_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn render(&mut self, view: &wgpu::TextureView, frame: SceneFrame<'_>) {
        match frame {
            SceneFrame::Ambient(scene) => self.render_ambient(view, scene),
            SceneFrame::Gallery(scene) => self.render_gallery(view, scene),
        }
    }

    fn write_slot(&self, slot: usize, uniforms: &DrawUniforms) -> u32 {
        let offset = (slot * UNIFORM_ALIGNMENT) as u32;
        self.queue.write_buffer(&self.uniform_buffer, offset as u64, bytemuck::bytes_of(uniforms));
        offset
    }

    fn color(&self, rgb: [f32; 3]) -> [f32; 3] {
        if self.format.is_srgb() {
            rgb.map(srgb_to_linear)
        } else {
            rgb
        }
    }

    fn begin_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
        label: &str,
    ) -> wgpu::RenderPass<'e> {
        let load = match self.load {
            LoadMode::Clear(color) => wgpu::LoadOp::Clear(color),
            LoadMode::Preserve => wgpu::LoadOp::Load,
        };
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations { load, store: wgpu::StoreOp::Store },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    fn render_ambient(&mut self, view: &wgpu::TextureView, scene: &mut AmbientScene) {
        // Particle upload: the field's dirty flag gates the per-frame copy.
        let needs_upload = scene.particles.take_dirty() || self.particles.is_none();
        if needs_upload && !scene.particles.is_empty() {
            let colors: Vec<[f32; 3]> = scene.particles.colors().iter().map(|c| self.color(*c)).collect();
            let instances = mesh::particle_instances(scene.particles.positions(), &colors);
            match &self.particles {
                Some(existing) if existing.count as usize == instances.len() => {
                    self.queue.write_buffer(&existing.buffer, 0, bytemuck::cast_slice(&instances));
                }
                _ => {
                    let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Particle Instance Buffer"),
                        contents: bytemuck::cast_slice(&instances),
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    });
                    self.particles = Some(ParticleBuffer { buffer, count: instances.len() as u32 });
                }
            }
        }

        if self.ring_geometry.is_none() {
            let ring = &scene.ring;
            let (vertices, indices) =
                mesh::create_torus_geometry(ring.radius, ring.tube, ring.radial_segments, ring.tubular_segments);
            self.ring_geometry = Some(MeshGeometry::upload(&self.device, "Ring", &vertices, &indices));
        }

        let camera = &scene.state.camera;
        let projection = camera.projection_matrix();
        let view_matrix = camera.view_matrix();

        // Particles are expanded in view space: projection in view_proj, view in model.
        let mut particle_uniforms = DrawUniforms::new(projection, view_matrix);
        particle_uniforms.params = [scene.particles.size() * 0.5, scene.particles.opacity(), 0.0, 0.0];
        let particle_offset = self.write_slot(0, &particle_uniforms);

        let ring = &scene.ring;
        let mut ring_uniforms = DrawUniforms::new(projection * view_matrix, ring.model_matrix());
        let base = self.color(ring.material.color);
        let emissive = self.color(ring.material.emissive);
        let ambient = self.color(scene.state.ambient_term());
        ring_uniforms.base_color = [base[0], base[1], base[2], 1.0];
        ring_uniforms.emissive = [emissive[0], emissive[1], emissive[2], ring.material.emissive_intensity];
        ring_uniforms.ambient = [ambient[0], ambient[1], ambient[2], 1.0];
        if let Some((direction, color)) = scene.state.key_light() {
            let color = self.color(color);
            ring_uniforms.light_dir = [direction.x, direction.y, direction.z, 0.0];
            ring_uniforms.light_color = [color[0], color[1], color[2], 1.0];
        }
        let ring_offset = self.write_slot(1, &ring_uniforms);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Ambient Render Encoder"),
        });
        {
            let mut render_pass = self.begin_pass(&mut encoder, view, "Ambient Render Pass");

            if let Some(ring_geometry) = &self.ring_geometry {
                render_pass.set_pipeline(&self.ring_pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[ring_offset]);
                render_pass.set_vertex_buffer(0, ring_geometry.vertex_buffer.slice(..));
                render_pass.set_index_buffer(ring_geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..ring_geometry.num_indices, 0, 0..1);
            }

            // Transparent particles last, depth-tested against the ring.
            if let Some(particles) = &self.particles {
                render_pass.set_pipeline(&self.particle_pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[particle_offset]);
                render_pass.set_vertex_buffer(0, particles.buffer.slice(..));
                render_pass.draw(0..PARTICLE_QUAD_VERTICES, 0..particles.count);
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
    }

    fn render_gallery(&mut self, view: &wgpu::TextureView, scene: &GalleryScene) {
        let group = &scene.items;

        // Drop textures of items that are gone, upload newly decoded ones.
        self.textures.retain(|id, _| group.get(*id).is_some());
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        for item in group.items() {
            if let Some(image) = item.texture.take_for_upload() {
                let image = image.fit_within(max_dimension);
                let bind_group = create_texture_bind_group(
                    &self.device,
                    &self.queue,
                    &self.texture_bind_group_layout,
                    &self.sampler,
                    &image,
                    "Plane Texture",
                );
                self.textures.insert(item.id, bind_group);
            }
        }

        let view_proj = scene.state.camera.view_projection_matrix();
        let mut draws = Vec::with_capacity(group.len().min(MAX_DRAWS_PER_FRAME));
        for (slot, item) in group.items().iter().take(MAX_DRAWS_PER_FRAME).enumerate() {
            let model = group.world_matrix(item) * Mat4::from_scale(item.size.extend(1.0));
            let uniforms = DrawUniforms::new(view_proj, model);
            draws.push((self.write_slot(slot, &uniforms), item.id));
        }
        if group.len() > MAX_DRAWS_PER_FRAME {
            log::warn!("Gallery has {} planes; drawing the first {}", group.len(), MAX_DRAWS_PER_FRAME);
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Gallery Render Encoder"),
        });
        {
            let mut render_pass = self.begin_pass(&mut encoder, view, "Gallery Render Pass");
            render_pass.set_pipeline(&self.plane_pipeline);
            render_pass.set_vertex_buffer(0, self.plane_geometry.vertex_buffer.slice(..));
            render_pass.set_index_buffer(self.plane_geometry.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            for (offset, id) in &draws {
                let texture = self.textures.get(id).unwrap_or(&self.placeholder);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[*offset]);
                render_pass.set_bind_group(1, texture, &[]);
                render_pass.draw_indexed(0..self.plane_geometry.num_indices, 0, 0..1);
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
    }
}

fn create_depth_view(device: &wgpu::Device, size: wgpu::Extent3d) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_texture_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    image: &DecodedImage,
    label: &str,
) -> wgpu::BindGroup {
    let texture = device.create_texture_with_data(
        queue,
        &wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &image.rgba,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
        label: Some(label),
    })
}

/// sRGB transfer function, inverse.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
