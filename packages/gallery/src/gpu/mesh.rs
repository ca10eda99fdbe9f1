use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self { position, normal, uv }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 24,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// One particle as uploaded to the instance buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl ParticleInstance {
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ParticleInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Vertices drawn per particle billboard (two triangles, expanded in the shader).
pub const PARTICLE_QUAD_VERTICES: u32 = 6;

/// Interleave positions and colors for upload.
pub fn particle_instances(positions: &[[f32; 3]], colors: &[[f32; 3]]) -> Vec<ParticleInstance> {
    positions
        .iter()
        .zip(colors)
        .map(|(position, color)| ParticleInstance { position: *position, color: *color })
        .collect()
}

/// Torus around the Z axis: `radius` to the tube centre, `tube` thick.
pub fn create_torus_geometry(
    radius: f32,
    tube: f32,
    radial_segments: u32,
    tubular_segments: u32,
) -> (Vec<Vertex>, Vec<u32>) {
    let radial_segments = radial_segments.max(3);
    let tubular_segments = tubular_segments.max(3);
    let tau = std::f32::consts::TAU;

    let mut vertices = Vec::with_capacity(((radial_segments + 1) * (tubular_segments + 1)) as usize);
    let mut indices = Vec::with_capacity((radial_segments * tubular_segments * 6) as usize);

    for j in 0..=radial_segments {
        let v = j as f32 / radial_segments as f32 * tau;
        for i in 0..=tubular_segments {
            let u = i as f32 / tubular_segments as f32 * tau;

            let ring = radius + tube * v.cos();
            let position = glam::Vec3::new(ring * u.cos(), ring * u.sin(), tube * v.sin());
            let centre = glam::Vec3::new(radius * u.cos(), radius * u.sin(), 0.0);
            let normal = (position - centre).normalize_or_zero();

            vertices.push(Vertex::new(
                position.to_array(),
                normal.to_array(),
                [i as f32 / tubular_segments as f32, j as f32 / radial_segments as f32],
            ));
        }
    }

    let row = tubular_segments + 1;
    for j in 1..=radial_segments {
        for i in 1..=tubular_segments {
            let a = row * j + i - 1;
            let b = row * (j - 1) + i - 1;
            let c = row * (j - 1) + i;
            let d = row * j + i;

            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    (vertices, indices)
}

/// Unit plane in the XY plane facing +Z. UV (0, 0) is the top-left corner so
/// image rows map top to bottom.
pub fn create_plane_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let normal = [0.0, 0.0, 1.0];
    let vertices = vec![
        Vertex::new([-0.5, 0.5, 0.0], normal, [0.0, 0.0]),
        Vertex::new([0.5, 0.5, 0.0], normal, [1.0, 0.0]),
        Vertex::new([0.5, -0.5, 0.0], normal, [1.0, 1.0]),
        Vertex::new([-0.5, -0.5, 0.0], normal, [0.0, 1.0]),
    ];

    let indices = vec![
        3, 2, 1, 3, 1, 0,
    ];

    (vertices, indices)
}
