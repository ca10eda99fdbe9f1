//! The two scene graphs: the ambient backdrop and the interactive gallery.
//!
//! The scenes never share geometry. Each carries its own camera and light set;
//! the gallery additionally owns the item group that the materializer fills.

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::camera::PerspectiveCamera;
use crate::config::{hex_rgb, GalleryConfig};
use crate::particle_field::{FocalRing, ParticleField};
use crate::records::CollectibleRecord;
use crate::texture::TextureSlot;

/// Unique identifier for gallery items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Position, orientation and scale of a scene node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self { position, ..Self::default() }
    }

    /// Orient the node so its local +Z axis points at `target`.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize_or_zero();
        if forward == Vec3::ZERO {
            return;
        }
        let mut right = up.cross(forward);
        if right.length_squared() < 1e-12 {
            // Looking straight along `up`; any perpendicular works.
            right = forward.any_orthonormal_vector();
        }
        let right = right.normalize();
        let up = forward.cross(right);
        self.rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, forward));
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Light sources understood by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    Ambient { color: [f32; 3], intensity: f32 },
    /// Light shining from `position` towards the origin.
    Directional { color: [f32; 3], intensity: f32, position: Vec3 },
}

/// Camera and lights of one scene.
#[derive(Debug, Clone)]
pub struct SceneState {
    pub camera: PerspectiveCamera,
    pub lights: Vec<Light>,
}

impl SceneState {
    /// Summed ambient contribution (rgb * intensity).
    pub fn ambient_term(&self) -> [f32; 3] {
        self.lights.iter().fold([0.0; 3], |mut acc, light| {
            if let Light::Ambient { color, intensity } = light {
                for (a, c) in acc.iter_mut().zip(color) {
                    *a += c * intensity;
                }
            }
            acc
        })
    }

    /// First directional light, as (direction towards the light, rgb * intensity).
    pub fn key_light(&self) -> Option<(Vec3, [f32; 3])> {
        self.lights.iter().find_map(|light| match light {
            Light::Directional { color, intensity, position } => Some((
                position.normalize_or_zero(),
                [color[0] * intensity, color[1] * intensity, color[2] * intensity],
            )),
            _ => None,
        })
    }
}

// ============================================================================
// Ambient Scene
// ============================================================================

/// Backdrop: drifting particles, the focal torus and soft lighting.
#[derive(Debug, Clone)]
pub struct AmbientScene {
    pub state: SceneState,
    pub particles: ParticleField,
    pub ring: FocalRing,
}

impl AmbientScene {
    pub fn new(config: &GalleryConfig, particles: ParticleField, aspect: f32) -> Self {
        Self {
            state: SceneState {
                camera: PerspectiveCamera::new(&config.cameras.ambient, aspect),
                lights: vec![
                    Light::Ambient { color: [1.0, 1.0, 1.0], intensity: 0.3 },
                    Light::Directional {
                        color: hex_rgb(0x9ad8ff),
                        intensity: 0.6,
                        position: Vec3::new(5.0, 10.0, 7.0),
                    },
                ],
            },
            particles,
            ring: FocalRing::new(&config.ring),
        }
    }
}

// ============================================================================
// Gallery Scene
// ============================================================================

/// A materialized, clickable collectible plane.
#[derive(Debug, Clone)]
pub struct GalleryItem {
    pub id: EntityId,
    /// Ring slot index the item was placed at.
    pub slot: usize,
    /// Angle on the ring, radians.
    pub angle: f32,
    pub source: CollectibleRecord,
    pub transform: Transform,
    /// Plane width and height.
    pub size: Vec2,
    pub link_url: String,
    pub texture: TextureSlot,
}

/// The rotating group holding every gallery item.
///
/// Items are only ever appended; the group is cleared as a whole.
#[derive(Debug)]
pub struct ItemGroup {
    /// Euler angles (XYZ), radians.
    pub rotation: Vec3,
    items: Vec<GalleryItem>,
    next_id: u64,
}

impl ItemGroup {
    pub fn new() -> Self {
        Self { rotation: Vec3::ZERO, items: Vec::new(), next_id: 1 }
    }

    /// Reserve the id for the next item.
    pub fn next_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add(&mut self, item: GalleryItem) -> EntityId {
        let id = item.id;
        self.items.push(item);
        id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[GalleryItem] {
        &self.items
    }

    pub fn get(&self, id: EntityId) -> Option<&GalleryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_euler(glam::EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    /// World matrix of one item (group rotation applied on top).
    pub fn world_matrix(&self, item: &GalleryItem) -> Mat4 {
        self.matrix() * item.transform.matrix()
    }
}

impl Default for ItemGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Foreground: collectible planes under bright ambient light.
#[derive(Debug)]
pub struct GalleryScene {
    pub state: SceneState,
    pub items: ItemGroup,
}

impl GalleryScene {
    pub fn new(config: &GalleryConfig, aspect: f32) -> Self {
        Self {
            state: SceneState {
                camera: PerspectiveCamera::new(&config.cameras.gallery, aspect),
                lights: vec![Light::Ambient { color: [1.0, 1.0, 1.0], intensity: 0.9 }],
            },
            items: ItemGroup::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn item(group: &mut ItemGroup, position: Vec3) -> GalleryItem {
        GalleryItem {
            id: group.next_id(),
            slot: 0,
            angle: 0.0,
            source: CollectibleRecord::with_image("x"),
            transform: Transform::from_position(position),
            size: Vec2::splat(1.6),
            link_url: String::new(),
            texture: TextureSlot::new(),
        }
    }

    #[test]
    fn test_look_at_points_local_z_at_target() {
        let mut t = Transform::from_position(Vec3::new(5.0, 0.8, 0.0));
        t.look_at(Vec3::new(0.0, 0.8, 0.0), Vec3::Y);
        let forward = t.rotation * Vec3::Z;
        assert!((forward - Vec3::NEG_X).length() < 1e-5);
        let up = t.rotation * Vec3::Y;
        assert!((up - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_look_at_straight_up_is_finite() {
        let mut t = Transform::from_position(Vec3::ZERO);
        t.look_at(Vec3::new(0.0, 3.0, 0.0), Vec3::Y);
        assert!(t.matrix().is_finite());
        assert!(((t.rotation * Vec3::Z) - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_group_ids_and_append_only() {
        let mut group = ItemGroup::new();
        let a = item(&mut group, Vec3::X);
        let b = item(&mut group, Vec3::Z);
        assert_ne!(a.id, b.id);
        let a_id = group.add(a);
        group.add(b);
        assert_eq!(group.len(), 2);
        assert!(group.get(a_id).is_some());
        group.clear();
        assert!(group.is_empty());
    }

    #[test]
    fn test_world_matrix_applies_group_rotation() {
        let mut group = ItemGroup::new();
        let it = item(&mut group, Vec3::new(5.0, 0.0, 0.0));
        group.rotation.y = std::f32::consts::FRAC_PI_2;
        let world = group.world_matrix(&it).transform_point3(Vec3::ZERO);
        assert!((world - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-4);
    }

    #[test]
    fn test_scene_lights() {
        let config = GalleryConfig::default();
        let gallery = GalleryScene::new(&config, 1.0);
        assert_eq!(gallery.state.ambient_term(), [0.9, 0.9, 0.9]);
        assert!(gallery.state.key_light().is_none());

        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let particles = ParticleField::generate(&config.particles, &mut rng);
        let ambient = AmbientScene::new(&config, particles, 1.0);
        let (dir, _) = ambient.state.key_light().unwrap();
        assert!((dir.length() - 1.0).abs() < 1e-5);
    }
}
