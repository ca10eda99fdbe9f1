//! Pointer picking against gallery planes.
//!
//! Planes are unit quads in their local XY plane (normal +Z), scaled by the
//! item size. Rays are intersected in each item's local space, so the group's
//! spin and every item's own orientation come for free.

use glam::{Mat4, Vec2};

use crate::camera::{PerspectiveCamera, Ray};
use crate::host::{Navigator, SurfaceRect};
use crate::scene_graph::{EntityId, ItemGroup};

/// Rays closer to parallel than this are treated as missing the plane.
const PARALLEL_EPSILON: f32 = 1e-8;

/// A ray hit on a gallery item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: EntityId,
    /// World-space distance from the ray origin.
    pub distance: f32,
}

/// Convert client coordinates to normalized device coordinates relative to
/// `rect`. Points outside the rect (or an empty rect) give `None`.
pub fn screen_to_ndc(x: f32, y: f32, rect: &SurfaceRect) -> Option<Vec2> {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }
    let ndc = Vec2::new(
        (x - rect.left) / rect.width * 2.0 - 1.0,
        -((y - rect.top) / rect.height * 2.0 - 1.0),
    );
    if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || !ndc.is_finite() {
        return None;
    }
    Some(ndc)
}

/// World-space hit distance of `ray` against a `size` plane placed by
/// `world_from_local`. Both faces count.
pub fn intersect_plane(ray: &Ray, world_from_local: Mat4, size: Vec2) -> Option<f32> {
    let local = ray.to_local(world_from_local);
    if local.direction.z.abs() < PARALLEL_EPSILON {
        return None;
    }
    let t = -local.origin.z / local.direction.z;
    if t < 0.0 {
        return None;
    }
    let point = local.at(t);
    let half = size * 0.5;
    if point.x.abs() > half.x || point.y.abs() > half.y {
        return None;
    }
    let world_point = world_from_local.transform_point3(point);
    Some(world_point.distance(ray.origin))
}

/// All items under the ray, nearest first.
pub fn raycast(ray: &Ray, group: &ItemGroup) -> Vec<Hit> {
    let mut hits: Vec<Hit> = group
        .items()
        .iter()
        .filter_map(|item| {
            intersect_plane(ray, group.world_matrix(item), item.size)
                .map(|distance| Hit { id: item.id, distance })
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits
}

/// Nearest item under the NDC point, if any.
pub fn pick(camera: &PerspectiveCamera, group: &ItemGroup, ndc: Vec2) -> Option<Hit> {
    let ray = camera.ray_from_ndc(ndc);
    raycast(&ray, group).into_iter().next()
}

/// Handle a pointer-down at client coordinates: open the nearest plane's
/// link. Returns the opened URL.
pub fn route_pointer_down<N: Navigator + ?Sized>(
    navigator: &N,
    camera: &PerspectiveCamera,
    group: &ItemGroup,
    rect: &SurfaceRect,
    x: f32,
    y: f32,
) -> Option<String> {
    let ndc = screen_to_ndc(x, y, rect)?;
    let hit = pick(camera, group, ndc)?;
    let item = group.get(hit.id)?;
    log::info!("Opening {}", item.link_url);
    navigator.open_in_new_context(&item.link_url);
    Some(item.link_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraParams;
    use crate::records::CollectibleRecord;
    use crate::scene_graph::{GalleryItem, Transform};
    use crate::texture::TextureSlot;
    use glam::Vec3;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingNavigator {
        opened: RefCell<Vec<String>>,
    }

    impl Navigator for RecordingNavigator {
        fn open_in_new_context(&self, url: &str) {
            self.opened.borrow_mut().push(url.to_string());
        }
    }

    fn camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            &CameraParams { fov_degrees: 50.0, distance: 8.0, near: 0.1, far: 1000.0 },
            1.0,
        )
    }

    fn add_plane(group: &mut ItemGroup, position: Vec3, link: &str) -> EntityId {
        let mut transform = Transform::from_position(position);
        transform.look_at(position + Vec3::Z, Vec3::Y);
        let id = group.next_id();
        group.add(GalleryItem {
            id,
            slot: 0,
            angle: 0.0,
            source: CollectibleRecord::with_image("x"),
            transform,
            size: Vec2::splat(1.6),
            link_url: link.to_string(),
            texture: TextureSlot::new(),
        })
    }

    fn rect() -> SurfaceRect {
        SurfaceRect { left: 100.0, top: 50.0, width: 800.0, height: 600.0 }
    }

    #[test]
    fn test_screen_to_ndc() {
        let r = rect();
        assert_eq!(screen_to_ndc(500.0, 350.0, &r), Some(Vec2::ZERO));
        assert_eq!(screen_to_ndc(100.0, 50.0, &r), Some(Vec2::new(-1.0, 1.0)));
        assert_eq!(screen_to_ndc(900.0, 650.0, &r), Some(Vec2::new(1.0, -1.0)));
        assert_eq!(screen_to_ndc(50.0, 350.0, &r), None);
        assert_eq!(screen_to_ndc(0.0, 0.0, &SurfaceRect::default()), None);
    }

    #[test]
    fn test_single_hit_opens_link() {
        let nav = RecordingNavigator::default();
        let mut group = ItemGroup::new();
        add_plane(&mut group, Vec3::ZERO, "https://zora.co/collect/0xabc/1");

        let opened = route_pointer_down(&nav, &camera(), &group, &rect(), 500.0, 350.0);
        assert_eq!(opened.as_deref(), Some("https://zora.co/collect/0xabc/1"));
        assert_eq!(nav.opened.borrow().len(), 1);
    }

    #[test]
    fn test_miss_is_noop() {
        let nav = RecordingNavigator::default();
        let mut group = ItemGroup::new();
        add_plane(&mut group, Vec3::ZERO, "a");

        // Top-left corner of the viewport is well clear of a centred plane.
        assert!(route_pointer_down(&nav, &camera(), &group, &rect(), 110.0, 60.0).is_none());
        // Outside the surface entirely.
        assert!(route_pointer_down(&nav, &camera(), &group, &rect(), 10.0, 10.0).is_none());
        assert!(nav.opened.borrow().is_empty());
    }

    #[test]
    fn test_nearest_plane_wins() {
        let nav = RecordingNavigator::default();
        let mut group = ItemGroup::new();
        add_plane(&mut group, Vec3::new(0.0, 0.0, -2.0), "far");
        add_plane(&mut group, Vec3::new(0.0, 0.0, 2.0), "near");

        let hits = raycast(&camera().ray_from_ndc(Vec2::ZERO), &group);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].distance < hits[1].distance);

        let opened = route_pointer_down(&nav, &camera(), &group, &rect(), 500.0, 350.0);
        assert_eq!(opened.as_deref(), Some("near"));
    }

    #[test]
    fn test_back_face_and_group_rotation() {
        let mut group = ItemGroup::new();
        let id = add_plane(&mut group, Vec3::ZERO, "a");
        // Half a turn shows the camera the back of the plane.
        group.rotation.y = std::f32::consts::PI;
        let hit = pick(&camera(), &group, Vec2::ZERO).unwrap();
        assert_eq!(hit.id, id);
        assert!((hit.distance - 8.0).abs() < 1e-3);

        // A plane swung off to the side by the group spin is missed.
        let mut group = ItemGroup::new();
        add_plane(&mut group, Vec3::new(0.0, 0.0, 3.0), "a");
        group.rotation.y = std::f32::consts::FRAC_PI_2;
        assert!(pick(&camera(), &group, Vec2::ZERO).is_none());
    }
}
