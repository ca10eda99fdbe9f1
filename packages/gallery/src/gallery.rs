//! Gallery materializer: records in, positioned planes out.
//!
//! Layout is a pure function of the record list so it can be inspected (and
//! printed by the CLI) without a host. [`materialize`] turns the layout into
//! [`GalleryItem`]s and kicks off their textures; [`load_gallery`] wraps the
//! whole thing around the asynchronous records fetch.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3};
use serde::Serialize;

use crate::config::{GalleryConfig, LayoutConfig};
use crate::host::{ImageLoader, LoadReport, RecordSource};
use crate::lifecycle::CancellationToken;
use crate::records::{collect_url, parse_records, CollectibleRecord, RecordBatch};
use crate::scene_graph::{GalleryItem, ItemGroup, Transform};
use crate::texture::TextureSlot;

/// Angular distance between ring slots for `count` candidates.
pub fn ring_step(count: usize, min_slots: usize) -> f32 {
    TAU / count.max(min_slots).max(1) as f32
}

/// Transform of the plane in ring slot `slot`, facing the ring centre.
pub fn ring_transform(slot: usize, step: f32, layout: &LayoutConfig) -> Transform {
    let angle = slot as f32 * step;
    let position = Vec3::new(
        layout.radius * angle.cos(),
        layout.height + (slot as f32).sin() * layout.height_jitter,
        layout.radius * angle.sin(),
    );
    let mut transform = Transform::from_position(position);
    transform.look_at(Vec3::new(0.0, layout.height, 0.0), Vec3::Y);
    transform
}

/// One plane the materializer will build.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedItem {
    pub slot: usize,
    pub angle: f32,
    pub position: [f32; 3],
    pub image: String,
    pub link: String,
    #[serde(skip)]
    pub transform: Transform,
    #[serde(skip)]
    pub record: CollectibleRecord,
}

/// Plan the ring for a batch of records.
///
/// Only the first `max_items` records are candidates. The angular step is
/// derived from the candidate count; candidates without an image keep their
/// slot empty.
pub fn plan_layout(records: &[CollectibleRecord], config: &GalleryConfig) -> Vec<PlannedItem> {
    let layout = &config.layout;
    let candidates = records.len().min(layout.max_items);
    let step = ring_step(candidates, layout.min_slots);

    records
        .iter()
        .take(candidates)
        .enumerate()
        .filter_map(|(slot, record)| {
            let Some(image) = record.image_ref() else {
                log::debug!("Skipping record {} without an image reference", slot);
                return None;
            };
            let transform = ring_transform(slot, step, layout);
            Some(PlannedItem {
                slot,
                angle: slot as f32 * step,
                position: transform.position.to_array(),
                image: image.to_string(),
                link: collect_url(
                    &config.source.marketplace_url,
                    &config.source.default_contract,
                    record.contract.as_deref(),
                    record.token_id.as_deref(),
                ),
                transform,
                record: record.clone(),
            })
        })
        .collect()
}

/// Add planes for `batch` to `group`, requesting each texture from `loader`.
/// Returns the number of planes added.
pub fn materialize<L: ImageLoader + ?Sized>(
    batch: &RecordBatch,
    config: &GalleryConfig,
    loader: &L,
    group: &mut ItemGroup,
) -> usize {
    let plan = plan_layout(&batch.records, config);
    let size = Vec2::splat(config.layout.plane_size);
    let count = plan.len();

    for planned in plan {
        let texture = TextureSlot::new();
        loader.load_image(&planned.image, texture.clone());
        let id = group.next_id();
        group.add(GalleryItem {
            id,
            slot: planned.slot,
            angle: planned.angle,
            source: planned.record,
            transform: planned.transform,
            size,
            link_url: planned.link,
            texture,
        });
    }
    count
}

/// Fetch records from `source` and hand them to `apply`.
///
/// Fetch and decode failures are logged and treated as an empty batch. If
/// `token` was cancelled while the fetch was in flight the result is dropped
/// without calling `apply`, and `None` is returned.
pub async fn load_gallery<S, F>(source: &S, token: &CancellationToken, apply: F) -> Option<LoadReport>
where
    S: RecordSource + ?Sized,
    F: FnOnce(&RecordBatch) -> usize,
{
    let result = source.fetch_payload().await;

    if token.is_cancelled() {
        log::debug!("Gallery deactivated before records arrived; discarding result");
        return None;
    }

    let (batch, failed) = match result {
        Ok(body) => (parse_records(&body), false),
        Err(e) => {
            log::error!("Failed to load gallery records: {}", e);
            (RecordBatch::default(), true)
        }
    };

    let materialized = apply(&batch);
    log::info!(
        "Gallery loaded: {} records fetched, {} planes materialized",
        batch.reported,
        materialized
    );

    Some(LoadReport { fetched: batch.reported, materialized, failed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, FetchErrorKind};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingLoader {
        urls: RefCell<Vec<String>>,
    }

    impl ImageLoader for RecordingLoader {
        fn load_image(&self, url: &str, _slot: TextureSlot) {
            self.urls.borrow_mut().push(url.to_string());
        }
    }

    struct StaticSource(Result<String, FetchErrorKind>);

    impl RecordSource for StaticSource {
        async fn fetch_payload(&self) -> Result<String, FetchError> {
            match &self.0 {
                Ok(body) => Ok(body.clone()),
                Err(kind) => Err(FetchError::new(*kind, "unavailable")),
            }
        }
    }

    fn records(count: usize, missing: &[usize]) -> Vec<CollectibleRecord> {
        (0..count)
            .map(|i| {
                if missing.contains(&i) {
                    CollectibleRecord { token_id: Some(i.to_string()), ..Default::default() }
                } else {
                    CollectibleRecord {
                        token_id: Some(i.to_string()),
                        ..CollectibleRecord::with_image(format!("https://img/{}.png", i))
                    }
                }
            })
            .collect()
    }

    #[test]
    fn test_ring_step_floor() {
        assert!((ring_step(2, 6) - TAU / 6.0).abs() < 1e-6);
        assert!((ring_step(28, 6) - TAU / 28.0).abs() < 1e-6);
        assert!((ring_step(0, 6) - TAU / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_cap_and_skip() {
        let config = GalleryConfig::default();
        let plan = plan_layout(&records(40, &[3, 10, 27, 35]), &config);
        // 35 is beyond the cap, so only three candidates are skipped.
        assert_eq!(plan.len(), 25);
        assert!(plan.iter().all(|p| p.slot < 28));
        assert!(!plan.iter().any(|p| [3, 10, 27].contains(&p.slot)));
    }

    #[test]
    fn test_angles_distinct_and_evenly_stepped() {
        let config = GalleryConfig::default();
        let plan = plan_layout(&records(28, &[]), &config);
        let step = TAU / 28.0;
        for pair in plan.windows(2) {
            assert!((pair[1].angle - pair[0].angle - step).abs() < 1e-5);
        }
        assert!(plan.iter().all(|p| (0.0..TAU).contains(&p.angle)));
    }

    #[test]
    fn test_small_batch_uses_min_slots() {
        let config = GalleryConfig::default();
        let plan = plan_layout(&records(2, &[]), &config);
        assert_eq!(plan.len(), 2);
        assert!((plan[1].angle - TAU / 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_plane_placement_faces_centre() {
        let config = GalleryConfig::default();
        let layout = &config.layout;
        let t = ring_transform(1, TAU / 6.0, layout);
        let angle = TAU / 6.0;
        assert!((t.position.x - 5.0 * angle.cos()).abs() < 1e-5);
        assert!((t.position.z - 5.0 * angle.sin()).abs() < 1e-5);
        assert!((t.position.y - (0.8 + 1.0_f32.sin() * 0.25)).abs() < 1e-5);

        let to_centre = (Vec3::new(0.0, 0.8, 0.0) - t.position).normalize();
        let facing = t.rotation * Vec3::Z;
        assert!(facing.dot(to_centre) > 0.999);
    }

    #[test]
    fn test_links_fall_back_to_default_contract() {
        let config = GalleryConfig::default();
        let mut recs = records(2, &[]);
        recs[0].contract = Some("0xabc".to_string());
        let plan = plan_layout(&recs, &config);
        assert_eq!(plan[0].link, "https://zora.co/collect/0xabc/0");
        assert_eq!(
            plan[1].link,
            format!("https://zora.co/collect/{}/1", config.source.default_contract)
        );
    }

    #[test]
    fn test_materialize_requests_textures() {
        let config = GalleryConfig::default();
        let loader = RecordingLoader::default();
        let mut group = ItemGroup::new();
        let batch = RecordBatch { records: records(5, &[1]), reported: 5 };

        let added = materialize(&batch, &config, &loader, &mut group);
        assert_eq!(added, 4);
        assert_eq!(group.len(), 4);
        assert_eq!(loader.urls.borrow().len(), 4);
        assert_eq!(loader.urls.borrow()[1], "https://img/2.png");
        assert!(group.items().iter().all(|i| i.texture.is_pending()));
    }

    #[test]
    fn test_load_reports_counts() {
        let source = StaticSource(Ok(
            r#"{ "nfts": [ { "image": "a" }, { "tokenId": 2 }, { "image": "c" } ] }"#.to_string(),
        ));
        let token = CancellationToken::new();
        let config = GalleryConfig::default();
        let loader = RecordingLoader::default();
        let mut group = ItemGroup::new();

        let report = pollster::block_on(load_gallery(&source, &token, |batch| {
            materialize(batch, &config, &loader, &mut group)
        }))
        .unwrap();
        assert_eq!(report, LoadReport { fetched: 3, materialized: 2, failed: false });
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_undecodable_entry_counts_against_cap() {
        let mut entries = vec!["1".to_string()];
        entries.extend((1..=28).map(|i| format!(r#"{{ "image": "https://img/{}.png" }}"#, i)));
        let source = StaticSource(Ok(format!(r#"{{ "nfts": [ {} ] }}"#, entries.join(", "))));
        let token = CancellationToken::new();
        let config = GalleryConfig::default();
        let loader = RecordingLoader::default();
        let mut group = ItemGroup::new();

        let report = pollster::block_on(load_gallery(&source, &token, |batch| {
            materialize(batch, &config, &loader, &mut group)
        }))
        .unwrap();
        assert_eq!(report, LoadReport { fetched: 29, materialized: 27, failed: false });
        assert!(!loader.urls.borrow().iter().any(|u| u.ends_with("/28.png")));
        let step = TAU / 28.0;
        for item in group.items() {
            assert!((1..28).contains(&item.slot));
            assert!((item.angle - item.slot as f32 * step).abs() < 1e-5);
            assert_eq!(item.source.image_ref(), Some(format!("https://img/{}.png", item.slot).as_str()));
        }
    }

    #[test]
    fn test_numeric_contract_still_materializes() {
        let batch = crate::records::parse_records(
            r#"{ "nfts": [ { "image": "https://img/a.png", "contract": 123, "tokenId": "5" } ] }"#,
        );
        let config = GalleryConfig::default();
        let loader = RecordingLoader::default();
        let mut group = ItemGroup::new();

        assert_eq!(materialize(&batch, &config, &loader, &mut group), 1);
        assert!(group.items()[0].link_url.ends_with("/123/5"));
    }

    #[test]
    fn test_fetch_failure_resolves_empty() {
        let source = StaticSource(Err(FetchErrorKind::Status(500)));
        let token = CancellationToken::new();
        let mut applied = None;
        let report = pollster::block_on(load_gallery(&source, &token, |batch| {
            applied = Some(batch.records.len());
            0
        }))
        .unwrap();
        assert_eq!(applied, Some(0));
        assert!(report.failed);
        assert_eq!(report.materialized, 0);
    }

    #[test]
    fn test_cancelled_load_is_discarded() {
        let source = StaticSource(Ok(r#"{ "nfts": [ { "image": "a" } ] }"#.to_string()));
        let token = CancellationToken::new();
        token.cancel();
        let mut called = false;
        let report = pollster::block_on(load_gallery(&source, &token, |_| {
            called = true;
            1
        }));
        assert!(report.is_none());
        assert!(!called);
    }
}
