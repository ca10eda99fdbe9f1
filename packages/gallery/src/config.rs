//! Tuning constants for the gallery, loadable from JSON.
//!
//! Every field has a default, so a host can pass `{}` (or nothing at all) and
//! get the stock look. Field names are camelCase on the wire to match the
//! page-side TypeScript.

use serde::{Deserialize, Serialize};

/// Default records endpoint (same-origin serverless route).
fn default_endpoint() -> String {
    format!("/api/fx1-nft?contract={}", default_contract())
}

/// Contract used when a record does not carry its own.
fn default_contract() -> String {
    "0x24c42adfb620f3835fcb31fbdf3c1773fac76970".to_string()
}

fn default_marketplace_url() -> String {
    "https://zora.co/collect".to_string()
}

/// Top-level configuration for one mounted gallery instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GalleryConfig {
    pub particles: ParticleConfig,
    pub ring: RingConfig,
    pub layout: LayoutConfig,
    pub cameras: CameraSetup,
    pub orbit: OrbitConfig,
    pub source: SourceConfig,

    /// Upper bound on the device pixel ratio used to size render surfaces.
    pub max_pixel_ratio: f32,

    /// Per-tick spin of the gallery group around Y (radians).
    pub gallery_spin: f32,

    /// Fixed RNG seed for the particle field. `None` seeds from the platform.
    pub seed: Option<u64>,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            particles: ParticleConfig::default(),
            ring: RingConfig::default(),
            layout: LayoutConfig::default(),
            cameras: CameraSetup::default(),
            orbit: OrbitConfig::default(),
            source: SourceConfig::default(),
            max_pixel_ratio: 2.0,
            gallery_spin: 0.0025,
            seed: None,
        }
    }
}

impl GalleryConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: GalleryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the scene degenerate.
    pub fn validate(&self) -> anyhow::Result<()> {
        let extent = self.particles.extent;
        if extent.iter().any(|e| !e.is_finite() || *e < 0.0) {
            anyhow::bail!("particle extent must be finite and non-negative: {:?}", extent);
        }
        if self.particles.drift_band <= 0.0 {
            anyhow::bail!("particle drift band must be positive");
        }
        if self.layout.min_slots == 0 {
            anyhow::bail!("layout minSlots must be at least 1");
        }
        if self.layout.radius <= 0.0 || self.layout.plane_size <= 0.0 {
            anyhow::bail!("layout radius and planeSize must be positive");
        }
        if self.orbit.min_distance > self.orbit.max_distance {
            anyhow::bail!(
                "orbit minDistance ({}) exceeds maxDistance ({})",
                self.orbit.min_distance,
                self.orbit.max_distance
            );
        }
        if !(0.0..=1.0).contains(&self.orbit.damping_factor) {
            anyhow::bail!("orbit dampingFactor must be within 0..=1");
        }
        if self.max_pixel_ratio <= 0.0 {
            anyhow::bail!("maxPixelRatio must be positive");
        }
        Ok(())
    }
}

/// Ambient point cloud parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticleConfig {
    pub count: usize,
    /// Full size of the centred sampling box (x, y, z).
    pub extent: [f32; 3],
    pub base_hue: f32,
    pub hue_jitter: f32,
    pub saturation: f32,
    pub base_lightness: f32,
    pub lightness_jitter: f32,
    /// World-space billboard size.
    pub size: f32,
    pub opacity: f32,
    /// Angular speed of the sinusoidal drift (per second of elapsed time).
    pub drift_speed: f32,
    /// Vertical displacement per tick at the sine peak.
    pub drift_amplitude: f32,
    /// Particles above `+drift_band` wrap to `-drift_band`.
    pub drift_band: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count: 420,
            extent: [40.0, 14.0, 30.0],
            base_hue: 0.56,
            hue_jitter: 0.06,
            saturation: 0.6,
            base_lightness: 0.48,
            lightness_jitter: 0.08,
            size: 0.08,
            opacity: 0.95,
            drift_speed: 0.06,
            drift_amplitude: 0.0008,
            drift_band: 20.0,
        }
    }
}

/// The decorative torus in the backdrop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RingConfig {
    pub radius: f32,
    pub tube: f32,
    pub radial_segments: u32,
    pub tubular_segments: u32,
    pub initial_tilt: f32,
    /// Per-tick rotation increments (x, y).
    pub spin: [f32; 2],
    pub color: [f32; 3],
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            radius: 1.6,
            tube: 0.25,
            radial_segments: 64,
            tubular_segments: 128,
            initial_tilt: 0.6,
            spin: [0.002, 0.004],
            color: hex_rgb(0x2aa6ff),
            emissive: hex_rgb(0x06213a),
            emissive_intensity: 0.6,
        }
    }
}

/// Placement of the collectible planes on their ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    /// Maximum number of records considered for materialization.
    pub max_items: usize,
    /// Floor on the slot count used for the angular step.
    pub min_slots: usize,
    pub radius: f32,
    pub plane_size: f32,
    pub height: f32,
    pub height_jitter: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            max_items: 28,
            min_slots: 6,
            radius: 5.0,
            plane_size: 1.6,
            height: 0.8,
            height_jitter: 0.25,
        }
    }
}

/// Perspective parameters for a single camera.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraParams {
    pub fov_degrees: f32,
    pub distance: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CameraSetup {
    pub ambient: CameraParams,
    pub gallery: CameraParams,
}

impl Default for CameraSetup {
    fn default() -> Self {
        Self {
            ambient: CameraParams { fov_degrees: 60.0, distance: 12.0, near: 0.1, far: 1000.0 },
            gallery: CameraParams { fov_degrees: 50.0, distance: 8.0, near: 0.1, far: 1000.0 },
        }
    }
}

/// Damped orbit controls bound to the gallery camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrbitConfig {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            enable_damping: true,
            damping_factor: 0.06,
            min_distance: 4.0,
            max_distance: 20.0,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
        }
    }
}

/// Where records come from and where clicks go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    pub endpoint: String,
    pub marketplace_url: String,
    pub default_contract: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            marketplace_url: default_marketplace_url(),
            default_contract: default_contract(),
        }
    }
}

/// Convert a 0xRRGGBB literal into linear-ish [0, 1] floats.
pub fn hex_rgb(hex: u32) -> [f32; 3] {
    [
        ((hex >> 16) & 0xff) as f32 / 255.0,
        ((hex >> 8) & 0xff) as f32 / 255.0,
        (hex & 0xff) as f32 / 255.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = GalleryConfig::from_json("{}").unwrap();
        assert_eq!(config.particles.count, 420);
        assert_eq!(config.layout.max_items, 28);
        assert_eq!(config.layout.min_slots, 6);
        assert_eq!(config.orbit.min_distance, 4.0);
        assert_eq!(config.orbit.max_distance, 20.0);
        assert!(config.source.endpoint.contains(&config.source.default_contract));
    }

    #[test]
    fn test_partial_override() {
        let config = GalleryConfig::from_json(
            r#"{ "particles": { "count": 12 }, "layout": { "radius": 3.5 }, "seed": 7 }"#,
        )
        .unwrap();
        assert_eq!(config.particles.count, 12);
        assert_eq!(config.particles.extent, [40.0, 14.0, 30.0]);
        assert_eq!(config.layout.radius, 3.5);
        assert_eq!(config.layout.max_items, 28);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_invalid_orbit_bounds_rejected() {
        let result = GalleryConfig::from_json(
            r#"{ "orbit": { "minDistance": 30.0, "maxDistance": 10.0 } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_min_slots_rejected() {
        assert!(GalleryConfig::from_json(r#"{ "layout": { "minSlots": 0 } }"#).is_err());
    }

    #[test]
    fn test_hex_rgb() {
        assert_eq!(hex_rgb(0xff0000), [1.0, 0.0, 0.0]);
        let c = hex_rgb(0x2aa6ff);
        assert!((c[0] - 42.0 / 255.0).abs() < 1e-6);
        assert!((c[2] - 1.0).abs() < 1e-6);
    }
}
