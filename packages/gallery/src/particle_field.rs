//! Ambient backdrop geometry: the drifting point cloud and the focal torus.
//!
//! Both are built once at activation. The point cloud keeps its buffers for the
//! lifetime of the instance; drift mutates positions in place and raises a
//! dirty flag that the renderer clears when it re-uploads.

use glam::Vec3;
use rand::Rng;

use crate::config::{ParticleConfig, RingConfig};

/// A fixed-size cloud of coloured points.
#[derive(Debug, Clone)]
pub struct ParticleField {
    positions: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
    drift_speed: f32,
    drift_amplitude: f32,
    drift_band: f32,
    size: f32,
    opacity: f32,
    dirty: bool,
}

impl ParticleField {
    /// Sample `config.count` particles uniformly inside the centred extent box,
    /// coloured from the configured hue band.
    pub fn generate<R: Rng + ?Sized>(config: &ParticleConfig, rng: &mut R) -> Self {
        let mut positions = Vec::with_capacity(config.count);
        let mut colors = Vec::with_capacity(config.count);
        let [ex, ey, ez] = config.extent;

        for _ in 0..config.count {
            positions.push([
                (rng.random::<f32>() - 0.5) * ex,
                (rng.random::<f32>() - 0.5) * ey,
                (rng.random::<f32>() - 0.5) * ez,
            ]);

            let hue = config.base_hue + rng.random::<f32>() * config.hue_jitter;
            let lightness = config.base_lightness + rng.random::<f32>() * config.lightness_jitter;
            colors.push(hsl_to_rgb(hue, config.saturation, lightness));
        }

        Self {
            positions,
            colors,
            drift_speed: config.drift_speed,
            drift_amplitude: config.drift_amplitude,
            drift_band: config.drift_band,
            size: config.size,
            opacity: config.opacity,
            // A fresh field has never been uploaded.
            dirty: true,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Displace every particle vertically by `sin(elapsed * speed + index) * amplitude`.
    ///
    /// Particles that leave the band through one edge re-enter at the other, so
    /// the drift never grows without bound. The buffer is mutated in place and
    /// flagged for upload.
    pub fn drift(&mut self, elapsed: f32) {
        let phase = elapsed * self.drift_speed;
        for (i, p) in self.positions.iter_mut().enumerate() {
            p[1] += (phase + i as f32).sin() * self.drift_amplitude;
            if p[1] > self.drift_band {
                p[1] = -self.drift_band;
            } else if p[1] < -self.drift_band {
                p[1] = self.drift_band;
            }
        }
        self.dirty = true;
    }

    /// Whether positions changed since the last upload.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, returning whether an upload is due.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

/// Emissive standard-ish material for the torus.
#[derive(Debug, Clone, Copy)]
pub struct EmissiveMaterial {
    pub color: [f32; 3],
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
}

/// The slowly tumbling torus at the centre of the backdrop.
#[derive(Debug, Clone)]
pub struct FocalRing {
    pub radius: f32,
    pub tube: f32,
    pub radial_segments: u32,
    pub tubular_segments: u32,
    /// Euler angles (XYZ), radians.
    pub rotation: Vec3,
    pub material: EmissiveMaterial,
    spin: [f32; 2],
}

impl FocalRing {
    pub fn new(config: &RingConfig) -> Self {
        Self {
            radius: config.radius,
            tube: config.tube,
            radial_segments: config.radial_segments.max(3),
            tubular_segments: config.tubular_segments.max(3),
            rotation: Vec3::new(config.initial_tilt, 0.0, 0.0),
            material: EmissiveMaterial {
                color: config.color,
                emissive: config.emissive,
                emissive_intensity: config.emissive_intensity,
            },
            spin: config.spin,
        }
    }

    /// Apply one tick of rotation on X and Y.
    pub fn spin(&mut self) {
        self.rotation.x += self.spin[0];
        self.rotation.y += self.spin[1];
    }

    pub fn model_matrix(&self) -> glam::Mat4 {
        glam::Mat4::from_euler(glam::EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }
}

/// HSL (all components in [0, 1], hue wrapping) to RGB.
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    let h = hue.rem_euclid(1.0);
    let s = saturation.clamp(0.0, 1.0);
    let l = lightness.clamp(0.0, 1.0);

    if s == 0.0 {
        return [l, l, l];
    }

    let high = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let low = 2.0 * l - high;

    [
        hue_to_channel(low, high, h + 1.0 / 3.0),
        hue_to_channel(low, high, h),
        hue_to_channel(low, high, h - 1.0 / 3.0),
    ]
}

fn hue_to_channel(low: f32, high: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        low + (high - low) * 6.0 * t
    } else if t < 0.5 {
        high
    } else if t < 2.0 / 3.0 {
        low + (high - low) * 6.0 * (2.0 / 3.0 - t)
    } else {
        low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rgb_to_hsl([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;
        if max == min {
            return (0.0, 0.0, l);
        }
        let d = max - min;
        let s = if l <= 0.5 { d / (max + min) } else { d / (2.0 - max - min) };
        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };
        (h / 6.0, s, l)
    }

    #[test]
    fn test_generate_count_and_bounds() {
        let config = ParticleConfig::default();
        let mut rng = StdRng::seed_from_u64(42);
        for count in [0usize, 1, 17, 420] {
            let config = ParticleConfig { count, ..config.clone() };
            let field = ParticleField::generate(&config, &mut rng);
            assert_eq!(field.len(), count);
            assert_eq!(field.colors().len(), count);
            for p in field.positions() {
                for axis in 0..3 {
                    let half = config.extent[axis] / 2.0;
                    assert!(p[axis] >= -half && p[axis] <= half, "axis {} out of bounds: {}", axis, p[axis]);
                }
            }
        }
    }

    #[test]
    fn test_colors_stay_in_hue_band() {
        let config = ParticleConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let field = ParticleField::generate(&config, &mut rng);
        let eps = 1e-3;
        for c in field.colors() {
            let (h, s, l) = rgb_to_hsl(*c);
            assert!(h >= config.base_hue - eps && h <= config.base_hue + config.hue_jitter + eps, "hue {}", h);
            assert!((s - config.saturation).abs() < eps, "saturation {}", s);
            assert!(
                l >= config.base_lightness - eps
                    && l <= config.base_lightness + config.lightness_jitter + eps,
                "lightness {}",
                l
            );
        }
    }

    #[test]
    fn test_hsl_primaries() {
        let red = hsl_to_rgb(0.0, 1.0, 0.5);
        assert!((red[0] - 1.0).abs() < 1e-6 && red[1].abs() < 1e-6 && red[2].abs() < 1e-6);
        let grey = hsl_to_rgb(0.3, 0.0, 0.25);
        assert_eq!(grey, [0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_drift_wraps_at_band() {
        let config = ParticleConfig { count: 4, drift_amplitude: 1.0, ..ParticleConfig::default() };
        let mut rng = StdRng::seed_from_u64(1);
        let mut field = ParticleField::generate(&config, &mut rng);
        for p in field.positions.iter_mut() {
            p[1] = config.drift_band - 1e-4;
        }
        // Particle 0 at elapsed 0 has sin(0) = 0 and must not move.
        // Particle 1 gets sin(1) * 1.0 and crosses the band.
        field.drift(0.0);
        assert!((field.positions()[0][1] - (config.drift_band - 1e-4)).abs() < 1e-6);
        assert_eq!(field.positions()[1][1], -config.drift_band);
    }

    #[test]
    fn test_drift_stays_bounded_and_marks_dirty() {
        let config = ParticleConfig { count: 64, drift_amplitude: 0.5, ..ParticleConfig::default() };
        let mut rng = StdRng::seed_from_u64(3);
        let mut field = ParticleField::generate(&config, &mut rng);
        assert!(field.take_dirty());
        assert!(!field.is_dirty());

        for tick in 0..2_000 {
            field.drift(tick as f32 / 60.0);
        }
        assert!(field.is_dirty());
        assert_eq!(field.len(), 64);
        for p in field.positions() {
            assert!(p[1] <= config.drift_band);
            assert!(p[1] >= -config.drift_band);
        }
    }

    #[test]
    fn test_ring_spin() {
        let config = RingConfig::default();
        let mut ring = FocalRing::new(&config);
        assert_eq!(ring.rotation.x, config.initial_tilt);
        ring.spin();
        ring.spin();
        assert!((ring.rotation.x - (config.initial_tilt + 2.0 * config.spin[0])).abs() < 1e-6);
        assert!((ring.rotation.y - 2.0 * config.spin[1]).abs() < 1e-6);
    }
}
