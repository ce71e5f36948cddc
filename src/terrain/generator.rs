//! Noise-based density sources for filling the grid.

use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Density in `[0, 1]` at a world position. Values `>= iso` are solid.
pub trait DensitySource: Sync {
    fn density(&self, world: Vec3) -> f32;
}

impl<F> DensitySource for F
where
    F: Fn(Vec3) -> f32 + Sync,
{
    fn density(&self, world: Vec3) -> f32 {
        self(world)
    }
}

/// Parameters controlling cave generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaveParams {
    pub seed: u32,
    pub scale: f32,       // World units per noise period (larger = smoother)
    pub octaves: u32,     // FBM octaves (detail levels)
    pub persistence: f32, // FBM persistence (0.5 typical)
    pub lacunarity: f32,  // FBM lacunarity (2.0 typical)
    /// Noise level at which rock turns into cave
    pub threshold: f32,
    /// Above this height everything is air
    pub ground_height: f32,
    /// Width of the fade from rock to air at the ground height
    pub surface_falloff: f32,
}

impl Default for CaveParams {
    fn default() -> Self {
        Self {
            seed: 12345,
            scale: 24.0,
            octaves: 4,
            persistence: 0.5,
            lacunarity: 2.0,
            threshold: 0.1,
            ground_height: 48.0,
            surface_falloff: 4.0,
        }
    }
}

/// Rock with fractal noise tunnels, capped by a flat ground surface.
pub struct CaveGenerator {
    params: CaveParams,
    noise: Fbm<Perlin>,
}

impl CaveGenerator {
    pub fn new(params: CaveParams) -> Self {
        let noise = Fbm::<Perlin>::new(params.seed)
            .set_octaves(params.octaves as usize)
            .set_persistence(params.persistence as f64)
            .set_lacunarity(params.lacunarity as f64);

        Self { params, noise }
    }

    pub fn params(&self) -> &CaveParams {
        &self.params
    }

    /// Raw noise in roughly `[-1, 1]`.
    pub fn noise_at(&self, p: Vec3) -> f32 {
        let q = p / self.params.scale;
        self.noise.get([q.x as f64, q.y as f64, q.z as f64]) as f32
    }
}

impl DensitySource for CaveGenerator {
    fn density(&self, world: Vec3) -> f32 {
        // 1 deep underground, 0 above ground
        let falloff = self.params.surface_falloff.max(f32::EPSILON);
        let ground = ((self.params.ground_height - world.y) / falloff + 0.5).clamp(0.0, 1.0);
        if ground == 0.0 {
            return 0.0;
        }

        // Tunnels where the noise is below the threshold
        let rock = (0.5 + (self.noise_at(world) - self.params.threshold) * 2.0).clamp(0.0, 1.0);
        ground.min(rock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_source() {
        let source = |p: Vec3| -> f32 { if p.y < 2.0 { 1.0 } else { 0.0 } };
        assert_eq!(source.density(Vec3::new(0.0, 1.0, 0.0)), 1.0);
        assert_eq!(DensitySource::density(&source, Vec3::new(0.0, 3.0, 0.0)), 0.0);
    }

    #[test]
    fn test_density_in_unit_range() {
        let generator = CaveGenerator::new(CaveParams::default());
        for i in 0..200 {
            let p = Vec3::new(i as f32 * 1.37, (i % 60) as f32, i as f32 * 0.71);
            let d = generator.density(p);
            assert!((0.0..=1.0).contains(&d), "density {} at {:?}", d, p);
        }
    }

    #[test]
    fn test_air_above_ground() {
        let generator = CaveGenerator::new(CaveParams { ground_height: 10.0, ..Default::default() });
        assert_eq!(generator.density(Vec3::new(3.0, 20.0, 3.0)), 0.0);
    }

    #[test]
    fn test_deterministic_per_seed() {
        let a = CaveGenerator::new(CaveParams::default());
        let b = CaveGenerator::new(CaveParams::default());
        let c = CaveGenerator::new(CaveParams { seed: 7, ..Default::default() });
        let p = Vec3::new(10.3, 5.7, -2.2);
        assert_eq!(a.density(p), b.density(p));

        let differs = (0..32).any(|i| {
            let p = Vec3::new(i as f32 * 3.1, 4.0, i as f32 * 1.3);
            a.noise_at(p) != c.noise_at(p)
        });
        assert!(differs);
    }

    #[test]
    fn test_params_json_defaults() {
        let params: CaveParams = serde_json::from_str(r#"{"seed": 3}"#).unwrap();
        assert_eq!(params.seed, 3);
        assert_eq!(params.octaves, CaveParams::default().octaves);
    }
}
