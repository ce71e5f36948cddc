//! Terrain configuration.

use std::fs;
use std::path::Path;

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::math::Aabb;

/// Largest supported `chunk_size`; keeps the triangle capacity well inside `u32`.
pub const MAX_CHUNK_SIZE: u32 = 128;

/// Configuration for a chunked density terrain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Cells per chunk axis. The density field holds `chunk_size + 2` samples per axis.
    pub chunk_size: u32,
    /// World units per voxel.
    pub chunk_scale: f32,
    /// Number of chunks along x, y and z.
    pub chunks: UVec3,
    /// World-space minimum corner of the grid.
    pub origin: Vec3,
    /// Density threshold of the extracted surface.
    pub iso_level: f32,
    /// Chunks visited by a multi-chunk raycast before giving up.
    pub max_raycast_hops: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            chunk_scale: 0.5,
            chunks: UVec3::new(16, 8, 16),
            origin: Vec3::ZERO,
            iso_level: 0.5,
            max_raycast_hops: 10,
        }
    }
}

impl TerrainConfig {
    /// Small grid handy for tests and tools.
    pub fn small(chunk_size: u32, chunks: UVec3) -> Self {
        Self {
            chunk_size,
            chunk_scale: 1.0,
            chunks,
            ..Default::default()
        }
    }

    /// Reject configurations the extractor or the grid cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(2..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(Error::Config(format!(
                "chunk_size must lie in [2, {}], got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if !(self.chunk_scale.is_finite() && self.chunk_scale > 0.0) {
            return Err(Error::Config(format!(
                "chunk_scale must be positive, got {}",
                self.chunk_scale
            )));
        }
        if self.chunks.min_element() == 0 {
            return Err(Error::Config(format!(
                "chunk counts must be non-zero, got {:?}",
                self.chunks
            )));
        }
        if !(self.iso_level > 0.0 && self.iso_level < 1.0) {
            return Err(Error::Config(format!(
                "iso_level must lie strictly inside (0, 1), got {}",
                self.iso_level
            )));
        }
        if !self.origin.is_finite() {
            return Err(Error::Config("origin must be finite".into()));
        }
        Ok(())
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), text)?;
        Ok(())
    }

    /// Samples per axis of a chunk's density field.
    pub fn padded_dim(&self) -> u32 {
        self.chunk_size + 2
    }

    /// World distance between neighbouring chunk origins.
    pub fn step_size(&self) -> f32 {
        (self.chunk_size - 1) as f32 * self.chunk_scale
    }

    /// Worst-case triangle count a single extraction may record.
    pub fn triangle_capacity(&self) -> u32 {
        self.chunk_size.pow(3) * 3
    }

    /// Total number of chunks in the grid.
    pub fn chunk_count(&self) -> usize {
        self.chunks.x as usize * self.chunks.y as usize * self.chunks.z as usize
    }

    /// World bounding box `[min_corner, max_corner]` of the grid.
    pub fn grid_bounds(&self) -> Aabb {
        let extent = self.chunks.as_vec3() * self.step_size();
        Aabb::new(self.origin, self.origin + extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TerrainConfig::default();
        config.validate().unwrap();
        assert_eq!(config.padded_dim(), 34);
        assert!((config.step_size() - 15.5).abs() < 1e-6);
        assert_eq!(config.triangle_capacity(), 32 * 32 * 32 * 3);
        assert_eq!(config.chunk_count(), 16 * 8 * 16);
    }

    #[test]
    fn test_grid_bounds() {
        let config = TerrainConfig {
            origin: Vec3::new(10.0, 0.0, -5.0),
            ..TerrainConfig::small(9, UVec3::new(2, 1, 3))
        };
        let bounds = config.grid_bounds();
        assert_eq!(bounds.min, Vec3::new(10.0, 0.0, -5.0));
        assert_eq!(bounds.max, Vec3::new(26.0, 8.0, 19.0));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TerrainConfig::default();
        config.chunk_size = 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TerrainConfig::default();
        config.chunk_size = MAX_CHUNK_SIZE + 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = TerrainConfig::default();
        config.chunk_size = 1200;
        assert!(config.validate().is_err());

        let mut config = TerrainConfig::default();
        config.chunk_size = MAX_CHUNK_SIZE;
        config.validate().unwrap();
        assert_eq!(config.triangle_capacity(), 128 * 128 * 128 * 3);

        let mut config = TerrainConfig::default();
        config.chunk_scale = 0.0;
        assert!(config.validate().is_err());

        let mut config = TerrainConfig::default();
        config.chunks = UVec3::new(4, 0, 4);
        assert!(config.validate().is_err());

        let mut config = TerrainConfig::default();
        config.iso_level = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terrain.json");

        let config = TerrainConfig {
            iso_level: 0.4,
            ..TerrainConfig::small(16, UVec3::new(3, 2, 1))
        };
        config.save(&path).unwrap();

        let loaded = TerrainConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_fills_missing_fields_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "chunk_size": 8 }"#).unwrap();

        let loaded = TerrainConfig::load(&path).unwrap();
        assert_eq!(loaded.chunk_size, 8);
        assert_eq!(loaded.iso_level, 0.5);
        assert_eq!(loaded.chunks, UVec3::new(16, 8, 16));
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "chunk_size": 1 }"#).unwrap();
        assert!(matches!(TerrainConfig::load(&path), Err(Error::Config(_))));
    }
}
