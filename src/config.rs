use serde::{Deserialize, Serialize};

use crate::error::OcclusionError;
use crate::occlusion::binner::BinnedTri;
use crate::occlusion::coarse::COARSE_BLOCK_SIZE;

/// Which code path bins and rasterizes triangles.
///
/// Both paths produce bit-identical framebuffers; the lane path is simply faster.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimdMode {
    /// One triangle at a time while binning, one pixel at a time while rasterizing.
    Scalar,
    /// Four triangles per gather while binning, one 2x2 quad per step while rasterizing.
    Lanes4,
}

impl Default for SimdMode {
    fn default() -> Self {
        SimdMode::Lanes4
    }
}

/// Sizing and scheduling parameters for an [`OcclusionBuffer`].
///
/// Every buffer is sized from these values once, at construction.
///
/// [`OcclusionBuffer`]: crate::occlusion::OcclusionBuffer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Framebuffer width in pixels.
    pub width: usize,
    /// Framebuffer height in pixels.
    pub height: usize,
    /// Binning tile width in pixels.
    pub tile_width: usize,
    /// Binning tile height in pixels.
    pub tile_height: usize,
    /// Capacity of each tile's bin. Triangles past this are dropped and counted.
    pub tris_per_bin: usize,
    /// Number of parallel tile rasterization jobs.
    pub num_jobs: usize,
    /// Scalar or 4-lane code path.
    pub simd_mode: SimdMode,
    /// Memory budget for all buffers, in bytes.
    pub mempool_bytes: usize,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            tile_width: 80,
            tile_height: 96,
            tris_per_bin: 16 * 1024,
            num_jobs: 4,
            simd_mode: SimdMode::Lanes4,
            mempool_bytes: 32 * 1024 * 1024,
        }
    }
}

impl OcclusionConfig {
    /// Parse a configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, OcclusionError> {
        let config: OcclusionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of tiles horizontally (partial right column rounds up).
    #[inline]
    pub fn tiles_x(&self) -> usize {
        self.width.div_ceil(self.tile_width)
    }

    /// Number of tiles vertically (partial bottom row rounds up).
    #[inline]
    pub fn tiles_y(&self) -> usize {
        self.height.div_ceil(self.tile_height)
    }

    #[inline]
    pub fn num_tiles(&self) -> usize {
        self.tiles_x() * self.tiles_y()
    }

    /// Bytes needed by the framebuffer, coarse buffer, bin arena and auxiliary arrays.
    ///
    /// Fails with [`OcclusionError::FootprintOverflow`] when the total does not fit a `usize`.
    pub fn memory_footprint(&self) -> Result<usize, OcclusionError> {
        let tiles = self.tiles_x().checked_mul(self.tiles_y());
        let blocks = (self.width / COARSE_BLOCK_SIZE).checked_mul(self.height / COARSE_BLOCK_SIZE);

        let bytes = |count: Option<usize>, size: usize| count.and_then(|n| n.checked_mul(size));
        let parts = [
            bytes(self.width.checked_mul(self.height), std::mem::size_of::<f32>()),
            bytes(blocks, std::mem::size_of::<glam::Vec2>()),
            bytes(tiles.and_then(|t| t.checked_mul(self.tris_per_bin)), std::mem::size_of::<BinnedTri>()),
            // bin counts + tile dispatch order
            bytes(tiles.and_then(|t| t.checked_mul(2)), std::mem::size_of::<u32>()),
        ];

        parts
            .into_iter()
            .try_fold(0usize, |total, part| part.and_then(|p| total.checked_add(p)))
            .ok_or(OcclusionError::FootprintOverflow)
    }

    /// Check the configuration against the layout requirements of the rasterizer.
    pub fn validate(&self) -> Result<(), OcclusionError> {
        let block = COARSE_BLOCK_SIZE;
        let aligned = |w: usize, h: usize| w > 0 && h > 0 && w % block == 0 && h % block == 0;

        if !aligned(self.width, self.height) {
            return Err(OcclusionError::InvalidDimensions {
                what: "framebuffer",
                width: self.width,
                height: self.height,
                block,
            });
        }
        if !aligned(self.tile_width, self.tile_height) {
            return Err(OcclusionError::InvalidDimensions {
                what: "tile",
                width: self.tile_width,
                height: self.tile_height,
                block,
            });
        }
        if self.tile_width > self.width || self.tile_height > self.height {
            return Err(OcclusionError::TileNotAligned {
                tile_width: self.tile_width,
                tile_height: self.tile_height,
                width: self.width,
                height: self.height,
            });
        }
        if self.tris_per_bin == 0 {
            return Err(OcclusionError::ZeroCapacity);
        }
        if self.num_jobs == 0 {
            return Err(OcclusionError::NoWorkers);
        }

        let required = self.memory_footprint()?;
        if required > self.mempool_bytes {
            return Err(OcclusionError::MempoolTooSmall {
                required,
                available: self.mempool_bytes,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_matches_reference_layout() {
        let config = OcclusionConfig::default();
        assert_eq!(config.tiles_x(), 8);
        assert_eq!(config.tiles_y(), 4); // 360 / 96 = 3.75, partial bottom row
        assert_eq!(config.num_tiles(), 32);
        assert!(config.validate().is_ok());
        assert!(config.memory_footprint().unwrap() <= config.mempool_bytes);
    }

    #[test]
    fn rejects_unaligned_framebuffer() {
        let config = OcclusionConfig {
            width: 642,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OcclusionError::InvalidDimensions { what: "framebuffer", .. })
        ));
    }

    #[test]
    fn rejects_odd_tiles_and_empty_bins() {
        let odd = OcclusionConfig {
            tile_width: 60,
            ..Default::default()
        };
        assert!(matches!(
            odd.validate(),
            Err(OcclusionError::InvalidDimensions { what: "tile", .. })
        ));

        let empty = OcclusionConfig {
            tris_per_bin: 0,
            ..Default::default()
        };
        assert_eq!(empty.validate(), Err(OcclusionError::ZeroCapacity));

        let idle = OcclusionConfig {
            num_jobs: 0,
            ..Default::default()
        };
        assert_eq!(idle.validate(), Err(OcclusionError::NoWorkers));
    }

    #[test]
    fn rejects_budget_overrun() {
        let config = OcclusionConfig {
            mempool_bytes: 1024,
            ..Default::default()
        };
        match config.validate() {
            Err(OcclusionError::MempoolTooSmall { required, available }) => {
                assert_eq!(available, 1024);
                assert_eq!(Ok(required), config.memory_footprint());
            }
            other => panic!("expected MempoolTooSmall, got {:?}", other),
        }
    }

    #[test]
    fn oversized_bins_fail_instead_of_wrapping() {
        assert_eq!(
            OcclusionConfig::from_toml_str("tris_per_bin = 1152921504606846976"),
            Err(OcclusionError::FootprintOverflow)
        );

        let huge = OcclusionConfig {
            width: usize::MAX - 7,
            height: usize::MAX - 7,
            tile_width: 80,
            tile_height: 96,
            ..Default::default()
        };
        assert_eq!(huge.memory_footprint(), Err(OcclusionError::FootprintOverflow));
        assert_eq!(huge.validate(), Err(OcclusionError::FootprintOverflow));
    }

    #[test]
    fn parses_partial_toml() {
        let config = OcclusionConfig::from_toml_str(
            r#"
            num_jobs = 8
            simd_mode = "scalar"
            tris_per_bin = 2048
            "#,
        )
        .unwrap();

        assert_eq!(config.num_jobs, 8);
        assert_eq!(config.simd_mode, SimdMode::Scalar);
        assert_eq!(config.tris_per_bin, 2048);
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 360);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = OcclusionConfig::from_toml_str("width = \"wide\"").unwrap_err();
        assert!(matches!(err, OcclusionError::Config(_)));
    }
}
