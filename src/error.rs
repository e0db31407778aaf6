//! Errors raised while building an occlusion buffer.
//!
//! Only construction and configuration loading can fail. The per-frame
//! binning, rasterization and query paths never return errors.

use thiserror::Error;

/// Errors that can occur when configuring or constructing an [`OcclusionBuffer`].
///
/// [`OcclusionBuffer`]: crate::occlusion::OcclusionBuffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OcclusionError {
    /// Framebuffer or tile dimensions are zero or not divisible by the coarse block size.
    #[error("invalid dimensions: {what} is {width}x{height}, must be non-zero multiples of {block}")]
    InvalidDimensions {
        /// Which extent was rejected ("framebuffer" or "tile").
        what: &'static str,
        /// Rejected width.
        width: usize,
        /// Rejected height.
        height: usize,
        /// Required granularity in pixels.
        block: usize,
    },

    /// Tiles larger than the framebuffer.
    #[error("tile {tile_width}x{tile_height} does not fit framebuffer {width}x{height}")]
    TileNotAligned {
        /// Tile width in pixels.
        tile_width: usize,
        /// Tile height in pixels.
        tile_height: usize,
        /// Framebuffer width in pixels.
        width: usize,
        /// Framebuffer height in pixels.
        height: usize,
    },

    /// Bins need room for at least one triangle.
    #[error("triangles per bin must be non-zero")]
    ZeroCapacity,

    /// The tile scheduler needs at least one job.
    #[error("number of rasterization jobs must be non-zero")]
    NoWorkers,

    /// The configured memory budget cannot hold all buffers.
    #[error("mempool too small: need {required} bytes, have {available}")]
    MempoolTooSmall {
        /// Bytes required by the configuration.
        required: usize,
        /// Bytes made available by the configuration.
        available: usize,
    },

    /// Buffer sizes derived from the configuration overflow `usize`.
    #[error("configuration too large: buffer sizes overflow usize")]
    FootprintOverflow,

    /// Configuration text could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<toml::de::Error> for OcclusionError {
    fn from(err: toml::de::Error) -> Self {
        OcclusionError::Config(err.to_string())
    }
}
