pub mod config;
pub mod error;
pub mod geometry;
/// Soft Occlusion - tiled software depth rasterizer for occlusion culling
/// Occluders are binned into screen tiles, rasterized in parallel and queried
/// through a coarse min/max grid backed by the full-resolution depth buffer
pub mod occlusion;
pub mod perf;

pub use config::{OcclusionConfig, SimdMode};
pub use error::OcclusionError;
pub use geometry::{viewport_matrix, Aabb, TransformedMesh};
pub use occlusion::{
    BinStats, GlobalRayonPool, InlinePool, OccluderMesh, OcclusionBuffer, Visibility,
    VisibilityObject, WorkerPool,
};
pub use perf::{CounterSnapshot, OcclusionCounters, OCCLUSION_COUNTERS};
