//! Software occlusion buffer pipeline.
//!
//! Per frame: [`OcclusionBuffer::bin_triangles`] sorts occluder triangles into
//! screen tiles, [`OcclusionBuffer::rasterize_binned_triangles`] fills the
//! inverted-depth framebuffer and the coarse 8x8 min/max grid tile by tile on a
//! worker pool, then [`OcclusionBuffer::early_test`] and
//! [`OcclusionBuffer::full_test`] answer visibility queries for bounding boxes.
//!
//! All storage is allocated once in [`OcclusionBuffer::new`].

pub mod binner;
pub mod coarse;
pub mod framebuffer;
pub mod lanes;
pub mod query;
pub mod rasterizer;
pub mod scheduler;
pub mod visibility;

pub use binner::{BinStats, BinnedTri, TriangleBins};
pub use coarse::{CoarseBuffer, COARSE_BLOCK_SIZE};
pub use framebuffer::{tiled_index, DepthBuffer, TileRect};
pub use query::{Projection, ScreenRect, Visibility};
pub use scheduler::{GlobalRayonPool, InlinePool, TileScheduler, WorkerPool};
pub use visibility::{OccluderMesh, VertexLanes, VisibilityObject};

use glam::{Mat4, Vec2};
use std::fmt::Write;

use crate::config::OcclusionConfig;
use crate::error::OcclusionError;
use crate::geometry::Aabb;
use crate::perf_scope;

/// Software occlusion buffer: tiled inverted-depth framebuffer, coarse 8x8
/// min/max grid and per-tile triangle bins for one viewport.
///
/// Bin occluders with [`Self::bin_triangles`], fill the depth with
/// [`Self::rasterize_binned_triangles`], then query bounding boxes with
/// [`Self::early_test`] or [`Self::full_test`]. All storage is allocated once
/// in [`Self::new`].
pub struct OcclusionBuffer {
    config: OcclusionConfig,
    depth: DepthBuffer,
    coarse: CoarseBuffer,
    bins: TriangleBins,
    scheduler: TileScheduler,
    footprint: usize,
}

impl OcclusionBuffer {
    /// Validate `config` and allocate every buffer.
    pub fn new(config: OcclusionConfig) -> Result<Self, OcclusionError> {
        config.validate()?;
        let footprint = config.memory_footprint()?;

        let buffer = Self {
            depth: DepthBuffer::new(config.width, config.height),
            coarse: CoarseBuffer::new(config.width, config.height),
            bins: TriangleBins::new(&config),
            scheduler: TileScheduler::new(config.num_tiles()),
            footprint,
            config,
        };

        tracing::debug!(
            width = buffer.config.width,
            height = buffer.config.height,
            tiles = buffer.num_tiles(),
            tris_per_bin = buffer.config.tris_per_bin,
            bytes = buffer.memory_footprint(),
            "occlusion buffer allocated"
        );
        Ok(buffer)
    }

    /// 640x360 buffer with 80x96 tiles.
    pub fn with_defaults() -> Result<Self, OcclusionError> {
        Self::new(OcclusionConfig::default())
    }

    /// Replace this frame's bins with the triangles of `objects`.
    pub fn bin_triangles<O: VisibilityObject>(&mut self, objects: &[O]) -> &mut Self {
        perf_scope!("bin_triangles");

        self.bins.clear();
        self.bins.bin_objects(objects, self.config.simd_mode);

        let stats = self.bins.stats();
        tracing::debug!(
            submitted = stats.submitted,
            binned = stats.binned,
            rejected_area = stats.rejected_area,
            rejected_near = stats.rejected_near,
            rejected_guard_band = stats.rejected_guard_band,
            rejected_offscreen = stats.rejected_offscreen,
            entries = stats.entries,
            "binned triangles"
        );
        if stats.overflowed > 0 {
            tracing::warn!(
                dropped = stats.overflowed,
                capacity = self.bins.capacity(),
                "tile bins overflowed, occlusion will be conservative"
            );
        }
        if tracing::enabled!(tracing::Level::TRACE) {
            tracing::trace!("bin counts:\n{}", self.bin_count_grid());
        }

        self
    }

    /// Rasterize every tile's bin and rebuild the coarse grid. Blocks until
    /// all tiles are done.
    pub fn rasterize_binned_triangles<P: WorkerPool + ?Sized>(&mut self, pool: &P) -> &mut Self {
        perf_scope!("rasterize_binned_triangles");

        self.scheduler.prepare(self.bins.counts());

        let mode = self.config.simd_mode;
        let bins = &self.bins;
        let fb = self.depth.shared();
        let coarse = self.coarse.shared();

        self.scheduler.dispatch(pool, self.config.num_jobs, |tile| {
            let rect = bins.tile_rect(tile);
            // Safety: the scheduler hands each tile to exactly one worker and
            // tiles partition both buffers.
            unsafe {
                rasterizer::rasterize_tile(&fb, &rect, bins.bin(tile), mode);
                coarse::reduce_tile(&fb, &coarse, &rect);
            }
        });

        tracing::debug!(
            tiles = self.scheduler.claimed(),
            jobs = self.config.num_jobs,
            workers = pool.num_workers(),
            busiest_tile = self.scheduler.order().first().copied(),
            "rasterized tiles"
        );
        #[cfg(feature = "profiling")]
        crate::perf::OCCLUSION_COUNTERS.snapshot().log_report();

        self
    }

    /// Tiled depth storage; see [`tiled_index`].
    #[inline]
    pub fn framebuffer(&self) -> &[f32] {
        self.depth.as_slice()
    }

    /// Row-major copy, bottom row first.
    pub fn detiled_framebuffer(&self) -> Vec<f32> {
        self.depth.detiled()
    }

    /// `(min, max)` per 8x8 block, row-major.
    #[inline]
    pub fn coarse_framebuffer(&self) -> &[Vec2] {
        self.coarse.as_slice()
    }

    #[inline]
    pub fn depth_at(&self, x: usize, y: usize) -> f32 {
        self.depth.depth_at(x, y)
    }

    /// Project `bounds` with `view_projection_viewport` onto this buffer.
    pub fn project(&self, bounds: &Aabb, view_projection_viewport: &Mat4) -> Projection {
        query::project_bounds(bounds, view_projection_viewport, self.config.width, self.config.height)
    }

    /// Conservative test against the coarse grid.
    pub fn early_test(&self, bounds: &Aabb, view_projection_viewport: &Mat4) -> Visibility {
        query::early_test(&self.coarse, &self.project(bounds, view_projection_viewport))
    }

    /// Exact test against the depth buffer. `false` means occluded.
    pub fn full_test(&self, bounds: &Aabb, view_projection_viewport: &Mat4) -> bool {
        query::full_test(&self.depth, &self.project(bounds, view_projection_viewport))
    }

    /// Early test, falling back to the full test when it is inconclusive.
    pub fn is_visible(&self, bounds: &Aabb, view_projection_viewport: &Mat4) -> bool {
        let projection = self.project(bounds, view_projection_viewport);
        match query::early_test(&self.coarse, &projection) {
            Visibility::Visible => true,
            Visibility::Occluded => false,
            Visibility::Unknown => query::full_test(&self.depth, &projection),
        }
    }

    #[inline]
    pub fn config(&self) -> &OcclusionConfig {
        &self.config
    }

    #[inline]
    pub fn tiles_x(&self) -> usize {
        self.bins.tiles_x()
    }

    #[inline]
    pub fn tiles_y(&self) -> usize {
        self.bins.tiles_y()
    }

    #[inline]
    pub fn num_tiles(&self) -> usize {
        self.bins.num_tiles()
    }

    #[inline]
    pub fn bin_counts(&self) -> &[u32] {
        self.bins.counts()
    }

    #[inline]
    pub fn bin(&self, tile: usize) -> &[BinnedTri] {
        self.bins.bin(tile)
    }

    #[inline]
    pub fn tile_rect(&self, tile: usize) -> TileRect {
        self.bins.tile_rect(tile)
    }

    /// Tiles in the order the last rasterization pass dispatched them.
    #[inline]
    pub fn tile_order(&self) -> &[u32] {
        self.scheduler.order()
    }

    #[inline]
    pub fn bin_stats(&self) -> BinStats {
        self.bins.stats()
    }

    #[inline]
    pub fn memory_footprint(&self) -> usize {
        self.footprint
    }

    fn bin_count_grid(&self) -> String {
        let mut grid = String::new();
        for row in self.bins.counts().chunks(self.bins.tiles_x()) {
            for count in row {
                let _ = write!(grid, "{:6}", count);
            }
            grid.push('\n');
        }
        grid
    }
}
