/// Coarse min/max depth per 8x8 block, used by the conservative early test.
use std::marker::PhantomData;

use glam::Vec2;

use super::framebuffer::{tiled_index, DepthBuffer, SharedDepth, TileRect};

/// Side of a coarse block in pixels.
pub const COARSE_BLOCK_SIZE: usize = 8;

/// Grid of `(min, max)` depth pairs, one per 8x8 pixel block, row-major with
/// block row 0 at the top of the screen.
pub struct CoarseBuffer {
    blocks_x: usize,
    blocks_y: usize,
    data: Vec<Vec2>,
}

impl CoarseBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let blocks_x = width / COARSE_BLOCK_SIZE;
        let blocks_y = height / COARSE_BLOCK_SIZE;
        Self {
            blocks_x,
            blocks_y,
            data: vec![Vec2::ZERO; blocks_x * blocks_y],
        }
    }

    #[inline]
    pub fn blocks_x(&self) -> usize {
        self.blocks_x
    }

    #[inline]
    pub fn blocks_y(&self) -> usize {
        self.blocks_y
    }

    #[inline]
    pub fn as_slice(&self) -> &[Vec2] {
        &self.data
    }

    #[inline]
    pub fn block(&self, bx: usize, by: usize) -> Vec2 {
        self.data[by * self.blocks_x + bx]
    }

    /// Recompute every block from `depth`.
    pub fn rebuild(&mut self, depth: &DepthBuffer) {
        let width = depth.width();
        let fb = depth.as_slice();
        for by in 0..self.blocks_y {
            for bx in 0..self.blocks_x {
                self.data[by * self.blocks_x + bx] = block_min_max(|i| fb[i], width, bx, by);
            }
        }
    }

    pub(crate) fn shared(&mut self) -> SharedCoarse<'_> {
        SharedCoarse {
            blocks_x: self.blocks_x,
            ptr: self.data.as_mut_ptr(),
            _buffer: PhantomData,
        }
    }
}

/// Raw view of a [`CoarseBuffer`] for tile workers. Tile edges fall on block
/// edges, so each block belongs to exactly one tile.
pub(crate) struct SharedCoarse<'a> {
    blocks_x: usize,
    ptr: *mut Vec2,
    _buffer: PhantomData<&'a mut [Vec2]>,
}

// Safety: see `SharedDepth`; blocks are partitioned by tile the same way.
unsafe impl Send for SharedCoarse<'_> {}
unsafe impl Sync for SharedCoarse<'_> {}

/// Reduce the blocks covering `rect` after the tile has been rasterized.
///
/// # Safety
/// `rect` must be block-aligned, inside both buffers and owned by the caller.
pub(crate) unsafe fn reduce_tile(fb: &SharedDepth<'_>, coarse: &SharedCoarse<'_>, rect: &TileRect) {
    let width = fb.width();
    let read = |i: usize| *fb.at(i);
    for by in rect.y0 / COARSE_BLOCK_SIZE..=rect.y1 / COARSE_BLOCK_SIZE {
        for bx in rect.x0 / COARSE_BLOCK_SIZE..=rect.x1 / COARSE_BLOCK_SIZE {
            *coarse.ptr.add(by * coarse.blocks_x + bx) = block_min_max(read, width, bx, by);
        }
    }
}

/// Walk the 16 quads of block (bx, by) and return `(min, max)` depth.
#[inline]
fn block_min_max(read: impl Fn(usize) -> f32, width: usize, bx: usize, by: usize) -> Vec2 {
    let (x0, y0) = (bx * COARSE_BLOCK_SIZE, by * COARSE_BLOCK_SIZE);
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for y in (y0..y0 + COARSE_BLOCK_SIZE).step_by(2) {
        let row = tiled_index(width, x0, y);
        for i in row..row + 2 * COARSE_BLOCK_SIZE {
            let d = read(i);
            lo = lo.min(d);
            hi = hi.max(d);
        }
    }
    Vec2::new(lo, hi)
}
