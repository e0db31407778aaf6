/// Depth framebuffer in 2x2-quad tiled layout.
///
/// Each pair of rows is stored as consecutive quads: pixel (x, y) lives at
/// `(y & !1) * width + 2 * (x & !1) + 2 * (y & 1) + (x & 1)`, so one 16-byte
/// load reads the quad (x, y), (x+1, y), (x, y+1), (x+1, y+1).
///
/// Depth is inverted: 0.0 means nothing was drawn, larger values are nearer.
use std::marker::PhantomData;

/// Inclusive pixel rectangle of one binning tile.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TileRect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl TileRect {
    #[inline]
    pub fn width(&self) -> usize {
        self.x1 - self.x0 + 1
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.y1 - self.y0 + 1
    }
}

/// Tiled index of pixel (x, y) in a framebuffer `width` pixels wide.
#[inline(always)]
pub fn tiled_index(width: usize, x: usize, y: usize) -> usize {
    (y & !1) * width + 2 * (x & !1) + 2 * (y & 1) + (x & 1)
}

pub struct DepthBuffer {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl DepthBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Raw tiled storage.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn depth_at(&self, x: usize, y: usize) -> f32 {
        self.data[tiled_index(self.width, x, y)]
    }

    /// Row-major copy with row 0 at the bottom of the screen.
    pub fn detiled(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.data.len()];
        self.detile_into(&mut out);
        out
    }

    /// Row-major copy into `out`, flipped vertically.
    pub fn detile_into(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.data.len());
        for y in 0..self.height {
            let dst = &mut out[(self.height - 1 - y) * self.width..][..self.width];
            for (x, d) in dst.iter_mut().enumerate() {
                *d = self.data[tiled_index(self.width, x, y)];
            }
        }
    }

    /// Shared raw view for parallel per-tile writes.
    pub(crate) fn shared(&mut self) -> SharedDepth<'_> {
        SharedDepth {
            width: self.width,
            ptr: self.data.as_mut_ptr(),
            _buffer: PhantomData,
        }
    }
}

/// Raw view of a [`DepthBuffer`] handed to tile workers.
///
/// Workers own disjoint tiles. Tile origins and sizes are multiples of eight,
/// so the quads a worker touches never belong to another tile.
pub(crate) struct SharedDepth<'a> {
    width: usize,
    ptr: *mut f32,
    _buffer: PhantomData<&'a mut [f32]>,
}

// Safety: every worker writes only inside the tile it claimed from the
// scheduler, and tiles partition the framebuffer.
unsafe impl Send for SharedDepth<'_> {}
unsafe impl Sync for SharedDepth<'_> {}

impl SharedDepth<'_> {
    #[inline(always)]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Pointer to tiled index `index`.
    ///
    /// # Safety
    /// `index` must be inside the buffer and inside the caller's tile.
    #[inline(always)]
    pub unsafe fn at(&self, index: usize) -> *mut f32 {
        self.ptr.add(index)
    }

    /// Zero every pixel of `rect`.
    ///
    /// # Safety
    /// `rect` must be quad-aligned, inside the buffer and owned by the caller.
    pub unsafe fn clear_rect(&self, rect: &TileRect) {
        let quad_row_len = 2 * rect.width();
        for y in (rect.y0..=rect.y1).step_by(2) {
            let start = y * self.width + 2 * rect.x0;
            std::ptr::write_bytes(self.ptr.add(start), 0, quad_row_len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_lanes_are_consecutive() {
        let w = 16;
        assert_eq!(tiled_index(w, 0, 0), 0);
        assert_eq!(tiled_index(w, 1, 0), 1);
        assert_eq!(tiled_index(w, 0, 1), 2);
        assert_eq!(tiled_index(w, 1, 1), 3);
        assert_eq!(tiled_index(w, 2, 0), 4);
        assert_eq!(tiled_index(w, 0, 2), 2 * w);
        assert_eq!(tiled_index(w, 5, 3), 2 * w + 8 + 2 + 1);
    }

    #[test]
    fn tiled_index_is_a_permutation() {
        let (w, h) = (24, 16);
        let mut seen = vec![false; w * h];
        for y in 0..h {
            for x in 0..w {
                let i = tiled_index(w, x, y);
                assert!(!seen[i], "index {} hit twice", i);
                seen[i] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn detile_flips_rows() {
        let (w, h) = (8, 4);
        let mut fb = DepthBuffer::new(w, h);
        for y in 0..h {
            for x in 0..w {
                fb.data[tiled_index(w, x, y)] = (y * 100 + x) as f32;
            }
        }

        let flat = fb.detiled();
        for y in 0..h {
            for x in 0..w {
                assert_eq!(flat[(h - 1 - y) * w + x], (y * 100 + x) as f32);
            }
        }
    }

    #[test]
    fn clear_rect_touches_only_its_tile() {
        let (w, h) = (16, 16);
        let mut fb = DepthBuffer::new(w, h);
        fb.data.fill(1.0);

        let rect = TileRect { x0: 8, y0: 0, x1: 15, y1: 7 };
        unsafe { fb.shared().clear_rect(&rect) };

        for y in 0..h {
            for x in 0..w {
                let inside = x >= 8 && y < 8;
                let expected = if inside { 0.0 } else { 1.0 };
                assert_eq!(fb.depth_at(x, y), expected, "pixel ({}, {})", x, y);
            }
        }
    }
}
