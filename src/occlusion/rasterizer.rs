/// Tile rasterizer: integer edge functions, inclusive coverage
/// (`e0 | e1 | e2 >= 0`) and a max-merge into the inverted-depth framebuffer.
///
/// Depth is evaluated directly at every covered pixel as
/// `z0 + e1 * z1 + e2 * z2`, so the scalar and quad paths agree bit for bit.
use crate::config::SimdMode;
use crate::count_add;

use super::binner::BinnedTri;
use super::framebuffer::{tiled_index, SharedDepth, TileRect};
use super::lanes::{F32x4, I32x4};

/// Edge equations and pixel bounds of one triangle clipped to a tile.
struct TriSetup {
    a: [i32; 3],
    b: [i32; 3],
    c: [i32; 3],
    z: [f32; 3],
    start_x: usize,
    start_y: usize,
    end_x: usize,
    end_y: usize,
}

impl TriSetup {
    /// `None` when the triangle's box misses `rect`.
    #[inline]
    fn new(tri: &BinnedTri, rect: &TileRect) -> Option<Self> {
        let x = tri.v.map(|v| v[0] as i32);
        let y = tri.v.map(|v| v[1] as i32);

        let start_x = x[0].min(x[1]).min(x[2]).max(rect.x0 as i32);
        let start_y = y[0].min(y[1]).min(y[2]).max(rect.y0 as i32);
        let end_x = x[0].max(x[1]).max(x[2]).min(rect.x1 as i32);
        let end_y = y[0].max(y[1]).max(y[2]).min(rect.y1 as i32);
        if end_x < start_x || end_y < start_y {
            return None;
        }

        // Edge k is opposite vertex k.
        let a = [y[1] - y[2], y[2] - y[0], y[0] - y[1]];
        let b = [x[2] - x[1], x[0] - x[2], x[1] - x[0]];
        let c = [
            x[1] * y[2] - x[2] * y[1],
            x[2] * y[0] - x[0] * y[2],
            x[0] * y[1] - x[1] * y[0],
        ];

        Some(Self {
            a,
            b,
            c,
            z: tri.z,
            start_x: start_x as usize,
            start_y: start_y as usize,
            end_x: end_x as usize,
            end_y: end_y as usize,
        })
    }

    #[inline(always)]
    fn edge(&self, k: usize, x: i32, y: i32) -> i32 {
        self.a[k] * x + self.b[k] * y + self.c[k]
    }
}

/// Clear `rect` and rasterize `tris` into it, in order.
///
/// # Safety
/// `rect` must be a tile of `fb` (quad-aligned, inside the buffer) that no
/// other thread touches for the duration of the call.
pub(crate) unsafe fn rasterize_tile(
    fb: &SharedDepth<'_>,
    rect: &TileRect,
    tris: &[BinnedTri],
    mode: SimdMode,
) {
    fb.clear_rect(rect);
    count_add!(crate::perf::OCCLUSION_COUNTERS.tiles_rasterized, 1);
    count_add!(crate::perf::OCCLUSION_COUNTERS.triangles_rasterized, tris.len());

    match mode {
        SimdMode::Scalar => {
            for tri in tris {
                if let Some(setup) = TriSetup::new(tri, rect) {
                    rasterize_tri_scalar(fb, &setup);
                }
            }
        }
        SimdMode::Lanes4 => {
            for tri in tris {
                if let Some(setup) = TriSetup::new(tri, rect) {
                    rasterize_tri_quads(fb, &setup);
                }
            }
        }
    }
}

/// One pixel per step over the clipped bounding box.
unsafe fn rasterize_tri_scalar(fb: &SharedDepth<'_>, t: &TriSetup) {
    let width = fb.width();
    let [z0, z1, z2] = t.z;

    for y in t.start_y..=t.end_y {
        let mut e0 = t.edge(0, t.start_x as i32, y as i32);
        let mut e1 = t.edge(1, t.start_x as i32, y as i32);
        let mut e2 = t.edge(2, t.start_x as i32, y as i32);

        for x in t.start_x..=t.end_x {
            if (e0 | e1 | e2) >= 0 {
                let depth = z0 + e1 as f32 * z1 + e2 as f32 * z2;
                let dst = fb.at(tiled_index(width, x, y));
                let prev = *dst;
                *dst = if depth > prev { depth } else { prev };
            }
            e0 += t.a[0];
            e1 += t.a[1];
            e2 += t.a[2];
        }
    }

    count_add!(
        crate::perf::OCCLUSION_COUNTERS.pixels_tested,
        (t.end_x - t.start_x + 1) * (t.end_y - t.start_y + 1)
    );
}

/// One 2x2 quad per step. The box is widened to even coordinates so every
/// step is one 4-wide load and store.
unsafe fn rasterize_tri_quads(fb: &SharedDepth<'_>, t: &TriSetup) {
    let width = fb.width();
    let start_x = t.start_x & !1;
    let start_y = t.start_y & !1;

    // Lane order (x, y), (x+1, y), (x, y+1), (x+1, y+1).
    let lane_x = I32x4::from_array([0, 1, 0, 1]) + I32x4::splat(start_x as i32);
    let lane_y = I32x4::from_array([0, 0, 1, 1]) + I32x4::splat(start_y as i32);

    let mut row = [I32x4::splat(0); 3];
    let mut step_x = [I32x4::splat(0); 3];
    let mut step_y = [I32x4::splat(0); 3];
    for k in 0..3 {
        let a = I32x4::splat(t.a[k]);
        let b = I32x4::splat(t.b[k]);
        row[k] = a * lane_x + b * lane_y + I32x4::splat(t.c[k]);
        step_x[k] = a + a;
        step_y[k] = b + b;
    }

    let z0 = F32x4::splat(t.z[0]);
    let z1 = F32x4::splat(t.z[1]);
    let z2 = F32x4::splat(t.z[2]);

    let mut y = start_y;
    while y <= t.end_y {
        let mut e = row;
        let mut index = y * width + 2 * start_x;
        let mut x = start_x;
        while x <= t.end_x {
            let outside = e[0] | e[1] | e[2];
            let depth = z0 + e[1].to_f32() * z1 + e[2].to_f32() * z2;

            let dst = fb.at(index);
            let prev = F32x4::load_ptr(dst);
            let merged = F32x4::select_negative(outside, prev, depth.max(prev));
            merged.store_ptr(dst);

            for k in 0..3 {
                e[k] = e[k] + step_x[k];
            }
            index += 4;
            x += 2;
        }

        for k in 0..3 {
            row[k] = row[k] + step_y[k];
        }
        y += 2;
    }

    count_add!(
        crate::perf::OCCLUSION_COUNTERS.quads_tested,
        ((t.end_x - start_x) / 2 + 1) * ((t.end_y - start_y) / 2 + 1)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occlusion::framebuffer::DepthBuffer;

    fn binned(v: [[i16; 2]; 3], z: f32) -> BinnedTri {
        BinnedTri { v, z: [z, 0.0, 0.0] }
    }

    fn render(w: usize, h: usize, tris: &[BinnedTri], mode: SimdMode) -> DepthBuffer {
        let mut depth = DepthBuffer::new(w, h);
        let rect = TileRect { x0: 0, y0: 0, x1: w - 1, y1: h - 1 };
        unsafe { rasterize_tile(&depth.shared(), &rect, tris, mode) };
        depth
    }

    #[test]
    fn covers_edges_inclusively() {
        let tri = binned([[0, 0], [4, 0], [0, 4]], 0.5);
        for mode in [SimdMode::Scalar, SimdMode::Lanes4] {
            let depth = render(8, 8, &[tri], mode);
            for y in 0..8 {
                for x in 0..8 {
                    let expected = if x + y <= 4 { 0.5 } else { 0.0 };
                    assert_eq!(depth.depth_at(x, y), expected, "{:?} at ({}, {})", mode, x, y);
                }
            }
        }
    }

    #[test]
    fn nearer_depth_wins_regardless_of_order() {
        let far = binned([[0, 0], [16, 0], [0, 16]], 0.25);
        let near = binned([[0, 0], [8, 0], [0, 8]], 0.75);
        for mode in [SimdMode::Scalar, SimdMode::Lanes4] {
            let a = render(16, 16, &[far, near], mode);
            let b = render(16, 16, &[near, far], mode);
            assert_eq!(a.as_slice(), b.as_slice());
            assert_eq!(a.depth_at(2, 2), 0.75);
            assert_eq!(a.depth_at(10, 2), 0.25);
            assert_eq!(a.depth_at(15, 15), 0.0);
        }
    }

    #[test]
    fn depth_plane_interpolates_across_pixels() {
        // z = 0.25 + 0.5 * x / 8 + 0.25 * y / 8 over the triangle.
        let tri = BinnedTri {
            v: [[0, 0], [8, 0], [0, 8]],
            z: [0.25, 0.5 / 64.0, 0.25 / 64.0],
        };
        let depth = render(8, 8, &[tri], SimdMode::Scalar);
        // e1 = 8 * x, e2 = 8 * y at this size.
        assert_eq!(depth.depth_at(4, 0), 0.25 + 32.0 * (0.5 / 64.0));
        assert_eq!(depth.depth_at(0, 4), 0.25 + 32.0 * (0.25 / 64.0));
    }

    #[test]
    fn odd_bounds_and_tile_offsets_agree() {
        let tris = [
            binned([[3, 5], [13, 6], [4, 15]], 0.3),
            binned([[9, 1], [15, 9], [7, 7]], 0.6),
        ];
        let scalar = render(16, 16, &tris, SimdMode::Scalar);
        let quads = render(16, 16, &tris, SimdMode::Lanes4);
        assert_eq!(scalar.as_slice(), quads.as_slice());
    }

    #[test]
    fn triangles_outside_the_tile_are_skipped() {
        let mut depth = DepthBuffer::new(16, 8);
        let right = TileRect { x0: 8, y0: 0, x1: 15, y1: 7 };
        let tri = binned([[0, 0], [4, 0], [0, 4]], 0.9);
        unsafe { rasterize_tile(&depth.shared(), &right, &[tri], SimdMode::Lanes4) };
        assert!(depth.as_slice().iter().all(|&d| d == 0.0));
    }
}
