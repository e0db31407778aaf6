/// Triangle binning: snap transformed triangles to the pixel grid, reject the
/// ones that cannot produce coverage, set up their depth plane and append them
/// to every tile their bounding box overlaps.
///
/// Bins live in one arena sized at construction, `tris_per_bin` slots per tile.
/// A full bin drops further triangles and counts them in [`BinStats::overflowed`].
use glam::Vec4;

use crate::config::{OcclusionConfig, SimdMode};
use crate::count_add;

use super::framebuffer::TileRect;
use super::lanes::{F32x4, I32x4, LANES, LANE_MASK};
use super::visibility::{OccluderMesh, VertexLanes, VisibilityObject};

/// Triangles with a snapped vertex beyond +-GUARD_BAND pixels are rejected.
/// Keeps every edge function product inside i32 and every vertex inside i16.
pub const GUARD_BAND: i32 = 8192;

/// A triangle ready for tile rasterization.
///
/// `v` holds the snapped pixel coordinates. `z` holds the depth plane:
/// `z[0]` is the depth at vertex 0, `z[1]` and `z[2]` are the depth deltas to
/// vertices 1 and 2 divided by twice the signed area.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[repr(C)]
pub struct BinnedTri {
    pub v: [[i16; 2]; 3],
    pub z: [f32; 3],
}

/// Per-pass binning statistics. Each submitted triangle lands in exactly one
/// of `binned` or a `rejected_*` field, checked in the order near plane,
/// guard band, area, framebuffer bounds.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BinStats {
    pub submitted: usize,
    pub binned: usize,
    /// Back-facing or degenerate after snapping.
    pub rejected_area: usize,
    /// A vertex at or behind the eye plane.
    pub rejected_near: usize,
    /// A vertex too far off screen to snap without moving it.
    pub rejected_guard_band: usize,
    /// Bounding box entirely outside the framebuffer.
    pub rejected_offscreen: usize,
    /// Tile slots written.
    pub entries: usize,
    /// Tile slots dropped because the bin was full.
    pub overflowed: usize,
}

/// Round to the nearest pixel. Values past the guard band are clamped so the
/// conversion stays defined; such triangles never reach a bin.
#[inline(always)]
pub(crate) fn snap(v: f32) -> i32 {
    let band = GUARD_BAND as f32;
    (v + 0.5).floor().clamp(-band, band) as i32
}

/// Whether `v` snaps inside the guard band. `false` for NaN.
#[inline(always)]
pub(crate) fn in_guard_band(v: f32) -> bool {
    let band = GUARD_BAND as f32;
    let r = (v + 0.5).floor();
    r >= -band && r <= band
}

/// One bit per lane whose six coordinates all snap inside the guard band.
#[inline]
fn guard_band_mask(verts: &[VertexLanes; 3]) -> u32 {
    let mut mask = LANE_MASK;
    for v in verts {
        let (x, y) = (v.x.to_array(), v.y.to_array());
        for lane in 0..LANES {
            if !(in_guard_band(x[lane]) && in_guard_band(y[lane])) {
                mask &= !(1 << lane);
            }
        }
    }
    mask
}

/// Twice the signed area. Positive for triangles that face the viewer.
#[inline(always)]
pub(crate) fn tri_area(x: [i32; 3], y: [i32; 3]) -> i32 {
    (x[1] - x[0]) * (y[2] - y[0]) - (x[0] - x[2]) * (y[0] - y[1])
}

pub struct TriangleBins {
    width: i32,
    height: i32,
    tile_width: i32,
    tile_height: i32,
    tiles_x: usize,
    tiles_y: usize,
    capacity: usize,
    tris: Vec<BinnedTri>,
    counts: Vec<u32>,
    stats: BinStats,
}

impl TriangleBins {
    pub fn new(config: &OcclusionConfig) -> Self {
        let tiles_x = config.tiles_x();
        let tiles_y = config.tiles_y();
        let num_tiles = tiles_x * tiles_y;
        Self {
            width: config.width as i32,
            height: config.height as i32,
            tile_width: config.tile_width as i32,
            tile_height: config.tile_height as i32,
            tiles_x,
            tiles_y,
            capacity: config.tris_per_bin,
            tris: vec![BinnedTri::default(); num_tiles * config.tris_per_bin],
            counts: vec![0; num_tiles],
            stats: BinStats::default(),
        }
    }

    #[inline]
    pub fn tiles_x(&self) -> usize {
        self.tiles_x
    }

    #[inline]
    pub fn tiles_y(&self) -> usize {
        self.tiles_y
    }

    #[inline]
    pub fn num_tiles(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    #[inline]
    pub fn stats(&self) -> BinStats {
        self.stats
    }

    /// Triangles binned into `tile`, in submission order.
    #[inline]
    pub fn bin(&self, tile: usize) -> &[BinnedTri] {
        let start = tile * self.capacity;
        &self.tris[start..start + self.counts[tile] as usize]
    }

    /// Pixel rectangle covered by `tile`. The last row and column may be short.
    pub fn tile_rect(&self, tile: usize) -> TileRect {
        let tx = (tile % self.tiles_x) as i32;
        let ty = (tile / self.tiles_x) as i32;
        let x0 = tx * self.tile_width;
        let y0 = ty * self.tile_height;
        TileRect {
            x0: x0 as usize,
            y0: y0 as usize,
            x1: ((x0 + self.tile_width).min(self.width) - 1) as usize,
            y1: ((y0 + self.tile_height).min(self.height) - 1) as usize,
        }
    }

    /// Empty every bin and reset the statistics.
    pub fn clear(&mut self) {
        self.counts.fill(0);
        self.stats = BinStats::default();
    }

    /// Bin every triangle of every mesh of every object, in order.
    pub fn bin_objects<O: VisibilityObject>(&mut self, objects: &[O], mode: SimdMode) {
        for object in objects {
            for m in 0..object.num_meshes() {
                let mesh = object.mesh(m);
                match mode {
                    SimdMode::Scalar => self.bin_mesh_scalar(mesh),
                    SimdMode::Lanes4 => self.bin_mesh_lanes(mesh),
                }
            }
        }
    }

    /// One triangle at a time.
    pub fn bin_mesh_scalar<M: OccluderMesh + ?Sized>(&mut self, mesh: &M) {
        let n = mesh.num_triangles();
        count_add!(crate::perf::OCCLUSION_COUNTERS.triangles_submitted, n);
        self.stats.submitted += n;

        for tri in 0..n {
            let verts: [Vec4; 3] = mesh.gather_tri(tri);
            let x = verts.map(|v| snap(v.x));
            let y = verts.map(|v| snap(v.y));

            if verts.iter().any(|v| !(v.w > 0.0)) {
                self.stats.rejected_near += 1;
                continue;
            }
            if !verts.iter().all(|v| in_guard_band(v.x) && in_guard_band(v.y)) {
                self.stats.rejected_guard_band += 1;
                continue;
            }
            if tri_area(x, y) <= 0 {
                self.stats.rejected_area += 1;
                continue;
            }

            let start = (x[0].min(x[1]).min(x[2]).max(0), y[0].min(y[1]).min(y[2]).max(0));
            let end = (
                x[0].max(x[1]).max(x[2]).min(self.width - 1),
                y[0].max(y[1]).max(y[2]).min(self.height - 1),
            );
            if end.0 < start.0 || end.1 < start.1 {
                self.stats.rejected_offscreen += 1;
                continue;
            }

            let inv_area = 1.0 / tri_area(x, y) as f32;
            let z0 = verts[0].z;
            let binned = BinnedTri {
                v: [
                    [x[0] as i16, y[0] as i16],
                    [x[1] as i16, y[1] as i16],
                    [x[2] as i16, y[2] as i16],
                ],
                z: [z0, (verts[1].z - z0) * inv_area, (verts[2].z - z0) * inv_area],
            };
            self.insert(binned, start, end);
        }
    }

    /// Four triangles per gather; accepted lanes are inserted in lane order.
    pub fn bin_mesh_lanes<M: OccluderMesh + ?Sized>(&mut self, mesh: &M) {
        let n = mesh.num_triangles();
        count_add!(crate::perf::OCCLUSION_COUNTERS.triangles_submitted, n);
        self.stats.submitted += n;

        let zero = I32x4::splat(0);
        let fzero = F32x4::splat(0.0);
        let max_x = I32x4::splat(self.width - 1);
        let max_y = I32x4::splat(self.height - 1);

        let mut first = 0;
        while first < n {
            let lanes = (n - first).min(LANES);
            let lane_mask = (1u32 << lanes) - 1;
            let verts: [VertexLanes; 3] = mesh.gather_tri4(first, lanes);

            let x = verts.map(|v| I32x4::from_array(v.x.to_array().map(snap)));
            let y = verts.map(|v| I32x4::from_array(v.y.to_array().map(snap)));

            let area = (x[1] - x[0]) * (y[2] - y[0]) - (x[0] - x[2]) * (y[0] - y[1]);

            let start_x = x[0].min(x[1]).min(x[2]).max(zero);
            let start_y = y[0].min(y[1]).min(y[2]).max(zero);
            let end_x = x[0].max(x[1]).max(x[2]).min(max_x);
            let end_y = y[0].max(y[1]).max(y[2]).min(max_y);

            let in_front_of_eye = lane_mask
                & (verts[0].w.gt(fzero) & verts[1].w.gt(fzero) & verts[2].w.gt(fzero)).movemask();
            let in_band = in_front_of_eye & guard_band_mask(&verts);
            let front = in_band & area.gt(zero).movemask();
            let empty = (start_x.gt(end_x) | start_y.gt(end_y)).movemask();

            self.stats.rejected_near += (lane_mask & !in_front_of_eye).count_ones() as usize;
            self.stats.rejected_guard_band += (in_front_of_eye & !in_band).count_ones() as usize;
            self.stats.rejected_area += (in_band & !front).count_ones() as usize;
            self.stats.rejected_offscreen += (front & empty).count_ones() as usize;

            let mut accept = front & !empty;
            if accept != 0 {
                let inv_area = F32x4::splat(1.0) / area.to_f32();
                let z0 = verts[0].z;
                let z1 = ((verts[1].z - z0) * inv_area).to_array();
                let z2 = ((verts[2].z - z0) * inv_area).to_array();
                let z0 = z0.to_array();

                let (x, y) = (x.map(I32x4::to_array), y.map(I32x4::to_array));
                let (sx, sy) = (start_x.to_array(), start_y.to_array());
                let (ex, ey) = (end_x.to_array(), end_y.to_array());

                while accept != 0 {
                    let lane = accept.trailing_zeros() as usize;
                    accept &= accept - 1;

                    let binned = BinnedTri {
                        v: [
                            [x[0][lane] as i16, y[0][lane] as i16],
                            [x[1][lane] as i16, y[1][lane] as i16],
                            [x[2][lane] as i16, y[2][lane] as i16],
                        ],
                        z: [z0[lane], z1[lane], z2[lane]],
                    };
                    self.insert(binned, (sx[lane], sy[lane]), (ex[lane], ey[lane]));
                }
            }

            first += lanes;
        }
    }

    /// Append `tri` to every tile overlapped by the pixel box `start..=end`.
    fn insert(&mut self, tri: BinnedTri, start: (i32, i32), end: (i32, i32)) {
        let tx0 = (start.0 / self.tile_width) as usize;
        let ty0 = (start.1 / self.tile_height) as usize;
        let tx1 = ((end.0 / self.tile_width) as usize).min(self.tiles_x - 1);
        let ty1 = ((end.1 / self.tile_height) as usize).min(self.tiles_y - 1);

        let mut written = 0;
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                let tile = ty * self.tiles_x + tx;
                let count = self.counts[tile] as usize;
                if count < self.capacity {
                    self.tris[tile * self.capacity + count] = tri;
                    self.counts[tile] += 1;
                    written += 1;
                } else {
                    self.stats.overflowed += 1;
                }
            }
        }

        self.stats.binned += 1;
        self.stats.entries += written;
        count_add!(crate::perf::OCCLUSION_COUNTERS.triangles_binned, 1);
        count_add!(crate::perf::OCCLUSION_COUNTERS.bin_entries_written, written);
    }
}
