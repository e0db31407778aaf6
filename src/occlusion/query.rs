/// Visibility queries against a rasterized occlusion buffer.
///
/// A query projects the eight corners of a bounding box, takes the covered
/// pixel rectangle and the box's nearest depth, then compares that depth
/// against the coarse blocks (early test) or individual pixels (full test).
/// With inverted depth, "nearest" is the largest corner depth and a surface
/// hides the box wherever its depth is strictly greater.
use glam::{Mat4, Vec3};

use crate::count_call;
use crate::geometry::Aabb;

use super::coarse::{CoarseBuffer, COARSE_BLOCK_SIZE};
use super::framebuffer::DepthBuffer;

/// Result of the conservative block-level test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Visibility {
    /// Some covered block has no surface nearer than the box.
    Visible,
    /// Every covered block is entirely nearer than the box.
    Occluded,
    /// Block bounds straddle the box depth; run the full test.
    Unknown,
}

/// Inclusive pixel rectangle a box projects onto, plus its nearest depth.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenRect {
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
    pub nearest: f32,
}

/// Where a bounding box ends up on screen.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Projection {
    /// A corner is at or behind the eye plane, or projects to a non-finite
    /// position; treat the box as visible.
    Straddling,
    /// The box projects outside the framebuffer; nothing to draw.
    Offscreen,
    OnScreen(ScreenRect),
}

/// Project `bounds` into a `width` x `height` framebuffer.
pub fn project_bounds(bounds: &Aabb, m: &Mat4, width: usize, height: usize) -> Projection {
    let mut lo = Vec3::splat(f32::INFINITY);
    let mut hi = Vec3::splat(f32::NEG_INFINITY);

    for corner in bounds.corners() {
        let clip = *m * corner.extend(1.0);
        if !(clip.w > 0.0) {
            return Projection::Straddling;
        }
        let screen = clip.truncate() / clip.w;
        if !screen.is_finite() {
            return Projection::Straddling;
        }
        lo = lo.min(screen);
        hi = hi.max(screen);
    }

    let min_x = lo.x.floor().max(0.0);
    let min_y = lo.y.floor().max(0.0);
    let max_x = hi.x.ceil().min((width - 1) as f32);
    let max_y = hi.y.ceil().min((height - 1) as f32);
    if !(min_x <= max_x && min_y <= max_y) {
        return Projection::Offscreen;
    }

    Projection::OnScreen(ScreenRect {
        min_x: min_x as usize,
        min_y: min_y as usize,
        max_x: max_x as usize,
        max_y: max_y as usize,
        nearest: hi.z,
    })
}

/// Block-level test against the coarse `(min, max)` grid.
pub fn early_test(coarse: &CoarseBuffer, projection: &Projection) -> Visibility {
    count_call!(crate::perf::OCCLUSION_COUNTERS.early_tests);

    let rect = match projection {
        Projection::Straddling => return Visibility::Visible,
        Projection::Offscreen => return Visibility::Occluded,
        Projection::OnScreen(rect) => rect,
    };

    let mut occluded = true;
    for by in rect.min_y / COARSE_BLOCK_SIZE..=rect.max_y / COARSE_BLOCK_SIZE {
        for bx in rect.min_x / COARSE_BLOCK_SIZE..=rect.max_x / COARSE_BLOCK_SIZE {
            let block = coarse.block(bx, by);
            if block.y <= rect.nearest {
                return Visibility::Visible;
            }
            occluded &= rect.nearest < block.x;
        }
    }

    if occluded {
        Visibility::Occluded
    } else {
        Visibility::Unknown
    }
}

/// Per-pixel test. `false` means every covered pixel is nearer than the box.
pub fn full_test(depth: &DepthBuffer, projection: &Projection) -> bool {
    count_call!(crate::perf::OCCLUSION_COUNTERS.full_tests);

    let rect = match projection {
        Projection::Straddling => return true,
        Projection::Offscreen => return false,
        Projection::OnScreen(rect) => rect,
    };

    (rect.min_y..=rect.max_y)
        .any(|y| (rect.min_x..=rect.max_x).any(|x| depth.depth_at(x, y) <= rect.nearest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occlusion::framebuffer::tiled_index;

    fn aabb(min: (f32, f32, f32), max: (f32, f32, f32)) -> Aabb {
        Aabb::new(Vec3::new(min.0, min.1, min.2), Vec3::new(max.0, max.1, max.2))
    }

    fn filled(w: usize, h: usize, region: (usize, usize, usize, usize), d: f32) -> DepthBuffer {
        let mut depth = DepthBuffer::new(w, h);
        {
            let shared = depth.shared();
            for y in region.1..=region.3 {
                for x in region.0..=region.2 {
                    unsafe { *shared.at(tiled_index(w, x, y)) = d };
                }
            }
        }
        depth
    }

    #[test]
    fn projection_rounds_outward_and_clamps() {
        let b = aabb((-3.5, 2.2, 0.1), (9.1, 40.0, 0.4));
        match project_bounds(&b, &Mat4::IDENTITY, 32, 16) {
            Projection::OnScreen(r) => {
                assert_eq!((r.min_x, r.min_y, r.max_x, r.max_y), (0, 2, 10, 15));
                assert_eq!(r.nearest, 0.4);
            }
            other => panic!("expected on-screen rect, got {:?}", other),
        }
    }

    #[test]
    fn boxes_behind_the_eye_or_offscreen() {
        let mut m = Mat4::IDENTITY;
        m.w_axis.w = 0.0;
        let b = aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0));
        assert_eq!(project_bounds(&b, &m, 32, 16), Projection::Straddling);

        let off = aabb((40.0, 0.0, 0.0), (50.0, 4.0, 1.0));
        assert_eq!(project_bounds(&off, &Mat4::IDENTITY, 32, 16), Projection::Offscreen);

        let depth = DepthBuffer::new(32, 16);
        let coarse = CoarseBuffer::new(32, 16);
        assert_eq!(early_test(&coarse, &Projection::Straddling), Visibility::Visible);
        assert!(full_test(&depth, &Projection::Straddling));
        assert_eq!(early_test(&coarse, &Projection::Offscreen), Visibility::Occluded);
        assert!(!full_test(&depth, &Projection::Offscreen));
    }

    #[test]
    fn non_finite_corners_count_as_straddling() {
        let b = aabb((0.0, 0.0, 0.0), (1.0, 1.0, 1.0));

        let mut nan = Mat4::IDENTITY;
        nan.x_axis.x = f32::NAN;
        assert_eq!(project_bounds(&b, &nan, 32, 16), Projection::Straddling);

        let mut tiny_w = Mat4::IDENTITY;
        tiny_w.w_axis.w = f32::MIN_POSITIVE;
        tiny_w.x_axis.x = f32::MAX;
        assert_eq!(project_bounds(&b, &tiny_w, 32, 16), Projection::Straddling);
    }

    #[test]
    fn empty_buffer_hides_nothing() {
        let depth = DepthBuffer::new(32, 16);
        let mut coarse = CoarseBuffer::new(32, 16);
        coarse.rebuild(&depth);

        let p = project_bounds(&aabb((4.0, 4.0, 0.2), (12.0, 12.0, 0.3)), &Mat4::IDENTITY, 32, 16);
        assert_eq!(early_test(&coarse, &p), Visibility::Visible);
        assert!(full_test(&depth, &p));
    }

    #[test]
    fn fully_covered_region_occludes_farther_boxes() {
        let depth = filled(32, 16, (0, 0, 31, 15), 0.5);
        let mut coarse = CoarseBuffer::new(32, 16);
        coarse.rebuild(&depth);

        let behind = project_bounds(&aabb((2.0, 2.0, 0.1), (20.0, 10.0, 0.4)), &Mat4::IDENTITY, 32, 16);
        assert_eq!(early_test(&coarse, &behind), Visibility::Occluded);
        assert!(!full_test(&depth, &behind));

        let in_front =
            project_bounds(&aabb((2.0, 2.0, 0.1), (20.0, 10.0, 0.6)), &Mat4::IDENTITY, 32, 16);
        assert_eq!(early_test(&coarse, &in_front), Visibility::Visible);
        assert!(full_test(&depth, &in_front));
    }

    #[test]
    fn partial_blocks_need_the_full_test() {
        // Block (0, 0) is covered except for pixel (7, 7).
        let mut depth = filled(16, 8, (0, 0, 15, 7), 0.5);
        {
            let shared = depth.shared();
            unsafe { *shared.at(tiled_index(16, 7, 7)) = 0.0 };
        }
        let mut coarse = CoarseBuffer::new(16, 8);
        coarse.rebuild(&depth);

        let over_hole = project_bounds(&aabb((5.0, 5.0, 0.1), (7.0, 7.0, 0.4)), &Mat4::IDENTITY, 16, 8);
        assert_eq!(early_test(&coarse, &over_hole), Visibility::Unknown);
        assert!(full_test(&depth, &over_hole));

        let beside_hole =
            project_bounds(&aabb((1.0, 1.0, 0.1), (3.0, 3.0, 0.4)), &Mat4::IDENTITY, 16, 8);
        assert_eq!(early_test(&coarse, &beside_hole), Visibility::Unknown);
        assert!(!full_test(&depth, &beside_hole));
    }
}
