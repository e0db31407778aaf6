/// Geometry helpers shared by occluders and queries: bounding boxes, the
/// viewport transform and a simple indexed occluder mesh.
use glam::{Mat4, Vec3, Vec4};

use crate::occlusion::OccluderMesh;

/// Axis-aligned bounding box in world space.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// The eight corners, x varying fastest.
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        std::array::from_fn(|i| {
            Vec3::new(
                if i & 1 == 0 { lo.x } else { hi.x },
                if i & 2 == 0 { lo.y } else { hi.y },
                if i & 4 == 0 { lo.z } else { hi.z },
            )
        })
    }
}

/// Maps normalized device coordinates to pixels with inverted depth.
///
/// x in [-1, 1] goes to [0, width], y is flipped so +1 lands on row 0, and
/// depth becomes `w - z` so that after the divide nearer surfaces are larger.
pub fn viewport_matrix(width: usize, height: usize) -> Mat4 {
    let hw = width as f32 * 0.5;
    let hh = height as f32 * 0.5;
    Mat4::from_cols(
        Vec4::new(hw, 0.0, 0.0, 0.0),
        Vec4::new(0.0, -hh, 0.0, 0.0),
        Vec4::new(0.0, 0.0, -1.0, 0.0),
        Vec4::new(hw, hh, 1.0, 1.0),
    )
}

/// Transform one point and divide by w.
///
/// Points at or behind the eye plane (`w <= 0`) are returned undivided so the
/// binner can see the non-positive w and reject the triangle.
#[inline]
pub fn project_point(m: &Mat4, p: Vec3) -> Vec4 {
    let clip = *m * p.extend(1.0);
    if clip.w > 0.0 {
        let inv_w = 1.0 / clip.w;
        Vec4::new(clip.x * inv_w, clip.y * inv_w, clip.z * inv_w, clip.w)
    } else {
        clip
    }
}

/// Project a batch of positions into `out`, reusing its allocation.
pub fn transform_vertices(positions: &[Vec3], m: &Mat4, out: &mut Vec<Vec4>) {
    out.clear();
    out.reserve(positions.len());
    out.extend(positions.iter().map(|&p| project_point(m, p)));
}

/// An indexed triangle mesh whose vertices are already in screen space.
#[derive(Clone, Debug, Default)]
pub struct TransformedMesh {
    vertices: Vec<Vec4>,
    indices: Vec<u32>,
}

impl TransformedMesh {
    /// Project world-space `positions` with `view_proj_viewport` (model, view,
    /// projection and [`viewport_matrix`] combined). Trailing indices that do
    /// not form a full triangle are ignored.
    pub fn from_world(positions: &[Vec3], indices: &[u32], view_proj_viewport: &Mat4) -> Self {
        let mut vertices = Vec::new();
        transform_vertices(positions, view_proj_viewport, &mut vertices);
        Self {
            vertices,
            indices: indices.to_vec(),
        }
    }

    /// Re-project in place, keeping both allocations.
    pub fn update(&mut self, positions: &[Vec3], view_proj_viewport: &Mat4) {
        transform_vertices(positions, view_proj_viewport, &mut self.vertices);
    }
}

impl OccluderMesh for TransformedMesh {
    #[inline]
    fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    fn gather_tri(&self, tri: usize) -> [Vec4; 3] {
        let base = tri * 3;
        [
            self.vertices[self.indices[base] as usize],
            self.vertices[self.indices[base + 1] as usize],
            self.vertices[self.indices[base + 2] as usize],
        ]
    }
}
