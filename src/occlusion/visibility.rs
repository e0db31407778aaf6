/// Occluder collaborators: meshes that hand out clip-space triangles and the
/// objects that own them.
///
/// The binner never sees vertex or index buffers. It asks a mesh for the three
/// transformed vertices of a triangle, one at a time or four at a time.
use glam::Vec4;

use super::lanes::{F32x4, LANES};

/// One vertex position across four triangles, structure-of-arrays.
#[derive(Copy, Clone, Debug)]
pub struct VertexLanes {
    pub x: F32x4,
    pub y: F32x4,
    pub z: F32x4,
    pub w: F32x4,
}

impl VertexLanes {
    /// Transpose four vertices into lanes.
    #[inline]
    pub fn from_vertices(v: [Vec4; LANES]) -> Self {
        Self {
            x: F32x4::from_array([v[0].x, v[1].x, v[2].x, v[3].x]),
            y: F32x4::from_array([v[0].y, v[1].y, v[2].y, v[3].y]),
            z: F32x4::from_array([v[0].z, v[1].z, v[2].z, v[3].z]),
            w: F32x4::from_array([v[0].w, v[1].w, v[2].w, v[3].w]),
        }
    }
}

/// A mesh of already-transformed triangles.
///
/// Vertices are in screen space after the perspective divide: `x`, `y` in
/// pixels, `z` the inverted depth (larger is nearer) and `w` the clip-space w.
pub trait OccluderMesh {
    fn num_triangles(&self) -> usize;

    /// The three vertices of triangle `tri`.
    fn gather_tri(&self, tri: usize) -> [Vec4; 3];

    /// Vertices of triangles `first..first + lanes`, one lane per triangle.
    ///
    /// `lanes` is at most [`LANES`]. Unused lanes are zero, which the binner
    /// rejects as degenerate.
    fn gather_tri4(&self, first: usize, lanes: usize) -> [VertexLanes; 3] {
        let mut verts = [[Vec4::ZERO; LANES]; 3];
        for lane in 0..lanes.min(LANES) {
            let tri = self.gather_tri(first + lane);
            for (corner, v) in tri.into_iter().enumerate() {
                verts[corner][lane] = v;
            }
        }
        verts.map(VertexLanes::from_vertices)
    }
}

/// Triangle soup: each entry is one pre-transformed triangle.
impl OccluderMesh for Vec<[Vec4; 3]> {
    #[inline]
    fn num_triangles(&self) -> usize {
        self.len()
    }

    #[inline]
    fn gather_tri(&self, tri: usize) -> [Vec4; 3] {
        self[tri]
    }
}

impl<M: OccluderMesh + ?Sized> OccluderMesh for &M {
    #[inline]
    fn num_triangles(&self) -> usize {
        (**self).num_triangles()
    }

    #[inline]
    fn gather_tri(&self, tri: usize) -> [Vec4; 3] {
        (**self).gather_tri(tri)
    }

    #[inline]
    fn gather_tri4(&self, first: usize, lanes: usize) -> [VertexLanes; 3] {
        (**self).gather_tri4(first, lanes)
    }
}

/// A scene object owning zero or more occluder meshes.
pub trait VisibilityObject {
    type Mesh: OccluderMesh;

    fn num_meshes(&self) -> usize;
    fn mesh(&self, index: usize) -> &Self::Mesh;
}

impl<M: OccluderMesh> VisibilityObject for Vec<M> {
    type Mesh = M;

    #[inline]
    fn num_meshes(&self) -> usize {
        self.len()
    }

    #[inline]
    fn mesh(&self, index: usize) -> &M {
        &self[index]
    }
}

impl<M: OccluderMesh> VisibilityObject for [M] {
    type Mesh = M;

    #[inline]
    fn num_meshes(&self) -> usize {
        self.len()
    }

    #[inline]
    fn mesh(&self, index: usize) -> &M {
        &self[index]
    }
}

impl<O: VisibilityObject + ?Sized> VisibilityObject for &O {
    type Mesh = O::Mesh;

    #[inline]
    fn num_meshes(&self) -> usize {
        (**self).num_meshes()
    }

    #[inline]
    fn mesh(&self, index: usize) -> &O::Mesh {
        (**self).mesh(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soup() -> Vec<[Vec4; 3]> {
        (0..5)
            .map(|i| {
                let f = i as f32;
                [
                    Vec4::new(f, 0.0, 0.5, 1.0),
                    Vec4::new(f + 10.0, 0.0, 0.5, 1.0),
                    Vec4::new(f, 10.0, 0.5, 1.0),
                ]
            })
            .collect()
    }

    #[test]
    fn gather_tri4_transposes_and_zero_fills() {
        let mesh = soup();
        let lanes = mesh.gather_tri4(3, 2);

        assert_eq!(lanes[0].x.to_array(), [3.0, 4.0, 0.0, 0.0]);
        assert_eq!(lanes[1].x.to_array(), [13.0, 14.0, 0.0, 0.0]);
        assert_eq!(lanes[2].y.to_array(), [10.0, 10.0, 0.0, 0.0]);
        assert_eq!(lanes[0].w.to_array(), [1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn object_of_meshes_exposes_each_mesh() {
        let object = vec![soup(), soup()];
        assert_eq!(object.num_meshes(), 2);
        assert_eq!(object.mesh(1).num_triangles(), 5);
        assert_eq!((&object).mesh(0).gather_tri(2)[1].x, 12.0);

        let slice: &[Vec<[Vec4; 3]>] = &object[1..];
        assert_eq!(slice.num_meshes(), 1);
    }
}
