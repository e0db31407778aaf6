/// Shared scene generation for the occlusion benchmarks.
use glam::{Mat4, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use soft_occlusion::{viewport_matrix, Aabb, TransformedMesh};

pub const WIDTH: usize = 640;
pub const HEIGHT: usize = 360;

/// Camera at the origin looking down -Z, combined with the viewport transform.
pub fn view_projection_viewport() -> Mat4 {
    let proj = Mat4::perspective_rh(60f32.to_radians(), WIDTH as f32 / HEIGHT as f32, 0.5, 200.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
    viewport_matrix(WIDTH, HEIGHT) * proj * view
}

/// Indices of an axis-aligned box with faces wound toward the outside.
const BOX_INDICES: [u32; 36] = [
    0, 1, 2, 1, 3, 2, // -z
    4, 6, 5, 5, 6, 7, // +z
    0, 2, 4, 4, 2, 6, // -x
    1, 5, 3, 5, 7, 3, // +x
    0, 4, 1, 1, 4, 5, // -y
    2, 3, 6, 3, 7, 6, // +y
];

/// Randomly placed boxes in front of the camera, one mesh per box.
pub fn box_field(seed: u64, count: usize) -> (Vec<TransformedMesh>, Vec<Aabb>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let vpv = view_projection_viewport();
    let mut meshes = Vec::with_capacity(count);
    let mut bounds = Vec::with_capacity(count);

    for _ in 0..count {
        let center = Vec3::new(
            rng.gen_range(-40.0..40.0),
            rng.gen_range(-20.0..20.0),
            rng.gen_range(-120.0..-8.0),
        );
        let half = Vec3::new(rng.gen_range(0.5..6.0), rng.gen_range(0.5..6.0), rng.gen_range(0.5..3.0));
        let b = Aabb::new(center - half, center + half);
        meshes.push(TransformedMesh::from_world(&b.corners(), &BOX_INDICES, &vpv));
        bounds.push(b);
    }

    (meshes, bounds)
}
