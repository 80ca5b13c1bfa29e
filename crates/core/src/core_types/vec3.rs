//! Vector type aliases for positions, directions and the grid transform.

use nalgebra::{Matrix4, Vector2, Vector3};

/// 3D vector type for world positions, wind vectors and forces.
///
/// This is a simple alias for `nalgebra::Vector3<f32>`.
pub type Vec3 = Vector3<f32>;

/// 2D vector on the ground plane, used by the quadtree.
pub type Vec2 = Vector2<f32>;

/// Homogeneous 4x4 transform (grid world-to-local, instance transforms).
pub type Mat4 = Matrix4<f32>;

/// World up axis. The host engine is y-up.
pub const UP: Vec3 = Vector3::new(0.0, 1.0, 0.0);

/// Squared length below which a direction is treated as degenerate.
pub const DEGENERATE_LENGTH_SQ: f32 = 1e-12;

/// Normalize `v`, falling back to `fallback` when `v` is zero-length or non-finite.
#[inline]
pub fn normalize_or(v: &Vec3, fallback: Vec3) -> Vec3 {
    let len_sq = v.norm_squared();
    if len_sq.is_finite() && len_sq > DEGENERATE_LENGTH_SQ {
        v / len_sq.sqrt()
    } else {
        fallback
    }
}
