//! Wind loading on modules

use crate::core_types::vec3::{normalize_or, Vec3};

/// Drag force on a module: `0.5·ρ·v²·A` along the wind direction
///
/// A zero-length direction yields no force.
pub fn drag_force(air_density: f32, wind_direction: &Vec3, wind_speed: f32, surface_area: f32) -> Vec3 {
    let dir = normalize_or(wind_direction, Vec3::zeros());
    let magnitude = 0.5 * air_density * wind_speed * wind_speed * surface_area;
    if magnitude.is_finite() {
        dir * magnitude
    } else {
        Vec3::zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_drag_force_magnitude_and_direction() {
        let f = drag_force(1.2, &Vec3::new(2.0, 0.0, 0.0), 10.0, 0.5);
        assert_relative_eq!(f.x, 30.0, epsilon = 1e-4);
        assert_eq!(f.y, 0.0);
        assert_eq!(f.z, 0.0);
    }

    #[test]
    fn test_drag_force_zero_direction() {
        assert_eq!(drag_force(1.2, &Vec3::zeros(), 10.0, 0.5), Vec3::zeros());
    }
}
