//! Grid and wind configuration

use super::quality::GridQuality;
use crate::core_types::error::{require_non_negative, ConfigError};
use crate::core_types::vec3::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Compute dispatch block edge; every resolution axis must be a multiple of it.
pub const DISPATCH_BLOCK_SIZE: u32 = 8;

/// Grid solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Voxels along x, y, z
    pub resolution: [u32; 3],
    /// Temperature diffusion coefficient
    pub diffusion: f32,
    /// Velocity diffusion coefficient
    pub viscosity: f32,
    /// Relaxation passes for diffusion and pressure (10-20 is typical)
    pub solver_iterations: u32,
    /// Solver steps per tick
    pub substeps: u32,
    /// Upward acceleration per unit temperature (voxels/s²)
    pub buoyancy: f32,
    /// Velocity decay rate (1/s) applied with the wind bias
    pub velocity_damping: f32,
    /// Maps world space into the grid's unit cube centred on the origin
    pub world_to_local: Mat4,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: GridQuality::Low.resolution(),
            diffusion: 0.05,
            viscosity: 0.01,
            solver_iterations: 10,
            substeps: 1,
            buoyancy: 0.5,
            velocity_damping: 1.0,
            world_to_local: Self::volume_transform(&Vec3::new(0.0, 16.0, 0.0), &Vec3::new(32.0, 32.0, 32.0)),
        }
    }
}

impl GridConfig {
    /// Configuration for a quality preset covering the given world box
    pub fn from_quality(quality: GridQuality, center: &Vec3, size: &Vec3) -> Self {
        Self {
            resolution: quality.resolution(),
            world_to_local: Self::volume_transform(center, size),
            ..Self::default()
        }
    }

    /// World-to-local transform for an axis-aligned box of `size` at `center`
    ///
    /// The box maps to `[-0.5, 0.5]³`.
    pub fn volume_transform(center: &Vec3, size: &Vec3) -> Mat4 {
        let inv_size = Vec3::new(1.0 / size.x, 1.0 / size.y, 1.0 / size.z);
        Mat4::new_nonuniform_scaling(&inv_size) * Mat4::new_translation(&(-center))
    }

    /// # Errors
    ///
    /// - [`ConfigError::InvalidResolution`] when an axis is zero or not a
    ///   multiple of [`DISPATCH_BLOCK_SIZE`]
    /// - [`ConfigError::InvalidParameter`] for negative or non-finite
    ///   coefficients, zero iterations/substeps or a non-finite transform
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (axis, &value) in ['x', 'y', 'z'].iter().zip(self.resolution.iter()) {
            if value == 0 || value % DISPATCH_BLOCK_SIZE != 0 {
                return Err(ConfigError::InvalidResolution { axis: *axis, value });
            }
        }
        require_non_negative("diffusion", self.diffusion)?;
        require_non_negative("viscosity", self.viscosity)?;
        if self.solver_iterations == 0 {
            return Err(ConfigError::invalid("solver_iterations", "must be >= 1"));
        }
        if self.substeps == 0 {
            return Err(ConfigError::invalid("substeps", "must be >= 1"));
        }
        if !self.buoyancy.is_finite() {
            return Err(ConfigError::invalid("buoyancy", "must be finite"));
        }
        require_non_negative("velocity_damping", self.velocity_damping)?;
        if !self.world_to_local.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::invalid(
                "world_to_local",
                "transform has non-finite entries",
            ));
        }
        Ok(())
    }
}

/// Wind driving both the grid bias and the drag on modules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindConfig {
    /// Direction, normalized on use; zero means calm
    pub direction: Vec3,
    /// Wind speed (m/s for drag, voxels/s² for the grid bias)
    pub intensity: f32,
}

impl Default for WindConfig {
    fn default() -> Self {
        Self {
            direction: Vec3::new(1.0, 0.0, 0.0),
            intensity: 1.0,
        }
    }
}

impl WindConfig {
    pub fn calm() -> Self {
        Self {
            direction: Vec3::zeros(),
            intensity: 0.0,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for a non-finite direction or
    /// a negative/non-finite intensity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.direction.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::invalid("direction", "must be finite"));
        }
        require_non_negative("intensity", self.intensity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_default_is_valid() {
        assert!(GridConfig::default().validate().is_ok());
        assert!(WindConfig::default().validate().is_ok());
        assert!(WindConfig::calm().validate().is_ok());
    }

    #[test]
    fn test_resolution_must_be_block_multiple() {
        let config = GridConfig {
            resolution: [32, 12, 32],
            ..GridConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidResolution { axis: 'y', value: 12 })
        );

        let config = GridConfig {
            resolution: [0, 8, 8],
            ..GridConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidResolution { axis: 'x', value: 0 })
        );
    }

    #[test]
    fn test_bad_coefficients_rejected() {
        let config = GridConfig {
            viscosity: -0.1,
            ..GridConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GridConfig {
            solver_iterations: 0,
            ..GridConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GridConfig {
            world_to_local: GridConfig::volume_transform(&Vec3::zeros(), &Vec3::new(0.0, 1.0, 1.0)),
            ..GridConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_volume_transform_maps_box_to_unit_cube() {
        let m = GridConfig::volume_transform(&Vec3::new(10.0, 5.0, 0.0), &Vec3::new(20.0, 10.0, 4.0));
        let corner = m * Vector4::new(20.0, 10.0, 2.0, 1.0);
        assert_relative_eq!(corner.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(corner.y, 0.5, epsilon = 1e-6);
        assert_relative_eq!(corner.z, 0.5, epsilon = 1e-6);
        let center = m * Vector4::new(10.0, 5.0, 0.0, 1.0);
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-6);
    }
}
