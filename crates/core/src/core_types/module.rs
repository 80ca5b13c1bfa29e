//! Combustible tree modules
//!
//! A module is one capsule-shaped segment of a tree. Its radius is never
//! stored: it is always derived from the current mass, the configured wood
//! density and the (fixed) segment height.

use crate::core_types::error::{
    require_fraction, require_non_negative, require_positive, ConfigError,
};
use crate::core_types::units::{KgPerCubicMeter, Kilograms, Meters};
use crate::core_types::vec3::Vec3;
use crate::physics::combustion_physics::{
    cylinder_mass, lateral_surface_area, radius_from_mass,
};
use serde::{Deserialize, Serialize};

/// Tunables shared by every module in a forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Wood density used for the mass/radius relation
    pub wood_density: KgPerCubicMeter,
    /// Normalized temperature where the reaction starts
    pub ignition_temperature: f32,
    /// Normalized temperature where the reaction rate saturates at 1
    pub attenuation_temperature: f32,
    /// Char depth consumed per tick at full reaction rate (m)
    pub thickness: f32,
    /// Scales burnt mass into energy delivered to the grid
    pub release_temperature_factor: f32,
    /// Fraction of the gap a module gains when the air is hotter
    pub air_transfer_factor: f32,
    /// Fraction of the gap a module loses when it is hotter than the air
    pub module_transfer_factor: f32,
    /// Parent/child equalization rate (per second)
    pub module_diffusion_factor: f32,
    /// Air density for the aerodynamic drag force
    pub air_density: KgPerCubicMeter,
    /// Fraction of the initial mass at which combustion stops for good
    pub stop_combustion_ratio: f32,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            wood_density: KgPerCubicMeter::HARDWOOD,
            ignition_temperature: 0.15,
            attenuation_temperature: 0.45,
            thickness: 0.01,
            release_temperature_factor: 10_000.0,
            air_transfer_factor: 0.05,
            module_transfer_factor: 0.02,
            module_diffusion_factor: 0.5,
            air_density: KgPerCubicMeter::AIR_SEA_LEVEL,
            stop_combustion_ratio: 0.1,
        }
    }
}

impl ModuleConfig {
    /// Check every coefficient for range and ordering problems
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("wood_density", *self.wood_density)?;
        require_non_negative("ignition_temperature", self.ignition_temperature)?;
        require_positive("attenuation_temperature", self.attenuation_temperature)?;
        if self.ignition_temperature >= self.attenuation_temperature {
            return Err(ConfigError::invalid(
                "ignition_temperature",
                format!(
                    "must be below attenuation_temperature ({} >= {})",
                    self.ignition_temperature, self.attenuation_temperature
                ),
            ));
        }
        require_non_negative("thickness", self.thickness)?;
        require_non_negative("release_temperature_factor", self.release_temperature_factor)?;
        require_fraction("air_transfer_factor", self.air_transfer_factor)?;
        require_fraction("module_transfer_factor", self.module_transfer_factor)?;
        require_non_negative("module_diffusion_factor", self.module_diffusion_factor)?;
        require_non_negative("air_density", *self.air_density)?;
        require_fraction("stop_combustion_ratio", self.stop_combustion_ratio)?;
        Ok(())
    }
}

/// Registration data for one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDesc {
    /// World position of the segment centre
    pub position: Vec3,
    /// Initial radius; the initial mass is derived from it
    pub radius: Meters,
    /// Segment length, fixed for the module's lifetime
    pub height: Meters,
    /// Index of the supporting module, `None` for roots
    pub parent: Option<usize>,
    /// Trunk modules are never destroyed by combustion
    pub is_trunk: bool,
    /// Initial normalized temperature
    pub temperature: f32,
}

impl ModuleDesc {
    /// Non-trunk segment hanging from `parent`
    ///
    /// Dimensions are checked by [`ModuleGraph::add_module`](crate::simulation::ModuleGraph::add_module).
    pub fn branch(position: Vec3, radius: f32, height: f32, parent: usize) -> Self {
        Self {
            position,
            radius: Meters::from(radius),
            height: Meters::from(height),
            parent: Some(parent),
            is_trunk: false,
            temperature: 0.0,
        }
    }

    /// Root segment of a tree
    pub fn trunk(position: Vec3, radius: f32, height: f32) -> Self {
        Self {
            position,
            radius: Meters::from(radius),
            height: Meters::from(height),
            parent: None,
            is_trunk: true,
            temperature: 0.0,
        }
    }
}

/// Per-module combustion state machine
///
/// `Exhausted` and `Destroyed` are terminal: nothing moves a module back out
/// of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CombustionState {
    /// Below the ignition temperature
    #[default]
    Intact = 0,
    /// Crossed the ignition temperature this tick
    Igniting = 1,
    /// Between ignition and attenuation, partial reaction rate
    ActivelyBurning = 2,
    /// At or above the attenuation temperature, full reaction rate
    FullyReacting = 3,
    /// Mass reached the combustion floor
    Exhausted = 4,
    /// Marked for removal from the graph
    Destroyed = 5,
}

impl CombustionState {
    /// Terminal states never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Destroyed)
    }

    /// States in which the reaction consumes mass
    pub fn is_reacting(self) -> bool {
        matches!(
            self,
            Self::Igniting | Self::ActivelyBurning | Self::FullyReacting
        )
    }
}

/// One combustible tree segment
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub(crate) position: Vec3,
    pub(crate) mass: f32,
    pub(crate) initial_mass: f32,
    pub(crate) height: f32,
    pub(crate) wood_density: f32,
    pub(crate) temperature: f32,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) is_trunk: bool,
    pub(crate) is_burning: bool,
    pub(crate) is_isolated_by_coal: bool,
    pub(crate) is_burned: bool,
    pub(crate) stop_combustion_mass: f32,
    pub(crate) state: CombustionState,
}

impl Module {
    /// Build a module from its registration data
    pub(crate) fn new(desc: &ModuleDesc, config: &ModuleConfig) -> Self {
        let height = desc.height.value();
        let wood_density = config.wood_density.value();
        let mass = cylinder_mass(desc.radius.value(), height, wood_density);
        Self {
            position: desc.position,
            mass,
            initial_mass: mass,
            height,
            wood_density,
            temperature: desc.temperature,
            parent: desc.parent,
            children: Vec::new(),
            is_trunk: desc.is_trunk,
            is_burning: false,
            is_isolated_by_coal: false,
            is_burned: false,
            stop_combustion_mass: mass * config.stop_combustion_ratio,
            state: CombustionState::Intact,
        }
    }

    /// World position of the segment centre
    pub fn position(&self) -> &Vec3 {
        &self.position
    }

    /// Current mass (kg)
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Mass at registration (kg)
    pub fn initial_mass(&self) -> f32 {
        self.initial_mass
    }

    /// Radius derived from the current mass
    pub fn radius(&self) -> f32 {
        radius_from_mass(self.mass, self.wood_density, self.height)
    }

    /// Segment length (m)
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Lateral cylinder surface `2π·r·h`
    pub fn surface_area(&self) -> f32 {
        lateral_surface_area(self.radius(), self.height)
    }

    /// Normalized temperature
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Supporting module, if any
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Modules supported by this one
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn is_trunk(&self) -> bool {
        self.is_trunk
    }

    pub fn is_burning(&self) -> bool {
        self.is_burning
    }

    /// Trunk whose combustion stopped at the mass floor; it stays standing as coal.
    pub fn is_isolated_by_coal(&self) -> bool {
        self.is_isolated_by_coal
    }

    /// Marked for removal
    pub fn is_burned(&self) -> bool {
        self.is_burned
    }

    /// Mass floor below which combustion stops permanently
    pub fn stop_combustion_mass(&self) -> f32 {
        self.stop_combustion_mass
    }

    pub fn state(&self) -> CombustionState {
        self.state
    }

    /// Burn off `lost` kilograms; mass never goes below zero and the radius follows
    pub(crate) fn consume(&mut self, lost: f32) {
        let mut mass = Kilograms::from(self.mass);
        mass -= lost;
        self.mass = mass.value();
    }

    /// Whether the reaction can still consume this module
    pub(crate) fn combustion_active(&self) -> bool {
        !self.state.is_terminal() && !self.is_isolated_by_coal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_initial_mass_matches_cylinder_volume() {
        let config = ModuleConfig::default();
        let module = Module::new(&ModuleDesc::trunk(Vec3::zeros(), 0.2, 2.0), &config);
        assert_relative_eq!(module.mass(), PI * 0.04 * 2.0 * 800.0, max_relative = 1e-5);
        assert_relative_eq!(module.radius(), 0.2, max_relative = 1e-5);
        assert_relative_eq!(
            module.stop_combustion_mass(),
            module.initial_mass() * 0.1,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_radius_follows_mass() {
        let config = ModuleConfig::default();
        let mut module = Module::new(&ModuleDesc::trunk(Vec3::zeros(), 0.3, 1.5), &config);
        module.consume(module.mass() * 0.75);
        assert_relative_eq!(module.radius(), 0.15, max_relative = 1e-5);

        module.consume(module.mass() + 3.0);
        assert_eq!(module.mass(), 0.0);
        assert_eq!(module.radius(), 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(ModuleConfig::default().validate().is_ok());

        let swapped = ModuleConfig {
            ignition_temperature: 0.5,
            attenuation_temperature: 0.4,
            ..ModuleConfig::default()
        };
        assert!(matches!(
            swapped.validate(),
            Err(ConfigError::InvalidParameter { name: "ignition_temperature", .. })
        ));

        let bad_factor = ModuleConfig {
            air_transfer_factor: 1.5,
            ..ModuleConfig::default()
        };
        assert!(bad_factor.validate().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(CombustionState::Exhausted.is_terminal());
        assert!(CombustionState::Destroyed.is_terminal());
        assert!(!CombustionState::FullyReacting.is_terminal());
        assert!(CombustionState::Igniting.is_reacting());
        assert!(!CombustionState::Intact.is_reacting());
    }
}
