//! Physics formulas for module combustion and wind loading

pub mod aerodynamics;
pub mod combustion_physics;

pub use aerodynamics::drag_force;
pub use combustion_physics::{
    ambient_exchange, cylinder_mass, lateral_surface_area, mass_loss, parent_diffusion,
    radius_from_mass, reaction_rate, released_energy,
};
