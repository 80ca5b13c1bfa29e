//! Core types and utilities

pub mod error;
pub mod module;
pub mod spatial;
pub mod units;
pub mod vec3;

pub use error::ConfigError;
pub use module::{CombustionState, Module, ModuleConfig, ModuleDesc};
pub use spatial::{
    QuadtreeConfig, QuadtreeSpawnListener, QuadtreeStats, Rect, SpatialDatum, SpatialIndex,
    SpawnListener,
};
pub use units::*;
pub use vec3::{Mat4, Vec2, Vec3};
