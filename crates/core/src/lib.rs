//! Tree fire simulation core library
//!
//! Real-time wildfire propagation for procedurally generated trees. Trees are
//! chains of cylindrical modules; a voxel fluid solver carries heat around
//! them, and every module exchanges energy with the grid, burns, loses mass
//! and can collapse, taking its dependent branches with it.
//!
//! ## Layout
//!
//! - `core_types`: modules, configuration errors, units, the quadtree
//! - `physics`: combustion and drag formulas
//! - `solver`: the 3D stable-fluids grid and its read-back queue
//! - `grid`: module/grid coupling with a one-tick-stale shadow copy
//! - `simulation`: module graph, combustion stepper and the tick facade
//!
//! ## Example
//!
//! ```rust
//! use tree_fire_core::{ModuleDesc, NullCollaborator, SimulationConfig, TreeFireSimulation, Vec3};
//!
//! let mut sim = TreeFireSimulation::new(SimulationConfig::default()).unwrap();
//! let trunk = sim.add_module(&ModuleDesc::trunk(Vec3::new(0.0, 1.0, 0.0), 0.2, 2.0)).unwrap();
//! sim.add_module(&ModuleDesc::branch(Vec3::new(0.0, 3.0, 0.0), 0.05, 1.0, trunk)).unwrap();
//! sim.ignite(trunk, 0.5);
//!
//! for _ in 0..10 {
//!     sim.tick(1.0 / 30.0, &mut NullCollaborator).unwrap();
//! }
//! assert_eq!(sim.stats().tick_count, 10);
//! ```

pub mod core_types;
pub mod grid;
pub mod physics;
pub mod simulation;
pub mod solver;

// Re-export core types
pub use core_types::{
    CombustionState, ConfigError, KgPerCubicMeter, Kilograms, Mat4, Meters, Module, ModuleConfig,
    ModuleDesc, QuadtreeConfig, QuadtreeStats, Rect, SpatialDatum, SpatialIndex, Vec2, Vec3,
};

// Re-export solver and coupling types
pub use grid::{GridModuleBridge, ReadbackLoopState, ReadbackPoll};
pub use solver::{create_grid_solver, GridConfig, GridQuality, GridSolver, WindConfig};

// Re-export simulation types
pub use simulation::{
    CombustionStepper, FrameRecorder, ModuleCollaborator, ModuleFootprint, ModuleGraph,
    NullCollaborator, SimulationConfig, SimulationStats, StepReport, TickReport,
    TreeFireSimulation,
};
