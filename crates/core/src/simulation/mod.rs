//! Tree fire simulation
//!
//! `TreeFireSimulation` ties the pieces together:
//! - `ModuleGraph`: arena of combustible tree segments
//! - `CombustionStepper`: per-module burn, heat exchange and destruction
//! - `GridModuleBridge`: module/grid transfer with a one-tick-stale shadow
//! - a boxed `GridSolver` advancing temperature and velocity
//! - a quadtree over module footprints for torch-style queries

pub mod collaborator;
pub mod combustion_stepper;
pub mod module_graph;

pub use collaborator::{FrameRecorder, ModuleCollaborator, NullCollaborator};
pub use combustion_stepper::{CombustionStepper, StepReport};
pub use module_graph::{ModuleGraph, ModuleGraphStats, RemovalReport};

use crate::core_types::error::ConfigError;
use crate::core_types::module::{CombustionState, ModuleConfig, ModuleDesc};
use crate::core_types::spatial::{
    QuadtreeConfig, QuadtreeSpawnListener, QuadtreeStats, Rect, SpatialDatum, SpawnListener,
};
use crate::core_types::vec3::{Mat4, Vec2, Vec3};
use crate::grid::{GridModuleBridge, ReadbackLoopState, ReadbackPoll};
use crate::solver::{create_grid_solver, FrameTimer, GridConfig, GridSolver, ProfilerScope, WindConfig};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Everything needed to build a [`TreeFireSimulation`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub grid: GridConfig,
    pub modules: ModuleConfig,
    pub wind: WindConfig,
    pub quadtree: QuadtreeConfig,
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns the first failing sub-configuration's [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.modules.validate()?;
        self.wind.validate()?;
        self.quadtree.validate()
    }
}

/// Ground-plane footprint of a module (x/z), stored in the proximity quadtree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleFootprint {
    pub module: usize,
    pub location: Vec2,
    pub radius: f32,
}

impl SpatialDatum for ModuleFootprint {
    fn location(&self) -> Vec2 {
        self.location
    }

    fn radius(&self) -> f32 {
        self.radius
    }
}

/// Statistics for the simulation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub tick_count: u64,
    pub simulation_time: f32,
    pub module_count: usize,
    pub burning: usize,
    pub destroyed_last_tick: usize,
    pub total_destroyed: usize,
    pub total_energy_released: f32,
    pub total_mass: f32,
    pub readbacks_completed: u64,
    pub last_frame_time_ms: f64,
    pub average_frame_time_ms: f64,
}

/// What happened during one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub step: StepReport,
    pub readback: ReadbackPoll,
    /// Modules outside the grid this tick
    pub out_of_grid: usize,
    /// Modules removed from the arena at the end of the tick
    pub removed: usize,
}

/// Wildfire simulation over a forest of tree modules
pub struct TreeFireSimulation {
    config: SimulationConfig,
    solver: Box<dyn GridSolver>,
    bridge: GridModuleBridge,
    graph: ModuleGraph,
    stepper: CombustionStepper,
    proximity: QuadtreeSpawnListener<ModuleFootprint>,
    proximity_dirty: bool,
    wind: WindConfig,
    timer: FrameTimer,
    started: bool,
    ambient: Vec<f32>,
    deltas: Vec<f32>,
    transforms: Vec<Mat4>,
    stats: SimulationStats,
}

impl TreeFireSimulation {
    /// Create an empty simulation
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when any part of `config` is invalid.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let solver = create_grid_solver(&config.grid)?;
        let bridge = GridModuleBridge::new(&config.grid);
        let graph = ModuleGraph::new(config.modules.clone())?;
        let proximity = QuadtreeSpawnListener::new(config.quadtree.clone())?;

        info!(
            "Tree fire simulation created: grid {:?}, {} solver iteration(s), {} substep(s)",
            config.grid.resolution, config.grid.solver_iterations, config.grid.substeps
        );

        Ok(Self {
            wind: config.wind.clone(),
            config,
            solver,
            bridge,
            graph,
            stepper: CombustionStepper::new(),
            proximity,
            proximity_dirty: true,
            timer: FrameTimer::new(),
            started: false,
            ambient: Vec::new(),
            deltas: Vec::new(),
            transforms: Vec::new(),
            stats: SimulationStats::default(),
        })
    }

    /// Register a module; see [`ModuleGraph::add_module`]
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownParent`] or
    /// [`ConfigError::InvalidParameter`] for a bad descriptor.
    pub fn add_module(&mut self, desc: &ModuleDesc) -> Result<usize, ConfigError> {
        let index = self.graph.add_module(desc)?;
        if let Some(module) = self.graph.get(index) {
            if self.bridge.world_to_voxel(module.position()).is_none() {
                warn!(
                    "Module {} at ({:.2}, {:.2}, {:.2}) is outside the grid; it will not exchange heat",
                    index, desc.position.x, desc.position.y, desc.position.z
                );
            }
        }
        self.proximity_dirty = true;
        Ok(index)
    }

    /// Arm the read-back loop and build the proximity index
    ///
    /// Called by the first [`tick`](Self::tick) when not done explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyForest`] when no module was registered.
    pub fn start(&mut self) -> Result<(), ConfigError> {
        if self.graph.is_empty() {
            return Err(ConfigError::EmptyForest);
        }
        if self.started {
            return Ok(());
        }
        self.rebuild_proximity();
        let outside = self.bridge.update_module_coordinates(self.graph.modules());
        if outside > 0 {
            warn!("{} module(s) lie outside the grid volume", outside);
        }
        if !self.bridge.arm(self.solver.as_mut()) {
            warn!("Grid read-back unavailable; ambient temperature stays at 0");
        }
        self.started = true;
        info!("Simulation started with {} module(s)", self.graph.len());
        Ok(())
    }

    /// Advance the simulation by `dt` seconds
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidParameter`] for a non-positive or non-finite `dt`
    /// - [`ConfigError::EmptyForest`] when starting an empty forest
    pub fn tick(
        &mut self,
        dt: f32,
        collaborator: &mut dyn ModuleCollaborator,
    ) -> Result<TickReport, ConfigError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigError::invalid(
                "dt",
                format!("must be positive and finite, got {dt}"),
            ));
        }
        if !self.started {
            self.start()?;
        }
        let frame_start = Instant::now();
        let _scope = ProfilerScope::new("tick");

        // 1. Shadow copy from an earlier tick
        self.solver.poll_device();
        let readback = self.bridge.process_readback(self.solver.as_mut());

        // 2-3. Module voxels and ambient temperatures
        let out_of_grid = self.bridge.update_module_coordinates(self.graph.modules());
        self.bridge.gather_grid_temperature_for_modules(&mut self.ambient);

        // 4. Combustion
        let step = self.stepper.step(
            &mut self.graph,
            &self.ambient,
            &self.wind,
            dt,
            &mut self.deltas,
            collaborator,
        );

        // 5. Energy into the grid
        self.bridge
            .scatter_module_energy_to_grid(&self.deltas, self.solver.as_mut());

        // 6-8. Grid
        self.solver
            .simulate_wind(&self.wind.direction, self.wind.intensity, dt);
        let grid = &self.config.grid;
        let substeps = grid.substeps.max(1);
        let sub_dt = dt / substeps as f32;
        for _ in 0..substeps {
            self.solver
                .step(sub_dt, grid.diffusion, grid.viscosity, grid.solver_iterations);
        }
        self.solver.flush();

        // 9. Deferred removal
        let removed = if step.destroyed.is_empty() {
            0
        } else {
            for &index in &step.destroyed {
                collaborator.detach_module(index);
            }
            let removal = self.graph.remove_burned();
            self.bridge.remap(&removal.remap);
            collaborator.remap_modules(&removal.remap);
            self.proximity_dirty = true;
            removal.removed.len()
        };

        // 10. Render transforms
        self.graph.instance_transforms(&mut self.transforms);
        collaborator.upload_instance_transforms(&self.transforms);

        let elapsed_ms = frame_start.elapsed().as_secs_f64() * 1000.0;
        self.timer.record(elapsed_ms);
        self.update_stats(dt, &step, removed);

        debug!(
            "Tick {}: {} burning, {} destroyed, {} read-back(s), {:.2} ms",
            self.stats.tick_count,
            step.burning,
            removed,
            self.stats.readbacks_completed,
            elapsed_ms
        );

        Ok(TickReport {
            tick: self.stats.tick_count,
            step,
            readback,
            out_of_grid,
            removed,
        })
    }

    fn update_stats(&mut self, dt: f32, step: &StepReport, removed: usize) {
        let graph = self.graph.stats();
        let stats = &mut self.stats;
        stats.tick_count += 1;
        stats.simulation_time += dt;
        stats.module_count = graph.total;
        stats.burning = step.burning;
        stats.destroyed_last_tick = removed;
        stats.total_destroyed += removed;
        stats.total_energy_released += step.energy_released;
        stats.total_mass = graph.total_mass;
        stats.readbacks_completed = self.bridge.completed_readbacks();
        stats.last_frame_time_ms = self.timer.last_frame_time_ms();
        stats.average_frame_time_ms = self.timer.average_frame_time_ms();
    }

    fn rebuild_proximity(&mut self) {
        let footprints: Vec<ModuleFootprint> = self
            .graph
            .iter()
            .enumerate()
            .map(|(module, m)| ModuleFootprint {
                module,
                location: Vec2::new(m.position().x, m.position().z),
                radius: m.radius(),
            })
            .collect();

        let min_size = self.config.quadtree.min_node_size;
        let mut min = Vec2::repeat(f32::INFINITY);
        let mut max = Vec2::repeat(f32::NEG_INFINITY);
        for f in &footprints {
            min = min.inf(&(f.location - Vec2::repeat(f.radius)));
            max = max.sup(&(f.location + Vec2::repeat(f.radius)));
        }
        if footprints.is_empty() {
            min = Vec2::zeros();
            max = Vec2::zeros();
        }
        let bounds = Rect::new(min - Vec2::repeat(min_size), max + Vec2::repeat(min_size));

        self.proximity.on_bounds_calculated(bounds);
        for footprint in &footprints {
            self.proximity.on_item_spawned(footprint);
        }
        self.proximity.on_all_items_spawned(&footprints);
        self.proximity_dirty = false;
    }

    /// Modules whose footprint touches the circle at `world_pos` (x/z), ascending
    pub fn modules_near(&mut self, world_pos: &Vec3, radius: f32) -> Vec<usize> {
        if self.proximity_dirty {
            self.rebuild_proximity();
        }
        let index = self.proximity.index();
        let mut modules: Vec<usize> = index
            .query_range(Vec2::new(world_pos.x, world_pos.z), radius)
            .into_iter()
            .filter_map(|handle| index.get(handle).map(|f| f.module))
            .collect();
        modules.sort_unstable();
        modules
    }

    /// Torch: add `amount` to every module within `radius` of `world_pos`
    ///
    /// # Returns
    ///
    /// Number of modules heated
    pub fn heat_at(&mut self, world_pos: &Vec3, radius: f32, amount: f32) -> usize {
        let targets = self.modules_near(world_pos, radius);
        targets
            .into_iter()
            .filter(|&module| self.graph.heat(module, amount))
            .count()
    }

    /// Grid torch: add `intensity` to the voxel holding `world_pos`
    pub fn inject_heat(&mut self, world_pos: &Vec3, intensity: f32) -> bool {
        match self.bridge.world_to_voxel(world_pos) {
            Some([x, y, z]) => {
                let texel = Vec3::new(x as f32, y as f32, z as f32);
                self.solver.inject_source(&texel, intensity)
            }
            None => {
                warn!(
                    "Heat source at ({:.2}, {:.2}, {:.2}) is outside the grid",
                    world_pos.x, world_pos.y, world_pos.z
                );
                false
            }
        }
    }

    /// Raise module `index` to at least `temperature`
    pub fn ignite(&mut self, index: usize, temperature: f32) -> bool {
        self.graph.ignite(index, temperature)
    }

    /// # Errors
    ///
    /// Propagates [`WindConfig::validate`] failures; the previous wind stays.
    pub fn set_wind(&mut self, wind: WindConfig) -> Result<(), ConfigError> {
        wind.validate()?;
        self.wind = wind;
        Ok(())
    }

    /// Tear down the device side; the read-back loop stops on the next tick
    pub fn shutdown(&mut self) {
        self.solver.shutdown();
        info!("Simulation shut down after {} tick(s)", self.stats.tick_count);
    }

    #[must_use]
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    #[must_use]
    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    #[must_use]
    pub fn solver(&self) -> &dyn GridSolver {
        self.solver.as_ref()
    }

    #[must_use]
    pub fn bridge(&self) -> &GridModuleBridge {
        &self.bridge
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    #[must_use]
    pub fn wind(&self) -> &WindConfig {
        &self.wind
    }

    #[must_use]
    pub fn combustion_state(&self, index: usize) -> Option<CombustionState> {
        self.graph.combustion_state(index)
    }

    #[must_use]
    pub fn readback_state(&self) -> ReadbackLoopState {
        self.bridge.readback_state()
    }

    #[must_use]
    pub fn proximity_stats(&self) -> QuadtreeStats {
        self.proximity.index().stats()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl std::fmt::Debug for TreeFireSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeFireSimulation")
            .field("modules", &self.graph.len())
            .field("started", &self.started)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
