use std::ptr;
use std::sync::Mutex;
use tracing::info;
use tree_fire_core::{
    FrameRecorder, GridConfig, ModuleConfig, SimulationConfig, TreeFireSimulation, Vec3,
    WindConfig,
};

use crate::error::{DefaultTreeFireError, TreeFireErrorCode};
use crate::helpers::{clear_last_error, track_error, track_result};
use crate::queries::ModuleSnapshot;

/// C-compatible simulation configuration.
///
/// Start from `tree_fire_default_config()` and override what you need.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeFireConfig {
    /// Voxels along x, y, z; each must be a positive multiple of 8.
    pub resolution_x: u32,
    pub resolution_y: u32,
    pub resolution_z: u32,
    /// World-space centre of the grid volume.
    pub volume_center_x: f32,
    pub volume_center_y: f32,
    pub volume_center_z: f32,
    /// World-space size of the grid volume.
    pub volume_size_x: f32,
    pub volume_size_y: f32,
    pub volume_size_z: f32,
    /// Temperature diffusion coefficient.
    pub diffusion: f32,
    /// Velocity diffusion coefficient.
    pub viscosity: f32,
    /// Relaxation passes per solve (10-20).
    pub solver_iterations: u32,
    /// Solver steps per update.
    pub substeps: u32,
    /// Upward acceleration per unit temperature.
    pub buoyancy: f32,
    /// Wood density (kg/m³).
    pub wood_density: f32,
    /// Normalized ignition temperature.
    pub ignition_temperature: f32,
    /// Normalized temperature of full reaction.
    pub attenuation_temperature: f32,
    /// Char depth burnt per tick at full reaction (m).
    pub thickness: f32,
    /// Scales burnt mass into grid energy.
    pub release_temperature_factor: f32,
    /// Fraction of the gap gained from hotter air.
    pub air_transfer_factor: f32,
    /// Fraction of the gap lost to cooler air.
    pub module_transfer_factor: f32,
    /// Parent/child equalization rate.
    pub module_diffusion_factor: f32,
    /// Wind direction (normalized internally).
    pub wind_x: f32,
    pub wind_y: f32,
    pub wind_z: f32,
    /// Wind speed.
    pub wind_intensity: f32,
}

impl Default for TreeFireConfig {
    fn default() -> Self {
        let grid = GridConfig::default();
        let modules = ModuleConfig::default();
        let wind = WindConfig::default();
        Self {
            resolution_x: grid.resolution[0],
            resolution_y: grid.resolution[1],
            resolution_z: grid.resolution[2],
            volume_center_x: 0.0,
            volume_center_y: 16.0,
            volume_center_z: 0.0,
            volume_size_x: 32.0,
            volume_size_y: 32.0,
            volume_size_z: 32.0,
            diffusion: grid.diffusion,
            viscosity: grid.viscosity,
            solver_iterations: grid.solver_iterations,
            substeps: grid.substeps,
            buoyancy: grid.buoyancy,
            wood_density: *modules.wood_density,
            ignition_temperature: modules.ignition_temperature,
            attenuation_temperature: modules.attenuation_temperature,
            thickness: modules.thickness,
            release_temperature_factor: modules.release_temperature_factor,
            air_transfer_factor: modules.air_transfer_factor,
            module_transfer_factor: modules.module_transfer_factor,
            module_diffusion_factor: modules.module_diffusion_factor,
            wind_x: wind.direction.x,
            wind_y: wind.direction.y,
            wind_z: wind.direction.z,
            wind_intensity: wind.intensity,
        }
    }
}

impl TreeFireConfig {
    fn to_simulation_config(self) -> Result<SimulationConfig, DefaultTreeFireError> {
        let size = Vec3::new(self.volume_size_x, self.volume_size_y, self.volume_size_z);
        if !size.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(DefaultTreeFireError::invalid_parameter(format!(
                "Volume size must be finite and positive, got ({}, {}, {})",
                size.x, size.y, size.z
            )));
        }
        if !self.wood_density.is_finite() || self.wood_density <= 0.0 {
            return Err(DefaultTreeFireError::invalid_parameter(format!(
                "wood_density must be finite and positive, got {}",
                self.wood_density
            )));
        }
        let center = Vec3::new(self.volume_center_x, self.volume_center_y, self.volume_center_z);

        Ok(SimulationConfig {
            grid: GridConfig {
                resolution: [self.resolution_x, self.resolution_y, self.resolution_z],
                diffusion: self.diffusion,
                viscosity: self.viscosity,
                solver_iterations: self.solver_iterations,
                substeps: self.substeps,
                buoyancy: self.buoyancy,
                world_to_local: GridConfig::volume_transform(&center, &size),
                ..GridConfig::default()
            },
            modules: ModuleConfig {
                wood_density: self.wood_density.into(),
                ignition_temperature: self.ignition_temperature,
                attenuation_temperature: self.attenuation_temperature,
                thickness: self.thickness,
                release_temperature_factor: self.release_temperature_factor,
                air_transfer_factor: self.air_transfer_factor,
                module_transfer_factor: self.module_transfer_factor,
                module_diffusion_factor: self.module_diffusion_factor,
                ..ModuleConfig::default()
            },
            wind: WindConfig {
                direction: Vec3::new(self.wind_x, self.wind_y, self.wind_z),
                intensity: self.wind_intensity,
            },
            ..SimulationConfig::default()
        })
    }
}

/// Everything behind the instance lock.
pub(crate) struct InstanceState {
    pub(crate) sim: TreeFireSimulation,
    /// Collaborator output from the last update (forces, effects, transforms).
    pub(crate) recorder: FrameRecorder,
    /// Cached module snapshot reused by `tree_fire_get_module_states`.
    pub(crate) snapshot: Vec<ModuleSnapshot>,
    /// Transforms flattened to 16 column-major floats per module.
    pub(crate) transform_floats: Vec<f32>,
}

/// The tree fire simulation context.
///
/// # Thread Safety
/// All state sits behind one `Mutex`: the simulation owns a read-back channel
/// receiver, which may move between threads but cannot be shared, so a
/// reader/writer lock is not available. Every call locks briefly; updates
/// hold the lock for one tick.
///
/// # Usage (C++)
/// ```cpp
/// TreeFireInstance* sim = nullptr;
/// TreeFireConfig config = tree_fire_default_config();
/// config.resolution_x = 64;
/// if (tree_fire_new(config, &sim) != TreeFireErrorCode::Ok) {
///     return;
/// }
///
/// uintptr_t trunk = 0;
/// TreeFireModuleDesc desc = { 0.0f, 1.0f, 0.0f, 0.2f, 2.0f, -1, true, 0.0f };
/// tree_fire_add_module(sim, desc, &trunk);
/// tree_fire_ignite(sim, trunk, 0.5f);
///
/// // Every frame
/// tree_fire_update(sim, DeltaTime);
///
/// tree_fire_destroy(sim);
/// ```
pub struct TreeFireInstance {
    pub(crate) state: Mutex<InstanceState>,
}

impl TreeFireInstance {
    /// # Errors
    ///
    /// Returns an error when the configuration is rejected by the core crate.
    pub(crate) fn new(config: &TreeFireConfig) -> Result<Box<Self>, DefaultTreeFireError> {
        let sim = TreeFireSimulation::new(config.to_simulation_config()?)?;
        info!("Tree fire instance created");
        Ok(Box::new(Self {
            state: Mutex::new(InstanceState {
                sim,
                recorder: FrameRecorder::new(),
                snapshot: Vec::new(),
                transform_floats: Vec::new(),
            }),
        }))
    }
}

/// Default configuration: 32³ grid covering a 32 m cube standing on the origin.
#[no_mangle]
pub extern "C" fn tree_fire_default_config() -> TreeFireConfig {
    TreeFireConfig::default()
}

/// Create a new instance and return it via out-parameter.
///
/// Returns
/// - `TreeFireErrorCode::Ok` (0) with a valid instance in `out_instance`
/// - `TreeFireErrorCode::NullPointer` if `out_instance` is null
/// - `TreeFireErrorCode::InvalidResolution` / `InvalidParameter` for a rejected config
///
/// Call `tree_fire_get_last_error()` for a human-readable description.
///
/// # Safety
///
/// - `out_instance` must be a valid, non-null pointer to writable memory.
/// - The caller takes ownership of the returned instance and MUST call
///   `tree_fire_destroy` exactly once.
#[no_mangle]
pub unsafe extern "C" fn tree_fire_new(
    config: TreeFireConfig,
    out_instance: *mut *mut TreeFireInstance,
) -> TreeFireErrorCode {
    if out_instance.is_null() {
        return track_error(&DefaultTreeFireError::null_pointer("out_instance"));
    }

    match track_result(TreeFireInstance::new(&config)) {
        Ok(instance) => {
            unsafe {
                *out_instance = Box::into_raw(instance);
            }
            clear_last_error();
            TreeFireErrorCode::Ok
        }
        Err(code) => {
            unsafe {
                // Set to null on error (per documentation contract)
                *out_instance = ptr::null_mut();
            }
            code
        }
    }
}

/// Destroy an instance previously created by `tree_fire_new`.
///
/// Shuts the solver down before freeing. A null `ptr` is a no-op.
///
/// # Safety
/// - The pointer MUST have been created by `tree_fire_new` and not freed already.
/// - After calling this function, the caller must not use the pointer again.
#[no_mangle]
pub unsafe extern "C" fn tree_fire_destroy(ptr: *mut TreeFireInstance) {
    if ptr.is_null() {
        return;
    }

    // SAFETY: the pointer was created by `Box::into_raw` in `tree_fire_new`
    // and has not been freed; null was rejected above.
    let instance = unsafe { Box::from_raw(ptr) };
    if let Ok(mut state) = instance.state.lock() {
        state.sim.shutdown();
    }
    drop(instance);
}
