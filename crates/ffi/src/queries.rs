use std::ptr;
use tree_fire_core::{Module, SimulationStats};

use crate::error::{DefaultTreeFireError, TreeFireErrorCode};
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, lock_state, track_error};
use crate::instance::TreeFireInstance;

#[repr(C)]
/// FFI-friendly snapshot of one module.
/// Keep this layout stable for C/C++/C# consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleSnapshot {
    /// Current module index (indices compact after destruction).
    pub index: usize,
    /// Combustion state: 0 intact, 1 igniting, 2 burning, 3 fully reacting,
    /// 4 exhausted, 5 destroyed.
    pub state: u8,
    pub is_burning: bool,
    pub is_isolated_by_coal: bool,
    /// Flame effect currently enabled.
    pub effect_enabled: bool,
    /// Mass (kg).
    pub mass: f32,
    /// Radius derived from mass (m).
    pub radius: f32,
    /// Normalized temperature.
    pub temperature: f32,
    /// Wind force applied during the last update.
    pub force_x: f32,
    pub force_y: f32,
    pub force_z: f32,
}

impl ModuleSnapshot {
    fn new(index: usize, module: &Module, effect_enabled: bool, force: [f32; 3]) -> Self {
        Self {
            index,
            state: module.state() as u8,
            is_burning: module.is_burning(),
            is_isolated_by_coal: module.is_isolated_by_coal(),
            effect_enabled,
            mass: module.mass(),
            radius: module.radius(),
            temperature: module.temperature(),
            force_x: force[0],
            force_y: force[1],
            force_z: force[2],
        }
    }
}

/// C-compatible simulation statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TreeFireStats {
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

impl From<&SimulationStats> for TreeFireStats {
    fn from(stats: &SimulationStats) -> Self {
        Self {
            tick_count: stats.tick_count,
            simulation_time: stats.simulation_time,
            module_count: stats.module_count,
            burning: stats.burning,
            destroyed_last_tick: stats.destroyed_last_tick,
            total_destroyed: stats.total_destroyed,
            total_energy_released: stats.total_energy_released,
            total_mass: stats.total_mass,
            readbacks_completed: stats.readbacks_completed,
            last_frame_time_ms: stats.last_frame_time_ms,
            average_frame_time_ms: stats.average_frame_time_ms,
        }
    }
}

/// Write a null array and zero length into the out-parameters.
unsafe fn clear_out_array<T>(out_len: *mut usize, out_array: *mut *const T) {
    unsafe {
        *out_array = ptr::null();
        *out_len = 0;
    }
}

#[no_mangle]
/// Return a borrowed pointer to a snapshot of every module.
///
/// The buffer is reused between calls. The returned pointer is valid until
/// the next call to this function or `tree_fire_destroy`. **DO NOT FREE THIS POINTER**.
///
/// Returns
/// - `TreeFireErrorCode::Ok` with the array in `out_array` and its length in `out_len`
/// - `TreeFireErrorCode::NullPointer` if `ptr`, `out_len` or `out_array` is null
/// - `TreeFireErrorCode::LockPoisoned` if the internal lock is poisoned
///
/// # Safety
///
/// - `ptr` must be a valid pointer returned by `tree_fire_new` or null.
/// - `out_len` and `out_array` must be valid, non-null pointers.
///
/// # Example Usage (C++)
/// ```cpp
/// uintptr_t len = 0;
/// const ModuleSnapshot* modules = nullptr;
/// if (tree_fire_get_module_states(sim, &len, &modules) == TreeFireErrorCode::Ok) {
///     for (uintptr_t i = 0; i < len; i++) {
///         SetFlame(modules[i].index, modules[i].effect_enabled);
///     }
/// }
/// ```
pub unsafe extern "C" fn tree_fire_get_module_states(
    ptr: *const TreeFireInstance,
    out_len: *mut usize,
    out_array: *mut *const ModuleSnapshot,
) -> TreeFireErrorCode {
    if out_len.is_null() {
        return track_error(&DefaultTreeFireError::null_pointer("out_len"));
    }
    if out_array.is_null() {
        unsafe {
            *out_len = 0;
        }
        return track_error(&DefaultTreeFireError::null_pointer("out_array"));
    }

    let result = handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let mut guard = lock_state(instance)?;
        let state = &mut *guard;

        state.snapshot.clear();
        let recorder = &state.recorder;
        state
            .snapshot
            .extend(state.sim.graph().iter().enumerate().map(|(index, module)| {
                let effect = recorder.effects.get(index).copied().unwrap_or(false);
                let force = recorder
                    .forces
                    .get(index)
                    .map_or([0.0; 3], |f| [f.x, f.y, f.z]);
                ModuleSnapshot::new(index, module, effect, force)
            }));

        unsafe {
            *out_len = state.snapshot.len();
            *out_array = state.snapshot.as_ptr();
        }
        Ok(())
    });

    if result != TreeFireErrorCode::Ok {
        unsafe { clear_out_array(out_len, out_array) };
    }
    result
}

#[no_mangle]
/// Return a borrowed pointer to the instance transforms uploaded by the last update.
///
/// Each module contributes 16 floats (column-major 4x4 matrix); `out_len`
/// receives the number of floats. Same lifetime rules as
/// `tree_fire_get_module_states`.
///
/// # Safety
///
/// - `ptr` must be a valid pointer returned by `tree_fire_new` or null.
/// - `out_len` and `out_array` must be valid, non-null pointers.
pub unsafe extern "C" fn tree_fire_get_instance_transforms(
    ptr: *const TreeFireInstance,
    out_len: *mut usize,
    out_array: *mut *const f32,
) -> TreeFireErrorCode {
    if out_len.is_null() {
        return track_error(&DefaultTreeFireError::null_pointer("out_len"));
    }
    if out_array.is_null() {
        unsafe {
            *out_len = 0;
        }
        return track_error(&DefaultTreeFireError::null_pointer("out_array"));
    }

    let result = handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let mut guard = lock_state(instance)?;
        let state = &mut *guard;

        state.transform_floats.clear();
        for m in &state.recorder.transforms {
            state.transform_floats.extend_from_slice(m.as_slice());
        }
        unsafe {
            *out_len = state.transform_floats.len();
            *out_array = state.transform_floats.as_ptr();
        }
        Ok(())
    });

    if result != TreeFireErrorCode::Ok {
        unsafe { clear_out_array(out_len, out_array) };
    }
    result
}

#[no_mangle]
/// Fill `out_stats` with the simulation statistics.
///
/// # Safety
///
/// - `ptr` must be a valid pointer returned by `tree_fire_new` or null.
/// - `out_stats` must be a valid, non-null pointer.
pub unsafe extern "C" fn tree_fire_get_stats(
    ptr: *const TreeFireInstance,
    out_stats: *mut TreeFireStats,
) -> TreeFireErrorCode {
    if out_stats.is_null() {
        return track_error(&DefaultTreeFireError::null_pointer("out_stats"));
    }
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let state = lock_state(instance)?;
        let stats = TreeFireStats::from(state.sim.stats());
        unsafe {
            *out_stats = stats;
        }
        Ok(())
    })
}
