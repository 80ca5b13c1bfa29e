use tree_fire_core::{Meters, ModuleDesc, Vec3, WindConfig};

use crate::error::{DefaultTreeFireError, TreeFireErrorCode};
use crate::helpers::{handle_ffi_result_error, instance_from_ptr, track_error, with_state_mut};
use crate::instance::TreeFireInstance;

/// C-compatible module descriptor.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeFireModuleDesc {
    /// Segment centre in world space.
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Initial radius (m).
    pub radius: f32,
    /// Segment length (m), fixed for the module's life.
    pub height: f32,
    /// Parent module index, or -1 for none.
    pub parent: i64,
    /// Trunk modules are roots and never destroyed automatically.
    pub is_trunk: bool,
    /// Initial normalized temperature.
    pub temperature: f32,
}

impl TreeFireModuleDesc {
    fn to_desc(self) -> Result<ModuleDesc, DefaultTreeFireError> {
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(DefaultTreeFireError::invalid_parameter(format!(
                "radius must be finite and non-negative, got {}",
                self.radius
            )));
        }
        if !(self.height.is_finite() && self.height >= 0.0) {
            return Err(DefaultTreeFireError::invalid_parameter(format!(
                "height must be finite and non-negative, got {}",
                self.height
            )));
        }
        let parent = match self.parent {
            p if p < 0 => None,
            p => Some(usize::try_from(p).map_err(|_| {
                DefaultTreeFireError::invalid_parameter(format!("parent index {p} out of range"))
            })?),
        };
        Ok(ModuleDesc {
            position: Vec3::new(self.x, self.y, self.z),
            radius: Meters::from(self.radius),
            height: Meters::from(self.height),
            parent,
            is_trunk: self.is_trunk,
            temperature: self.temperature,
        })
    }
}

/// Register a module.
///
/// Parents must be registered before their children.
///
/// Returns
/// - `TreeFireErrorCode::Ok` with the new index in `out_index`
/// - `TreeFireErrorCode::UnknownParent` if `parent` does not exist yet
/// - `TreeFireErrorCode::InvalidParameter` for non-finite geometry
///
/// # Safety
///
/// - `ptr` must be a valid pointer returned by `tree_fire_new` or null.
/// - `out_index` must be null or point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn tree_fire_add_module(
    ptr: *const TreeFireInstance,
    desc: TreeFireModuleDesc,
    out_index: *mut usize,
) -> TreeFireErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let desc = desc.to_desc()?;
        let index = with_state_mut(instance, |state| state.sim.add_module(&desc))??;
        if !out_index.is_null() {
            unsafe {
                *out_index = index;
            }
        }
        Ok(())
    })
}

/// Raise a module to at least `temperature`.
///
/// Returns `TreeFireErrorCode::InvalidModule` for unknown or burned modules.
#[no_mangle]
pub extern "C" fn tree_fire_ignite(
    ptr: *const TreeFireInstance,
    module: usize,
    temperature: f32,
) -> TreeFireErrorCode {
    if !temperature.is_finite() {
        return track_error(&DefaultTreeFireError::invalid_parameter(format!(
            "temperature must be finite, got {temperature}"
        )));
    }
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        if with_state_mut(instance, |state| state.sim.ignite(module, temperature))? {
            Ok(())
        } else {
            Err(DefaultTreeFireError::invalid_module(module))
        }
    })
}

/// Add `amount` to every module within `radius` of a world position (x/z plane).
///
/// `out_count` (optional) receives the number of modules heated.
///
/// # Safety
///
/// - `ptr` must be a valid pointer returned by `tree_fire_new` or null.
/// - `out_count` must be null or point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn tree_fire_heat_at(
    ptr: *const TreeFireInstance,
    x: f32,
    y: f32,
    z: f32,
    radius: f32,
    amount: f32,
    out_count: *mut usize,
) -> TreeFireErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let count = with_state_mut(instance, |state| {
            state.sim.heat_at(&Vec3::new(x, y, z), radius, amount)
        })?;
        if !out_count.is_null() {
            unsafe {
                *out_count = count;
            }
        }
        Ok(())
    })
}

/// Add heat to the grid voxel at a world position.
///
/// Returns `TreeFireErrorCode::InvalidParameter` when the position lies
/// outside the grid volume or `intensity` is not finite.
#[no_mangle]
pub extern "C" fn tree_fire_inject_heat(
    ptr: *const TreeFireInstance,
    x: f32,
    y: f32,
    z: f32,
    intensity: f32,
) -> TreeFireErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let position = Vec3::new(x, y, z);
        if with_state_mut(instance, |state| state.sim.inject_heat(&position, intensity))? {
            Ok(())
        } else {
            Err(DefaultTreeFireError::invalid_parameter(format!(
                "cannot inject {intensity} at ({x}, {y}, {z})"
            )))
        }
    })
}

/// Replace the wind. The previous wind stays on error.
#[no_mangle]
pub extern "C" fn tree_fire_set_wind(
    ptr: *const TreeFireInstance,
    x: f32,
    y: f32,
    z: f32,
    intensity: f32,
) -> TreeFireErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        let wind = WindConfig {
            direction: Vec3::new(x, y, z),
            intensity,
        };
        with_state_mut(instance, |state| state.sim.set_wind(wind))??;
        Ok(())
    })
}
