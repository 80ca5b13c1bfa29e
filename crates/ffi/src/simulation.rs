use crate::helpers::{handle_ffi_result_error, instance_from_ptr, with_state_mut};
use crate::error::TreeFireErrorCode;
use crate::instance::TreeFireInstance;

/// Advance the simulation by `dt` seconds.
///
/// Collaborator output (forces, flame toggles, instance transforms) is kept
/// in the instance and read back through the query functions.
///
/// Returns
/// - `TreeFireErrorCode::InvalidParameter` if `dt` is non-finite or non-positive
/// - `TreeFireErrorCode::EmptyForest` if no module was added yet
///
/// Safety:
/// - `ptr` must be a valid pointer returned by `tree_fire_new` or null.
#[no_mangle]
pub extern "C" fn tree_fire_update(ptr: *const TreeFireInstance, dt: f32) -> TreeFireErrorCode {
    handle_ffi_result_error(|| {
        let instance = instance_from_ptr(ptr)?;
        with_state_mut(instance, |state| {
            state.recorder.begin_frame();
            state.sim.tick(dt, &mut state.recorder).map(|_| ())
        })??;
        Ok(())
    })
}
