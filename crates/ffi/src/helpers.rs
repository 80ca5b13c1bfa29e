use crate::error::{with_last_error_mut, DefaultTreeFireError, TreeFireError, TreeFireErrorCode};
use crate::instance::{InstanceState, TreeFireInstance};
use std::ffi::CString;
use std::sync::MutexGuard;

/// Set the thread-local error message and code.
/// Accepts any type implementing `TreeFireError` trait.
pub(crate) fn set_last_error(error: &impl TreeFireError) {
    with_last_error_mut(|(cstring, code)| {
        *cstring = CString::new(error.msg()).ok();
        *code = error.code();
    });
}

/// Track an error by setting it in thread-local storage and returning its code.
#[inline]
pub(crate) fn track_error(error: &impl TreeFireError) -> TreeFireErrorCode {
    set_last_error(error);
    error.code()
}

/// Record the error of a failed result, passing success through.
pub(crate) fn track_result<T>(result: Result<T, DefaultTreeFireError>) -> Result<T, TreeFireErrorCode> {
    result.map_err(|error| track_error(&error))
}

/// Clear the thread-local error message and code.
/// Called on successful operations.
pub(crate) fn clear_last_error() {
    with_last_error_mut(|(cstring, code)| {
        *cstring = None;
        *code = TreeFireErrorCode::Ok;
    });
}

/// Run `f`, translating its result into an error code and the thread-local error.
pub(crate) fn handle_ffi_result_error<F>(f: F) -> TreeFireErrorCode
where
    F: FnOnce() -> Result<(), DefaultTreeFireError>,
{
    match f() {
        Ok(()) => {
            clear_last_error();
            TreeFireErrorCode::Ok
        }
        Err(error) => track_error(&error),
    }
}

/// Borrow the instance behind a raw pointer.
pub(crate) fn instance_from_ptr<'a>(
    ptr: *const TreeFireInstance,
) -> Result<&'a TreeFireInstance, DefaultTreeFireError> {
    // SAFETY: callers pass pointers obtained from `tree_fire_new` that have not
    // been destroyed; null is rejected here.
    unsafe { ptr.as_ref() }.ok_or_else(|| DefaultTreeFireError::null_pointer("ptr"))
}

/// Lock the instance state.
pub(crate) fn lock_state(
    instance: &TreeFireInstance,
) -> Result<MutexGuard<'_, InstanceState>, DefaultTreeFireError> {
    instance
        .state
        .lock()
        .map_err(|_| DefaultTreeFireError::lock_poisoned("Mutex"))
}

/// Run `f` with exclusive access to the instance state.
pub(crate) fn with_state_mut<F, T>(instance: &TreeFireInstance, f: F) -> Result<T, DefaultTreeFireError>
where
    F: FnOnce(&mut InstanceState) -> T,
{
    let mut state = lock_state(instance)?;
    Ok(f(&mut state))
}
