use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;
use tree_fire_core::ConfigError;

/// Common interface for FFI error types.
///
/// # Design
/// - `code()` - Returns the error code to be passed across FFI boundary
/// - `msg()` - Returns the error message for diagnostic purposes
pub(crate) trait TreeFireError {
    /// Returns the error code to be returned across the FFI boundary.
    fn code(&self) -> TreeFireErrorCode;

    /// Returns the human-readable error message.
    fn msg(&self) -> &str;
}

/// Default implementation of `TreeFireError` for the FFI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultTreeFireError {
    code: TreeFireErrorCode,
    msg: String,
}

impl DefaultTreeFireError {
    /// Create error for null pointer passed where non-null required.
    ///
    /// # Arguments
    /// * `param_name` - The name of the parameter that was null (e.g., `"out_instance"`, `"ptr"`)
    pub fn null_pointer(param_name: &str) -> Self {
        Self {
            code: TreeFireErrorCode::NullPointer,
            msg: format!("Parameter '{param_name}' cannot be null"),
        }
    }

    /// Create error for poisoned lock.
    pub fn lock_poisoned(lock_name: &str) -> Self {
        Self {
            code: TreeFireErrorCode::LockPoisoned,
            msg: format!("Lock '{lock_name}' was poisoned by a panic in another thread"),
        }
    }

    /// Create error for an invalid parameter.
    pub fn invalid_parameter(message: String) -> Self {
        Self {
            code: TreeFireErrorCode::InvalidParameter,
            msg: message,
        }
    }

    /// Create error for a module index that does not exist (or is burned).
    pub fn invalid_module(index: usize) -> Self {
        Self {
            code: TreeFireErrorCode::InvalidModule,
            msg: format!("Module {index} does not exist or has burned"),
        }
    }
}

impl From<ConfigError> for DefaultTreeFireError {
    fn from(error: ConfigError) -> Self {
        let code = match error {
            ConfigError::InvalidResolution { .. } => TreeFireErrorCode::InvalidResolution,
            ConfigError::InvalidParameter { .. } => TreeFireErrorCode::InvalidParameter,
            ConfigError::EmptyForest => TreeFireErrorCode::EmptyForest,
            ConfigError::UnknownParent { .. } => TreeFireErrorCode::UnknownParent,
        };
        Self {
            code,
            msg: error.to_string(),
        }
    }
}

impl TreeFireError for DefaultTreeFireError {
    fn code(&self) -> TreeFireErrorCode {
        self.code
    }

    fn msg(&self) -> &str {
        &self.msg
    }
}

/// FFI error codes returned by tree fire functions.
/// Follows standard C convention: 0 = success, non-zero = error.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFireErrorCode {
    /// Operation completed successfully.
    Ok = 0,

    /// Invalid pointer: null pointer passed where non-null required.
    NullPointer = 1,

    /// Lock poisoned: internal synchronization primitive was poisoned by a panic.
    LockPoisoned = 2,

    /// A grid axis is not a positive multiple of 8.
    InvalidResolution = 3,

    /// Invalid parameter passed to function.
    InvalidParameter = 4,

    /// The simulation was updated before any module was added.
    EmptyForest = 5,

    /// A module referenced a parent that does not exist.
    UnknownParent = 6,

    /// A module index is out of range or refers to a burned module.
    InvalidModule = 7,
}

impl From<DefaultTreeFireError> for TreeFireErrorCode {
    fn from(error: DefaultTreeFireError) -> Self {
        error.code
    }
}

thread_local! {
    /// Thread-local storage for the most recent FFI error (C string, error code).
    /// The CString is stored so the pointer handed out stays valid.
    static LAST_ERROR: RefCell<(Option<CString>, TreeFireErrorCode)> = const { RefCell::new((None, TreeFireErrorCode::Ok)) };
}

/// Internal helper to read `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error<F, R>(f: F) -> R
where
    F: FnOnce(&(Option<CString>, TreeFireErrorCode)) -> R,
{
    LAST_ERROR.with_borrow(f)
}

/// Internal helper to mutate `LAST_ERROR` thread-local storage (cstring, code).
pub(crate) fn with_last_error_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut (Option<CString>, TreeFireErrorCode)) -> R,
{
    LAST_ERROR.with_borrow_mut(f)
}

/// Retrieve the most recent FFI error message as a null-terminated C string.
///
/// Returns:
/// - A borrowed pointer to the error message if an error occurred.
/// - `null` if no error has occurred or the message cannot be converted to a C string.
///
/// # Thread Safety
/// Error messages are stored per-thread, so each thread has its own error state.
///
/// # Lifetime
/// The returned pointer is valid until the next FFI call on this thread that
/// sets or clears the error. **DO NOT FREE THIS POINTER**.
///
/// Example:
/// ```cpp
/// TreeFireInstance* sim = nullptr;
/// TreeFireErrorCode err = tree_fire_new(tree_fire_default_config(), &sim);
/// if (err != TreeFireErrorCode::Ok) {
///     const char* error = tree_fire_get_last_error();
///     if (error) {
///         printf("Tree fire creation failed: %s\n", error);
///     }
/// }
/// ```
#[no_mangle]
pub extern "C" fn tree_fire_get_last_error() -> *const c_char {
    with_last_error(|(cstring, _code)| cstring.as_ref().map_or(ptr::null(), |cs| cs.as_ptr()))
}

/// Retrieve the most recent FFI error code.
///
/// Returns `TreeFireErrorCode::Ok` (0) if no error has occurred, otherwise
/// the code from the last failed operation on this thread.
#[no_mangle]
pub extern "C" fn tree_fire_get_last_error_code() -> TreeFireErrorCode {
    with_last_error(|(_cstring, code)| *code)
}
