//! 3D fluid/temperature grid solver
//!
//! The core abstraction is the `GridSolver` trait: a dense 3D grid of
//! temperature and velocity advanced with a stable-fluids step (diffuse,
//! project, advect). The trait also carries the device timeline used for
//! asynchronous read-back, so backends that live on a compute device and the
//! CPU backend present the same latency to callers.
//!
//! # Example
//!
//! ```rust
//! use tree_fire_core::solver::{create_grid_solver, GridConfig, GridSolver};
//!
//! let solver = create_grid_solver(&GridConfig::default()).unwrap();
//! assert_eq!(solver.resolution(), [32, 32, 32]);
//! ```

mod config;
mod cpu;
mod fields;
mod kernels;
pub mod profiler;
mod quality;
mod readback;
#[allow(clippy::module_name_repetitions)]
mod r#trait;

// Re-exports
pub use config::{GridConfig, WindConfig, DISPATCH_BLOCK_SIZE};
pub use cpu::CpuGridSolver;
pub use fields::{GridDims, GridField, GridTexel};
pub use profiler::{FrameTimer, ProfilerScope};
pub use quality::GridQuality;
pub use r#trait::{FieldKind, GridSolver};
pub use readback::{ReadbackId, ReadbackPayload, ReadbackQueue, ReadbackStats, ReadbackTicket};

use crate::core_types::error::ConfigError;
use tracing::info;

/// Create a grid solver for `config`
///
/// Only the CPU backend ships in this crate; the selection point stays so a
/// compute backend can slot in behind the same trait.
///
/// # Arguments
///
/// * `config` - Grid configuration (validated here)
///
/// # Returns
///
/// A boxed `GridSolver` trait object
///
/// # Errors
///
/// Returns the [`ConfigError`] from [`GridConfig::validate`].
pub fn create_grid_solver(config: &GridConfig) -> Result<Box<dyn GridSolver>, ConfigError> {
    let solver = CpuGridSolver::new(config)?;
    let [nx, ny, nz] = config.resolution;
    info!(
        "Using CPU grid backend ({}x{}x{}, {} rayon threads)",
        nx,
        ny,
        nz,
        rayon::current_num_threads()
    );
    Ok(Box::new(solver))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_grid_solver_validates() {
        let bad = GridConfig {
            resolution: [7, 8, 8],
            ..GridConfig::default()
        };
        assert!(create_grid_solver(&bad).is_err());

        let solver = create_grid_solver(&GridConfig::default()).unwrap();
        assert!(!solver.is_gpu_accelerated());
        assert_eq!(solver.read_temperature().len(), 32 * 32 * 32);
    }
}
