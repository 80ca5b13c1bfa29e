//! C ABI for the tree fire simulation.
//!
//! Every entry point returns a [`TreeFireErrorCode`]; the matching message is
//! kept per thread and read with `tree_fire_get_last_error`. Instances are
//! opaque pointers created by `tree_fire_new` and freed by `tree_fire_destroy`.

mod error;
mod helpers;
mod instance;
mod modules;
mod queries;
mod simulation;

pub use error::{tree_fire_get_last_error, tree_fire_get_last_error_code, TreeFireErrorCode};
pub use instance::{
    tree_fire_default_config, tree_fire_destroy, tree_fire_new, TreeFireConfig, TreeFireInstance,
};
pub use modules::{
    tree_fire_add_module, tree_fire_heat_at, tree_fire_ignite, tree_fire_inject_heat,
    tree_fire_set_wind, TreeFireModuleDesc,
};
pub use queries::{
    tree_fire_get_instance_transforms, tree_fire_get_module_states, tree_fire_get_stats,
    ModuleSnapshot, TreeFireStats,
};
pub use simulation::tree_fire_update;
