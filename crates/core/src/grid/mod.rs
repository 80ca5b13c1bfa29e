//! Grid-side coupling for tree modules

pub mod module_grid_coupling;

pub use module_grid_coupling::{
    flat_index, voxel_for, world_to_grid_coordinate, GridModuleBridge, ReadbackLoopState,
    ReadbackPoll,
};
