//! Grid solver trait definition
//!
//! This module defines the `GridSolver` trait, the backend-agnostic interface
//! to the 3D fluid/temperature grid. The device timeline (read-back requests,
//! submits and polls) is part of the interface so a compute backend and the
//! CPU backend behave the same way towards the bridge.

use super::readback::{ReadbackStats, ReadbackTicket};
use crate::core_types::vec3::Vec3;
use std::borrow::Cow;

/// The four dense fields owned by a solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Temperature in `x`, free colour channels in `y..w`
    Temperature,
    /// Velocity in `x..z` (voxels per second)
    Velocity,
    /// Divergence scratch in `x`
    Divergence,
    /// Pressure in `x`
    Pressure,
}

/// Backend-agnostic interface to the fluid/temperature grid
pub trait GridSolver: Send + Sync {
    /// Grid resolution `[nx, ny, nz]`
    fn resolution(&self) -> [u32; 3];

    /// Add heat at the voxel containing a grid-space position
    ///
    /// # Arguments
    ///
    /// * `position` - Continuous voxel coordinate (`0..n` per axis)
    /// * `intensity` - Temperature added to that voxel
    ///
    /// # Returns
    ///
    /// `false` when the position lies outside the grid (nothing is written)
    fn inject_source(&mut self, position: &Vec3, intensity: f32) -> bool;

    /// Advance the grid by one numerical step
    ///
    /// Runs, in order: diffuse velocity, project, advect velocity, project,
    /// diffuse temperature, advect temperature.
    ///
    /// # Arguments
    ///
    /// * `dt` - Timestep in seconds
    /// * `diffusion` - Temperature diffusion coefficient
    /// * `viscosity` - Velocity diffusion coefficient
    /// * `iterations` - Relaxation passes for diffusion and pressure
    fn step(&mut self, dt: f32, diffusion: f32, viscosity: f32, iterations: u32);

    /// Apply the uniform wind bias and temperature buoyancy to the velocity field
    ///
    /// # Arguments
    ///
    /// * `direction` - Wind direction, normalized internally; zero means calm
    /// * `intensity` - Acceleration along `direction` (voxels/s²)
    /// * `dt` - Timestep in seconds
    fn simulate_wind(&mut self, direction: &Vec3, intensity: f32, dt: f32);

    /// Write `base + delta` into the temperature channel for every `(index, delta)`
    ///
    /// `base` is the value before this call. When an index appears several
    /// times the last entry wins; deltas are not accumulated.
    fn scatter_temperature(&mut self, writes: &[(usize, f32)]);

    /// Overwrite the temperature at a flat index
    fn write_temperature(&mut self, index: usize, value: f32);

    /// Temperature at a voxel, 0 when out of range
    fn sample_temperature(&self, voxel: [u32; 3]) -> f32;

    /// Temperature channel, flat index `x + y * nx + z * nx * ny`
    fn read_temperature(&self) -> Cow<'_, [f32]>;

    /// Raw four-channel view of one field
    fn read_field(&self, field: FieldKind) -> Cow<'_, [f32]>;

    /// Re-run the init step: every field back to zero
    fn clear(&mut self);

    /// Record a read-back of the temperature channel
    ///
    /// # Returns
    ///
    /// `None` after [`GridSolver::shutdown`] or when too many are outstanding
    fn submit_readback(&mut self) -> Option<ReadbackTicket>;

    /// Device submit: executes the copies for recorded read-backs
    fn flush(&mut self);

    /// Deliver completed read-backs; returns how many were delivered
    fn poll_device(&mut self) -> usize;

    /// Tear down the device timeline. Outstanding receivers disconnect.
    fn shutdown(&mut self);

    fn readback_stats(&self) -> ReadbackStats;

    /// Check if this is a GPU backend
    fn is_gpu_accelerated(&self) -> bool;
}
