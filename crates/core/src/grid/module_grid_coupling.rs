//! Coupling between tree modules and the fluid grid
//!
//! Modules write their energy deltas straight into the solver's temperature
//! field. Reading goes the other way through a shadow copy filled by the
//! solver's asynchronous read-back, so the ambient temperature a module sees
//! is always from an earlier tick.

use crate::core_types::module::Module;
use crate::core_types::vec3::{Mat4, Vec3};
use crate::solver::{GridConfig, GridSolver, ReadbackId, ReadbackTicket};
use nalgebra::Vector4;
use rayon::prelude::*;
use std::sync::mpsc::TryRecvError;
use tracing::{debug, trace, warn};

/// Homogeneous `w` below this is degenerate
const MIN_W: f32 = 1e-6;

/// Continuous grid coordinate of a world position
///
/// `world_to_local` maps the grid volume onto `[-0.5, 0.5]³`; the result is
/// shifted by 0.5 and scaled by `resolution`. `None` for a degenerate
/// projective divide.
pub fn world_to_grid_coordinate(
    world_pos: &Vec3,
    world_to_local: &Mat4,
    resolution: [u32; 3],
) -> Option<Vec3> {
    let h = world_to_local * Vector4::new(world_pos.x, world_pos.y, world_pos.z, 1.0);
    if !h.w.is_finite() || h.w.abs() < MIN_W {
        return None;
    }
    let local = h.xyz() / h.w;
    let coord = (local + Vec3::repeat(0.5)).component_mul(&Vec3::new(
        resolution[0] as f32,
        resolution[1] as f32,
        resolution[2] as f32,
    ));
    coord.iter().all(|c| c.is_finite()).then_some(coord)
}

/// Voxel holding a grid coordinate; `None` outside `[0, resolution)`
pub fn voxel_for(coord: &Vec3, resolution: [u32; 3]) -> Option<[u32; 3]> {
    let mut voxel = [0u32; 3];
    for axis in 0..3 {
        let c = coord[axis];
        if !(c >= 0.0 && c < resolution[axis] as f32) {
            return None;
        }
        voxel[axis] = c.floor() as u32;
    }
    Some(voxel)
}

/// Flat index `x + y·Nx + z·Nx·Ny`
#[inline]
pub fn flat_index(voxel: [u32; 3], resolution: [u32; 3]) -> usize {
    let [x, y, z] = voxel.map(|c| c as usize);
    let [nx, ny, _] = resolution.map(|c| c as usize);
    x + y * nx + z * nx * ny
}

/// Where the self re-arming read-back loop stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadbackLoopState {
    /// Not started yet
    Idle,
    /// Request in flight
    Waiting(ReadbackId),
    /// Teardown observed; never re-arms
    Stopped,
}

/// Result of polling the read-back loop once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadbackPoll {
    /// Nothing arrived; shadow unchanged
    Pending,
    /// Shadow refreshed from the copy taken at `submit_index`
    Updated { submit_index: u64 },
    /// Loop is not running
    Stopped,
}

/// Moves per-module data to and from the grid
pub struct GridModuleBridge {
    world_to_local: Mat4,
    resolution: [u32; 3],
    voxels: Vec<Option<usize>>,
    shadow: Vec<f32>,
    shadow_submit: Option<u64>,
    ticket: Option<ReadbackTicket>,
    state: ReadbackLoopState,
    completed: u64,
    writes: Vec<(usize, f32)>,
}

impl GridModuleBridge {
    pub fn new(config: &GridConfig) -> Self {
        Self {
            world_to_local: config.world_to_local,
            resolution: config.resolution,
            voxels: Vec::new(),
            shadow: Vec::new(),
            shadow_submit: None,
            ticket: None,
            state: ReadbackLoopState::Idle,
            completed: 0,
            writes: Vec::new(),
        }
    }

    pub fn resolution(&self) -> [u32; 3] {
        self.resolution
    }

    pub fn world_to_local(&self) -> &Mat4 {
        &self.world_to_local
    }

    /// Voxel containing a world position, if it lies inside the grid
    pub fn world_to_voxel(&self, world_pos: &Vec3) -> Option<[u32; 3]> {
        world_to_grid_coordinate(world_pos, &self.world_to_local, self.resolution)
            .and_then(|c| voxel_for(&c, self.resolution))
    }

    /// Recompute every module's voxel
    ///
    /// # Returns
    ///
    /// Number of modules outside the grid
    pub fn update_module_coordinates(&mut self, modules: &[Module]) -> usize {
        let world_to_local = self.world_to_local;
        let resolution = self.resolution;
        modules
            .par_iter()
            .map(|m| {
                world_to_grid_coordinate(m.position(), &world_to_local, resolution)
                    .and_then(|c| voxel_for(&c, resolution))
                    .map(|v| flat_index(v, resolution))
            })
            .collect_into_vec(&mut self.voxels);
        self.voxels.iter().filter(|v| v.is_none()).count()
    }

    /// Flat voxel index of module `index` from the last coordinate update
    pub fn module_voxel(&self, index: usize) -> Option<usize> {
        self.voxels.get(index).copied().flatten()
    }

    /// Add each module's delta at its voxel
    ///
    /// Several modules sharing a voxel: the highest index wins and the other
    /// deltas are dropped. Modules outside the grid are skipped.
    pub fn scatter_module_energy_to_grid(&mut self, deltas: &[f32], solver: &mut dyn GridSolver) {
        self.writes.clear();
        self.writes.extend(
            deltas
                .iter()
                .zip(&self.voxels)
                .filter_map(|(&delta, voxel)| match voxel {
                    Some(v) if delta.is_finite() => Some((*v, delta)),
                    _ => None,
                }),
        );
        solver.scatter_temperature(&self.writes);
    }

    /// Ambient temperature per module from the shadow copy
    ///
    /// Zero before the first read-back completes and for modules outside the
    /// grid.
    pub fn gather_grid_temperature_for_modules(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.voxels.iter().map(|voxel| {
            voxel
                .and_then(|v| self.shadow.get(v).copied())
                .unwrap_or(0.0)
        }));
    }

    /// Shadow value at a flat index, 0 when absent
    pub fn shadow_temperature(&self, index: usize) -> f32 {
        self.shadow.get(index).copied().unwrap_or(0.0)
    }

    /// Device submit the shadow was copied at
    pub fn shadow_submit_index(&self) -> Option<u64> {
        self.shadow_submit
    }

    /// Start the read-back loop
    ///
    /// # Returns
    ///
    /// `false` when the solver refuses the request (already shut down)
    pub fn arm(&mut self, solver: &mut dyn GridSolver) -> bool {
        if self.state == ReadbackLoopState::Stopped {
            return false;
        }
        if matches!(self.state, ReadbackLoopState::Waiting(_)) {
            return true;
        }
        self.request(solver)
    }

    fn request(&mut self, solver: &mut dyn GridSolver) -> bool {
        match solver.submit_readback() {
            Some(ticket) => {
                trace!("Read-back {} armed", ticket.id.raw());
                self.state = ReadbackLoopState::Waiting(ticket.id);
                self.ticket = Some(ticket);
                true
            }
            None => {
                warn!("Solver refused a read-back request; stopping read-back loop");
                self.stop();
                false
            }
        }
    }

    /// Consume a completed read-back if one arrived, then re-arm
    pub fn process_readback(&mut self, solver: &mut dyn GridSolver) -> ReadbackPoll {
        let Some(ticket) = self.ticket.as_ref() else {
            return ReadbackPoll::Stopped;
        };
        match ticket.receiver.try_recv() {
            Ok(payload) => {
                let updated = payload.resolution == self.resolution;
                if updated {
                    self.shadow = payload.temperature;
                    self.shadow_submit = Some(payload.submit_index);
                    self.completed += 1;
                } else {
                    warn!(
                        "Discarding read-back for resolution {:?} (grid is {:?})",
                        payload.resolution, self.resolution
                    );
                }
                self.ticket = None;
                if !self.request(solver) {
                    return ReadbackPoll::Stopped;
                }
                if updated {
                    ReadbackPoll::Updated {
                        submit_index: payload.submit_index,
                    }
                } else {
                    ReadbackPoll::Pending
                }
            }
            Err(TryRecvError::Empty) => ReadbackPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                debug!("Read-back channel closed; stopping read-back loop");
                self.stop();
                ReadbackPoll::Stopped
            }
        }
    }

    /// Drop the in-flight request and never re-arm
    pub fn stop(&mut self) {
        self.ticket = None;
        self.state = ReadbackLoopState::Stopped;
    }

    pub fn readback_state(&self) -> ReadbackLoopState {
        self.state
    }

    pub fn completed_readbacks(&self) -> u64 {
        self.completed
    }

    /// Follow an index compaction of the module array
    pub fn remap(&mut self, remap: &[Option<usize>]) {
        let survivors = remap.iter().flatten().count();
        let mut voxels = vec![None; survivors];
        for (old, new) in remap.iter().enumerate() {
            if let (Some(new), Some(voxel)) = (*new, self.voxels.get(old)) {
                voxels[new] = *voxel;
            }
        }
        self.voxels = voxels;
    }
}

impl std::fmt::Debug for GridModuleBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridModuleBridge")
            .field("resolution", &self.resolution)
            .field("modules", &self.voxels.len())
            .field("state", &self.state)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}
