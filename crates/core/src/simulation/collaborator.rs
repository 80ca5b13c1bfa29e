//! Render/physics collaborator interface
//!
//! The simulation never touches engine objects directly. Everything the host
//! needs to act on (forces, flame effects, instance transforms, detaching
//! destroyed segments) goes through this trait, keyed by module index.

use crate::core_types::vec3::{Mat4, Vec3};

/// Host-side consumer of per-module simulation output
pub trait ModuleCollaborator {
    /// Wind drag on a module for this tick
    fn apply_force(&mut self, module: usize, force: &Vec3);

    /// Flame effect toggled; only called on change
    fn set_visual_effect_enabled(&mut self, module: usize, enabled: bool);

    /// One transform per module, in index order, after removal
    fn upload_instance_transforms(&mut self, transforms: &[Mat4]);

    /// A destroyed module is about to be removed (index still valid)
    fn detach_module(&mut self, _module: usize) {}

    /// Indices were compacted: `remap[old] = Some(new)` or `None` if removed
    fn remap_modules(&mut self, _remap: &[Option<usize>]) {}
}

/// Collaborator that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCollaborator;

impl ModuleCollaborator for NullCollaborator {
    fn apply_force(&mut self, _module: usize, _force: &Vec3) {}

    fn set_visual_effect_enabled(&mut self, _module: usize, _enabled: bool) {}

    fn upload_instance_transforms(&mut self, _transforms: &[Mat4]) {}
}

/// Collaborator that keeps the latest per-module output in buffers
///
/// Used by hosts that poll state instead of receiving callbacks.
#[derive(Debug, Clone, Default)]
pub struct FrameRecorder {
    pub forces: Vec<Vec3>,
    pub effects: Vec<bool>,
    pub transforms: Vec<Mat4>,
    /// Modules detached during the last tick (pre-remap indices)
    pub detached: Vec<usize>,
    /// Effect toggles since the recorder was created
    pub effect_toggles: u64,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-tick data; call before each tick
    pub fn begin_frame(&mut self) {
        self.forces.iter_mut().for_each(|f| *f = Vec3::zeros());
        self.detached.clear();
    }

    fn ensure_len(&mut self, len: usize) {
        if self.forces.len() < len {
            self.forces.resize(len, Vec3::zeros());
            self.effects.resize(len, false);
        }
    }
}

impl ModuleCollaborator for FrameRecorder {
    fn apply_force(&mut self, module: usize, force: &Vec3) {
        self.ensure_len(module + 1);
        self.forces[module] = *force;
    }

    fn set_visual_effect_enabled(&mut self, module: usize, enabled: bool) {
        self.ensure_len(module + 1);
        self.effects[module] = enabled;
        self.effect_toggles += 1;
    }

    fn upload_instance_transforms(&mut self, transforms: &[Mat4]) {
        self.transforms.clear();
        self.transforms.extend_from_slice(transforms);
        self.ensure_len(transforms.len());
        self.forces.truncate(transforms.len());
        self.effects.truncate(transforms.len());
    }

    fn detach_module(&mut self, module: usize) {
        self.detached.push(module);
    }

    fn remap_modules(&mut self, remap: &[Option<usize>]) {
        let survivors = remap.iter().flatten().count();
        let mut forces = vec![Vec3::zeros(); survivors];
        let mut effects = vec![false; survivors];
        for (old, new) in remap.iter().enumerate() {
            if let Some(new) = *new {
                if let Some(f) = self.forces.get(old) {
                    forces[new] = *f;
                }
                if let Some(&e) = self.effects.get(old) {
                    effects[new] = e;
                }
            }
        }
        self.forces = forces;
        self.effects = effects;
    }
}
