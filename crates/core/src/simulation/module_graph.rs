//! Arena of tree modules with index-based parent links
//!
//! Indices stay stable for the whole tick. Destruction is two-phase: the
//! cascade marks modules as burned, and `remove_burned` compacts the arena
//! at the end of the tick, returning the index remap.

use crate::core_types::error::ConfigError;
use crate::core_types::module::{CombustionState, Module, ModuleConfig, ModuleDesc};
use crate::core_types::vec3::{normalize_or, Mat4, Vec3, UP};
use nalgebra::{UnitQuaternion, Vector3};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use tracing::{debug, trace};

/// Result of compacting the arena
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovalReport {
    /// Old indices that were removed, ascending
    pub removed: Vec<usize>,
    /// `remap[old] = Some(new)` for survivors, `None` for removed modules
    pub remap: Vec<Option<usize>>,
}

/// Population counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleGraphStats {
    pub total: usize,
    pub intact: usize,
    pub burning: usize,
    pub isolated_by_coal: usize,
    pub burned: usize,
    pub total_mass: f32,
}

/// Dense, order-stable module arena
#[derive(Debug, Clone)]
pub struct ModuleGraph {
    modules: Vec<Module>,
    config: ModuleConfig,
}

impl ModuleGraph {
    /// # Errors
    ///
    /// Propagates [`ModuleConfig::validate`] failures.
    pub fn new(config: ModuleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            modules: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Register a module and link it under its parent
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownParent`] if the parent index is not registered yet
    /// - [`ConfigError::InvalidParameter`] for non-positive dimensions or a
    ///   non-finite position/temperature
    pub fn add_module(&mut self, desc: &ModuleDesc) -> Result<usize, ConfigError> {
        let index = self.modules.len();
        if let Some(parent) = desc.parent {
            if parent >= index {
                return Err(ConfigError::UnknownParent {
                    module: index,
                    parent,
                });
            }
        }
        if !(desc.radius.is_finite() && *desc.radius > 0.0) {
            return Err(ConfigError::invalid("radius", "must be finite and > 0"));
        }
        if !(desc.height.is_finite() && *desc.height > 0.0) {
            return Err(ConfigError::invalid("height", "must be finite and > 0"));
        }
        if !desc.position.iter().all(|c| c.is_finite()) || !desc.temperature.is_finite() {
            return Err(ConfigError::invalid(
                "position",
                "position and temperature must be finite",
            ));
        }

        self.modules.push(Module::new(desc, &self.config));
        if let Some(parent) = desc.parent {
            self.modules[parent].children.push(index);
        }
        trace!("Module {} registered (parent {:?})", index, desc.parent);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Module> {
        self.modules.get(index)
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    /// Split borrow for the stepper: modules mutable, config shared
    pub(crate) fn parts_mut(&mut self) -> (&mut [Module], &ModuleConfig) {
        (&mut self.modules, &self.config)
    }

    pub fn combustion_state(&self, index: usize) -> Option<CombustionState> {
        self.modules.get(index).map(Module::state)
    }

    /// Raise a module to at least `temperature`
    ///
    /// # Returns
    ///
    /// `false` for unknown or burned modules
    pub fn ignite(&mut self, index: usize, temperature: f32) -> bool {
        match self.modules.get_mut(index) {
            Some(m) if !m.is_burned && temperature.is_finite() => {
                m.temperature = m.temperature.max(temperature);
                true
            }
            _ => false,
        }
    }

    /// Add `amount` to a module's temperature
    pub fn heat(&mut self, index: usize, amount: f32) -> bool {
        match self.modules.get_mut(index) {
            Some(m) if !m.is_burned && amount.is_finite() => {
                m.temperature += amount;
                true
            }
            _ => false,
        }
    }

    /// Move a module (physics collaborator feedback)
    pub fn set_position(&mut self, index: usize, position: Vec3) -> bool {
        match self.modules.get_mut(index) {
            Some(m) if position.iter().all(|c| c.is_finite()) => {
                m.position = position;
                true
            }
            _ => false,
        }
    }

    /// Mark `roots` and every descendant as burned
    ///
    /// Walks children with an explicit stack. Trunk modules are never marked.
    /// A child whose parent link does not point back at the module being
    /// visited is an inconsistent branch and is not descended into.
    ///
    /// # Returns
    ///
    /// Newly marked indices, ascending
    pub fn mark_destroyed_cascade(&mut self, roots: &[usize]) -> Vec<usize> {
        let len = self.modules.len();
        let mut marked: FxHashSet<usize> = FxHashSet::default();
        let mut stack: Vec<usize> = roots
            .iter()
            .copied()
            .filter(|&r| r < len && !self.modules[r].is_trunk)
            .collect();

        while let Some(index) = stack.pop() {
            if self.modules[index].is_burned || !marked.insert(index) {
                continue;
            }
            let module = &mut self.modules[index];
            module.is_burned = true;
            module.is_burning = false;
            module.state = CombustionState::Destroyed;

            for &child in &self.modules[index].children {
                let Some(c) = self.modules.get(child) else {
                    continue;
                };
                if c.parent == Some(index) && !c.is_trunk {
                    stack.push(child);
                }
            }
        }

        let mut marked: Vec<usize> = marked.into_iter().collect();
        marked.sort_unstable();
        if !marked.is_empty() {
            debug!("Cascade marked {} module(s) burned", marked.len());
        }
        marked
    }

    /// Drop every burned module and compact the arena
    pub fn remove_burned(&mut self) -> RemovalReport {
        if !self.modules.iter().any(|m| m.is_burned) {
            return RemovalReport {
                removed: Vec::new(),
                remap: (0..self.modules.len()).map(Some).collect(),
            };
        }

        let mut remap = Vec::with_capacity(self.modules.len());
        let mut removed = Vec::new();
        let mut next = 0;
        for (old, module) in self.modules.iter().enumerate() {
            if module.is_burned {
                remap.push(None);
                removed.push(old);
            } else {
                remap.push(Some(next));
                next += 1;
            }
        }

        self.modules.retain(|m| !m.is_burned);
        for module in &mut self.modules {
            module.parent = module.parent.and_then(|p| remap.get(p).copied().flatten());
            module.children = module
                .children
                .iter()
                .filter_map(|&c| remap.get(c).copied().flatten())
                .collect();
        }

        debug!(
            "Removed {} burned module(s), {} remain",
            removed.len(),
            self.modules.len()
        );
        RemovalReport { removed, remap }
    }

    /// Render transform per module: translate, orient along the parent link,
    /// scale by `(radius, height, radius)`
    pub fn instance_transforms(&self, out: &mut Vec<Mat4>) {
        let modules = &self.modules;
        modules
            .par_iter()
            .map(|m| {
                let axis = match m.parent.and_then(|p| modules.get(p)) {
                    Some(parent) => normalize_or(&(m.position - parent.position), UP),
                    None => UP,
                };
                let rotation = UnitQuaternion::rotation_between(&UP, &axis)
                    .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI));
                let r = m.radius();
                Mat4::new_translation(&m.position)
                    * rotation.to_homogeneous()
                    * Mat4::new_nonuniform_scaling(&Vec3::new(r, m.height, r))
            })
            .collect_into_vec(out);
    }

    pub fn stats(&self) -> ModuleGraphStats {
        let mut stats = ModuleGraphStats {
            total: self.modules.len(),
            ..ModuleGraphStats::default()
        };
        for m in &self.modules {
            if m.is_burned {
                stats.burned += 1;
            } else if m.is_burning {
                stats.burning += 1;
            } else if m.is_isolated_by_coal {
                stats.isolated_by_coal += 1;
            } else {
                stats.intact += 1;
            }
            stats.total_mass += m.mass;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chain(len: usize) -> ModuleGraph {
        let mut graph = ModuleGraph::new(ModuleConfig::default()).unwrap();
        graph
            .add_module(&ModuleDesc::trunk(Vec3::zeros(), 0.3, 1.0))
            .unwrap();
        for i in 1..len {
            graph
                .add_module(&ModuleDesc::branch(
                    Vec3::new(0.0, i as f32, 0.0),
                    0.1,
                    1.0,
                    i - 1,
                ))
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut graph = ModuleGraph::new(ModuleConfig::default()).unwrap();
        let err = graph
            .add_module(&ModuleDesc::branch(Vec3::zeros(), 0.1, 1.0, 0))
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownParent { module: 0, parent: 0 });
    }

    #[test]
    fn test_bad_dimensions_rejected() {
        let mut graph = ModuleGraph::new(ModuleConfig::default()).unwrap();
        let err = graph
            .add_module(&ModuleDesc::trunk(Vec3::zeros(), -0.1, 1.0))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "radius", .. }));

        let err = graph
            .add_module(&ModuleDesc::trunk(Vec3::zeros(), 0.1, f32::NAN))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "height", .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_cascade_handles_deep_chain() {
        const LEN: usize = 100_000;
        let mut graph = chain(LEN);
        let marked = graph.mark_destroyed_cascade(&[1]);
        assert_eq!(marked.len(), LEN - 1);
        assert_eq!(marked.first(), Some(&1));
        assert_eq!(marked.last(), Some(&(LEN - 1)));

        let removal = graph.remove_burned();
        assert_eq!(removal.removed.len(), LEN - 1);
        assert_eq!(graph.len(), 1);
        assert!(graph.get(0).unwrap().children().is_empty());
    }

    #[test]
    fn test_children_are_linked() {
        let graph = chain(3);
        assert_eq!(graph.get(0).unwrap().children(), &[1]);
        assert_eq!(graph.get(1).unwrap().children(), &[2]);
        assert_eq!(graph.get(2).unwrap().parent(), Some(1));
    }

    #[test]
    fn test_cascade_marks_descendants_only() {
        // A <- B <- C <- D
        let mut graph = chain(4);
        let marked = graph.mark_destroyed_cascade(&[1]);
        assert_eq!(marked, vec![1, 2, 3]);
        assert!(!graph.get(0).unwrap().is_burned());
        for i in 1..4 {
            assert!(graph.get(i).unwrap().is_burned());
            assert_eq!(graph.combustion_state(i), Some(CombustionState::Destroyed));
        }
    }

    #[test]
    fn test_cascade_never_marks_trunk() {
        let mut graph = chain(2);
        assert!(graph.mark_destroyed_cascade(&[0]).is_empty());
        assert!(!graph.get(0).unwrap().is_burned());
    }

    #[test]
    fn test_cascade_stops_at_inconsistent_link() {
        let mut graph = chain(4);
        // Corrupt C's parent pointer: D must survive, C is reached via B's child list
        graph.modules[2].parent = Some(0);
        let marked = graph.mark_destroyed_cascade(&[1]);
        assert_eq!(marked, vec![1]);
        assert!(!graph.get(3).unwrap().is_burned());
    }

    #[test]
    fn test_cascade_on_branching_tree() {
        let mut graph = chain(2);
        let b = graph
            .add_module(&ModuleDesc::branch(Vec3::new(1.0, 1.0, 0.0), 0.1, 1.0, 1))
            .unwrap();
        let c = graph
            .add_module(&ModuleDesc::branch(Vec3::new(-1.0, 1.0, 0.0), 0.1, 1.0, 1))
            .unwrap();
        let marked = graph.mark_destroyed_cascade(&[1, b]);
        assert_eq!(marked, vec![1, b, c]);
    }

    #[test]
    fn test_remove_burned_compacts_and_remaps() {
        let mut graph = chain(3);
        let side = graph
            .add_module(&ModuleDesc::branch(Vec3::new(1.0, 0.0, 0.0), 0.1, 1.0, 0))
            .unwrap();
        graph.mark_destroyed_cascade(&[1]);
        let report = graph.remove_burned();

        assert_eq!(report.removed, vec![1, 2]);
        assert_eq!(report.remap, vec![Some(0), None, None, Some(1)]);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get(0).unwrap().children(), &[1]);
        assert_eq!(graph.get(1).unwrap().parent(), Some(0));
        assert_eq!(side, 3);
    }

    #[test]
    fn test_remove_without_burned_is_identity() {
        let mut graph = chain(3);
        let report = graph.remove_burned();
        assert!(report.removed.is_empty());
        assert_eq!(report.remap, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_ignite_and_heat() {
        let mut graph = chain(2);
        assert!(graph.ignite(1, 0.6));
        assert!(graph.ignite(1, 0.2));
        assert_eq!(graph.get(1).unwrap().temperature(), 0.6);
        assert!(graph.heat(1, 0.1));
        assert_relative_eq!(graph.get(1).unwrap().temperature(), 0.7, epsilon = 1e-6);
        assert!(!graph.ignite(9, 1.0));
    }

    #[test]
    fn test_instance_transforms_follow_parent_axis() {
        let mut graph = chain(1);
        graph
            .add_module(&ModuleDesc::branch(Vec3::new(2.0, 0.0, 0.0), 0.1, 1.0, 0))
            .unwrap();
        let mut transforms = Vec::new();
        graph.instance_transforms(&mut transforms);
        assert_eq!(transforms.len(), 2);

        // Trunk: no rotation, translation at origin
        assert_relative_eq!(transforms[0][(1, 1)], 1.0, epsilon = 1e-5);
        // Branch lies along +x: local y axis maps to world x
        let y_axis = transforms[1].fixed_view::<3, 1>(0, 1).into_owned();
        assert_relative_eq!(y_axis.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(transforms[1][(0, 3)], 2.0, epsilon = 1e-6);
        assert!(transforms.iter().all(|m| m.iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_stats() {
        let mut graph = chain(3);
        graph.mark_destroyed_cascade(&[2]);
        let stats = graph.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.burned, 1);
        assert_eq!(stats.intact, 2);
        assert!(stats.total_mass > 0.0);
    }
}
