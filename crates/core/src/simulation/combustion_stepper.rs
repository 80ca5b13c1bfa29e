//! Per-tick combustion of the module graph
//!
//! Modules are visited in reverse index order. Children always have a higher
//! index than their parent, so a parent sees its children's diffusion before
//! it burns in the same pass.

use super::collaborator::ModuleCollaborator;
use super::module_graph::ModuleGraph;
use crate::core_types::module::{CombustionState, Module, ModuleConfig};
use crate::core_types::vec3::Vec3;
use crate::physics::aerodynamics::drag_force;
use crate::physics::combustion_physics::{
    ambient_exchange, mass_loss, parent_diffusion, reaction_rate, released_energy,
};
use crate::solver::WindConfig;
use tracing::trace;

/// Outcome of one stepper pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// Modules reacting after the pass
    pub burning: usize,
    /// Modules that reached the mass floor this pass
    pub exhausted: Vec<usize>,
    /// Modules marked burned by the cascade, ascending
    pub destroyed: Vec<usize>,
    /// Sum of energy added to the grid by burning
    pub energy_released: f32,
    /// Mass consumed this pass
    pub mass_consumed: f32,
}

/// Drives the combustion state machine of every module
#[derive(Debug, Default)]
pub struct CombustionStepper {
    destroy_queue: Vec<usize>,
}

impl CombustionStepper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance every module by one tick
    ///
    /// `ambient[i]` is the grid temperature around module `i` from a previous
    /// tick; missing or non-finite entries count as 0. `deltas` is resized to
    /// the module count and receives the energy each module hands to the grid.
    pub fn step(
        &mut self,
        graph: &mut ModuleGraph,
        ambient: &[f32],
        wind: &WindConfig,
        dt: f32,
        deltas: &mut Vec<f32>,
        collaborator: &mut dyn ModuleCollaborator,
    ) -> StepReport {
        let mut report = StepReport::default();
        self.destroy_queue.clear();

        let (modules, config) = graph.parts_mut();
        deltas.clear();
        deltas.resize(modules.len(), 0.0);

        for index in (0..modules.len()).rev() {
            if modules[index].is_burned {
                continue;
            }

            let area = modules[index].surface_area();
            let force = drag_force(*config.air_density, &wind.direction, wind.intensity, area);
            if force != Vec3::zeros() {
                collaborator.apply_force(index, &force);
            }

            if let Some(parent) = modules[index].parent.filter(|&p| p < index) {
                let (head, tail) = modules.split_at_mut(index);
                let child = &mut tail[0];
                let parent = &mut head[parent];
                if !parent.is_burned {
                    let d = parent_diffusion(
                        child.temperature,
                        parent.temperature,
                        config.module_diffusion_factor,
                        dt,
                    );
                    child.temperature += d;
                    parent.temperature -= d;
                }
            }

            let module = &mut modules[index];
            if module.combustion_active() {
                burn(module, index, config, &mut deltas[index], &mut report, collaborator);
            }

            let ambient_t = ambient
                .get(index)
                .copied()
                .filter(|t| t.is_finite())
                .unwrap_or(0.0);
            let change = ambient_exchange(
                module.temperature,
                ambient_t,
                config.air_transfer_factor,
                config.module_transfer_factor,
            );
            module.temperature += change;
            deltas[index] -= change;

            if module.state == CombustionState::Exhausted && !module.is_trunk {
                self.destroy_queue.push(index);
            }
        }

        report.destroyed = graph.mark_destroyed_cascade(&self.destroy_queue);
        report.burning = graph.iter().filter(|m| m.is_burning).count();
        report
    }
}

fn burn(
    module: &mut Module,
    index: usize,
    config: &ModuleConfig,
    delta: &mut f32,
    report: &mut StepReport,
    collaborator: &mut dyn ModuleCollaborator,
) {
    let was_reacting = module.state.is_reacting();
    let rate = reaction_rate(
        module.temperature,
        config.ignition_temperature,
        config.attenuation_temperature,
    );

    if rate > 0.0 {
        let lost = mass_loss(rate, module.surface_area(), config.thickness);
        if module.mass - lost > module.stop_combustion_mass {
            module.consume(lost);
            let released = released_energy(lost, config.release_temperature_factor);
            *delta += released;
            report.energy_released += released;
            report.mass_consumed += lost;
        } else {
            module.state = CombustionState::Exhausted;
            module.is_burning = false;
            if module.is_trunk {
                module.is_isolated_by_coal = true;
            }
            report.exhausted.push(index);
            trace!("Module {} exhausted at mass {:.4}", index, module.mass);
            if was_reacting {
                collaborator.set_visual_effect_enabled(index, false);
            }
            return;
        }
    }

    let next = if rate <= 0.0 {
        CombustionState::Intact
    } else if module.temperature >= config.attenuation_temperature {
        CombustionState::FullyReacting
    } else if module.state == CombustionState::Intact {
        CombustionState::Igniting
    } else {
        CombustionState::ActivelyBurning
    };

    if next != module.state {
        trace!("Module {}: {:?} -> {:?}", index, module.state, next);
        module.state = next;
    }
    module.is_burning = next.is_reacting();
    if module.is_burning != was_reacting {
        collaborator.set_visual_effect_enabled(index, module.is_burning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::module::ModuleDesc;
    use crate::physics::combustion_physics::radius_from_mass;
    use crate::simulation::collaborator::{FrameRecorder, NullCollaborator};
    use approx::assert_relative_eq;

    fn config() -> ModuleConfig {
        ModuleConfig {
            air_transfer_factor: 0.0,
            module_transfer_factor: 0.0,
            module_diffusion_factor: 0.0,
            ..ModuleConfig::default()
        }
    }

    fn fast_burning() -> ModuleConfig {
        ModuleConfig {
            thickness: 1.0,
            ..config()
        }
    }

    fn single(config: ModuleConfig, trunk: bool) -> ModuleGraph {
        let mut graph = ModuleGraph::new(config).unwrap();
        let root = graph
            .add_module(&ModuleDesc::trunk(Vec3::zeros(), 0.2, 1.0))
            .unwrap();
        if !trunk {
            graph
                .add_module(&ModuleDesc::branch(Vec3::new(0.0, 1.0, 0.0), 0.05, 0.5, root))
                .unwrap();
        }
        graph
    }

    #[test]
    fn test_cold_module_is_untouched() {
        let mut graph = single(config(), true);
        let mass = graph.modules()[0].mass();
        let mut deltas = Vec::new();
        let report = CombustionStepper::new().step(
            &mut graph,
            &[],
            &WindConfig::calm(),
            0.1,
            &mut deltas,
            &mut NullCollaborator,
        );
        assert_eq!(graph.modules()[0].mass(), mass);
        assert_eq!(deltas, vec![0.0]);
        assert_eq!(report.burning, 0);
        assert_eq!(graph.combustion_state(0), Some(CombustionState::Intact));
    }

    #[test]
    fn test_mass_monotonic_and_radius_consistent() {
        let mut graph = single(config(), true);
        graph.ignite(0, 1.0);
        let mut stepper = CombustionStepper::new();
        let mut deltas = Vec::new();
        let mut previous = graph.modules()[0].mass();

        for _ in 0..200 {
            stepper.step(
                &mut graph,
                &[],
                &WindConfig::calm(),
                0.1,
                &mut deltas,
                &mut NullCollaborator,
            );
            let m = &graph.modules()[0];
            assert!(m.mass() <= previous);
            assert!(m.mass() > 0.0);
            if m.state() != CombustionState::Exhausted {
                assert!(m.mass() > m.stop_combustion_mass());
            }
            let expected = radius_from_mass(m.mass(), 800.0, m.height());
            assert_relative_eq!(m.radius(), expected, max_relative = 1e-6);
            previous = m.mass();
        }
    }

    #[test]
    fn test_trunk_isolated_by_coal_and_stops_for_good() {
        let mut graph = single(fast_burning(), true);
        graph.ignite(0, 1.0);
        let mut stepper = CombustionStepper::new();
        let mut deltas = Vec::new();

        let mut exhausted_at = None;
        for tick in 0..10_000 {
            let report = stepper.step(
                &mut graph,
                &[],
                &WindConfig::calm(),
                0.1,
                &mut deltas,
                &mut NullCollaborator,
            );
            if !report.exhausted.is_empty() {
                exhausted_at = Some(tick);
                assert!(report.destroyed.is_empty());
                break;
            }
        }
        assert!(exhausted_at.is_some());

        let m = &graph.modules()[0];
        assert!(m.is_isolated_by_coal());
        assert!(!m.is_burned());
        assert!(!m.is_burning());
        let mass = m.mass();

        // Still hot, but combustion never restarts
        graph.ignite(0, 1.0);
        stepper.step(
            &mut graph,
            &[],
            &WindConfig::calm(),
            0.1,
            &mut deltas,
            &mut NullCollaborator,
        );
        assert_eq!(graph.modules()[0].mass(), mass);
        assert_eq!(graph.combustion_state(0), Some(CombustionState::Exhausted));
        assert_eq!(deltas[0], 0.0);
    }

    #[test]
    fn test_exhausted_branch_is_destroyed() {
        let mut graph = single(fast_burning(), false);
        graph.ignite(1, 1.0);
        let mut stepper = CombustionStepper::new();
        let mut deltas = Vec::new();

        let mut destroyed = Vec::new();
        for _ in 0..10_000 {
            let report = stepper.step(
                &mut graph,
                &[],
                &WindConfig::calm(),
                0.1,
                &mut deltas,
                &mut NullCollaborator,
            );
            if !report.destroyed.is_empty() {
                destroyed = report.destroyed;
                break;
            }
        }
        assert_eq!(destroyed, vec![1]);
        assert!(graph.modules()[1].is_burned());
        assert!(!graph.modules()[0].is_burned());
    }

    #[test]
    fn test_burning_count_excludes_cascaded_modules() {
        // trunk <- nearly spent branch <- healthy burning branch
        let mut graph = ModuleGraph::new(fast_burning()).unwrap();
        graph
            .add_module(&ModuleDesc::trunk(Vec3::zeros(), 0.2, 1.0))
            .unwrap();
        graph
            .add_module(&ModuleDesc::branch(Vec3::new(0.0, 1.0, 0.0), 0.05, 0.5, 0))
            .unwrap();
        graph
            .add_module(&ModuleDesc::branch(Vec3::new(0.0, 2.0, 0.0), 0.1, 1.0, 1))
            .unwrap();
        {
            let (modules, _) = graph.parts_mut();
            let spent = modules[1].mass() - modules[1].stop_combustion_mass() * 1.01;
            modules[1].consume(spent);
        }
        graph.ignite(1, 1.0);
        graph.ignite(2, 1.0);

        let mut deltas = Vec::new();
        let report = CombustionStepper::new().step(
            &mut graph,
            &[],
            &WindConfig::calm(),
            0.1,
            &mut deltas,
            &mut NullCollaborator,
        );
        assert_eq!(report.exhausted, vec![1]);
        assert_eq!(report.destroyed, vec![1, 2]);
        assert_eq!(report.burning, 0);
    }

    #[test]
    fn test_burning_releases_energy_into_delta() {
        let mut graph = single(config(), true);
        graph.ignite(0, 1.0);
        let before = graph.modules()[0].mass();
        let area = graph.modules()[0].surface_area();
        let mut deltas = Vec::new();
        let report = CombustionStepper::new().step(
            &mut graph,
            &[],
            &WindConfig::calm(),
            0.1,
            &mut deltas,
            &mut NullCollaborator,
        );

        let lost = area * 0.01;
        assert_relative_eq!(before - graph.modules()[0].mass(), lost, max_relative = 1e-2);
        assert_relative_eq!(deltas[0], lost * 10.0, max_relative = 1e-5);
        assert_relative_eq!(report.energy_released, deltas[0], max_relative = 1e-6);
        assert_eq!(graph.combustion_state(0), Some(CombustionState::FullyReacting));
    }

    #[test]
    fn test_state_progression() {
        let mut graph = single(config(), true);
        let mut stepper = CombustionStepper::new();
        let mut deltas = Vec::new();
        let mut run = |graph: &mut ModuleGraph| {
            stepper.step(
                graph,
                &[],
                &WindConfig::calm(),
                0.1,
                &mut deltas,
                &mut NullCollaborator,
            );
            graph.combustion_state(0)
        };

        graph.ignite(0, 0.2);
        assert_eq!(run(&mut graph), Some(CombustionState::Igniting));
        assert_eq!(run(&mut graph), Some(CombustionState::ActivelyBurning));
        graph.ignite(0, 0.5);
        assert_eq!(run(&mut graph), Some(CombustionState::FullyReacting));
    }

    #[test]
    fn test_asymmetric_ambient_exchange() {
        let cfg = ModuleConfig {
            air_transfer_factor: 0.5,
            module_transfer_factor: 0.1,
            module_diffusion_factor: 0.0,
            ignition_temperature: 5.0,
            attenuation_temperature: 6.0,
            ..ModuleConfig::default()
        };
        let mut graph = single(cfg, true);
        let mut stepper = CombustionStepper::new();
        let mut deltas = Vec::new();

        // Air hotter
        stepper.step(
            &mut graph,
            &[1.0],
            &WindConfig::calm(),
            0.1,
            &mut deltas,
            &mut NullCollaborator,
        );
        assert_relative_eq!(graph.modules()[0].temperature(), 0.5, max_relative = 1e-6);
        assert_relative_eq!(deltas[0], -0.5, max_relative = 1e-6);

        // Module hotter
        stepper.step(
            &mut graph,
            &[0.0],
            &WindConfig::calm(),
            0.1,
            &mut deltas,
            &mut NullCollaborator,
        );
        assert_relative_eq!(graph.modules()[0].temperature(), 0.45, max_relative = 1e-5);
        assert_relative_eq!(deltas[0], 0.05, max_relative = 1e-5);
    }

    #[test]
    fn test_non_finite_ambient_counts_as_zero() {
        let cfg = ModuleConfig {
            air_transfer_factor: 0.5,
            module_transfer_factor: 0.5,
            module_diffusion_factor: 0.0,
            ..ModuleConfig::default()
        };
        let mut graph = single(cfg, true);
        let mut deltas = Vec::new();
        CombustionStepper::new().step(
            &mut graph,
            &[f32::NAN],
            &WindConfig::calm(),
            0.1,
            &mut deltas,
            &mut NullCollaborator,
        );
        assert_eq!(graph.modules()[0].temperature(), 0.0);
        assert_eq!(deltas[0], 0.0);
    }

    #[test]
    fn test_parent_diffusion_is_symmetric() {
        let cfg = ModuleConfig {
            module_diffusion_factor: 1.0,
            ..config()
        };
        let mut graph = single(cfg, false);
        graph.ignite(1, 0.1);
        let mut deltas = Vec::new();
        CombustionStepper::new().step(
            &mut graph,
            &[],
            &WindConfig::calm(),
            0.5,
            &mut deltas,
            &mut NullCollaborator,
        );
        let parent = graph.modules()[0].temperature();
        let child = graph.modules()[1].temperature();
        assert_relative_eq!(parent + child, 0.1, max_relative = 1e-6);
        assert_relative_eq!(child, 0.075, max_relative = 1e-5);
    }

    #[test]
    fn test_wind_force_and_effect_toggles() {
        let mut graph = single(config(), true);
        graph.ignite(0, 1.0);
        let mut recorder = FrameRecorder::new();
        let mut deltas = Vec::new();
        let wind = WindConfig {
            direction: Vec3::new(0.0, 0.0, 2.0),
            intensity: 4.0,
        };
        CombustionStepper::new().step(&mut graph, &[], &wind, 0.1, &mut deltas, &mut recorder);

        assert_eq!(recorder.forces.len(), 1);
        assert!(recorder.forces[0].z > 0.0);
        assert_eq!(recorder.forces[0].x, 0.0);
        assert!(recorder.effects[0]);
        assert_eq!(recorder.effect_toggles, 1);
    }
}
