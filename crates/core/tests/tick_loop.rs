//! End-to-end tick loop tests: read-back latency, destruction cascade and
//! burning through the grid.

use tree_fire_core::grid::ReadbackPoll;
use tree_fire_core::{
    CombustionState, FrameRecorder, GridConfig, ModuleConfig, ModuleDesc, NullCollaborator,
    SimulationConfig, TreeFireSimulation, Vec3, WindConfig,
};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const DT: f32 = 0.1;

fn calm_config(modules: ModuleConfig) -> SimulationConfig {
    SimulationConfig {
        grid: GridConfig {
            resolution: [16, 16, 16],
            world_to_local: GridConfig::volume_transform(
                &Vec3::new(0.0, 8.0, 0.0),
                &Vec3::repeat(16.0),
            ),
            ..GridConfig::default()
        },
        modules,
        wind: WindConfig::calm(),
        ..SimulationConfig::default()
    }
}

/// Trunk at the origin with `branches` segments stacked on top of it
fn chain(sim: &mut TreeFireSimulation, x: f32, branches: usize) -> Vec<usize> {
    let mut ids = vec![sim
        .add_module(&ModuleDesc::trunk(Vec3::new(x, 1.0, 0.0), 0.2, 2.0))
        .unwrap()];
    for i in 0..branches {
        let parent = ids[i];
        let y = 3.0 + 2.0 * i as f32;
        ids.push(
            sim.add_module(&ModuleDesc::branch(Vec3::new(x, y, 0.0), 0.1, 2.0, parent))
                .unwrap(),
        );
    }
    ids
}

#[test]
fn test_readback_is_at_least_one_tick_stale() {
    let mut sim = TreeFireSimulation::new(calm_config(ModuleConfig::default())).unwrap();
    let ids = chain(&mut sim, 0.0, 0);
    let trunk_pos = *sim.graph().modules()[ids[0]].position();
    assert!(sim.inject_heat(&trunk_pos, 100.0));

    // Tick 1: nothing has been read back yet, the module sees 0
    let report = sim.tick(DT, &mut NullCollaborator).unwrap();
    assert_eq!(report.readback, ReadbackPoll::Pending);
    assert_eq!(sim.graph().modules()[0].temperature(), 0.0);

    // Tick 2: the copy taken at the end of tick 1 arrives
    let report = sim.tick(DT, &mut NullCollaborator).unwrap();
    assert_eq!(report.readback, ReadbackPoll::Updated { submit_index: 1 });
    assert!(sim.graph().modules()[0].temperature() > 0.0);

    // Every later tick consumes the previous tick's copy
    for tick in 3..8u64 {
        let report = sim.tick(DT, &mut NullCollaborator).unwrap();
        assert_eq!(
            report.readback,
            ReadbackPoll::Updated {
                submit_index: tick - 1
            }
        );
    }
    assert_eq!(sim.stats().readbacks_completed, 6);
}

#[test]
fn test_grid_write_not_visible_in_same_tick() {
    let modules = ModuleConfig {
        air_transfer_factor: 0.5,
        ..ModuleConfig::default()
    };
    let mut sim = TreeFireSimulation::new(calm_config(modules)).unwrap();
    chain(&mut sim, 0.0, 0);
    sim.tick(DT, &mut NullCollaborator).unwrap();

    let voxel = sim.bridge().module_voxel(0).unwrap();
    let before = sim.bridge().shadow_temperature(voxel);
    let trunk_pos = *sim.graph().modules()[0].position();
    sim.inject_heat(&trunk_pos, 50.0);

    // Injected after the tick-1 copy: invisible during tick 2
    sim.tick(DT, &mut NullCollaborator).unwrap();
    assert_eq!(sim.bridge().shadow_temperature(voxel), before);

    sim.tick(DT, &mut NullCollaborator).unwrap();
    assert!(sim.bridge().shadow_temperature(voxel) > before);
}

#[test]
fn test_exhausted_branch_takes_descendants_with_it() {
    let modules = ModuleConfig {
        thickness: 1.0,
        air_transfer_factor: 0.0,
        module_transfer_factor: 0.0,
        module_diffusion_factor: 0.0,
        ..ModuleConfig::default()
    };
    let mut sim = TreeFireSimulation::new(calm_config(modules)).unwrap();
    let ids = chain(&mut sim, 0.0, 3);
    assert!(sim.ignite(ids[1], 1.0));

    let mut recorder = FrameRecorder::new();
    let mut destroyed_at = None;
    for tick in 0..1000 {
        recorder.begin_frame();
        let report = sim.tick(DT, &mut recorder).unwrap();
        if report.removed > 0 {
            assert_eq!(report.step.destroyed, vec![1, 2, 3]);
            assert_eq!(report.removed, 3);
            destroyed_at = Some(tick);
            break;
        }
    }
    assert!(destroyed_at.is_some());

    assert_eq!(recorder.detached, vec![1, 2, 3]);
    assert_eq!(sim.graph().len(), 1);
    assert!(sim.graph().modules()[0].is_trunk());
    assert_eq!(sim.combustion_state(0), Some(CombustionState::Intact));
    assert_eq!(recorder.transforms.len(), 1);
    assert_eq!(recorder.forces.len(), 1);
    assert_eq!(sim.stats().total_destroyed, 3);
    assert_eq!(sim.stats().module_count, 1);
    assert!(sim.graph().modules()[0].children().is_empty());

    // The survivor keeps ticking
    sim.tick(DT, &mut recorder).unwrap();
    assert_eq!(recorder.transforms.len(), 1);
}

#[test]
fn test_burning_heats_the_grid() {
    let mut sim = TreeFireSimulation::new(calm_config(ModuleConfig::default())).unwrap();
    let ids = chain(&mut sim, -2.0, 2);
    chain(&mut sim, 2.0, 2);
    sim.ignite(ids[0], 1.0);
    sim.ignite(ids[1], 1.0);

    let mass_before = sim.graph().stats().total_mass;
    for _ in 0..20 {
        sim.tick(DT, &mut NullCollaborator).unwrap();
    }

    let stats = sim.stats();
    assert!(stats.total_energy_released > 0.0);
    assert!(stats.total_mass < mass_before);
    assert!(stats.burning > 0);
    let hottest = sim
        .solver()
        .read_temperature()
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    assert!(hottest > 0.0);
    assert!(sim
        .solver()
        .read_temperature()
        .iter()
        .all(|t| t.is_finite()));
}

#[test]
fn test_wind_pushes_modules_downwind() {
    let mut config = calm_config(ModuleConfig::default());
    config.wind = WindConfig {
        direction: Vec3::new(0.0, 0.0, -1.0),
        intensity: 6.0,
    };
    let mut sim = TreeFireSimulation::new(config).unwrap();
    chain(&mut sim, 0.0, 1);

    let mut recorder = FrameRecorder::new();
    sim.tick(DT, &mut recorder).unwrap();
    assert_eq!(recorder.forces.len(), 2);
    for force in &recorder.forces {
        assert!(force.z < 0.0);
        assert!(force.x.abs() < 1e-6);
    }
    // Thicker trunk catches more wind
    assert!(recorder.forces[0].norm() > recorder.forces[1].norm());
}
