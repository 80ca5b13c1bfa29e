use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tree_fire_core::{
    FrameRecorder, GridConfig, GridQuality, ModuleDesc, SimulationConfig, TreeFireSimulation,
    Vec3, WindConfig,
};

/// Headless tree fire demo with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "tree-fire-demo")]
#[command(about = "Tree-module wildfire simulation demo", long_about = None)]
struct Args {
    /// Simulation duration in seconds
    #[arg(short, long, default_value_t = 30.0)]
    duration: f32,

    /// Fixed time step in seconds
    #[arg(long, default_value_t = 0.05)]
    dt: f32,

    /// Grid quality preset (low, medium, high); picked from the thread count when omitted
    #[arg(short, long)]
    quality: Option<GridQuality>,

    /// Side of the square forest plot in meters
    #[arg(long, default_value_t = 24.0)]
    plot_size: f32,

    /// Number of trees to place
    #[arg(short = 'n', long, default_value_t = 9)]
    num_trees: u32,

    /// Branch segments stacked on each trunk
    #[arg(long, default_value_t = 4)]
    branches: u32,

    /// Wind speed in m/s
    #[arg(short, long, default_value_t = 4.0)]
    wind_speed: f32,

    /// Wind direction in degrees in the horizontal plane (0 = +x)
    #[arg(long, default_value_t = 0.0)]
    wind_direction: f32,

    /// Grid torch intensity injected at the plot centre for the first second
    #[arg(long, default_value_t = 50.0)]
    torch: f32,

    /// Report interval in seconds
    #[arg(short, long, default_value_t = 2.0)]
    report_interval: f32,

    /// Seed for tree placement jitter
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

/// Place `num_trees` jittered trees on a square plot, each a trunk with a
/// chain of branches above it.
fn plant_forest(sim: &mut TreeFireSimulation, args: &Args) -> Result<usize, Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let per_row = (args.num_trees as f32).sqrt().ceil().max(1.0) as u32;
    let spacing = args.plot_size / per_row as f32;
    let offset = (per_row as f32 - 1.0) * spacing / 2.0;

    let mut planted = 0;
    for tree in 0..args.num_trees {
        let row = tree / per_row;
        let col = tree % per_row;
        let x = col as f32 * spacing - offset + rng.random_range(-0.2..0.2) * spacing;
        let z = row as f32 * spacing - offset + rng.random_range(-0.2..0.2) * spacing;

        let trunk_radius = rng.random_range(0.15..0.3);
        let mut parent = sim.add_module(&ModuleDesc::trunk(Vec3::new(x, 1.0, z), trunk_radius, 2.0))?;
        planted += 1;

        let mut radius = trunk_radius;
        for level in 0..args.branches {
            radius *= 0.7;
            let lean = Vec3::new(rng.random_range(-0.5..0.5), 0.0, rng.random_range(-0.5..0.5));
            let position = Vec3::new(x, 2.5 + 1.5 * level as f32, z) + lean;
            parent = sim.add_module(&ModuleDesc::branch(position, radius, 1.5, parent))?;
            planted += 1;
        }
    }
    Ok(planted)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    println!("=== Tree Fire Simulation Demo ===\n");

    let height = args.plot_size.max(8.0);
    let center = Vec3::new(0.0, height / 2.0, 0.0);
    let size = Vec3::new(args.plot_size + 4.0, height, args.plot_size + 4.0);
    let heading = args.wind_direction.to_radians();
    let quality = args.quality.unwrap_or_else(GridQuality::recommended);
    let config = SimulationConfig {
        grid: GridConfig::from_quality(quality, &center, &size),
        wind: WindConfig {
            direction: Vec3::new(heading.cos(), 0.0, heading.sin()),
            intensity: args.wind_speed,
        },
        ..SimulationConfig::default()
    };
    let resolution = config.grid.resolution;
    let mut sim = TreeFireSimulation::new(config)?;
    println!(
        "Grid {}x{}x{} over {:.0}x{:.0}x{:.0} m",
        resolution[0], resolution[1], resolution[2], size.x, size.y, size.z
    );

    let planted = plant_forest(&mut sim, &args)?;
    println!("Planted {} trees ({} modules)", args.num_trees, planted);

    let heated = sim.heat_at(&Vec3::new(0.0, 1.0, 0.0), args.plot_size / 4.0, 0.5);
    println!("Ignited {} module(s) near the plot centre\n", heated);

    let mut recorder = FrameRecorder::new();
    println!("Time(s) | Modules | Burning | Destroyed | Energy released | Frame(ms)");
    println!("--------|---------|---------|-----------|-----------------|----------");

    let mut time = 0.0;
    let mut next_report = 0.0;
    while time < args.duration {
        if time < 1.0 && !sim.inject_heat(&Vec3::new(0.0, 1.0, 0.0), args.torch * args.dt) {
            warn!("Torch position lies outside the grid");
        }
        recorder.begin_frame();
        sim.tick(args.dt, &mut recorder)?;
        time += args.dt;

        let stats = sim.stats();
        if time >= next_report {
            println!(
                "{:7.1} | {:7} | {:7} | {:9} | {:15.1} | {:9.2}",
                time,
                stats.module_count,
                stats.burning,
                stats.total_destroyed,
                stats.total_energy_released,
                stats.last_frame_time_ms
            );
            next_report += args.report_interval;
        }
        if stats.burning == 0 && time > 1.0 && stats.tick_count > 1 {
            info!("No module is burning, stopping at {:.1}s", time);
            break;
        }
    }

    let stats = sim.stats().clone();
    sim.shutdown();

    println!("\n=== Simulation Complete ===");
    println!("Final time: {:.1}s over {} ticks", stats.simulation_time, stats.tick_count);
    println!("Modules destroyed: {}", stats.total_destroyed);
    println!("Remaining mass: {:.2} kg", stats.total_mass);
    println!("Grid read-backs completed: {}", stats.readbacks_completed);
    println!("Flame toggles: {}", recorder.effect_toggles);
    println!("Average frame time: {:.2} ms", stats.average_frame_time_ms);
    Ok(())
}
