use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use worldspace_common::Aabb;
use worldspace_kernel::{Scene, WorldContent};
use worldspace_persist::{Depot, FileDepot};
use worldspace_stream::{
    CompiledWorld, CookConfig, TokioJobRunner, WorldStreamingSystem, cook_world,
};
use worldspace_template::DepotPrefabSource;

#[derive(Parser)]
#[command(name = "worldspace-cli", about = "CLI tool for worldspace operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Depot root directory
    #[arg(short, long, default_value = ".")]
    depot: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version info
    Info,
    /// Cook a world into a compiled world plus sector resources
    Cook {
        /// Depot path of the world resource
        world: String,
        /// JSON cook configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the sectors of a compiled world
    Inspect {
        /// Depot path of the compiled world
        world: String,
    },
    /// Stream a compiled world around a fixed observer
    Stream {
        /// Depot path of the compiled world
        world: String,
        /// Observer position
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [0.0, 0.0, 0.0])]
        observer: Vec<f32>,
        /// Number of ticks to run
        #[arg(short, long, default_value = "10")]
        ticks: u64,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CookConfig> {
    let Some(path) = path else {
        return Ok(CookConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading cook config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing cook config {}", path.display()))
}

fn describe_box(bounds: &Aabb) -> String {
    if bounds.is_unbounded() {
        "unbounded".to_string()
    } else {
        let c = bounds.center();
        let size = bounds.max - bounds.min;
        format!("center=({:.0}, {:.0}) size={:.0}", c.x, c.y, size.x)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("worldspace-cli v{}", env!("CARGO_PKG_VERSION"));
            let config = CookConfig::default();
            println!(
                "grid: top cell {} units, {} levels, min distance {}",
                config.grid.top_cell_size, config.grid.max_levels, config.grid.min_streaming_distance
            );
        }
        Commands::Cook { world, config } => {
            let config = load_config(config.as_deref())?;
            let depot: Arc<dyn Depot> = Arc::new(
                FileDepot::open(&cli.depot)
                    .with_context(|| format!("opening depot {}", cli.depot.display()))?,
            );
            let prefabs = DepotPrefabSource::new(depot.clone());
            let report = cook_world(depot.as_ref(), &world, &config, &prefabs)?;
            if report.layer_count == 0 {
                tracing::warn!("world {world} has no layers, cooked output is empty");
            }

            println!("Cooked {}", report.world_path);
            println!(
                "  layers={} nodes={} sectors={} entities={} prefabs={}",
                report.layer_count,
                report.node_count,
                report.sector_count,
                report.entity_count,
                report.dependency_count
            );
            for path in &report.written {
                println!("  wrote {path}");
            }
        }
        Commands::Inspect { world } => {
            let depot = FileDepot::open(&cli.depot)?;
            let compiled = CompiledWorld::load(&depot, &world)?;
            println!("World '{}': {} sectors", compiled.name, compiled.sectors.len());
            for sector in &compiled.sectors {
                println!(
                    "  {:<16} {} {}",
                    sector.name,
                    if sector.always_loaded { "always" } else { "grid  " },
                    describe_box(&sector.streaming_box)
                );
            }
            if !compiled.dependencies.is_empty() {
                println!("Prefab dependencies:");
                for (path, version) in compiled.dependencies.iter() {
                    println!("  {path} v{version}");
                }
            }
        }
        Commands::Stream {
            world,
            observer,
            ticks,
        } => {
            let depot: Arc<dyn Depot> = Arc::new(FileDepot::open(&cli.depot)?);
            let compiled = CompiledWorld::load(depot.as_ref(), &world)?;
            let runner = Arc::new(TokioJobRunner::new().context("starting loader runtime")?);

            let mut scene = Scene::new();
            scene.register_system(Box::new(WorldStreamingSystem::new(
                depot,
                runner,
                CookConfig::default().streaming,
            )));
            tracing::info!("loaded compiled world '{}' with {} sectors", compiled.name, compiled.sectors.len());
            let content: Arc<dyn WorldContent> = Arc::new(compiled);
            scene.attach_world_content(content);
            let position = Vec3::from_slice(&observer);
            scene.add_observer(position);
            println!("Streaming '{world}' around {position}");

            for _ in 0..ticks {
                scene.tick();
                // give background loads a chance to land before the next poll
                std::thread::sleep(std::time::Duration::from_millis(16));
                if let Some(system) = scene.system::<WorldStreamingSystem>() {
                    let stats = system.stats();
                    println!(
                        "tick {:>3}: +{} requested, +{} loaded, -{} unloaded, {} failed | loaded={} loading={} entities={}",
                        scene.tick_count(),
                        stats.sectors_requested_this_tick,
                        stats.sectors_loaded_this_tick,
                        stats.sectors_unloaded_this_tick,
                        stats.sectors_failed_this_tick,
                        stats.total_loaded_sectors,
                        stats.total_loading_sectors,
                        scene.entity_count()
                    );
                }
            }
            for line in scene.render_frame().lines {
                println!("{line}");
            }
            scene.shutdown();
            tracing::info!("streaming stopped after {} ticks", scene.tick_count());
        }
    }

    Ok(())
}
