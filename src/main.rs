// LedCloud - Procedural light animations for an irregular LED mesh
// Patterns, rainbow, notifications and a sunrise alarm, switched by TCP commands and sent to WLED over DDP
use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

mod background;
mod clock;
mod command;
mod config;
mod director;
mod frame;
mod gradients;
mod kinematic;
mod logging;
mod mesh;
mod output;
mod pattern;
mod pool;
mod rainbow;
mod server;
mod shapes;
mod state;
mod timeline;
mod types;

use clock::SystemClock;
use config::{Args, CloudConfig};
use director::{Director, DirectorSettings};
use gradients::Palette;
use mesh::{MeshCoordinator, MeshTable};
use pool::{PatternPool, PoolSettings};
use rainbow::RainbowPattern;
use state::CloudState;
use types::InterpolationMode;

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging();

    let mut config = CloudConfig::load_with_path(args.cfg.as_deref())?;
    config.merge_with_args(&args);
    if let Some(path) = config.config_path.as_ref() {
        info!("Using config file: {}", path.display());
    }

    let table = MeshTable::load(Path::new(&config.mesh_file))?;
    info!(
        "Mesh: {} LEDs on a {}x{} grid",
        table.len(),
        table.width(),
        table.height()
    );

    let devices = config.devices_for(table.len());
    let output = output::open_output(&devices, table.len(), config.global_brightness, config.dry_run)?;

    let state = Arc::new(CloudState::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Release);
        })
        .context("Failed to install Ctrl-C handler")?;
    }

    let _command_server = server::spawn_command_server(config.listen_ip.clone(), config.listen_port, Arc::clone(&state))?;

    let palette = Palette::resolve(
        &config.rainbow_palette,
        InterpolationMode::from_string(&config.interpolation),
    )?;
    let rainbow = RainbowPattern::new(table.width(), table.height(), palette)
        .with_velocity(config.rainbow_velocity as f32)
        .with_density(config.rainbow_density);
    let pool = PatternPool::new(
        table.width(),
        table.height(),
        PoolSettings {
            spawn_chance: config.spawn_chance,
            min_patterns: config.min_patterns,
        },
        config.seed,
    );
    let settings = DirectorSettings {
        tick: Duration::from_millis(config.tick_ms),
        idle_rest: Duration::from_millis(config.idle_ms),
        poll_interval: Duration::from_millis(config.alarm_poll_ms),
        intro: Duration::from_millis(config.intro_ms),
    };

    let mut director = Director::new(
        state,
        shutdown,
        MeshCoordinator::new(table, output),
        SystemClock,
        rainbow,
        pool,
        settings,
    );

    let skip_intro = args.skip_intro;
    let animation = thread::Builder::new()
        .name("animation".to_string())
        .spawn(move || director.run(skip_intro))
        .context("Failed to start animation thread")?;

    if animation.join().is_err() {
        error!("Animation thread panicked");
        anyhow::bail!("Animation thread panicked");
    }

    info!("Shut down");
    Ok(())
}
