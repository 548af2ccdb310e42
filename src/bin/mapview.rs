//! Headless driver for the map viewer session lifecycle.
//!
//! Opens a world, optionally switches to a second one, lets the refresh
//! scheduler run, then shuts down and prints the tick counters. Redraws go
//! to a renderer that only counts frames, which makes this useful for
//! checking cadence and disposal behaviour without a window.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mapview::audit::{spawn_audit_writer, AuditEmitter, HistoryStore};
use mapview::{
    parse_coordinates, LifecycleCoordinator, RenderError, Renderer, Session, ViewerConfig,
    Viewport, WorldInfo, WorldType,
};

#[derive(Parser, Debug)]
#[command(name = "mapview")]
#[command(about = "Run the map viewer session lifecycle without a window")]
struct Args {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "MAPVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Seed (number or text) of the first world
    #[arg(long, short = 's', default_value = "0")]
    seed: String,

    /// Seed to switch to halfway through
    #[arg(long)]
    switch_to: Option<String>,

    /// Coordinates to centre on after opening, e.g. "123,456"
    #[arg(long, short = 'g')]
    goto: Option<String>,

    /// Game version label recorded in the history
    #[arg(long, default_value = "unknown")]
    game_version: String,

    /// How long to keep refreshing (milliseconds)
    #[arg(long, short = 'd', default_value_t = 1000)]
    duration_ms: u64,
}

/// Counts frames instead of drawing them.
struct FrameCounter {
    label: String,
    frames: Arc<AtomicU64>,
}

impl Renderer for FrameCounter {
    fn request_redraw(&self, _viewport: &Viewport) -> Result<(), RenderError> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn dispose(&self) {
        info!(
            world = %self.label,
            frames = self.frames.load(Ordering::Relaxed),
            "Renderer released"
        );
    }
}

fn session_for(seed: &str, version: &str) -> Session {
    let world = WorldInfo::from_user_input(seed, WorldType::Default, version);
    Session::new(
        world,
        FrameCounter {
            label: seed.to_string(),
            frames: Arc::new(AtomicU64::new(0)),
        },
    )
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mapview=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ViewerConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ViewerConfig::default(),
    };

    let (audit, writer) = if config.audit.enabled {
        let (emitter, receiver) = AuditEmitter::new(config.audit.buffer_size);
        let store = HistoryStore::from_config(config.audit.history_file.as_deref());
        let writer = spawn_audit_writer(receiver, store).context("starting audit writer")?;
        (Some(Arc::new(emitter)), Some(writer))
    } else {
        (None, None)
    };

    let mut coordinator = LifecycleCoordinator::start(&config.refresh, audit)?;
    coordinator.open(session_for(&args.seed, &args.game_version))?;

    if let Some(goto) = &args.goto {
        let point = parse_coordinates(goto).with_context(|| format!("parsing '{}'", goto))?;
        coordinator.center_on(point)?;
    }

    let run_for = Duration::from_millis(args.duration_ms);
    match &args.switch_to {
        Some(seed) => {
            std::thread::sleep(run_for / 2);
            coordinator.switch_to(session_for(seed, &args.game_version))?;
            std::thread::sleep(run_for / 2);
        }
        None => std::thread::sleep(run_for),
    }

    coordinator.shutdown()?;
    let stats = coordinator.scheduler_stats();
    drop(coordinator);

    if let Some(writer) = writer {
        match writer.join() {
            Ok(written) => info!(written, "Audit history flushed"),
            Err(_) => tracing::error!("Audit writer panicked"),
        }
    }

    println!(
        "ticks={} redraws={} failures={}",
        stats.ticks, stats.redraws, stats.failures
    );
    Ok(())
}
