use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use drone_dispatch::Error;
use drone_dispatch::Fleet;
use drone_dispatch::FleetConfig;
use drone_dispatch::FleetStores;
use drone_dispatch::Result;
use drone_dispatch::StepScheduler;
use drone_dispatch::WaveSpec;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs a drone fleet against a freshly seeded job pool.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML file merged over the defaults (environment variables still win)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fleet size of the swarm waves
    #[arg(long, default_value_t = 70)]
    drones: usize,

    /// Slowed-down, candidate-marking drones per swarm wave
    #[arg(long, default_value_t = 1)]
    examples: usize,

    /// Deliveries per drone and wave
    #[arg(long, default_value_t = 5)]
    trips: u32,

    /// Number of swarm waves
    #[arg(long, default_value_t = 1)]
    waves: u32,

    /// Length of one pacing tick in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Skip the single-drone wave run before the swarm
    #[arg(long)]
    no_tutorial: bool,
}

fn main() -> Result<()> {
    init_observability();
    let cli = Cli::parse();

    let mut config = FleetConfig::new()?;
    if let Some(path) = &cli.config {
        let path = path
            .to_str()
            .ok_or_else(|| Error::Fatal(format!("config path is not utf-8: {path:?}")))?;
        config = config.with_override_config(path)?;
    }
    let config = config.validate()?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if config.wave.worker_threads > 0 {
        builder.worker_threads(config.wave.worker_threads);
    }
    let runtime = builder
        .build()
        .map_err(|e| Error::Fatal(format!("build runtime: {e}")))?;

    runtime.block_on(run(cli, config))
}

async fn run(
    cli: Cli,
    config: FleetConfig,
) -> Result<()> {
    let stores = FleetStores::open(&config.storage)?;
    let fleet = Fleet::new(config, stores, StepScheduler::current())?;
    let _metering = fleet.start_metering();

    tokio::select! {
        result = run_waves(&fleet, &cli) => {
            if let Err(e) = result {
                error!("fleet stopped: {}", e);
            }
        }
        _ = shutdown_signal() => {}
    }

    fleet.shutdown().await;
    println!("{}", fleet.metrics_registry().render());
    Ok(())
}

async fn run_waves(
    fleet: &Fleet,
    cli: &Cli,
) -> Result<()> {
    let tick = Duration::from_millis(cli.tick_ms);

    if !cli.no_tutorial {
        let report = fleet.activate_wave(WaveSpec::new(1, 1, cli.trips, tick)).await?;
        info!("tutorial wave settled after {:?}", report.elapsed);
    }

    for _ in 0..cli.waves {
        let spec = WaveSpec::new(cli.drones, cli.examples, cli.trips, tick);
        let report = fleet.activate_wave(spec).await?;
        info!(
            "wave {} settled: {} drones, {:?}",
            report.wave,
            report.participants.len(),
            report.elapsed
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }
}

fn init_observability() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
