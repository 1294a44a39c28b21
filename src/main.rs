//! Hazard Edge binary.
//!
//! Runs the relay roles: HTTP API (optionally with ingestion and in-process
//! monitoring), standalone ingestion, a remote monitoring daemon, and a
//! one-shot dump of the latest readings.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use hazard_edge::{
    start_web_server, ActuatorController, AppState, DeviceConfig, DeviceLink, HttpCommandLink,
    HttpReadingSource, IngestConfig, IngestPipeline, Monitor, MonitorConfig, Reading,
    ReadingStore, SafetyLimits, SensorDevice, SerialDevice, SimulatedDevice, StoreConfig,
    WebConfig, DEFAULT_BAUD_RATE, DEFAULT_DATABASE_FILE, DEFAULT_FEED_INTERVAL_MS,
    DEFAULT_MONITOR_INTERVAL_MS, DEFAULT_POLL_BACKOFF_MS, DEFAULT_RECENT_LIMIT,
    DEFAULT_SAFE_LIMITS, DEFAULT_SERIAL_PORT, DEFAULT_TABLE, DEFAULT_WEB_PORT,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "hazard_edge")]
#[command(about = "Hazard sensor relay with automatic safety actuator control")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Relay serial frames into the store
    Ingest(IngestArgs),

    /// Drive the actuator from a remote API
    Monitor(MonitorArgs),

    /// Print the most recent readings and exit
    Latest(LatestArgs),
}

#[derive(Args)]
struct StoreArgs {
    /// SQLite database file
    #[arg(long, env = "DATABASE_FILE", default_value = DEFAULT_DATABASE_FILE)]
    database_file: PathBuf,

    /// Table holding the readings
    #[arg(long, env = "DATABASE_TABLE", default_value = DEFAULT_TABLE)]
    database_table: String,
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        StoreConfig::new(&self.database_file).with_table(&self.database_table)
    }
}

#[derive(Args)]
struct DeviceArgs {
    /// Serial device path
    #[arg(long, env = "SERIAL_PORT", default_value = DEFAULT_SERIAL_PORT)]
    serial_port: String,

    /// Serial baud rate
    #[arg(long, env = "BAUD_RATE", default_value_t = DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    /// Use a simulated sensor board instead of the serial device
    #[arg(long)]
    simulate: bool,

    /// Frame cadence of the simulated board in milliseconds
    #[arg(long, default_value_t = DEFAULT_FEED_INTERVAL_MS)]
    simulate_interval_ms: u64,
}

#[derive(Args)]
struct LimitArgs {
    /// Safety limits as metric=limit pairs
    #[arg(long, env = "SAFE_LIMITS", default_value = DEFAULT_SAFE_LIMITS)]
    safe_limits: SafetyLimits,

    /// Monitoring interval in milliseconds
    #[arg(long, env = "MONITOR_INTERVAL_MS", default_value_t = DEFAULT_MONITOR_INTERVAL_MS)]
    monitor_interval_ms: u64,
}

impl LimitArgs {
    fn config(&self) -> MonitorConfig {
        MonitorConfig::default()
            .with_limits(self.safe_limits.clone())
            .with_interval(Duration::from_millis(self.monitor_interval_ms))
    }
}

#[derive(Args)]
struct ServeArgs {
    /// Web server bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Maximum concurrent feed subscribers
    #[arg(long, default_value_t = 100)]
    max_connections: usize,

    /// Continuous feed interval in milliseconds
    #[arg(long, env = "FEED_INTERVAL_MS", default_value_t = DEFAULT_FEED_INTERVAL_MS)]
    feed_interval_ms: u64,

    /// Readings returned by the point query
    #[arg(long, env = "RECENT_LIMIT", default_value_t = DEFAULT_RECENT_LIMIT)]
    recent_limit: usize,

    /// Also run the ingestion pipeline
    #[arg(long)]
    ingest: bool,

    /// Also run the monitoring loop in-process
    #[arg(long)]
    monitor: bool,

    /// Expose the actuator endpoint without ingesting or monitoring
    #[arg(long)]
    actuator: bool,

    #[command(flatten)]
    tuning: IngestTuningArgs,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    device: DeviceArgs,

    #[command(flatten)]
    limits: LimitArgs,
}

#[derive(Args)]
struct IngestTuningArgs {
    /// Pause between polls while no full line is available, in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_BACKOFF_MS)]
    poll_backoff_ms: u64,

    /// Consecutive device failures tolerated before exiting
    #[arg(long, default_value_t = 5)]
    max_device_retries: u32,
}

impl IngestTuningArgs {
    fn config(&self) -> IngestConfig {
        IngestConfig::default()
            .with_poll_backoff(Duration::from_millis(self.poll_backoff_ms))
            .with_max_device_retries(self.max_device_retries)
    }
}

#[derive(Args)]
struct IngestArgs {
    #[command(flatten)]
    tuning: IngestTuningArgs,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    device: DeviceArgs,
}

#[derive(Args)]
struct MonitorArgs {
    /// Base URL of the relay API
    #[arg(long, env = "API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// HTTP request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    request_timeout_ms: u64,

    #[command(flatten)]
    limits: LimitArgs,
}

#[derive(Args)]
struct LatestArgs {
    /// Number of readings to print
    #[arg(short = 'n', long, default_value_t = DEFAULT_RECENT_LIMIT)]
    count: usize,

    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,

    #[command(flatten)]
    store: StoreArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Commands::Serve(args) => serve_command(args).await?,
        Commands::Ingest(args) => ingest_command(args).await?,
        Commands::Monitor(args) => monitor_command(args).await?,
        Commands::Latest(args) => latest_command(args).await?,
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Token cancelled on Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            trigger.cancel();
        }
    });
    token
}

fn open_device(args: &DeviceArgs) -> anyhow::Result<Arc<dyn SensorDevice>> {
    if args.simulate {
        info!(
            "Using simulated sensor board ({}ms cadence)",
            args.simulate_interval_ms
        );
        return Ok(Arc::new(SimulatedDevice::new(Duration::from_millis(
            args.simulate_interval_ms,
        ))));
    }

    let config = DeviceConfig::new(&args.serial_port).with_baud_rate(args.baud_rate);
    let device = SerialDevice::open(config)
        .with_context(|| format!("failed to open serial device {}", args.serial_port))?;
    Ok(Arc::new(device))
}

async fn open_store(args: &StoreArgs) -> anyhow::Result<ReadingStore> {
    ReadingStore::open(&args.config())
        .await
        .with_context(|| format!("failed to open store {}", args.database_file.display()))
}

/// Wait for every task; the first failure cancels the rest.
async fn supervise(
    mut tasks: JoinSet<hazard_edge::Result<()>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut failure: Option<anyhow::Error> = None;

    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e).context("task panicked")),
        };

        if let Err(e) = outcome {
            error!("Task failed: {:#}", e);
            shutdown.cancel();
            failure.get_or_insert(e);
        }
    }

    failure.map_or(Ok(()), Err)
}

async fn serve_command(args: &ServeArgs) -> anyhow::Result<()> {
    let shutdown = shutdown_on_ctrl_c();
    let store = open_store(&args.store).await?;

    let web_config = WebConfig::new(&args.host, args.port)
        .with_cors(!args.no_cors)
        .with_max_websocket_connections(args.max_connections)
        .with_recent_limit(args.recent_limit)
        .with_feed_interval(Duration::from_millis(args.feed_interval_ms));

    let feed = web_config.feed_service(store.clone());
    let mut state = AppState::new(feed.clone(), &web_config).with_shutdown(shutdown.clone());
    let mut tasks = JoinSet::new();

    if args.ingest || args.monitor || args.actuator {
        let device = open_device(&args.device)?;
        let controller = Arc::new(ActuatorController::new(DeviceLink::new(device.clone())));
        state = state.with_actuator(controller.clone());

        if args.ingest {
            let pipeline = IngestPipeline::new(device, store, args.tuning.config());
            let token = shutdown.clone();
            tasks.spawn(async move { pipeline.run(token).await });
        }

        if args.monitor {
            let monitor = Monitor::new(feed, controller, args.limits.config());
            let token = shutdown.clone();
            tasks.spawn(async move { monitor.run(token).await });
        }
    }

    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!("  - Max feed subscribers: {}", web_config.max_websocket_connections);
    info!("  - Feed interval: {}ms", args.feed_interval_ms);
    info!("  - Ingestion: {}, monitoring: {}", args.ingest, args.monitor);

    tasks.spawn(start_web_server(web_config, state));
    supervise(tasks, shutdown).await
}

async fn ingest_command(args: &IngestArgs) -> anyhow::Result<()> {
    let shutdown = shutdown_on_ctrl_c();
    let store = open_store(&args.store).await?;
    let device = open_device(&args.device)?;

    IngestPipeline::new(device, store, args.tuning.config())
        .run(shutdown)
        .await
        .context("ingestion stopped")
}

async fn monitor_command(args: &MonitorArgs) -> anyhow::Result<()> {
    let shutdown = shutdown_on_ctrl_c();
    let timeout = Duration::from_millis(args.request_timeout_ms);

    let source = HttpReadingSource::new(&args.api_url, timeout)?;
    let link = HttpCommandLink::new(&args.api_url, timeout)?;
    info!("Monitoring relay API at {}", args.api_url);

    Monitor::new(source, Arc::new(ActuatorController::new(link)), args.limits.config())
        .run(shutdown)
        .await
        .context("monitoring stopped")
}

async fn latest_command(args: &LatestArgs) -> anyhow::Result<()> {
    let store = open_store(&args.store).await?;
    let readings = store.recent(args.count).await?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&readings)?),
        "pretty" => print_pretty_readings(&readings),
        other => anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }

    Ok(())
}

fn print_pretty_readings(readings: &[Reading]) {
    if readings.is_empty() {
        println!("No readings stored yet");
        return;
    }

    println!(
        "{:>8}  {:<20}  {:>9}  {:>9}  {:>9}  {:>7}",
        "id", "recorded at", "LPG", "CH4", "CO", "temp"
    );
    for reading in readings {
        println!(
            "{:>8}  {:<20}  {:>9.2}  {:>9.2}  {:>9.2}  {:>7.2}",
            reading.id,
            reading
                .recorded_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            reading.lpg,
            reading.ch4,
            reading.co,
            reading.temperature
        );
    }
}
