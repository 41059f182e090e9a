use blackbird_bridge::config::{Config, DeviceConfig, load_dotenv};
use blackbird_bridge::device_lock::DeviceLock;
use blackbird_bridge::entities::{EntityState, StateListener};
use blackbird_bridge::integration::{EntryRegistry, poll_once, spawn_poller};
use blackbird_bridge::transport::{Connector, MemoryConnector, MemoryTransport, TcpConnector};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "blackbird-bridge")]
#[command(about = "Expose Monoprice Blackbird HDMI matrices as switch and select entities")]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "BLACKBIRD_CONFIG")]
    config: Option<PathBuf>,

    /// Matrix host, added to the configured devices
    #[arg(long)]
    host: Option<String>,

    /// Port for --host
    #[arg(long, default_value_t = blackbird_bridge::device_info::DEFAULT_PORT)]
    port: u16,

    /// Seconds between polls, overrides the config file
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Talk to an in-memory simulated matrix instead of the network
    #[arg(long)]
    simulate: bool,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn log_state_change() -> StateListener {
    Arc::new(|unique_id: &str, state: &EntityState| match state {
        EntityState::Switch { available, is_on } => {
            info!(
                "[Entity] {} available={} is_on={:?}",
                unique_id, available, is_on
            );
        }
        EntityState::Select {
            available,
            current_option,
            ..
        } => {
            info!(
                "[Entity] {} available={} current_option={:?}",
                unique_id, available, current_option
            );
        }
    })
}

/// Walk output 1 through the inputs so state changes show up in the log.
fn run_route_simulation(matrix: Arc<MemoryTransport>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(45));
        let mut input = 1u8;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            input = input % 8 + 1;
            matrix.set_route(1, input);
            info!("[Sim] Output 1 switched to input {}", input);
        }
    })
}

fn main() {
    // Before the runtime spawns any worker threads.
    load_dotenv();
    let cli = Cli::parse();
    init_logger();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };
    runtime.block_on(run(cli));
}

async fn run(cli: Cli) {
    info!("Starting Blackbird Bridge");

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = &cli.host
        && !config.devices.iter().any(|d| &d.host == host)
    {
        config.devices.push(DeviceConfig::new(host, cli.port));
    }
    if let Some(secs) = cli.poll_interval {
        config.bridge.poll_interval_secs = secs;
    }
    for duplicate in config.dedup_devices() {
        warn!("Device {} is listed more than once; using the first entry", duplicate);
    }
    if config.devices.is_empty() {
        error!("No devices configured; pass --host or --config");
        std::process::exit(1);
    }

    info!("Configuration loaded:");
    info!("  Poll interval: {:?}", config.bridge.poll_interval());
    info!("  Timeout: {:?}", config.bridge.timeout());
    for device in &config.devices {
        info!("  Device: {}:{}", device.host, device.port);
    }

    let cancel = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let connector: Arc<dyn Connector> = if cli.simulate {
        info!("Simulation mode: using an in-memory matrix");
        let matrix = Arc::new(MemoryTransport::new());
        tasks.push(run_route_simulation(matrix.clone(), cancel.clone()));
        Arc::new(MemoryConnector::new(matrix))
    } else {
        Arc::new(TcpConnector::new())
    };

    // One process per matrix; held until exit.
    let mut locks = Vec::new();
    if !cli.simulate {
        for device in &config.devices {
            match DeviceLock::acquire(device.host.trim(), device.port) {
                Ok(lock) => locks.push(lock),
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    let registry = Arc::new(
        EntryRegistry::new(connector, config.bridge.timeout()).with_listener(log_state_change()),
    );

    for device in &config.devices {
        let registry = registry.clone();
        let entry = device.to_entry();
        let backoff = config.bridge.retry_interval();
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            match registry.setup_with_retry(entry.clone(), backoff, &cancel).await {
                // Publish initial state without waiting for the next tick.
                Some(loaded) => {
                    poll_once(&loaded).await;
                }
                None if !cancel.is_cancelled() => {
                    warn!("[Setup] Giving up on {}", entry.title);
                }
                None => {}
            }
        }));
    }

    tasks.push(spawn_poller(
        registry.clone(),
        config.bridge.poll_interval(),
        cancel.clone(),
    ));

    info!("Blackbird Bridge is running");
    info!("  - Press Ctrl+C to exit");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task failed during shutdown: {}", e);
        }
    }
    registry.unload_all().await;
    drop(locks);

    info!("Blackbird Bridge stopped");
}
