//! supla-exporter binary.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio::sync::watch;
use tracing_subscriber::{prelude::*, reload, EnvFilter, Registry};

use supla_core::DeviceRecord;
use supla_exporter::{
    build_runner, resolve_config_path, Config, PrometheusSink, Scheduler, ServerState,
};

#[derive(Parser)]
#[command(
    name = "supla-exporter",
    about = "Prometheus exporter for SUPLA devices that only expose an HTML status page",
    version
)]
struct Cli {
    /// Path to the YAML config file.
    /// Also reads from SUPLA_EXPORTER_CONFIG env var.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (debug, info, warn, error). Overrides global.log_level.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll devices periodically and serve /metrics (default).
    Serve,

    /// Run a single polling cycle and print the records.
    Poll {
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load and validate the config file.
    Validate,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG or --log-level win; otherwise global.log_level applies once
    // the config is loaded. Until then log at info.
    let explicit_filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| cli.log_level.as_deref().map(EnvFilter::new));
    let pinned = explicit_filter.is_some();
    let (filter, filter_handle) = reload::Layer::new(
        explicit_filter.unwrap_or_else(|| EnvFilter::new("info")),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let reload_filter = (!pinned).then_some(&filter_handle);
    let config_arg = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let (_, config) = load_config(config_arg, reload_filter)?;
            serve(config).await?;
        }

        Commands::Poll { json } => {
            let (_, config) = load_config(config_arg, reload_filter)?;
            let runner = build_runner(&config)?;
            let records = runner.run_cycle(&config.devices).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print_records(&records);
            }
        }

        Commands::Validate => {
            let (config_path, config) = load_config(config_arg, reload_filter)?;
            build_runner(&config)?;
            println!("Valid config: {}", config_path.display());
            println!("  Devices: {}", config.devices.len());
            println!("  Interval: {}s", config.global.interval);
            println!("  Timeout: {}s", config.global.timeout);
            println!("  Workers: {}", config.global.workers);
            println!("  Port: {}", config.global.port);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "supla-exporter", &mut std::io::stdout());
        }
    }

    Ok(())
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Resolve and load the config, then apply `global.log_level` through
/// `reload_filter` when the level was not pinned on the command line.
fn load_config(
    explicit: Option<&str>,
    reload_filter: Option<&FilterHandle>,
) -> anyhow::Result<(PathBuf, Config)> {
    let config_path = resolve_config_path(explicit)?;
    let config = Config::load(&config_path)?;
    if let Some(handle) = reload_filter {
        handle.reload(EnvFilter::new(&config.global.log_level))?;
    }
    tracing::info!(path = %config_path.display(), "configuration loaded");
    Ok((config_path, config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let runner = build_runner(&config)?;
    let counter = runner.counter();
    let sink = Arc::new(PrometheusSink::new()?);

    let state = Arc::new(ServerState {
        sink: sink.clone(),
        counter,
        devices: config.devices.len(),
    });

    let scheduler = Arc::new(Scheduler::new(
        runner,
        config.devices,
        sink,
        config.global.interval(),
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_loop = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(shutdown_rx).await })
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.global.port));
    let shutdown = async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("shutdown requested");
        shutdown_tx.send(true).ok();
    };

    supla_exporter::server::serve(addr, state, shutdown).await?;
    poll_loop.await?;
    Ok(())
}

fn print_records(records: &[DeviceRecord]) {
    for r in records {
        let status = if r.up { "UP" } else { "DOWN" };
        println!("{status:<5} {}", r.url);
        if r.up {
            println!("      name:     {}", r.name);
            println!("      state:    {}", r.state);
            println!("      firmware: {}", r.firmware);
            println!("      guid:     {}", r.guid);
            println!("      mac:      {}", r.mac);
            println!("      mode:     {}", r.mode);
            println!("      free mem: {} kB", r.free_mem_kb);
        } else if !r.state.is_empty() {
            println!("      reason:   {}", r.state);
        }
    }
}
