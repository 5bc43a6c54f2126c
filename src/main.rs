use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use isojs::config::Config;
use isojs::lifecycle::{self, Shutdown};
use isojs::logging;
use isojs::manager::ScriptManager;
use isojs::server::{self, AppState, TlsFiles};
use isojs::watchdog::{ProcessRssSampler, Watchdog, WatchdogTuning};

#[derive(Parser, Debug)]
#[command(name = "isojs", about = "Sandboxed JavaScript execution service")]
struct Flags {
    /// Logging level (trace, debug, info, warn, error, fatal, panic)
    #[arg(long, default_value = "info")]
    verbose: String,

    /// Configuration file path
    #[arg(long, default_value = "./config.yaml")]
    config: PathBuf,

    /// Log file path
    #[arg(long, default_value = "./logs/ijs.log")]
    log: PathBuf,

    /// TLS certificate file; enables HTTPS together with --key
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// TLS private key file; enables HTTPS together with --cert
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
}

fn main() -> Result<()> {
    let flags = Flags::parse();
    let level = logging::parse_level(&flags.verbose);

    // Config is loaded before the logging sink so log_on_console can take
    // effect; load failures abort with plain stderr output.
    let config = Config::load(&flags.config)?;
    let _guard = logging::init(&flags.log, level, config.log_on_console)?;
    info!(config_file = %flags.config.display(), ?config, "loaded configuration");

    let total_cpus = num_cpus::get();
    let limited_cpus = std::cmp::max(1, total_cpus / 2);
    info!(
        memory_limit_mb = config.max_memory_mb,
        max_script_size = config.max_script_size,
        cpu_usage = %format!("{limited_cpus}/{total_cpus} CPUs"),
        "script manager configuration initialized"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(limited_cpus)
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    runtime.block_on(run(config, flags))
}

async fn run(config: Config, flags: Flags) -> Result<()> {
    let manager = ScriptManager::new(&config);

    let (restart_tx, restart_rx) = mpsc::channel(1);
    let sampler = ProcessRssSampler::new()?;
    Watchdog::spawn(
        Arc::clone(&manager),
        config.memory_limit_bytes(),
        sampler,
        WatchdogTuning::default(),
        restart_tx,
    );

    let state = AppState {
        manager: Arc::clone(&manager),
        max_script_size: config.max_script_size,
    };
    let tls = flags
        .cert
        .zip(flags.key)
        .map(|(cert, key)| TlsFiles { cert, key });
    let server_handle = axum_server::Handle::new();
    let server = tokio::spawn(server::serve(
        state,
        config.server_port,
        tls,
        server_handle.clone(),
    ));

    match lifecycle::wait(manager, server_handle, server, restart_rx, &config).await? {
        Shutdown::Graceful => Ok(()),
        Shutdown::Restart => {
            lifecycle::respawn_process()?;
            Ok(())
        }
    }
}
