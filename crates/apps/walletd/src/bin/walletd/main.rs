mod call;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use walletd::config::DaemonConfig;
use walletd::daemon::Daemon;
use walletd_ipc::{IpcError, LifecycleExit};
use walletd_ipc_server::{probe_liveness, Liveness};

#[derive(Parser, Debug)]
#[command(name = "walletd", about = "Wallet daemon and its socket client")]
struct Args {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Socket path; overrides the configuration file.
    #[arg(long, global = true)]
    socket: Option<PathBuf>,
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daemon until SIGINT or SIGTERM (the default).
    Serve,
    /// Report whether a daemon answers on the socket.
    Status,
    /// Send one call to the running daemon and print its result.
    Call(call::CallArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err:#}");
            return exit(LifecycleExit::Failure);
        }
    };
    let outcome = match args.command {
        None | Some(Command::Serve) => serve(&config).await,
        Some(Command::Status) => status(&config).await,
        Some(Command::Call(call)) => call::run(&config, call).await,
    };
    exit(outcome)
}

fn load_config(args: &Args) -> anyhow::Result<DaemonConfig> {
    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(socket) = &args.socket {
        config.socket_path = Some(socket.clone());
    }
    Ok(config)
}

async fn serve(config: &DaemonConfig) -> LifecycleExit {
    let daemon = match Daemon::start(config).await {
        Ok(daemon) => daemon,
        Err(err) => {
            log::error!("{err}");
            return err.lifecycle_exit();
        }
    };
    log::info!("walletd ready socket={}", daemon.socket_path().display());

    if let Err(err) = wait_for_signal().await {
        log::error!("walletd cannot wait for signals: {err}");
    }
    match daemon.shutdown().await {
        Ok(()) => LifecycleExit::Success,
        Err(err) => {
            log::error!("{err}");
            err.lifecycle_exit()
        }
    }
}

async fn wait_for_signal() -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

async fn status(config: &DaemonConfig) -> LifecycleExit {
    let path = match config.resolved_socket_path() {
        Ok(path) => path,
        Err(err) => {
            log::error!("{err}");
            return err.lifecycle_exit();
        }
    };
    match probe_liveness(&path).await {
        Ok(Liveness::Live) => {
            println!("walletd is running at {}", path.display());
            LifecycleExit::Success
        }
        Ok(Liveness::Stale | Liveness::Absent) => {
            println!("{}", IpcError::DaemonNotRunning { path });
            LifecycleExit::NotRunning
        }
        Err(err) => {
            log::error!("walletd cannot probe {}: {err}", path.display());
            LifecycleExit::Failure
        }
    }
}

fn exit(outcome: LifecycleExit) -> ExitCode {
    ExitCode::from(outcome.code())
}
