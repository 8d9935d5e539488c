use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use walletd_ipc::{IpcError, LifecycleExit, WalletApi};
use walletd_ipc_server::{
    register_wallet, MethodRegistry, MutationLock, RegistryError, RunningServer, Server,
    ServerError, DEFAULT_LOCK_TIMEOUT,
};

use crate::config::DaemonConfig;
use crate::memory_wallet::{MemoryWallet, DEFAULT_SEED};

/// Extra time, beyond one poll interval, that open connections get to close
/// after stop.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("invalid configuration: {0}")]
    Config(#[source] IpcError),

    #[error("failed to set up wallet: {0}")]
    Wallet(#[source] IpcError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl DaemonError {
    pub fn lifecycle_exit(&self) -> LifecycleExit {
        match self {
            Self::Server(err) => err.lifecycle_exit(),
            Self::Config(err) | Self::Wallet(err) => err.lifecycle_exit(),
            Self::Registry(_) => LifecycleExit::Failure,
        }
    }
}

/// A started daemon: the socket server plus the wallet it serves.
#[derive(Debug)]
pub struct Daemon {
    server: RunningServer,
    wallet: Arc<MemoryWallet>,
    lock: MutationLock,
    drain_timeout: Duration,
}

impl Daemon {
    /// Builds the wallet from `config`, registers its operations and starts
    /// serving. Fails without touching an existing daemon's socket when one
    /// is already running.
    pub async fn start(config: &DaemonConfig) -> Result<Self, DaemonError> {
        let server_config = config.server_config().map_err(DaemonError::Config)?;
        let seed = config.seed.as_deref().unwrap_or(DEFAULT_SEED);
        let wallet = MemoryWallet::from_config(seed, &config.accounts);
        let wallet = Arc::new(wallet.map_err(DaemonError::Wallet)?);

        let mut registry = MethodRegistry::new();
        register_wallet(&mut registry, Arc::clone(&wallet))?;
        log::debug!("walletd registered methods={}", registry.names().join(","));

        let lock = MutationLock::new();
        let drain_timeout = server_config.poll_interval + DRAIN_GRACE;
        let server = Server::new(server_config, Arc::new(registry), lock.clone())
            .with_request_observer(|line| log::trace!("walletd request {line}"))
            .start()
            .await?;
        Ok(Self { server, wallet, lock, drain_timeout })
    }

    pub fn socket_path(&self) -> &Path {
        self.server.socket_path()
    }

    pub fn wallet(&self) -> &Arc<MemoryWallet> {
        &self.wallet
    }

    /// Stops accepting, waits for open connections to close and then syncs
    /// the wallet under the mutation lock.
    pub async fn shutdown(self) -> Result<(), DaemonError> {
        let Self { server, wallet, lock, drain_timeout } = self;
        server.stop();
        if tokio::time::timeout(drain_timeout, server.wait()).await.is_err() {
            log::warn!("walletd connections still open after {drain_timeout:?}");
        }

        match lock.acquire(DEFAULT_LOCK_TIMEOUT).await {
            Some(_guard) => wallet.sync_wallet_file().await.map_err(DaemonError::Wallet)?,
            None => log::warn!("walletd skipped final sync: wallet lock still held"),
        }
        log::info!("walletd stopped");
        Ok(())
    }
}
