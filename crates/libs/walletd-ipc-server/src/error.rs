use std::path::PathBuf;

use walletd_ipc::{IpcError, LifecycleExit};

/// Failures that prevent the server from starting. Nothing after a
/// successful bind is fatal.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    #[error("walletd is already running at {}", path.display())]
    AlreadyRunning { path: PathBuf },

    #[error("failed to probe socket at {}: {source}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove stale socket at {}: {source}", path.display())]
    StaleCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind socket at {}: {source}", path.display())]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set permissions on {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ServerError {
    pub fn lifecycle_exit(&self) -> LifecycleExit {
        match self {
            Self::AlreadyRunning { .. } => LifecycleExit::AlreadyRunning,
            _ => LifecycleExit::Failure,
        }
    }
}

impl From<ServerError> for IpcError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::AlreadyRunning { path } => IpcError::DaemonAlreadyRunning { path },
            ServerError::Probe { source, .. }
            | ServerError::StaleCleanup { source, .. }
            | ServerError::Bind { source, .. }
            | ServerError::Permissions { source, .. } => IpcError::Io(source),
        }
    }
}
