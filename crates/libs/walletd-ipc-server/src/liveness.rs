//! Startup probe for an existing daemon on the socket path.

use std::io::{self, ErrorKind};
use std::path::Path;

use tokio::net::UnixStream;

use crate::error::ServerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Liveness {
    /// A daemon accepted the probe connection.
    Live,
    /// A file is present but nothing listens on it.
    Stale,
    /// Nothing at the path.
    Absent,
}

/// Connects to `path` purely to learn whether someone is listening. The probe
/// connection is dropped immediately; a live daemon sees an empty read.
pub async fn probe_liveness(path: &Path) -> io::Result<Liveness> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Liveness::Absent),
        Err(err) => return Err(err),
    }
    match UnixStream::connect(path).await {
        Ok(_stream) => Ok(Liveness::Live),
        Err(err) if err.kind() == ErrorKind::ConnectionRefused => Ok(Liveness::Stale),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(Liveness::Absent),
        Err(err) => Err(err),
    }
}

/// Makes `path` bindable: fails if a daemon is live, unlinks stale debris.
pub(crate) async fn claim_socket_path(path: &Path) -> Result<(), ServerError> {
    let liveness = probe_liveness(path)
        .await
        .map_err(|source| ServerError::Probe { path: path.to_path_buf(), source })?;
    match liveness {
        Liveness::Absent => Ok(()),
        Liveness::Live => Err(ServerError::AlreadyRunning { path: path.to_path_buf() }),
        Liveness::Stale => {
            log::info!("walletd removing stale socket path={}", path.display());
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(source) => Err(ServerError::StaleCleanup { path: path.to_path_buf(), source }),
            }
        }
    }
}
