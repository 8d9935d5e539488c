use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use walletd_ipc::{resolve_socket_path, IpcError};
use walletd_ipc_server::ServerConfig;

/// Daemon settings read from TOML. Every field is optional; unset fields keep
/// the server defaults.
#[derive(Debug, Default, Deserialize)]
pub struct DaemonConfig {
    pub socket_path: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub lock_timeout_secs: Option<u64>,
    /// Octal in TOML, e.g. `socket_mode = 0o600`.
    pub socket_mode: Option<u32>,
    pub max_frame_len: Option<usize>,
    /// Seed for the development wallet's address and signature derivation.
    pub seed: Option<String>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Opening state of one development-wallet account, in satoshis.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    pub name: String,
    #[serde(default)]
    pub confirmed: u64,
    #[serde(default)]
    pub unconfirmed: u64,
}

impl DaemonConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    /// The configured socket path, else the invoking user's.
    pub fn resolved_socket_path(&self) -> Result<PathBuf, IpcError> {
        match &self.socket_path {
            Some(path) => Ok(path.clone()),
            None => resolve_socket_path(),
        }
    }

    pub fn server_config(&self) -> Result<ServerConfig, IpcError> {
        let mut config = match &self.socket_path {
            Some(path) => ServerConfig::new(path),
            None => ServerConfig::for_current_user()?,
        };
        if let Some(millis) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(millis.max(1));
        }
        if let Some(secs) = self.lock_timeout_secs {
            config.lock_timeout = Duration::from_secs(secs);
        }
        if let Some(mode) = self.socket_mode {
            config.socket_mode = Some(mode);
        }
        if let Some(max) = self.max_frame_len {
            config.max_frame_len = max;
        }
        Ok(config)
    }
}
