//! Per-user socket identity.

use std::path::{Path, PathBuf};

use crate::error::IpcError;

pub const SOCKET_FILE_PREFIX: &str = "walletd";
pub const SOCKET_FILE_EXTENSION: &str = "sock";

/// Checked in order, the first non-empty value wins.
const USER_ENV_VARS: [&str; 4] = ["LOGNAME", "USER", "LNAME", "USERNAME"];

/// `<temp dir>/walletd.<user>.sock` for the invoking OS user.
pub fn resolve_socket_path() -> Result<PathBuf, IpcError> {
    Ok(socket_path_in(&std::env::temp_dir(), &current_user()?))
}

pub fn socket_path_in(dir: &Path, user: &str) -> PathBuf {
    let user: String =
        user.chars().map(|c| if c == '/' || c == '\0' { '_' } else { c }).collect();
    dir.join(format!("{SOCKET_FILE_PREFIX}.{user}.{SOCKET_FILE_EXTENSION}"))
}

pub fn current_user() -> Result<String, IpcError> {
    for var in USER_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            let value = value.trim();
            if !value.is_empty() {
                return Ok(value.to_owned());
            }
        }
    }
    dirs::home_dir()
        .as_deref()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| IpcError::Identity {
            reason: format!("none of {} is set and no home directory", USER_ENV_VARS.join(", ")),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_embeds_user_name() {
        let path = socket_path_in(Path::new("/tmp"), "alice");
        assert_eq!(path, PathBuf::from("/tmp/walletd.alice.sock"));
    }

    #[test]
    fn socket_path_is_deterministic_and_flattens_separators() {
        let dir = Path::new("/var/tmp");
        assert_eq!(socket_path_in(dir, "bob"), socket_path_in(dir, "bob"));
        assert_ne!(socket_path_in(dir, "bob"), socket_path_in(dir, "carol"));
        assert_eq!(socket_path_in(dir, "../x"), PathBuf::from("/var/tmp/walletd..._x.sock"));
    }

    #[test]
    fn resolved_path_lives_in_temp_dir() {
        let Ok(path) = resolve_socket_path() else {
            return;
        };
        assert_eq!(path.parent(), Some(std::env::temp_dir().as_path()));
        let name = path.file_name().and_then(|n| n.to_str()).expect("utf-8 file name");
        assert!(name.starts_with("walletd.") && name.ends_with(".sock"), "{name}");
    }
}
