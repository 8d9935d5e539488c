use std::path::PathBuf;

use crate::types::{code, RpcError};

/// Errors surfaced to callers of the daemon, on either side of the socket.
///
/// Wallet operations served by the daemon return this type too; the server
/// maps it onto a wire [`RpcError`] with [`IpcError::to_rpc_error`] and the
/// client maps it back with `From<RpcError>`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IpcError {
    #[error("walletd is already running at {}", path.display())]
    DaemonAlreadyRunning { path: PathBuf },

    #[error("walletd is not running, or the socket at {} is not readable", path.display())]
    DaemonNotRunning { path: PathBuf },

    #[error("Timed out waiting for lock. Please try again.")]
    LockTimeout,

    #[error("invalid params: {message}")]
    InvalidParams { message: String },

    #[error("method not found: {method}")]
    MethodNotFound { method: String },

    #[error("{message}")]
    Wallet { message: String },

    #[error("{message} (code {code})")]
    Remote { code: i64, message: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("cannot determine socket identity: {reason}")]
    Identity { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Process exit statuses for daemon lifecycle commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleExit {
    Success,
    Failure,
    AlreadyRunning,
    NotRunning,
}

impl LifecycleExit {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::AlreadyRunning => 3,
            Self::NotRunning => 4,
        }
    }
}

impl IpcError {
    pub fn wallet(message: impl Into<String>) -> Self {
        Self::Wallet { message: message.into() }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into() }
    }

    /// Only a lock timeout is safe to retry blindly, and only for idempotent
    /// operations; the caller owns that decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout)
    }

    pub fn lifecycle_exit(&self) -> LifecycleExit {
        match self {
            Self::DaemonAlreadyRunning { .. } => LifecycleExit::AlreadyRunning,
            Self::DaemonNotRunning { .. } => LifecycleExit::NotRunning,
            _ => LifecycleExit::Failure,
        }
    }

    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Self::LockTimeout => RpcError::lock_timeout(),
            Self::InvalidParams { message } => RpcError::invalid_params(message),
            Self::MethodNotFound { method } => RpcError::method_not_found(method),
            Self::Remote { code, message } => RpcError::new(*code, message.clone()),
            Self::Wallet { message } => RpcError::operation_failed(message.clone()),
            other => RpcError::operation_failed(other.to_string()),
        }
    }
}

impl From<RpcError> for IpcError {
    fn from(error: RpcError) -> Self {
        match error.code {
            code::LOCK_TIMEOUT => Self::LockTimeout,
            code::OPERATION_FAILED => Self::Wallet { message: error.message },
            code::METHOD_NOT_FOUND => match error.data {
                Some(serde_json::Value::String(method)) => Self::MethodNotFound { method },
                _ => Self::Remote { code: error.code, message: error.message },
            },
            _ => Self::Remote { code: error.code, message: error.message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_signalled_by_code_not_text() {
        let wire = RpcError::new(code::LOCK_TIMEOUT, "something else entirely");
        let err = IpcError::from(wire);
        assert!(matches!(err, IpcError::LockTimeout));
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Timed out waiting for lock. Please try again.");
    }

    #[test]
    fn wallet_errors_round_trip_through_the_wire() {
        let original = IpcError::wallet("Insufficient funds");
        let wire = original.to_rpc_error();
        assert_eq!(wire.code, code::OPERATION_FAILED);
        assert_eq!(wire.message, "Insufficient funds");
        let back = IpcError::from(wire);
        assert!(
            matches!(back, IpcError::Wallet { ref message } if message == "Insufficient funds")
        );
        assert!(!back.is_retryable());
    }

    #[test]
    fn method_not_found_keeps_the_method_name() {
        let back = IpcError::from(RpcError::method_not_found("fly"));
        assert!(matches!(back, IpcError::MethodNotFound { ref method } if method == "fly"));

        let parse = IpcError::from(RpcError::parse_error("eof"));
        assert!(matches!(parse, IpcError::Remote { code: code::PARSE_ERROR, .. }));
    }

    #[test]
    fn lifecycle_exit_codes_are_distinct() {
        let running = IpcError::DaemonAlreadyRunning { path: "/tmp/w.sock".into() };
        let missing = IpcError::DaemonNotRunning { path: "/tmp/w.sock".into() };
        let other = IpcError::protocol("bad frame");
        assert_eq!(running.lifecycle_exit(), LifecycleExit::AlreadyRunning);
        assert_eq!(missing.lifecycle_exit(), LifecycleExit::NotRunning);
        assert_eq!(other.lifecycle_exit(), LifecycleExit::Failure);

        let mut codes = [
            LifecycleExit::Success.code(),
            LifecycleExit::Failure.code(),
            LifecycleExit::AlreadyRunning.code(),
            LifecycleExit::NotRunning.code(),
        ];
        codes.sort_unstable();
        assert!(codes.windows(2).all(|pair| pair[0] != pair[1]));
    }
}
