use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value as JsonValue;
use walletd_ipc::{code, IpcError, Params, ParamsError, RpcError};

/// How a registered operation fails.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// The arguments did not fit the operation; reported as `INVALID_PARAMS`.
    #[error("{0}")]
    InvalidParams(String),

    #[error("{message}")]
    Failed { code: i64, message: String },
}

impl OperationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed { code: code::OPERATION_FAILED, message: message.into() }
    }

    pub fn into_rpc_error(self) -> RpcError {
        match self {
            Self::InvalidParams(message) => RpcError::invalid_params(message),
            Self::Failed { code, message } => RpcError::new(code, message),
        }
    }
}

impl From<ParamsError> for OperationError {
    fn from(err: ParamsError) -> Self {
        Self::InvalidParams(err.0)
    }
}

impl From<IpcError> for OperationError {
    fn from(err: IpcError) -> Self {
        match err {
            IpcError::InvalidParams { message } => Self::InvalidParams(message),
            other => {
                let RpcError { code, message, .. } = other.to_rpc_error();
                Self::Failed { code, message }
            }
        }
    }
}

pub type OperationResult = Result<JsonValue, OperationError>;
pub type OperationFuture = BoxFuture<'static, OperationResult>;

type Operation = Arc<dyn Fn(Params) -> OperationFuture + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("method '{method}' is already registered")]
    Duplicate { method: String },
}

/// Maps method names to operations. Built once before the server starts and
/// shared read-only afterwards.
#[derive(Default)]
pub struct MethodRegistry {
    operations: HashMap<String, Operation>,
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry").field("methods", &self.names()).finish()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(
        &mut self,
        method: impl Into<String>,
        operation: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        let method = method.into();
        if self.operations.contains_key(&method) {
            return Err(RegistryError::Duplicate { method });
        }
        let operation: Operation = Arc::new(move |params| operation(params).boxed());
        self.operations.insert(method, operation);
        Ok(())
    }

    pub(crate) fn operation(&self, method: &str) -> Option<Operation> {
        self.operations.get(method).cloned()
    }

    pub fn contains(&self, method: &str) -> bool {
        self.operations.contains_key(method)
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = MethodRegistry::new();
        registry.register("ping", |_params| async { Ok(json!("pong")) }).expect("first");
        let err = registry
            .register("ping", |_params| async { Ok(JsonValue::Null) })
            .expect_err("duplicate");
        assert!(matches!(err, RegistryError::Duplicate { ref method } if method == "ping"));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("ping"));
        assert!(!registry.contains("pong"));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = MethodRegistry::new();
        for name in ["sweep", "addresses", "sendTo"] {
            registry.register(name, |_params| async { Ok(JsonValue::Null) }).expect("register");
        }
        assert_eq!(registry.names(), vec!["addresses", "sendTo", "sweep"]);
    }

    #[test]
    fn ipc_errors_keep_their_wire_codes() {
        let timeout = OperationError::from(IpcError::LockTimeout).into_rpc_error();
        assert_eq!(timeout.code, code::LOCK_TIMEOUT);

        let wallet = OperationError::from(IpcError::wallet("Insufficient funds")).into_rpc_error();
        assert_eq!(wallet.code, code::OPERATION_FAILED);
        assert_eq!(wallet.message, "Insufficient funds");

        let params = OperationError::from(IpcError::InvalidParams { message: "bad".into() });
        assert_eq!(params.into_rpc_error().code, code::INVALID_PARAMS);
    }
}
