//! Unix socket server for the wallet daemon.
//!
//! One [`Server`] listens on the per-user socket, runs one connection
//! handler task per client and funnels every dispatched operation through a
//! single [`MutationLock`]. Many clients may be connected at once; exactly
//! one wallet operation runs at a time.
//!
//! Startup goes through the [`liveness`] prober so a second daemon on the
//! same path fails fast and a crashed daemon's socket file is cleaned up.

mod dispatch;
mod error;
mod handler;
pub mod liveness;
mod lock;
mod registry;
mod server;
mod wallet_methods;

pub use dispatch::{decode_request, dispatch};
pub use error::ServerError;
pub use liveness::{probe_liveness, Liveness};
pub use lock::MutationLock;
pub use registry::{MethodRegistry, OperationError, OperationFuture, OperationResult, RegistryError};
pub use server::{
    RequestObserver, RunningServer, Server, ServerConfig, DEFAULT_LOCK_TIMEOUT,
    DEFAULT_POLL_INTERVAL,
};
pub use wallet_methods::register_wallet;
