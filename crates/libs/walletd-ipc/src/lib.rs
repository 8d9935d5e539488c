//! Wire contract between the wallet daemon and its short-lived clients.
//!
//! The daemon (`walletd`) owns the wallet state; CLI invocations reach it
//! through a per-user Unix domain socket. This crate holds everything both
//! sides agree on:
//!
//! - **Wire types**: [`Request`], [`Response`], [`RpcError`] and the numeric
//!   error [`code`]s
//! - **Framing**: one JSON object per line, see [`codec`]
//! - **Socket identity**: [`resolve_socket_path`] derives the per-user path
//! - **[`WalletApi`]**: the typed list of every operation the daemon serves
//! - **[`WalletClient`]**: the client proxy, itself a `WalletApi`
//! - **[`IpcError`]**: client-visible failures, including the lifecycle
//!   conditions surfaced to operators as [`LifecycleExit`] codes

pub mod client;
pub mod codec;
pub mod error;
pub mod socket;
pub mod types;
pub mod wallet;

pub use client::WalletClient;
pub use error::{IpcError, LifecycleExit};
pub use socket::{current_user, resolve_socket_path, socket_path_in};
pub use types::*;
pub use wallet::{methods, AccountInfo, AddressBalance, SendRequest, TxRecord, WalletApi};
