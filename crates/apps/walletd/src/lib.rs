//! The wallet daemon: configuration, startup and shutdown around the socket
//! server, plus an in-memory wallet for development and tests.

pub mod config;
pub mod daemon;
pub mod memory_wallet;
