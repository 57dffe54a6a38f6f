//! # Relis
//!
//! A Redis-compatible key-value server that keeps its data in SQLite.
//!
//! Every command runs in its own database transaction. Keys carry a type tag
//! and an optional expiry; expired keys are invisible to readers and are
//! purged in the background.

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod glob;
pub mod resp;
pub mod server;
pub mod store;
pub mod types;
