#![doc = include_str!("../docs/rustdoc.md")]

/// Command-line argument definitions.
pub mod cli;
/// Task stream client, connection supervisor and command facade.
pub mod client;
/// Runtime configuration model and endpoint derivation.
pub mod config;
/// Connection lifecycle state machine.
pub mod connection;
/// Inbound event parsing and subscriber fan-out.
pub mod dispatch;
/// Error types used across the crate.
pub mod error;
/// Terminal output formatters.
pub mod formatter;
/// Metrics counters and exporter setup.
pub mod monitoring;
/// Tracing/logging initialization.
pub mod tracing_setup;
/// Transport primitives: WebSocket and SSE.
pub mod transport;
/// Event stream and command channel data models.
pub mod types;

/// Primary crate error type.
pub use error::TaskwireError;
