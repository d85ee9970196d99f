//! scale-serial - Live serial scale reader
//!
//! This crate connects to a weighing device over a serial line and keeps the
//! most recent weight reading published for display.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConnectionManager                         │
//! │  connect() / disconnect(), state machine                    │
//! │                                                             │
//! │  ┌──────────────────┐         ┌──────────────────────────┐  │
//! │  │ PublishedState   │◄────────│ StreamReader (task)      │  │
//! │  │ state / reading  │ publish │ ChunkDecoder, LineBuffer │  │
//! │  │ error            │         │ parse_frame, retry       │  │
//! │  └──────────────────┘         └────────────┬─────────────┘  │
//! │                                            │ read()         │
//! │                 ┌──────────────────────────┴──────┐         │
//! │                 │ TransportProvider / Transport   │         │
//! │                 │ (serialport / mock)             │         │
//! │                 └─────────────────────────────────┘         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod connection;
pub mod error;
mod reader;
pub mod state;
pub mod transport;

pub use config::{LineSettings, RetryPolicy, ScaleConfig, TransportConfig};
pub use connection::{ConnectionManager, ConnectionState, FailureReason};
pub use error::ConnectionError;
pub use reader::LoopExit;
pub use state::{PublishedState, ScaleStatus};
pub use transport::{create_provider, PortInfo, PortKind, TransportError, TransportProvider};

// Re-export serial port enumeration (serial feature only)
#[cfg(feature = "serial")]
pub use transport::serial::scanner;

// Re-export for convenience
pub use scale_core::{parse_frame, Reading, WeightUnit};
