//! Transport layer for scale communication
//!
//! This module provides the transports a scale can be read through:
//! - Serial adapter backed by the `serialport` crate
//! - Mock adapter for testing and demos
//!
//! # Example
//!
//! ```ignore
//! use scale_serial::transport::create_provider;
//! use scale_serial::config::TransportConfig;
//!
//! let provider = create_provider(&TransportConfig::default())?;
//! let port = provider.request_port().await?;
//! port.open(&LineSettings::new(9600)).await?;
//! let mut reader = port.reader().await?;
//! while let Some(chunk) = reader.read().await? { /* ... */ }
//! ```

mod adapter;
pub mod error;
pub mod mock;

#[cfg(feature = "serial")]
pub mod serial;

pub use adapter::{ChunkReader, PortInfo, PortKind, SerialTransport, TransportProvider};
pub use error::TransportError;

use std::sync::Arc;

use crate::config::TransportConfig;

/// Create a transport provider based on configuration
pub fn create_provider(
    config: &TransportConfig,
) -> Result<Arc<dyn TransportProvider>, TransportError> {
    match config {
        #[cfg(feature = "serial")]
        TransportConfig::Serial(cfg) => Ok(Arc::new(serial::SerialPortProvider::new(cfg))),
        #[cfg(not(feature = "serial"))]
        TransportConfig::Serial(_) => Err(TransportError::Unsupported(
            "Serial ports require the 'serial' feature".to_string(),
        )),
        TransportConfig::Mock(cfg) => Ok(Arc::new(mock::MockTransportProvider::new(cfg))),
    }
}
