//! Transport traits and types

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use super::TransportError;
use crate::config::LineSettings;

/// Kind of port reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Virtual,
    Unknown,
}

/// A port that device selection can pick
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    /// OS path or name of the port
    pub name: String,
    pub kind: PortKind,
    /// USB vendor ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    /// USB product ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
}

/// Platform capability for serial transports
///
/// Capability detection and device selection live here so the connection
/// manager never consults global state; tests hand it a mock instead.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Whether serial transports can be used at all in this environment
    fn is_supported(&self) -> bool;

    /// Enumerate ports available for selection
    async fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError>;

    /// Select a device and return an unopened transport for it
    async fn request_port(&self) -> Result<Arc<dyn SerialTransport>, TransportError>;
}

/// A selected serial device
///
/// Read-only: scales are never written to.
#[async_trait]
pub trait SerialTransport: Send + Sync {
    /// Human-readable port name
    fn name(&self) -> String;

    /// Open the port with the given line settings
    async fn open(&self, settings: &LineSettings) -> Result<(), TransportError>;

    /// Close the port. Closing an already closed port succeeds.
    async fn close(&self) -> Result<(), TransportError>;

    /// Acquire a reader on the readable side of an open port
    async fn reader(&self) -> Result<Box<dyn ChunkReader>, TransportError>;
}

/// Exclusive reader on a transport's byte stream
#[async_trait]
pub trait ChunkReader: Send {
    /// Wait for the next chunk
    ///
    /// Returns `Ok(None)` at end of stream. Must be cancel safe: dropping the
    /// future loses no data.
    async fn read(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Abort a pending read at the transport level
    async fn cancel(&mut self) -> Result<(), TransportError>;

    /// Give the stream back to the transport
    fn release(&mut self);
}
