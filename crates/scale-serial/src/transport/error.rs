//! Transport layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Serial transport not supported: {0}")]
    Unsupported(String),

    #[error("No device selected: {0}")]
    NoDeviceSelected(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device busy: {0}")]
    Busy(String),

    #[error("Open failed: {0}")]
    OpenFailed(String),

    #[error("Port not open")]
    NotOpen,

    #[error("Reader unavailable: {0}")]
    ReaderUnavailable(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Cancel failed: {0}")]
    CancelFailed(String),

    #[error("Close failed: {0}")]
    CloseFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
