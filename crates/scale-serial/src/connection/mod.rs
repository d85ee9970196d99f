//! Connection lifecycle
//!
//! ```text
//!                 connect()                 open ok
//!  Disconnected ────────────► Connecting ────────────► Connected
//!       ▲                         │                       │
//!       │ disconnect()            │ select/open failed    │ retries exhausted
//!       │                         ▼                       ▼
//!       └──────────────────── Error(reason) ◄─────────────┘
//! ```
//!
//! `disconnect()` returns to `Disconnected` from every state.

mod manager;

pub use manager::ConnectionManager;

use std::fmt;

use serde::Serialize;

use crate::transport::TransportError;

/// Why a connection ended up in the error state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Device selection was cancelled or found nothing
    DeviceNotSelected,
    PermissionDenied,
    /// Another process holds the port
    AlreadyInUse,
    Other,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::DeviceNotSelected => "device not selected",
            FailureReason::PermissionDenied => "permission denied",
            FailureReason::AlreadyInUse => "already in use",
            FailureReason::Other => "other",
        };
        f.write_str(text)
    }
}

impl From<&TransportError> for FailureReason {
    fn from(error: &TransportError) -> Self {
        match error {
            TransportError::NoDeviceSelected(_) => FailureReason::DeviceNotSelected,
            TransportError::PermissionDenied(_) => FailureReason::PermissionDenied,
            TransportError::Busy(_) => FailureReason::AlreadyInUse,
            _ => FailureReason::Other,
        }
    }
}

/// Connection state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error(FailureReason),
}

impl ConnectionState {
    /// Connecting or connected; a new `connect()` is refused
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Error(reason) => write!(f, "error ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_from_transport_error() {
        let cases = [
            (
                TransportError::NoDeviceSelected("x".into()),
                FailureReason::DeviceNotSelected,
            ),
            (
                TransportError::PermissionDenied("x".into()),
                FailureReason::PermissionDenied,
            ),
            (TransportError::Busy("x".into()), FailureReason::AlreadyInUse),
            (TransportError::OpenFailed("x".into()), FailureReason::Other),
            (TransportError::NotOpen, FailureReason::Other),
        ];
        for (error, expected) in cases {
            assert_eq!(FailureReason::from(&error), expected, "{:?}", error);
        }
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(ConnectionState::Error(FailureReason::AlreadyInUse)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "error", "reason": "already_in_use"})
        );

        let json = serde_json::to_value(ConnectionState::Connected).unwrap();
        assert_eq!(json, serde_json::json!({"status": "connected"}));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(
            ConnectionState::Error(FailureReason::PermissionDenied).to_string(),
            "error (permission denied)"
        );
    }
}
