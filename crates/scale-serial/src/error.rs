//! Connection-level errors

use thiserror::Error;

use crate::connection::{ConnectionState, FailureReason};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Serial ports are not supported in this environment")]
    UnsupportedEnvironment,

    #[error("A connection is already active ({0})")]
    AlreadyActive(ConnectionState),

    #[error("Invalid baud rate: {0}")]
    InvalidBaudRate(u32),

    #[error("Connection failed ({reason}): {source}")]
    Failed {
        reason: FailureReason,
        #[source]
        source: TransportError,
    },
}

impl ConnectionError {
    /// The failure reason published in the connection state, if any
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            ConnectionError::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
