//! Published scale state
//!
//! What observers see: the connection state, the most recent reading and the
//! last error. State and reading live in `watch` channels so UIs can await
//! changes instead of polling; sends never fail for lack of receivers.

use parking_lot::RwLock;
use scale_core::Reading;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::connection::ConnectionState;

pub struct PublishedState {
    state_tx: watch::Sender<ConnectionState>,
    reading_tx: watch::Sender<Option<Reading>>,
    error: RwLock<Option<String>>,
}

impl Default for PublishedState {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishedState {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (reading_tx, _) = watch::channel(None);
        Self {
            state_tx,
            reading_tx,
            error: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Move to `Connecting` unless a connection is already active
    ///
    /// Check and transition happen atomically; on refusal the current state
    /// is returned and nothing changes.
    pub fn try_begin_connecting(&self) -> Result<(), ConnectionState> {
        let mut refused = None;
        self.state_tx.send_if_modified(|state| {
            if state.is_active() {
                refused = Some(*state);
                false
            } else {
                *state = ConnectionState::Connecting;
                true
            }
        });
        match refused {
            Some(state) => Err(state),
            None => {
                debug!("State: connecting");
                Ok(())
            }
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "State changed");
        }
    }

    pub fn last_reading(&self) -> Option<Reading> {
        self.reading_tx.borrow().clone()
    }

    pub fn publish_reading(&self, reading: Reading) {
        self.reading_tx.send_replace(Some(reading));
    }

    pub fn clear_reading(&self) {
        self.reading_tx.send_replace(None);
    }

    pub fn error(&self) -> Option<String> {
        self.error.read().clone()
    }

    pub fn record_error(&self, message: impl Into<String>) {
        *self.error.write() = Some(message.into());
    }

    pub fn clear_error(&self) {
        *self.error.write() = None;
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_readings(&self) -> watch::Receiver<Option<Reading>> {
        self.reading_tx.subscribe()
    }
}

/// Serializable snapshot of a connection manager
#[derive(Debug, Clone, Serialize)]
pub struct ScaleStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub connecting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reading: Option<Reading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub baud_rate: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::FailureReason;
    use chrono::Utc;
    use scale_core::WeightUnit;

    #[test]
    fn test_begin_connecting_from_idle_states() {
        let published = PublishedState::new();
        assert_eq!(published.try_begin_connecting(), Ok(()));
        assert_eq!(published.state(), ConnectionState::Connecting);

        published.set_state(ConnectionState::Error(FailureReason::Other));
        assert_eq!(published.try_begin_connecting(), Ok(()));
    }

    #[test]
    fn test_begin_connecting_refused_while_active() {
        let published = PublishedState::new();
        published.set_state(ConnectionState::Connected);

        assert_eq!(
            published.try_begin_connecting(),
            Err(ConnectionState::Connected)
        );
        assert_eq!(published.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_subscribers_see_latest_reading() {
        let published = PublishedState::new();
        let mut rx = published.subscribe_readings();

        let reading = Reading::new(1.5, WeightUnit::Kilogram, "1.5kg", Utc::now()).unwrap();
        published.publish_reading(reading.clone());

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&reading));

        published.clear_reading();
        assert!(published.last_reading().is_none());
    }

    #[test]
    fn test_error_field() {
        let published = PublishedState::new();
        published.record_error("boom");
        assert_eq!(published.error().as_deref(), Some("boom"));
        published.clear_error();
        assert_eq!(published.error(), None);
    }
}
