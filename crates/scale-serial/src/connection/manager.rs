//! Connection manager for a serial scale

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use scale_core::Reading;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ConnectionState, FailureReason};
use crate::config::{LineSettings, RetryPolicy, ScaleConfig};
use crate::error::ConnectionError;
use crate::reader::{LoopExit, StreamReader};
use crate::state::{PublishedState, ScaleStatus};
use crate::transport::{create_provider, SerialTransport, TransportError, TransportProvider};

/// How long `disconnect()` waits for the reader loop before aborting it
const LOOP_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct ActiveConnection {
    id: Uuid,
    transport: Arc<dyn SerialTransport>,
    settings: LineSettings,
    cancel_tx: watch::Sender<bool>,
    loop_handle: JoinHandle<LoopExit>,
}

/// Owns the transport and the connection state machine
///
/// At most one connection is active at a time. Everything observable goes
/// through [`PublishedState`], so the accessors never block on an in-flight
/// `connect()` or `disconnect()`.
pub struct ConnectionManager {
    provider: Arc<dyn TransportProvider>,
    published: Arc<PublishedState>,
    baud_rate: RwLock<u32>,
    retry: RetryPolicy,
    active: Mutex<Option<ActiveConnection>>,
}

impl ConnectionManager {
    pub fn new(provider: Arc<dyn TransportProvider>, config: &ScaleConfig) -> Self {
        Self {
            provider,
            published: Arc::new(PublishedState::new()),
            baud_rate: RwLock::new(config.baud_rate),
            retry: config.retry.clone(),
            active: Mutex::new(None),
        }
    }

    /// Build the transport provider described by the configuration
    pub fn from_config(config: &ScaleConfig) -> Result<Self, TransportError> {
        let provider = create_provider(&config.transport)?;
        Ok(Self::new(provider, config))
    }

    pub fn provider(&self) -> &Arc<dyn TransportProvider> {
        &self.provider
    }

    pub fn is_supported(&self) -> bool {
        self.provider.is_supported()
    }

    pub fn state(&self) -> ConnectionState {
        self.published.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn last_reading(&self) -> Option<Reading> {
        self.published.last_reading()
    }

    pub fn error(&self) -> Option<String> {
        self.published.error()
    }

    pub fn baud_rate(&self) -> u32 {
        *self.baud_rate.read()
    }

    /// Set the line speed for the next `connect()`
    ///
    /// An active connection keeps the speed it was opened with.
    pub fn set_baud_rate(&self, baud_rate: u32) -> Result<(), ConnectionError> {
        if baud_rate == 0 {
            return Err(ConnectionError::InvalidBaudRate(baud_rate));
        }
        *self.baud_rate.write() = baud_rate;
        debug!(baud_rate, "Baud rate set");
        Ok(())
    }

    pub fn snapshot(&self) -> ScaleStatus {
        let state = self.state();
        ScaleStatus {
            state,
            connected: state == ConnectionState::Connected,
            connecting: state == ConnectionState::Connecting,
            last_reading: self.last_reading(),
            error: self.error(),
            baud_rate: self.baud_rate(),
        }
    }

    pub fn subscribe_readings(&self) -> watch::Receiver<Option<Reading>> {
        self.published.subscribe_readings()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.published.subscribe_state()
    }

    /// Name of the port in use, while connected
    pub async fn port_name(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|c| c.transport.name())
    }

    /// Line settings the active connection was opened with
    pub async fn active_settings(&self) -> Option<LineSettings> {
        self.active.lock().await.as_ref().map(|c| c.settings)
    }

    /// Select a device, open it and start the reader loop
    ///
    /// The outcome is also mirrored into the published state, so callers that
    /// only watch state may ignore the result.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        if !self.provider.is_supported() {
            let err = ConnectionError::UnsupportedEnvironment;
            warn!("{}", err);
            self.published.record_error(err.to_string());
            return Err(err);
        }

        let current = self.published.state();
        if current.is_active() {
            return Err(ConnectionError::AlreadyActive(current));
        }

        let mut active = self.active.lock().await;
        self.published
            .try_begin_connecting()
            .map_err(ConnectionError::AlreadyActive)?;

        // A loop that gave up leaves its connection behind until now
        if let Some(stale) = active.take() {
            debug!(id = %stale.id, "Releasing stale connection");
            for message in teardown(stale).await {
                debug!(error = %message, "Stale connection teardown error");
            }
        }

        let settings = LineSettings::new(self.baud_rate());
        info!(baud_rate = settings.baud_rate, "Connecting to scale");

        let transport = match self.provider.request_port().await {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail(e)),
        };
        if let Err(e) = transport.open(&settings).await {
            return Err(self.fail(e));
        }

        let id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = StreamReader::new(
            transport.clone(),
            self.published.clone(),
            self.retry.clone(),
            cancel_rx,
        );

        self.published.clear_error();
        self.published.set_state(ConnectionState::Connected);
        let loop_handle = tokio::spawn(supervise(reader, self.published.clone(), id));

        info!(%id, port = %transport.name(), "Scale connected");
        *active = Some(ActiveConnection {
            id,
            transport,
            settings,
            cancel_tx,
            loop_handle,
        });
        Ok(())
    }

    fn fail(&self, error: TransportError) -> ConnectionError {
        let reason = FailureReason::from(&error);
        warn!(%reason, error = %error, "Scale connection failed");
        self.published.record_error(error.to_string());
        self.published.set_state(ConnectionState::Error(reason));
        ConnectionError::Failed {
            reason,
            source: error,
        }
    }

    /// Stop the reader loop and close the transport
    ///
    /// Always ends in `Disconnected` with no reading. Cancel and close
    /// failures are recorded as the error; a clean teardown clears it.
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;

        let errors = match active.take() {
            Some(connection) => {
                let id = connection.id;
                let errors = teardown(connection).await;
                info!(%id, "Scale disconnected");
                errors
            }
            None => Vec::new(),
        };

        self.published.clear_reading();
        if errors.is_empty() {
            self.published.clear_error();
        } else {
            warn!(errors = ?errors, "Scale teardown reported errors");
            self.published.record_error(errors.join("; "));
        }
        self.published.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(connection) = self.active.get_mut().take() {
            connection.cancel_tx.send_replace(true);
            connection.loop_handle.abort();
        }
    }
}

/// Run the reader loop, moving the connection to `Error(Other)` when the
/// transport turns out to be unusable
async fn supervise(reader: StreamReader, published: Arc<PublishedState>, id: Uuid) -> LoopExit {
    let exit = reader.run().await;
    if let LoopExit::Exhausted {
        failures,
        last_error,
    } = &exit
    {
        error!(%id, failures, error = %last_error, "Giving up on scale transport");
        published.record_error(format!(
            "Giving up after {} consecutive read failures: {}",
            failures, last_error
        ));
        published.clear_reading();
        published.set_state(ConnectionState::Error(FailureReason::Other));
    }
    exit
}

/// Cancel the loop, wait for it to exit and close the transport. Returns the
/// failures encountered along the way.
async fn teardown(connection: ActiveConnection) -> Vec<String> {
    let ActiveConnection {
        transport,
        cancel_tx,
        mut loop_handle,
        ..
    } = connection;
    let mut errors = Vec::new();

    cancel_tx.send_replace(true);
    match tokio::time::timeout(LOOP_SHUTDOWN_GRACE, &mut loop_handle).await {
        Ok(Ok(LoopExit::Cancelled {
            cancel_error: Some(e),
        })) => errors.push(e.to_string()),
        Ok(Ok(_)) => {}
        Ok(Err(e)) => errors.push(format!("Reader task failed: {}", e)),
        Err(_) => {
            warn!("Reader loop did not stop in time, aborting");
            loop_handle.abort();
            errors.push("Reader loop did not stop in time".to_string());
        }
    }

    if let Err(e) = transport.close().await {
        errors.push(e.to_string());
    }
    errors
}
