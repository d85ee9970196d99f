//! Mock transport for testing
//!
//! The mock stands in for the platform serial capability. Tests script the
//! byte stream (`push_chunk`, `end_stream`, `push_read_error`), inject
//! failures into every lifecycle call, and inspect call counters afterwards.
//! Configured with frames, it also plays them back on a timer, which makes a
//! usable demo device.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ChunkReader, PortInfo, PortKind, SerialTransport, TransportError, TransportProvider};
use crate::config::{LineSettings, MockConfig};

const MOCK_PORT_NAME: &str = "mock0";

#[derive(Debug)]
enum MockEvent {
    Chunk(Bytes),
    EndOfStream,
    Error(String),
}

/// Mock serial capability
pub struct MockTransportProvider {
    supported: AtomicBool,
    transport: Arc<MockTransport>,
    request_failure: Mutex<Option<TransportError>>,
    requests: AtomicUsize,
}

impl MockTransportProvider {
    pub fn new(config: &MockConfig) -> Self {
        Self {
            supported: AtomicBool::new(true),
            transport: Arc::new(MockTransport::new(config)),
            request_failure: Mutex::new(None),
            requests: AtomicUsize::new(0),
        }
    }

    /// A provider for an environment without serial support
    pub fn unsupported() -> Self {
        let provider = Self::new(&MockConfig::default());
        provider.set_supported(false);
        provider
    }

    pub fn set_supported(&self, supported: bool) {
        self.supported.store(supported, Ordering::SeqCst);
    }

    /// The single device this provider hands out
    pub fn transport(&self) -> Arc<MockTransport> {
        self.transport.clone()
    }

    /// Make the next device selection fail
    pub fn fail_next_request(&self, error: TransportError) {
        *self.request_failure.lock() = Some(error);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportProvider for MockTransportProvider {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    async fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        if !self.is_supported() {
            return Err(TransportError::Unsupported("mock disabled".to_string()));
        }
        Ok(vec![PortInfo {
            name: MOCK_PORT_NAME.to_string(),
            kind: PortKind::Virtual,
            vid: None,
            pid: None,
            manufacturer: Some("Mock".to_string()),
            product: Some("Simulated scale".to_string()),
            serial_number: None,
        }])
    }

    async fn request_port(&self) -> Result<Arc<dyn SerialTransport>, TransportError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.request_failure.lock().take() {
            return Err(error);
        }
        Ok(self.transport.clone())
    }
}

/// State shared between the mock port and its readers
struct MockShared {
    events_tx: mpsc::UnboundedSender<MockEvent>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockEvent>>,
    open: AtomicBool,
    fail_cancel: AtomicBool,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    readers_acquired: AtomicUsize,
    readers_released: AtomicUsize,
}

/// Mock serial port
///
/// Events pushed while no reader is attached are queued and delivered to the
/// next reader.
pub struct MockTransport {
    config: MockConfig,
    shared: Arc<MockShared>,
    settings: Mutex<Option<LineSettings>>,
    open_failure: Mutex<Option<TransportError>>,
    reader_failures: Mutex<VecDeque<TransportError>>,
    fail_close: AtomicBool,
    playback: Mutex<Option<JoinHandle<()>>>,
}

impl MockTransport {
    pub fn new(config: &MockConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config: config.clone(),
            shared: Arc::new(MockShared {
                events_tx,
                events_rx: tokio::sync::Mutex::new(events_rx),
                open: AtomicBool::new(false),
                fail_cancel: AtomicBool::new(false),
                open_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                cancel_calls: AtomicUsize::new(0),
                readers_acquired: AtomicUsize::new(0),
                readers_released: AtomicUsize::new(0),
            }),
            settings: Mutex::new(None),
            open_failure: Mutex::new(None),
            reader_failures: Mutex::new(VecDeque::new()),
            fail_close: AtomicBool::new(false),
            playback: Mutex::new(None),
        }
    }

    /// Queue raw bytes on the stream
    pub fn push_chunk(&self, chunk: &[u8]) {
        self.push(MockEvent::Chunk(Bytes::copy_from_slice(chunk)));
    }

    /// Queue one frame followed by CRLF
    pub fn push_frame(&self, frame: &str) {
        self.push(MockEvent::Chunk(Bytes::from(format!("{}\r\n", frame))));
    }

    /// End the current reader's stream (the device reset its output)
    pub fn end_stream(&self) {
        self.push(MockEvent::EndOfStream);
    }

    /// Fail the pending or next read
    pub fn push_read_error(&self, message: &str) {
        self.push(MockEvent::Error(message.to_string()));
    }

    fn push(&self, event: MockEvent) {
        // The receiver lives as long as the transport
        let _ = self.shared.events_tx.send(event);
    }

    /// Make the next `open()` fail
    pub fn fail_next_open(&self, error: TransportError) {
        *self.open_failure.lock() = Some(error);
    }

    /// Make the next reader acquisition fail
    pub fn fail_next_reader(&self, error: TransportError) {
        self.reader_failures.lock().push_back(error);
    }

    pub fn set_fail_cancel(&self, fail: bool) {
        self.shared.fail_cancel.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Line settings of the most recent successful `open()`
    pub fn opened_settings(&self) -> Option<LineSettings> {
        *self.settings.lock()
    }

    pub fn open_count(&self) -> usize {
        self.shared.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.shared.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn readers_acquired(&self) -> usize {
        self.shared.readers_acquired.load(Ordering::SeqCst)
    }

    pub fn readers_released(&self) -> usize {
        self.shared.readers_released.load(Ordering::SeqCst)
    }

    fn start_playback(&self) {
        if self.config.frames.is_empty() {
            return;
        }

        let events_tx = self.shared.events_tx.clone();
        let frames = self.config.frames.clone();
        let interval = Duration::from_millis(self.config.interval_ms.max(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for frame in frames.iter().cycle() {
                ticker.tick().await;
                let chunk = Bytes::from(format!("{}\r\n", frame));
                if events_tx.send(MockEvent::Chunk(chunk)).is_err() {
                    break;
                }
            }
        });

        if let Some(previous) = self.playback.lock().replace(handle) {
            previous.abort();
        }
        tracing::debug!(frames = self.config.frames.len(), "Mock playback started");
    }

    fn stop_playback(&self) {
        if let Some(handle) = self.playback.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.playback.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl SerialTransport for MockTransport {
    fn name(&self) -> String {
        MOCK_PORT_NAME.to_string()
    }

    async fn open(&self, settings: &LineSettings) -> Result<(), TransportError> {
        self.shared.open_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.open_failure.lock().take() {
            return Err(error);
        }

        *self.settings.lock() = Some(*settings);
        self.shared.open.store(true, Ordering::SeqCst);
        self.start_playback();

        tracing::debug!(baud_rate = settings.baud_rate, "Mock transport: opened");
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.stop_playback();
        self.shared.open.store(false, Ordering::SeqCst);

        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::CloseFailed("mock close failure".to_string()));
        }
        Ok(())
    }

    async fn reader(&self) -> Result<Box<dyn ChunkReader>, TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        if let Some(error) = self.reader_failures.lock().pop_front() {
            return Err(error);
        }

        self.shared.readers_acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockChunkReader {
            shared: self.shared.clone(),
            released: false,
        }))
    }
}

/// Reader handed out by [`MockTransport`]
pub struct MockChunkReader {
    shared: Arc<MockShared>,
    released: bool,
}

#[async_trait]
impl ChunkReader for MockChunkReader {
    async fn read(&mut self) -> Result<Option<Bytes>, TransportError> {
        let mut events = self.shared.events_rx.lock().await;
        match events.recv().await {
            Some(MockEvent::Chunk(chunk)) => Ok(Some(chunk)),
            Some(MockEvent::EndOfStream) | None => Ok(None),
            Some(MockEvent::Error(message)) => Err(TransportError::ReadFailed(message)),
        }
    }

    async fn cancel(&mut self) -> Result<(), TransportError> {
        self.shared.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.shared.fail_cancel.load(Ordering::SeqCst) {
            return Err(TransportError::CancelFailed(
                "mock cancel failure".to_string(),
            ));
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.readers_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MockChunkReader {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_requires_open_port() {
        let transport = MockTransport::new(&MockConfig::default());
        let err = transport.reader().await.err().unwrap();
        assert_eq!(err, TransportError::NotOpen);
    }

    #[tokio::test]
    async fn test_scripted_stream() {
        let transport = MockTransport::new(&MockConfig::default());
        transport.open(&LineSettings::new(9600)).await.unwrap();

        transport.push_frame("12 kg");
        transport.push_read_error("parity");
        transport.end_stream();

        let mut reader = transport.reader().await.unwrap();
        assert_eq!(
            reader.read().await.unwrap(),
            Some(Bytes::from_static(b"12 kg\r\n"))
        );
        assert_eq!(
            reader.read().await.unwrap_err(),
            TransportError::ReadFailed("parity".to_string())
        );
        assert_eq!(reader.read().await.unwrap(), None);

        reader.release();
        drop(reader);
        assert_eq!(transport.readers_acquired(), 1);
        assert_eq!(transport.readers_released(), 1);
    }

    #[tokio::test]
    async fn test_playback_replays_frames() {
        let config = MockConfig {
            frames: vec!["1,ST,100,0,kg".to_string()],
            interval_ms: 1,
        };
        let transport = MockTransport::new(&config);
        transport.open(&LineSettings::new(9600)).await.unwrap();

        let mut reader = transport.reader().await.unwrap();
        let first = reader.read().await.unwrap();
        let second = reader.read().await.unwrap();
        assert_eq!(first, Some(Bytes::from_static(b"1,ST,100,0,kg\r\n")));
        assert_eq!(first, second);

        transport.close().await.unwrap();
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_unsupported_provider() {
        let provider = MockTransportProvider::unsupported();
        assert!(!provider.is_supported());
        assert!(provider.list_ports().await.is_err());
    }

    #[tokio::test]
    async fn test_request_failure_is_one_shot() {
        let provider = MockTransportProvider::new(&MockConfig::default());
        provider.fail_next_request(TransportError::NoDeviceSelected("cancelled".into()));

        assert!(provider.request_port().await.is_err());
        assert!(provider.request_port().await.is_ok());
        assert_eq!(provider.request_count(), 2);
    }
}
