//! Serial port adapter
//!
//! `serialport` is a blocking API. Opening runs on the blocking pool, and each
//! reader owns a cloned port handle polled by a blocking task that forwards
//! chunks over a channel. The port's read timeout bounds how long that task
//! takes to notice a cancel. The OS lock on the device is only dropped once
//! every cloned handle is closed, so `cancel` and `close` wait for the read
//! tasks to finish.

use std::io::{ErrorKind as IoErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serialport::SerialPort;
use tokio::sync::{mpsc, watch};

use super::scanner;
use crate::config::{FlowControl, LineSettings, Parity, SerialPortConfig};
use crate::transport::{ChunkReader, PortInfo, SerialTransport, TransportError, TransportProvider};

/// Chunks buffered between the blocking read task and the reader loop
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Slack on top of the read timeout when waiting for a read task to stop
const READ_TASK_STOP_GRACE: Duration = Duration::from_secs(1);

/// Serial capability of the host
pub struct SerialPortProvider {
    config: SerialPortConfig,
}

impl SerialPortProvider {
    pub fn new(config: &SerialPortConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl TransportProvider for SerialPortProvider {
    fn is_supported(&self) -> bool {
        // Enumeration can still fail later; that surfaces as a selection error
        cfg!(any(unix, windows))
    }

    async fn list_ports(&self) -> Result<Vec<PortInfo>, TransportError> {
        scanner::list_ports().await
    }

    async fn request_port(&self) -> Result<Arc<dyn SerialTransport>, TransportError> {
        let path = match &self.config.port {
            Some(path) => path.clone(),
            None => {
                let ports = scanner::list_ports().await?;
                let port = scanner::select_default(&ports).ok_or_else(|| {
                    TransportError::NoDeviceSelected("No serial ports found".to_string())
                })?;
                tracing::info!(port = %port.name, kind = ?port.kind, "Auto-selected serial port");
                port.name.clone()
            }
        };

        Ok(Arc::new(SerialPortTransport::new(path, &self.config)))
    }
}

/// A selected serial port
pub struct SerialPortTransport {
    path: String,
    config: SerialPortConfig,
    port: Mutex<Option<Box<dyn SerialPort>>>,
    read_tasks: Mutex<Vec<ReadTask>>,
}

impl SerialPortTransport {
    pub fn new(path: impl Into<String>, config: &SerialPortConfig) -> Self {
        Self {
            path: path.into(),
            config: config.clone(),
            port: Mutex::new(None),
            read_tasks: Mutex::new(Vec::new()),
        }
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.config.read_timeout_ms.max(1))
    }

    fn stop_grace(&self) -> Duration {
        self.read_timeout() + READ_TASK_STOP_GRACE
    }
}

#[async_trait]
impl SerialTransport for SerialPortTransport {
    fn name(&self) -> String {
        self.path.clone()
    }

    async fn open(&self, settings: &LineSettings) -> Result<(), TransportError> {
        if self.port.lock().is_some() {
            return Err(TransportError::Busy(format!("{} is already open", self.path)));
        }

        let builder = serialport::new(self.path.as_str(), settings.baud_rate)
            .data_bits(data_bits(settings.data_bits)?)
            .stop_bits(stop_bits(settings.stop_bits)?)
            .parity(parity(settings.parity))
            .flow_control(flow_control(settings.flow_control))
            .timeout(self.read_timeout());

        let path = self.path.clone();
        let port = tokio::task::spawn_blocking(move || builder.open())
            .await
            .map_err(|e| TransportError::OpenFailed(format!("Open task failed: {}", e)))?
            .map_err(|e| classify_open_error(&path, e))?;

        tracing::info!(
            port = %self.path,
            baud_rate = settings.baud_rate,
            "Serial port opened"
        );
        *self.port.lock() = Some(port);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let port = self.port.lock().take();
        let tasks = std::mem::take(&mut *self.read_tasks.lock());

        for task in &tasks {
            task.stop();
        }
        let mut stuck = 0usize;
        for task in &tasks {
            if !task.join(self.stop_grace()).await {
                stuck += 1;
            }
        }

        if port.is_some() {
            drop(port);
            tracing::info!(port = %self.path, "Serial port closed");
        }

        if stuck > 0 {
            return Err(TransportError::CloseFailed(format!(
                "{} read task(s) on {} did not stop",
                stuck, self.path
            )));
        }
        Ok(())
    }

    async fn reader(&self) -> Result<Box<dyn ChunkReader>, TransportError> {
        let port = {
            let guard = self.port.lock();
            let port = guard.as_ref().ok_or(TransportError::NotOpen)?;
            port.try_clone()
                .map_err(|e| TransportError::ReaderUnavailable(e.to_string()))?
        };

        let reader = SerialChunkReader::spawn(
            port,
            self.config.chunk_size.max(1),
            self.stop_grace(),
        );
        let mut tasks = self.read_tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(reader.task.clone());
        Ok(Box::new(reader))
    }
}

/// Handle on a blocking read task
#[derive(Clone)]
struct ReadTask {
    running: Arc<AtomicBool>,
    /// Closed once the task has dropped its port handle
    done: watch::Receiver<()>,
}

impl ReadTask {
    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.done.has_changed().is_err()
    }

    /// Wait for the task to exit. Returns false on timeout.
    async fn join(&self, timeout: Duration) -> bool {
        let mut done = self.done.clone();
        tokio::time::timeout(timeout, async {
            while done.changed().await.is_ok() {}
        })
        .await
        .is_ok()
    }
}

/// Reader fed by a blocking read task
pub struct SerialChunkReader {
    rx: mpsc::Receiver<Result<Bytes, TransportError>>,
    task: ReadTask,
    stop_grace: Duration,
}

impl SerialChunkReader {
    fn spawn(mut port: Box<dyn SerialPort>, chunk_size: usize, stop_grace: Duration) -> Self {
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let (done_tx, done) = watch::channel(());
        let running = Arc::new(AtomicBool::new(true));
        let running_task = running.clone();

        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; chunk_size];
            while running_task.load(Ordering::SeqCst) {
                match port.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                            break;
                        }
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            IoErrorKind::TimedOut
                                | IoErrorKind::WouldBlock
                                | IoErrorKind::Interrupted
                        ) => {}
                    Err(e) => {
                        let _ = tx.blocking_send(Err(TransportError::ReadFailed(e.to_string())));
                        break;
                    }
                }
            }
            drop(port);
            drop(done_tx);
            tracing::trace!("Serial read task stopped");
        });

        Self {
            rx,
            task: ReadTask { running, done },
            stop_grace,
        }
    }
}

#[async_trait]
impl ChunkReader for SerialChunkReader {
    async fn read(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn cancel(&mut self) -> Result<(), TransportError> {
        self.release();
        if self.task.join(self.stop_grace).await {
            Ok(())
        } else {
            Err(TransportError::CancelFailed(
                "Serial read task did not stop".to_string(),
            ))
        }
    }

    fn release(&mut self) {
        self.task.stop();
        self.rx.close();
    }
}

impl Drop for SerialChunkReader {
    fn drop(&mut self) {
        self.release();
    }
}

/// Map an open failure to the reasons the connection manager distinguishes
fn classify_open_error(path: &str, err: serialport::Error) -> TransportError {
    let message = format!("{}: {}", path, err.description);

    // A held port comes back as NoDevice on Linux ("Unable to acquire
    // exclusive lock"), so the text wins over the kind
    let lower = err.description.to_ascii_lowercase();
    if ["exclusive lock", "busy", "in use"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return TransportError::Busy(message);
    }

    match err.kind {
        serialport::ErrorKind::NoDevice => TransportError::NoDeviceSelected(message),
        serialport::ErrorKind::InvalidInput => TransportError::InvalidConfig(message),
        serialport::ErrorKind::Io(IoErrorKind::NotFound) => TransportError::NoDeviceSelected(message),
        serialport::ErrorKind::Io(IoErrorKind::PermissionDenied) => {
            TransportError::PermissionDenied(message)
        }
        _ => TransportError::OpenFailed(message),
    }
}

fn data_bits(bits: u8) -> Result<serialport::DataBits, TransportError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(TransportError::InvalidConfig(format!(
            "Unsupported data bits: {}",
            other
        ))),
    }
}

fn stop_bits(bits: u8) -> Result<serialport::StopBits, TransportError> {
    match bits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        other => Err(TransportError::InvalidConfig(format!(
            "Unsupported stop bits: {}",
            other
        ))),
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Software => serialport::FlowControl::Software,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_error(kind: serialport::ErrorKind, description: &str) -> TransportError {
        classify_open_error("/dev/ttyUSB0", serialport::Error::new(kind, description))
    }

    #[test]
    fn test_classify_open_errors() {
        assert!(matches!(
            open_error(serialport::ErrorKind::NoDevice, "gone"),
            TransportError::NoDeviceSelected(_)
        ));
        assert!(matches!(
            open_error(serialport::ErrorKind::Io(IoErrorKind::NotFound), "no such file"),
            TransportError::NoDeviceSelected(_)
        ));
        assert!(matches!(
            open_error(serialport::ErrorKind::Io(IoErrorKind::PermissionDenied), "denied"),
            TransportError::PermissionDenied(_)
        ));
        assert!(matches!(
            open_error(serialport::ErrorKind::Unknown, "Device or resource busy"),
            TransportError::Busy(_)
        ));
        assert!(matches!(
            open_error(
                serialport::ErrorKind::NoDevice,
                "Unable to acquire exclusive lock on serial port"
            ),
            TransportError::Busy(_)
        ));
        assert!(matches!(
            open_error(serialport::ErrorKind::InvalidInput, "bad baud"),
            TransportError::InvalidConfig(_)
        ));
        assert!(matches!(
            open_error(serialport::ErrorKind::Unknown, "weird"),
            TransportError::OpenFailed(_)
        ));
    }

    #[test]
    fn test_classified_message_names_port() {
        let err = open_error(serialport::ErrorKind::Unknown, "weird");
        assert_eq!(err.to_string(), "Open failed: /dev/ttyUSB0: weird");
    }

    #[test]
    fn test_line_setting_conversion() {
        assert_eq!(data_bits(8).unwrap(), serialport::DataBits::Eight);
        assert_eq!(stop_bits(1).unwrap(), serialport::StopBits::One);
        assert!(data_bits(9).is_err());
        assert!(stop_bits(3).is_err());
    }

    #[tokio::test]
    async fn test_reader_requires_open_port() {
        let transport = SerialPortTransport::new("/dev/null-scale", &SerialPortConfig::default());
        let err = transport.reader().await.err().unwrap();
        assert_eq!(err, TransportError::NotOpen);
        // Closing a never-opened port is fine
        transport.close().await.unwrap();
    }

    #[test]
    fn test_supported_on_desktop_platforms() {
        let provider = SerialPortProvider::new(&SerialPortConfig::default());
        assert_eq!(provider.is_supported(), cfg!(any(unix, windows)));
    }

    #[cfg(unix)]
    mod pty {
        use super::*;
        use crate::connection::FailureReason;
        use serialport::TTYPort;

        /// A pseudo terminal pair. The master end must outlive the test.
        fn pty_pair() -> Option<(TTYPort, String)> {
            let (master, slave) = TTYPort::pair().ok()?;
            let path = slave.name()?;
            Some((master, path))
        }

        fn pty_config(read_timeout_ms: u64) -> SerialPortConfig {
            SerialPortConfig {
                read_timeout_ms,
                ..SerialPortConfig::default()
            }
        }

        #[tokio::test(flavor = "multi_thread")]
        async fn test_second_opener_is_already_in_use() {
            let Some((_master, path)) = pty_pair() else {
                return;
            };
            let first = SerialPortTransport::new(path.as_str(), &pty_config(100));
            let second = SerialPortTransport::new(path.as_str(), &pty_config(100));

            first.open(&LineSettings::default()).await.unwrap();
            let err = second.open(&LineSettings::default()).await.unwrap_err();

            assert!(matches!(err, TransportError::Busy(_)), "{:?}", err);
            assert_eq!(FailureReason::from(&err), FailureReason::AlreadyInUse);
            first.close().await.unwrap();
        }

        #[tokio::test(flavor = "multi_thread")]
        async fn test_reopen_right_after_cancel_and_close() {
            let Some((_master, path)) = pty_pair() else {
                return;
            };
            // A long read timeout keeps the read task parked in the OS read
            let transport = SerialPortTransport::new(path.as_str(), &pty_config(1000));
            transport.open(&LineSettings::default()).await.unwrap();

            let mut reader = transport.reader().await.unwrap();
            reader.cancel().await.unwrap();
            reader.release();
            drop(reader);
            transport.close().await.unwrap();

            let reopened = SerialPortTransport::new(path.as_str(), &pty_config(1000));
            reopened.open(&LineSettings::default()).await.unwrap();
            reopened.close().await.unwrap();
        }

        #[tokio::test(flavor = "multi_thread")]
        async fn test_close_waits_for_released_reader() {
            let Some((_master, path)) = pty_pair() else {
                return;
            };
            let transport = SerialPortTransport::new(path.as_str(), &pty_config(1000));
            transport.open(&LineSettings::default()).await.unwrap();

            // Released without a cancel, as an aborted loop would leave it
            let reader = transport.reader().await.unwrap();
            drop(reader);
            transport.close().await.unwrap();

            transport.open(&LineSettings::default()).await.unwrap();
            transport.close().await.unwrap();
        }
    }
}
