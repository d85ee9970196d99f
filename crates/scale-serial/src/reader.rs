//! Stream reader loop
//!
//! One loop runs per active connection. It acquires a reader on the
//! transport, decodes and reassembles each chunk into frames, parses them and
//! publishes every successful reading. End of stream reacquires a reader,
//! read failures are recorded and retried per [`RetryPolicy`], and the
//! cancellation flag interrupts a pending read immediately. Streams that end
//! without delivering any data back off on the same schedule as failures but
//! never exhaust it.

use std::sync::Arc;
use std::time::Duration;

use scale_core::{parse_frame, ChunkDecoder, LineBuffer};
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::RetryPolicy;
use crate::state::PublishedState;
use crate::transport::{ChunkReader, SerialTransport, TransportError};

/// Why the loop stopped
#[derive(Debug)]
pub enum LoopExit {
    /// Disconnect requested. Carries the error from cancelling a pending read.
    Cancelled { cancel_error: Option<TransportError> },
    /// Consecutive failures reached the retry limit
    Exhausted {
        failures: u32,
        last_error: TransportError,
    },
}

/// Outcome of draining one reader
enum Drained {
    Cancelled(Option<TransportError>),
    EndOfStream,
    Failed(TransportError),
}

pub struct StreamReader {
    transport: Arc<dyn SerialTransport>,
    published: Arc<PublishedState>,
    retry: RetryPolicy,
    cancel: watch::Receiver<bool>,
    buffer: LineBuffer,
    decoder: ChunkDecoder,
    failures: u32,
    /// Consecutive end-of-stream cycles that carried no data
    idle_ends: u32,
}

impl StreamReader {
    pub fn new(
        transport: Arc<dyn SerialTransport>,
        published: Arc<PublishedState>,
        retry: RetryPolicy,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            published,
            retry,
            cancel,
            buffer: LineBuffer::new(),
            decoder: ChunkDecoder::new(),
            failures: 0,
            idle_ends: 0,
        }
    }

    pub async fn run(mut self) -> LoopExit {
        debug!(port = %self.transport.name(), "Reader loop started");

        let exit = loop {
            if self.is_cancelled() {
                break LoopExit::Cancelled { cancel_error: None };
            }

            let mut reader = match self.transport.reader().await {
                Ok(reader) => reader,
                Err(e) => match self.on_failure(e).await {
                    Some(exit) => break exit,
                    None => continue,
                },
            };

            let drained = self.drain(reader.as_mut()).await;
            reader.release();
            drop(reader);

            match drained {
                Drained::Cancelled(cancel_error) => break LoopExit::Cancelled { cancel_error },
                Drained::EndOfStream => {
                    self.idle_ends = self.idle_ends.saturating_add(1);
                    debug!(idle_ends = self.idle_ends, "End of stream, reacquiring reader");
                    let delay = self.retry.delay_for(self.idle_ends);
                    if self.sleep_unless_cancelled(delay).await {
                        break LoopExit::Cancelled { cancel_error: None };
                    }
                }
                Drained::Failed(e) => {
                    if let Some(exit) = self.on_failure(e).await {
                        break exit;
                    }
                }
            }
        };

        debug!(?exit, "Reader loop stopped");
        exit
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn drain(&mut self, reader: &mut dyn ChunkReader) -> Drained {
        loop {
            let result = tokio::select! {
                biased;
                _ = cancelled(&mut self.cancel) => {
                    return Drained::Cancelled(reader.cancel().await.err());
                }
                result = reader.read() => result,
            };

            match result {
                Ok(Some(chunk)) => {
                    self.failures = 0;
                    self.idle_ends = 0;
                    self.handle_chunk(&chunk);
                }
                Ok(None) => return Drained::EndOfStream,
                Err(e) => return Drained::Failed(e),
            }
        }
    }

    fn handle_chunk(&mut self, chunk: &[u8]) {
        trace!(len = chunk.len(), data = %hex::encode(chunk), "Chunk received");

        let text = self.decoder.decode(chunk);
        for frame in self.buffer.append(&text) {
            match parse_frame(&frame) {
                Some(reading) => {
                    trace!(value = reading.value(), unit = %reading.unit(), "Reading decoded");
                    self.published.publish_reading(reading);
                }
                None => trace!(frame = %frame, "Frame not decoded"),
            }
        }
    }

    /// Record a failure and wait out the backoff. Returns the exit when the
    /// loop must stop.
    async fn on_failure(&mut self, error: TransportError) -> Option<LoopExit> {
        self.failures = self.failures.saturating_add(1);
        warn!(error = %error, failures = self.failures, "Scale read failed");
        self.published.record_error(error.to_string());

        if self.retry.is_exhausted(self.failures) {
            return Some(LoopExit::Exhausted {
                failures: self.failures,
                last_error: error,
            });
        }

        let delay = self.retry.delay_for(self.failures);
        if self.sleep_unless_cancelled(delay).await {
            return Some(LoopExit::Cancelled { cancel_error: None });
        }
        None
    }

    /// Returns true if cancellation arrived first
    async fn sleep_unless_cancelled(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return self.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = cancelled(&mut self.cancel) => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}

/// Resolves once the flag is set or the manager side is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LineSettings, MockConfig};
    use crate::transport::mock::MockTransport;

    async fn open_mock() -> Arc<MockTransport> {
        let transport = Arc::new(MockTransport::new(&MockConfig::default()));
        transport.open(&LineSettings::default()).await.unwrap();
        transport
    }

    #[tokio::test]
    async fn test_cancel_interrupts_pending_read() {
        let transport = open_mock().await;
        let published = Arc::new(PublishedState::new());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let reader = StreamReader::new(
            transport.clone(),
            published,
            RetryPolicy::immediate(),
            cancel_rx,
        );
        let handle = tokio::spawn(reader.run());

        while transport.readers_acquired() == 0 {
            tokio::task::yield_now().await;
        }
        cancel_tx.send_replace(true);

        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, LoopExit::Cancelled { cancel_error: None }));
        assert_eq!(transport.cancel_count(), 1);
        assert_eq!(transport.readers_released(), 1);
    }

    #[tokio::test]
    async fn test_exhausts_after_consecutive_failures() {
        let transport = open_mock().await;
        for _ in 0..2 {
            transport.push_read_error("framing error");
        }

        let published = Arc::new(PublishedState::new());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let reader = StreamReader::new(
            transport.clone(),
            published.clone(),
            RetryPolicy::immediate().with_max_failures(2),
            cancel_rx,
        );

        let exit = tokio::time::timeout(Duration::from_secs(2), reader.run())
            .await
            .unwrap();
        match exit {
            LoopExit::Exhausted { failures, last_error } => {
                assert_eq!(failures, 2);
                assert_eq!(last_error, TransportError::ReadFailed("framing error".into()));
            }
            other => panic!("Expected exhaustion, got {:?}", other),
        }
        assert_eq!(transport.readers_acquired(), 2);
        assert_eq!(transport.readers_released(), 2);
        assert_eq!(
            published.error().as_deref(),
            Some("Read failed: framing error")
        );
    }

    #[tokio::test]
    async fn test_successful_chunk_resets_failures() {
        let transport = open_mock().await;
        transport.push_read_error("glitch");
        transport.push_frame("3 kg");
        transport.push_read_error("glitch");
        transport.push_frame("4 kg");

        let published = Arc::new(PublishedState::new());
        let mut readings = published.subscribe_readings();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = StreamReader::new(
            transport.clone(),
            published.clone(),
            RetryPolicy::immediate().with_max_failures(2),
            cancel_rx,
        );
        let handle = tokio::spawn(reader.run());

        tokio::time::timeout(
            Duration::from_secs(2),
            readings.wait_for(|r| r.as_ref().is_some_and(|r| r.value() == 4.0)),
        )
        .await
        .unwrap()
        .unwrap();

        cancel_tx.send_replace(true);
        let exit = handle.await.unwrap();
        assert!(matches!(exit, LoopExit::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_backoff_sleep_is_cancellable() {
        let transport = open_mock().await;
        transport.push_read_error("unplugged");

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = StreamReader::new(
            transport.clone(),
            Arc::new(PublishedState::new()),
            RetryPolicy::backoff(Duration::from_secs(60), Duration::from_secs(60)),
            cancel_rx,
        );
        let handle = tokio::spawn(reader.run());

        while transport.readers_released() == 0 {
            tokio::task::yield_now().await;
        }
        cancel_tx.send_replace(true);

        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, LoopExit::Cancelled { cancel_error: None }));
    }

    #[tokio::test]
    async fn test_idle_end_of_stream_backs_off() {
        let transport = open_mock().await;
        transport.end_stream();

        let published = Arc::new(PublishedState::new());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = StreamReader::new(
            transport.clone(),
            published.clone(),
            RetryPolicy::backoff(Duration::from_secs(60), Duration::from_secs(60))
                .with_max_failures(1),
            cancel_rx,
        );
        let handle = tokio::spawn(reader.run());

        while transport.readers_released() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Still waiting out the backoff, and an ended stream is not a failure
        assert_eq!(transport.readers_acquired(), 1);
        assert_eq!(published.error(), None);

        cancel_tx.send_replace(true);
        let exit = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(exit, LoopExit::Cancelled { cancel_error: None }));
    }

    #[tokio::test]
    async fn test_end_of_stream_after_data_reacquires_at_once() {
        let transport = open_mock().await;
        transport.push_frame("2 kg");
        transport.end_stream();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let reader = StreamReader::new(
            transport.clone(),
            Arc::new(PublishedState::new()),
            RetryPolicy::backoff(Duration::from_secs(60), Duration::from_secs(60)),
            cancel_rx,
        );
        let handle = tokio::spawn(reader.run());

        tokio::time::timeout(Duration::from_secs(2), async {
            while transport.readers_acquired() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        cancel_tx.send_replace(true);
        handle.await.unwrap();
    }
}
