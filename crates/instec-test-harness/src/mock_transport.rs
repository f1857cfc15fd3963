//! Mock transport for deterministic testing of the command channel.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/reply pairs. Each `send()` is matched against the next expected
//! request; the paired reply is then handed out by `receive()`, at most
//! `chunk_size` bytes per call, so reply reassembly can be exercised.
//!
//! The transport is usually moved into a controller as a
//! `Box<dyn Transport>`; keep a [`MockMonitor`] to inspect what was sent.
//!
//! # Example
//!
//! ```
//! use instec_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! mock.expect(b"TEMP:SNUM?\n", b"A1B2C3\r\n");
//! mock.expect_write(b"TEMP:STOP\n");
//! let monitor = mock.monitor();
//! assert_eq!(monitor.remaining_expectations(), 2);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use instec_core::error::{Error, Result};
use instec_core::transport::Transport;

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    /// Empty for fire-and-forget writes.
    response: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    sent_log: Vec<Vec<u8>>,
}

/// A mock [`Transport`] for testing protocol code without hardware.
///
/// Expectations are consumed in order. A send that does not match the next
/// expectation, or a send with no expectations left, fails with an I/O
/// error.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    pending_response: Vec<u8>,
    response_cursor: usize,
    chunk_size: usize,
    connected: bool,
}

/// Shared view of a [`MockTransport`] that outlives moving the transport
/// into a controller.
#[derive(Debug, Clone)]
pub struct MockMonitor {
    state: Arc<Mutex<MockState>>,
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState::default())),
            pending_response: Vec::new(),
            response_cursor: 0,
            chunk_size: usize::MAX,
            connected: true,
        }
    }

    /// Expect `request` and reply with `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        lock(&self.state).expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Expect `request` with no reply.
    pub fn expect_write(&mut self, request: &[u8]) {
        self.expect(request, b"");
    }

    /// Hand out replies at most `chunk_size` bytes per `receive()` call.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    /// When set to `false`, `send()` and `receive()` fail with
    /// [`Error::NotConnected`] until the transport is opened again.
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn monitor(&self) -> MockMonitor {
        MockMonitor {
            state: Arc::clone(&self.state),
        }
    }

    /// All data sent through this transport, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.monitor().sent_data()
    }

    pub fn remaining_expectations(&self) -> usize {
        self.monitor().remaining_expectations()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMonitor {
    /// All data sent through the transport, one element per `send()`.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.state).sent_log.clone()
    }

    /// Sent data decoded as text lines with the trailing newline removed.
    pub fn sent_lines(&self) -> Vec<String> {
        lock(&self.state)
            .sent_log
            .iter()
            .map(|d| String::from_utf8_lossy(d).trim_end_matches('\n').to_string())
            .collect()
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        lock(&self.state).expectations.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let mut state = lock(&self.state);
        state.sent_log.push(data.to_vec());

        let Some(expectation) = state.expectations.pop_front() else {
            return Err(Error::Io(std::io::Error::other(format!(
                "no more expectations in mock transport (sent {:?})",
                String::from_utf8_lossy(data)
            ))));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Io(std::io::Error::other(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            ))));
        }

        self.pending_response = expectation.response;
        self.response_cursor = 0;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        let remaining = &self.pending_response[self.response_cursor..];
        if remaining.is_empty() {
            return Err(Error::Timeout);
        }
        let n = remaining.len().min(buf.len()).min(self.chunk_size);
        buf[..n].copy_from_slice(&remaining[..n]);
        self.response_cursor += n;
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response.clear();
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_receive_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"TEMP:SNUM?\n", b"A1B2C3\r\n");

        mock.send(b"TEMP:SNUM?\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"A1B2C3\r\n");

        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn chunked_receive() {
        let mut mock = MockTransport::new();
        mock.set_chunk_size(3);
        mock.expect(b"TEMP:TP?\n", b"41.5\r\n");
        mock.send(b"TEMP:TP?\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], b"41.");
        let n = mock.receive(&mut buf, Duration::ZERO).await.unwrap();
        assert_eq!(&buf[..n], b"5\r\n");
    }

    #[tokio::test]
    async fn write_expectation_has_no_reply() {
        let mut mock = MockTransport::new();
        mock.expect_write(b"TEMP:STOP\n");
        mock.send(b"TEMP:STOP\n").await.unwrap();

        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::ZERO).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn mismatched_send_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"*IDN?\n", b"x\r\n");
        assert!(matches!(mock.send(b"TEMP:STOP\n").await, Err(Error::Io(_))));
        assert!(matches!(mock.send(b"*IDN?\n").await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn monitor_survives_move() {
        let mut mock = MockTransport::new();
        mock.expect_write(b"PROF:PAUS\n");
        mock.expect_write(b"PROF:RES\n");
        let monitor = mock.monitor();

        let mut boxed: Box<dyn Transport> = Box::new(mock);
        boxed.send(b"PROF:PAUS\n").await.unwrap();

        assert_eq!(monitor.sent_lines(), vec!["PROF:PAUS".to_string()]);
        assert_eq!(monitor.remaining_expectations(), 1);
    }

    #[tokio::test]
    async fn closed_transport_rejects_io_until_reopened() {
        let mut mock = MockTransport::new();
        mock.expect_write(b"TEMP:STOP\n");
        mock.close().await.unwrap();
        assert!(!mock.is_connected());
        assert!(matches!(
            mock.send(b"TEMP:STOP\n").await,
            Err(Error::NotConnected)
        ));

        mock.open().await.unwrap();
        mock.send(b"TEMP:STOP\n").await.unwrap();
        assert!(mock.sent_data().len() == 1);
    }
}
