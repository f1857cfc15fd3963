//! Mock TCP server for testing the network path end to end.
//!
//! [`MockTcpServer`] listens on a random loopback port and serves one client
//! connection from a script of request/reply pairs. Replies can be written in
//! several fragments with a short pause between them, which forces the
//! client to reassemble a reply from more than one read.
//!
//! # Example
//!
//! ```
//! use instec_test_harness::MockTcpServer;
//!
//! # async fn example() -> instec_core::Result<()> {
//! let mut server = MockTcpServer::new().await?;
//! server.expect(b"TEMP:SNUM?\n", b"A1B2C3\r\n");
//! let addr = server.addr().to_string();
//! server.start();
//! // ... connect a TcpTransport to `addr` ...
//! # Ok(())
//! # }
//! ```

use instec_core::error::Result;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Pause between reply fragments, long enough that they arrive as separate
/// reads on loopback.
const FRAGMENT_GAP: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
struct TcpExpectation {
    request: Vec<u8>,
    fragments: Vec<Vec<u8>>,
}

/// A scripted single-connection TCP server.
pub struct MockTcpServer {
    listener: Option<TcpListener>,
    addr: String,
    expectations: VecDeque<TcpExpectation>,
    server_handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockTcpServer {
    /// Bind a new server on a random loopback port. No connection is
    /// accepted until [`start`](MockTcpServer::start).
    pub async fn new() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        Ok(Self {
            listener: Some(listener),
            addr,
            expectations: VecDeque::new(),
            server_handle: None,
        })
    }

    /// Reply to `request` with `response` in a single write. An empty
    /// response scripts a write-only command.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expect_fragmented(request, &[response]);
    }

    /// Reply to `request` with each of `fragments` in a separate write.
    pub fn expect_fragmented(&mut self, request: &[u8], fragments: &[&[u8]]) {
        self.expectations.push_back(TcpExpectation {
            request: request.to_vec(),
            fragments: fragments
                .iter()
                .filter(|f| !f.is_empty())
                .map(|f| f.to_vec())
                .collect(),
        });
    }

    /// `host:port` the server is listening on.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Accept one client in the background and play the script.
    ///
    /// Calling `start` twice has no further effect.
    pub fn start(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let expectations: Vec<TcpExpectation> = self.expectations.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;

            for (i, expectation) in expectations.iter().enumerate() {
                let mut buf = vec![0u8; expectation.request.len()];
                stream
                    .read_exact(&mut buf)
                    .await
                    .map_err(|e| format!("expectation {i}: read error: {e}"))?;

                if buf != expectation.request {
                    return Err(format!(
                        "expectation {i}: request mismatch: expected {:?}, got {:?}",
                        String::from_utf8_lossy(&expectation.request),
                        String::from_utf8_lossy(&buf)
                    ));
                }

                for (n, fragment) in expectation.fragments.iter().enumerate() {
                    if n > 0 {
                        tokio::time::sleep(FRAGMENT_GAP).await;
                    }
                    stream
                        .write_all(fragment)
                        .await
                        .map_err(|e| format!("expectation {i}: write error: {e}"))?;
                    stream
                        .flush()
                        .await
                        .map_err(|e| format!("expectation {i}: flush error: {e}"))?;
                }
            }

            Ok(())
        });

        self.server_handle = Some(handle);
    }

    /// Wait for the script to finish and report any mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.server_handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("server task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn serves_fragmented_reply() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect_fragmented(b"TEMP:RTIN?\n", &[b"MK#1:25", b".0\r\n"]);
        let addr = server.addr().to_string();
        server.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(b"TEMP:RTIN?\n").await.unwrap();

        let mut reply = Vec::new();
        let mut buf = [0u8; 64];
        while !reply.ends_with(b"\r\n") {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0);
            reply.extend_from_slice(&buf[..n]);
        }
        assert_eq!(reply, b"MK#1:25.0\r\n");
        server.wait().await.unwrap();
    }

    #[tokio::test]
    async fn reports_request_mismatch() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"TEMP:STOP\n", b"");
        let addr = server.addr().to_string();
        server.start();

        let mut client = TcpStream::connect(&addr).await.unwrap();
        client.write_all(b"PROF:STOP\n").await.unwrap();

        let err = server.wait().await.unwrap_err();
        assert!(err.contains("request mismatch"), "got {err}");
    }
}
