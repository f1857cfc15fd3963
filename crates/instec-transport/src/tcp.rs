//! TCP transport for Ethernet-attached controllers.
//!
//! This module provides [`TcpTransport`], which implements the [`Transport`]
//! trait for controllers reachable on their TCP control port (50292). The
//! address normally comes from UDP discovery by serial number.
//!
//! # Example
//!
//! ```no_run
//! use instec_transport::TcpTransport;
//! use instec_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> instec_core::Result<()> {
//! let mut transport = TcpTransport::new("192.168.1.40:50292");
//! transport.open().await?;
//! transport.send(b"TEMP:RTIN?\n").await?;
//!
//! let mut buf = [0u8; 1024];
//! let n = transport.receive(&mut buf, Duration::from_secs(10)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use instec_core::error::{Error, Result};
use instec_core::transport::Transport;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP port the controller listens on for commands.
pub const CONTROL_PORT: u16 = 50292;

/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP transport for controller communication.
///
/// Constructed closed; [`Transport::open`] performs the connect.
#[derive(Debug)]
pub struct TcpTransport {
    /// The underlying TCP stream, `None` while closed.
    stream: Option<TcpStream>,
    /// `host:port` of the controller.
    addr: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a transport for a `host:port` address with the default
    /// connect timeout.
    pub fn new(addr: &str) -> Self {
        Self::with_timeout(addr, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeout(addr: &str, connect_timeout: Duration) -> Self {
        Self {
            stream: None,
            addr: addr.to_string(),
            connect_timeout,
        }
    }

    async fn connect_once(&self) -> std::io::Result<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(ErrorKind::TimedOut, "connect timed out")),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        tracing::debug!(
            addr = %self.addr,
            timeout_ms = self.connect_timeout.as_millis(),
            "Connecting to controller"
        );

        let stream = connect_with_retry(&self.addr, || self.connect_once())
            .await
            .map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "TCP connection failed");
                map_connect_error(e, &self.addr)
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %self.addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        tracing::info!(addr = %self.addr, "TCP connection established");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = ?String::from_utf8_lossy(data),
            "Sending data"
        );

        stream.write_all(data).await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to send data");
            map_io_error(e)
        })?;
        stream.flush().await.map_err(|e| {
            tracing::error!(addr = %self.addr, error = %e, "Failed to flush TCP stream");
            map_io_error(e)
        })?;

        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, stream.read(buf)).await {
            Ok(Ok(0)) => {
                tracing::warn!(addr = %self.addr, "Peer closed connection (0 bytes read)");
                Err(Error::ConnectionLost)
            }
            Ok(Ok(n)) => {
                tracing::trace!(
                    addr = %self.addr,
                    bytes = n,
                    data = ?String::from_utf8_lossy(&buf[..n]),
                    "Received data"
                );
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(addr = %self.addr, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => {
                tracing::trace!(
                    addr = %self.addr,
                    timeout_ms = timeout.as_millis(),
                    "Timeout waiting for data"
                );
                Err(Error::Timeout)
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                tracing::warn!(
                    addr = %self.addr,
                    error = %e,
                    "Failed to shutdown TCP stream (continuing anyway)"
                );
            }
            tracing::info!(addr = %self.addr, "TCP connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Non-blocking one-byte peek.
    ///
    /// A zero-length read means the peer closed; pending data or a read that
    /// would block means the link is up; a reset means it is gone.
    async fn is_alive(&mut self) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };

        let mut probe = [0u8; 1];
        match tokio::time::timeout(Duration::ZERO, stream.peek(&mut probe)).await {
            Ok(Ok(0)) => {
                tracing::debug!(addr = %self.addr, "Peer has closed the connection");
                false
            }
            Ok(Ok(_)) => true,
            Ok(Err(e)) if e.kind() == ErrorKind::WouldBlock => true,
            Ok(Err(e)) => {
                tracing::debug!(addr = %self.addr, error = %e, "Liveness probe failed");
                false
            }
            Err(_) => true,
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(addr = %self.addr, "TcpTransport dropped while connected");
        }
    }
}

/// Run `connect`, and run it exactly once more if the first attempt is reset.
///
/// A controller that was just power cycled may reset the first connection
/// before the handshake completes. Any other failure is returned as is.
async fn connect_with_retry<T, F, Fut>(addr: &str, mut connect: F) -> std::io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    match connect().await {
        Err(e) if e.kind() == ErrorKind::ConnectionReset => {
            tracing::warn!(addr = %addr, "Connection reset during connect, retrying once");
            connect().await
        }
        other => other,
    }
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        ErrorKind::TimedOut => Error::Timeout,
        ErrorKind::ConnectionRefused => Error::Connection(format!("connection refused: {addr}")),
        _ => Error::Connection(format!("{addr}: {e}")),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    async fn test_listener() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn open_send_receive() {
        let (listener, addr) = test_listener().await;

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"*IDN?\n");
            stream
                .write_all(b"Instec,MK2000,A1B2C3,1.0\r\n")
                .await
                .unwrap();
        });

        let mut transport = TcpTransport::new(&addr);
        assert!(!transport.is_connected());
        transport.open().await.unwrap();
        assert!(transport.is_connected());

        transport.send(b"*IDN?\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = transport
            .receive(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(n > 0);

        transport.close().await.unwrap();
        server.await.unwrap();
    }

    fn counting_connect<'a>(
        attempts: &'a AtomicUsize,
        outcomes: &'static [Option<ErrorKind>],
    ) -> impl FnMut() -> std::future::Ready<std::io::Result<usize>> + 'a {
        move || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            std::future::ready(match outcomes[n] {
                Some(kind) => Err(std::io::Error::from(kind)),
                None => Ok(n),
            })
        }
    }

    #[tokio::test]
    async fn reset_on_connect_is_retried_once() {
        let attempts = AtomicUsize::new(0);
        let result = connect_with_retry(
            "test",
            counting_connect(&attempts, &[Some(ErrorKind::ConnectionReset), None]),
        )
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_reset_is_returned() {
        let attempts = AtomicUsize::new(0);
        let result = connect_with_retry(
            "test",
            counting_connect(
                &attempts,
                &[Some(ErrorKind::ConnectionReset), Some(ErrorKind::ConnectionReset), None],
            ),
        )
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConnectionReset);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refused_connect_is_not_retried() {
        let attempts = AtomicUsize::new(0);
        let result = connect_with_retry(
            "test",
            counting_connect(&attempts, &[Some(ErrorKind::ConnectionRefused), None]),
        )
        .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionRefused);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(map_connect_error(err, "test"), Error::Connection(_)));
    }

    #[tokio::test]
    async fn open_refused_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut transport = TcpTransport::new(&addr);
        match transport.open().await {
            Err(Error::Connection(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("expected Connection error, got: {other:?}"),
        }
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn open_timeout_to_blackhole() {
        // TEST-NET-1 (RFC 5737) is not routed.
        let mut transport =
            TcpTransport::with_timeout("192.0.2.1:50292", Duration::from_millis(100));
        let err = transport.open().await.unwrap_err();
        assert!(
            matches!(err, Error::Timeout | Error::Connection(_)),
            "expected Timeout or Connection, got: {err:?}"
        );
    }

    #[tokio::test]
    async fn is_alive_while_peer_idle() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(&addr);
        transport.open().await.unwrap();
        assert!(transport.is_alive().await);

        transport.close().await.unwrap();
        assert!(!transport.is_alive().await);
        server.abort();
    }

    #[tokio::test]
    async fn is_alive_with_pending_data() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"x").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(&addr);
        transport.open().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(transport.is_alive().await);

        // Peeking must not consume the byte.
        let mut buf = [0u8; 4];
        let n = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"x");
        server.abort();
    }

    #[tokio::test]
    async fn is_alive_detects_peer_close() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::new(&addr);
        transport.open().await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!transport.is_alive().await);
    }

    #[tokio::test]
    async fn receive_after_peer_close_is_connection_lost() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let mut transport = TcpTransport::new(&addr);
        transport.open().await.unwrap();
        server.await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = [0u8; 16];
        let result = transport.receive(&mut buf, Duration::from_secs(2)).await;
        assert!(matches!(result, Err(Error::ConnectionLost)), "got {result:?}");
    }

    #[tokio::test]
    async fn send_after_close_is_not_connected() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(&addr);
        transport.open().await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        assert!(matches!(
            transport.send(b"TEMP:STOP\n").await,
            Err(Error::NotConnected)
        ));
        server.abort();
    }

    #[tokio::test]
    async fn receive_timeout() {
        let (listener, addr) = test_listener().await;
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(&addr);
        transport.open().await.unwrap();
        let mut buf = [0u8; 16];
        let result = transport
            .receive(&mut buf, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(Error::Timeout)));
        server.abort();
    }
}
