//! UDP datagram socket used for controller discovery.
//!
//! [`UdpTransport`] does not implement [`Transport`](instec_core::Transport):
//! discovery is a one-shot broadcast followed by collecting whatever
//! datagrams arrive, not a request/reply stream.
//!
//! # Example
//!
//! ```no_run
//! use instec_transport::UdpTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> instec_core::Result<()> {
//! let socket = UdpTransport::bind_port(50291).await?;
//! socket.set_broadcast(true)?;
//! socket
//!     .send_to(&[0x73, 0xC4, 0x00, 0x00, 0x01], "255.255.255.255:50290".parse().unwrap())
//!     .await?;
//!
//! let mut buf = [0u8; 1024];
//! let (n, src) = socket.recv_from(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use instec_core::error::{Error, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

/// A bound UDP socket with the crate's error mapping and logging.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local `host:port` address.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;
        let local_addr = socket.local_addr()?;

        tracing::debug!(local_addr = %local_addr, "UDP socket bound");
        Ok(Self { socket, local_addr })
    }

    /// Bind to `port` on all interfaces (0 picks any free port).
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{port}")).await
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Allow sending to broadcast addresses such as `255.255.255.255`.
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        self.socket.set_broadcast(enable).map_err(|e| {
            tracing::error!(local = %self.local_addr, error = %e, "Failed to set broadcast");
            Error::Io(e)
        })
    }

    /// Send `data` as a single datagram to `addr`.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(
                local = %self.local_addr,
                remote = %addr,
                error = %e,
                "Failed to send datagram"
            );
            Error::Io(e)
        })?;
        Ok(())
    }

    /// Receive one datagram, waiting at most `timeout`.
    ///
    /// Returns [`Error::Timeout`] if nothing arrives in time.
    pub async fn recv_from(&self, buf: &mut [u8], timeout: Duration) -> Result<(usize, SocketAddr)> {
        match tokio::time::timeout(timeout, self.socket.recv_from(buf)).await {
            Ok(Ok((n, src))) => {
                tracing::trace!(
                    local = %self.local_addr,
                    remote = %src,
                    bytes = n,
                    "Received datagram"
                );
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(local = %self.local_addr, error = %e, "Failed to receive datagram");
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_assigns_port() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        assert_eq!(transport.local_addr().ip(), std::net::Ipv4Addr::LOCALHOST);
        assert_ne!(transport.local_addr().port(), 0);

        let any = UdpTransport::bind_port(0).await.unwrap();
        assert_ne!(any.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn send_recv_loopback_reports_source() {
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        let reply = b"IoT_MK#MK2000:A1B2C3:192.168.1.40";
        sender.send_to(reply, receiver.local_addr()).await.unwrap();

        let mut buf = [0u8; 256];
        let (n, src) = receiver
            .recv_from(&mut buf, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(&buf[..n], reply);
        assert_eq!(src, sender.local_addr());
    }

    #[tokio::test]
    async fn recv_timeout() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let mut buf = [0u8; 64];
        let result = transport
            .recv_from(&mut buf, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(Error::Timeout)), "got {result:?}");
    }

    #[tokio::test]
    async fn broadcast_flag_can_be_set() {
        let transport = UdpTransport::bind("0.0.0.0:0").await.unwrap();
        transport.set_broadcast(true).unwrap();
        transport.set_broadcast(false).unwrap();
    }
}
