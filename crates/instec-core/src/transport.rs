//! Transport trait for controller communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a temperature
//! controller. Implementations exist for serial ports (USB virtual COM),
//! TCP sockets (Ethernet-attached controllers), and mock transports for
//! testing.
//!
//! The command channel in `instec-mk2000` operates on a `Transport` rather
//! than directly on a serial port or socket, so the same protocol code drives
//! real hardware and the deterministic mocks in `instec-test-harness`.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a controller.
///
/// A transport is configured when it is constructed and opened explicitly
/// with [`open`](Transport::open). It is never reopened implicitly: after
/// [`close`](Transport::close), or after the peer drops the link, every
/// `send`/`receive` fails until the caller opens it again.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Claim the underlying channel (open the serial port, connect the
    /// socket). Opening an already open transport is a no-op.
    async fn open(&mut self) -> Result<()>;

    /// Send raw bytes to the controller.
    ///
    /// Returns once every byte has been handed to the OS.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available into `buf`.
    ///
    /// A single call may return only part of a reply line. Waits up to
    /// `timeout` for data and returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if none arrives.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Release the underlying channel. Closing a closed transport is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport currently holds an open handle.
    fn is_connected(&self) -> bool;

    /// Probe whether the link is still usable.
    ///
    /// The default reports the handle state. Network transports override
    /// this to detect a peer that has gone away without the handle noticing.
    async fn is_alive(&mut self) -> bool {
        self.is_connected()
    }
}
