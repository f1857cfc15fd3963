//! Transport implementations for the Instec driver.
//!
//! This crate provides concrete implementations of the
//! [`Transport`](instec_core::Transport) trait from `instec-core`:
//!
//! - [`SerialTransport`]: the controller's USB virtual COM port
//! - [`TcpTransport`]: the Ethernet control port of networked controllers
//! - [`UdpTransport`]: broadcast datagrams used for controller discovery
//!
//! # Example
//!
//! ```no_run
//! use instec_transport::SerialTransport;
//! use instec_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> instec_core::Result<()> {
//! let mut transport = SerialTransport::new("/dev/ttyUSB0", 38400);
//! transport.open().await?;
//!
//! transport.send(b"*IDN?\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;
pub mod tcp;
pub mod udp;

pub use serial::{SerialConfig, SerialTransport, available_ports};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;
