//! ControllerBuilder -- fluent builder for constructing [`Controller`]
//! instances.
//!
//! A controller is reached one of three ways: an explicit serial port, an
//! explicit network address, or a serial number resolved through
//! [`discovery`](crate::discovery). `build()` configures the transport but
//! does not open it; call [`Controller::connect`] for that.
//!
//! # Example
//!
//! ```no_run
//! use instec_mk2000::builder::ControllerBuilder;
//!
//! # async fn example() -> instec_core::Result<()> {
//! let controller = ControllerBuilder::new()
//!     .serial_port("/dev/ttyACM0")
//!     .build()
//!     .await?;
//! controller.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tracing::debug;

use instec_core::{Error, Result, Transport};
use instec_transport::serial::DEFAULT_BAUD_RATE;
use instec_transport::tcp::{CONTROL_PORT, DEFAULT_CONNECT_TIMEOUT};
use instec_transport::{SerialTransport, TcpTransport};

use crate::channel::{CommandChannel, DEFAULT_READ_TIMEOUT};
use crate::controller::Controller;
use crate::discovery::{self, DEFAULT_WINDOW};

/// How a controller is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    Serial { port: String, baud_rate: u32 },
    Network { address: IpAddr, port: u16 },
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionConfig::Serial { port, baud_rate } => write!(f, "{port} @ {baud_rate} baud"),
            ConnectionConfig::Network { address, port } => {
                write!(f, "{}", SocketAddr::new(*address, *port))
            }
        }
    }
}

/// Fluent builder for [`Controller`].
pub struct ControllerBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    network_address: Option<IpAddr>,
    network_port: u16,
    serial_number: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    discovery_window: Duration,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        ControllerBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            network_address: None,
            network_port: CONTROL_PORT,
            serial_number: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            discovery_window: DEFAULT_WINDOW,
        }
    }

    /// Connect over a serial port (e.g. `/dev/ttyACM0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Serial baud rate (default: 38400).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Connect over Ethernet to `address`.
    pub fn network_address(mut self, address: IpAddr) -> Self {
        self.network_address = Some(address);
        self
    }

    /// TCP control port (default: 50292).
    pub fn network_port(mut self, port: u16) -> Self {
        self.network_port = port;
        self
    }

    /// Find the controller by serial number when no port or address is set.
    pub fn serial_number(mut self, serial: &str) -> Self {
        self.serial_number = Some(serial.to_string());
        self
    }

    /// TCP connect timeout (default: 10s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Time to wait for each chunk of a reply (default: 10s).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// How long network discovery listens when resolving a serial number
    /// (default: 1s).
    pub fn discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window = window;
        self
    }

    /// Build a [`Controller`] over a caller-provided transport.
    ///
    /// The transport is used as-is: if it is not already open, call
    /// [`Controller::connect`] before issuing commands.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Controller> {
        Ok(Controller::new(
            CommandChannel::new(transport, self.read_timeout),
            None,
        ))
    }

    /// Build a [`Controller`] from the configured connection.
    ///
    /// Requires exactly one of a serial port or a network address, or else a
    /// serial number to look up. Looking up a serial number probes every
    /// serial port and then broadcasts on the network.
    pub async fn build(self) -> Result<Controller> {
        let connection = self.resolve().await?;
        debug!(connection = %connection, "building controller");

        let transport: Box<dyn Transport> = match &connection {
            ConnectionConfig::Serial { port, baud_rate } => {
                Box::new(SerialTransport::new(port, *baud_rate))
            }
            ConnectionConfig::Network { address, port } => Box::new(TcpTransport::with_timeout(
                &SocketAddr::new(*address, *port).to_string(),
                self.connect_timeout,
            )),
        };

        Ok(Controller::new(
            CommandChannel::new(transport, self.read_timeout),
            Some(connection),
        ))
    }

    async fn resolve(&self) -> Result<ConnectionConfig> {
        match (&self.serial_port, self.network_address) {
            (Some(_), Some(_)) => Err(Error::InvalidParameter(
                "serial_port and network_address are mutually exclusive".into(),
            )),
            (Some(port), None) => Ok(ConnectionConfig::Serial {
                port: port.clone(),
                baud_rate: self.baud_rate,
            }),
            (None, Some(address)) => Ok(ConnectionConfig::Network {
                address,
                port: self.network_port,
            }),
            (None, None) => match &self.serial_number {
                Some(serial) => {
                    discovery::locate(serial, self.baud_rate, self.discovery_window).await
                }
                None => Err(Error::InvalidParameter(
                    "one of serial_port, network_address, or serial_number is required".into(),
                )),
            },
        }
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instec_test_harness::MockTcpServer;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn nothing_configured_is_invalid() {
        let result = ControllerBuilder::new().build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn both_port_and_address_is_invalid() {
        let result = ControllerBuilder::new()
            .serial_port("/dev/ttyACM0")
            .network_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .build()
            .await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn serial_build_does_not_open() {
        let controller = ControllerBuilder::new()
            .serial_port("/dev/does-not-exist")
            .build()
            .await
            .unwrap();
        assert_eq!(
            controller.connection(),
            Some(&ConnectionConfig::Serial {
                port: "/dev/does-not-exist".into(),
                baud_rate: 38400,
            })
        );
        assert!(!controller.is_connected().await);
        assert!(matches!(
            controller.connect().await,
            Err(Error::PortUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn network_defaults_to_control_port() {
        let controller = ControllerBuilder::new()
            .network_address("192.0.2.10".parse().unwrap())
            .build()
            .await
            .unwrap();
        let connection = controller.connection().unwrap();
        assert_eq!(
            connection,
            &ConnectionConfig::Network {
                address: "192.0.2.10".parse().unwrap(),
                port: 50292,
            }
        );
        assert_eq!(connection.to_string(), "192.0.2.10:50292");
    }

    #[tokio::test]
    async fn network_round_trip() {
        let mut server = MockTcpServer::new().await.unwrap();
        server.expect(b"TEMP:SNUM?\n", b"A1B2C3\r\n");
        let addr: SocketAddr = server.addr().parse().unwrap();
        server.start();

        let controller = ControllerBuilder::new()
            .network_address(addr.ip())
            .network_port(addr.port())
            .connect_timeout(Duration::from_secs(2))
            .read_timeout(Duration::from_secs(2))
            .build()
            .await
            .unwrap();
        controller.connect().await.unwrap();
        assert!(controller.is_connected().await);
        assert_eq!(controller.serial_number().await.unwrap(), "A1B2C3");
        controller.disconnect().await.unwrap();
        server.wait().await.unwrap();
    }
}
