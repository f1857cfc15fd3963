//! Finding MK2000 controllers on serial ports and on the local network.
//!
//! Network discovery broadcasts a fixed probe to UDP port 50290 and collects
//! `model:serial:...` replies on port 50291 for a bounded window. Serial
//! discovery asks every serial port for its identification.
//!
//! Finding nothing is not an error; both return an empty list.
//!
//! ```no_run
//! use instec_mk2000::discovery;
//! use std::time::Duration;
//!
//! # async fn example() -> instec_core::Result<()> {
//! for found in discovery::discover_network(Duration::from_secs(1)).await? {
//!     println!("{} ({}) at {}", found.serial, found.model, found.address);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use instec_core::{Error, Result, SystemInfo, Transport};
use instec_transport::tcp::CONTROL_PORT;
use instec_transport::{SerialTransport, UdpTransport, available_ports};

use crate::builder::ConnectionConfig;
use crate::channel::CommandChannel;
use crate::commands;

/// Probe datagram every controller answers.
pub const PROBE: [u8; 5] = [0x73, 0xC4, 0x00, 0x00, 0x01];

/// Port the probe is broadcast to.
pub const PROBE_PORT: u16 = 50290;

/// Port replies arrive on.
pub const REPLY_PORT: u16 = 50291;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Model prefix of a network discovery reply from an MK2000.
pub const NETWORK_MODEL_PREFIX: &str = "IoT_MK#MK2000";

/// Model prefix of a serial identification reply from an MK2000.
pub const SERIAL_MODEL_PREFIX: &str = "MK2000";

const COMPANY: &str = "Instec";

const SERIAL_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// A controller that answered the network probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredController {
    pub model: String,
    pub serial: String,
    /// Source address of the reply.
    pub address: IpAddr,
}

/// A controller that identified itself on a serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialController {
    pub model: String,
    pub serial: String,
    pub port: String,
}

/// Broadcast the probe and collect replies for `window`.
pub async fn discover_network(window: Duration) -> Result<Vec<DiscoveredController>> {
    let target = SocketAddr::from((Ipv4Addr::BROADCAST, PROBE_PORT));
    discover_network_on(REPLY_PORT, target, window).await
}

/// Send the probe to `target` from `reply_port` and collect replies there.
///
/// Results are deduplicated by serial number and sorted by it.
pub async fn discover_network_on(
    reply_port: u16,
    target: SocketAddr,
    window: Duration,
) -> Result<Vec<DiscoveredController>> {
    let socket = UdpTransport::bind_port(reply_port).await?;
    socket.set_broadcast(true)?;
    socket.send_to(&PROBE, target).await?;
    debug!(target = %target, local = %socket.local_addr(), "discovery probe sent");

    let mut found: HashMap<String, DiscoveredController> = HashMap::new();
    let mut buf = [0u8; 1024];
    let deadline = Instant::now() + window;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        match socket.recv_from(&mut buf, remaining).await {
            Ok((n, src)) => match parse_discovery_reply(&buf[..n], src.ip()) {
                Ok(controller) if controller.model.starts_with(NETWORK_MODEL_PREFIX) => {
                    debug!(
                        model = %controller.model,
                        serial = %controller.serial,
                        address = %controller.address,
                        "discovered controller"
                    );
                    found.entry(controller.serial.clone()).or_insert(controller);
                }
                Ok(other) => {
                    trace!(model = %other.model, address = %other.address, "ignoring other model");
                }
                Err(e) => warn!(src = %src, error = %e, "ignoring malformed discovery reply"),
            },
            Err(Error::Timeout) => break,
            // Some hosts surface ICMP unreachable on the next receive.
            Err(e) => trace!(error = %e, "discovery receive error"),
        }
    }

    let mut controllers: Vec<DiscoveredController> = found.into_values().collect();
    controllers.sort_by(|a, b| a.serial.cmp(&b.serial));
    debug!(count = controllers.len(), "network discovery complete");
    Ok(controllers)
}

/// Parse one `model:serial:...` discovery datagram.
pub fn parse_discovery_reply(data: &[u8], address: IpAddr) -> Result<DiscoveredController> {
    let text = std::str::from_utf8(data)
        .map_err(|_| Error::Decode("discovery reply is not valid UTF-8".into()))?;
    let mut fields = text.trim().split(':');
    let model = fields.next().unwrap_or_default().trim();
    let serial = fields.next().map(str::trim).unwrap_or_default();
    if model.is_empty() || serial.is_empty() {
        return Err(Error::Decode(format!("discovery reply {text:?}")));
    }
    Ok(DiscoveredController {
        model: model.to_string(),
        serial: serial.to_string(),
        address,
    })
}

/// Ask every serial port for its identification and keep the MK2000s.
///
/// Ports that cannot be opened or do not answer are skipped.
pub async fn discover_serial(baud_rate: u32) -> Vec<SerialController> {
    let mut controllers = Vec::new();
    for port in available_ports() {
        let transport = Box::new(SerialTransport::new(&port, baud_rate));
        match probe(transport, SERIAL_PROBE_TIMEOUT).await {
            Ok(Some(info)) => {
                debug!(port = %port, serial = %info.serial, "found controller on serial port");
                controllers.push(SerialController {
                    model: info.model,
                    serial: info.serial,
                    port,
                });
            }
            Ok(None) => trace!(port = %port, "not an MK2000"),
            Err(e) => debug!(port = %port, error = %e, "serial probe failed"),
        }
    }
    controllers
}

/// Open `transport`, read the identification, and close it again.
///
/// `Ok(None)` means something answered but it is not an MK2000.
async fn probe(transport: Box<dyn Transport>, read_timeout: Duration) -> Result<Option<SystemInfo>> {
    let channel = CommandChannel::new(transport, read_timeout);
    channel.open().await?;
    let reply = channel.query(&commands::cmd_identify()).await;
    if let Err(e) = channel.close().await {
        debug!(error = %e, "closing probed port failed");
    }

    let info = commands::parse_system_info(&reply?)?;
    if info.company == COMPANY && info.model.starts_with(SERIAL_MODEL_PREFIX) {
        Ok(Some(info))
    } else {
        Ok(None)
    }
}

/// Find the controller with `serial_number`, trying serial ports first and
/// then the network.
pub async fn locate(
    serial_number: &str,
    baud_rate: u32,
    window: Duration,
) -> Result<ConnectionConfig> {
    if let Some(found) = discover_serial(baud_rate)
        .await
        .into_iter()
        .find(|c| c.serial == serial_number)
    {
        info!(serial = %serial_number, port = %found.port, "located controller on serial port");
        return Ok(ConnectionConfig::Serial {
            port: found.port,
            baud_rate,
        });
    }

    if let Some(found) = discover_network(window)
        .await?
        .into_iter()
        .find(|c| c.serial == serial_number)
    {
        info!(serial = %serial_number, address = %found.address, "located controller on network");
        return Ok(ConnectionConfig::Network {
            address: found.address,
            port: CONTROL_PORT,
        });
    }

    Err(Error::Connection(format!(
        "no controller with serial number {serial_number}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use instec_test_harness::{MockTransport, SimState, SimulatedController};

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn no_replies_is_empty_not_error() {
        // Receives the probe, never answers.
        let silent = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let found = discover_network_on(0, silent.local_addr(), Duration::from_millis(100))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn collects_filters_and_dedupes() {
        let responder = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let target = responder.local_addr();

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (n, src) = responder
                .recv_from(&mut buf, Duration::from_secs(2))
                .await
                .unwrap();
            assert_eq!(&buf[..n], &PROBE);
            for reply in [
                &b"IoT_MK#MK2000:SN100:1.0"[..],
                b"IoT_MK#MK2000:SN100:1.0",
                b"IoT_MK#MK1000:SN200:1.0",
                b"no separator here",
                b"IoT_MK#MK2000B:SN050",
            ] {
                responder.send_to(reply, src).await.unwrap();
            }
        });

        let found = discover_network_on(0, target, Duration::from_millis(500))
            .await
            .unwrap();
        task.await.unwrap();

        let serials: Vec<&str> = found.iter().map(|c| c.serial.as_str()).collect();
        assert_eq!(serials, vec!["SN050", "SN100"]);
        assert!(found.iter().all(|c| c.address == localhost()));
        assert_eq!(found[1].model, "IoT_MK#MK2000");
    }

    #[test]
    fn discovery_reply_shapes() {
        let c = parse_discovery_reply(b"IoT_MK#MK2000:ABC123:extra:fields\r\n", localhost()).unwrap();
        assert_eq!(c.model, "IoT_MK#MK2000");
        assert_eq!(c.serial, "ABC123");

        assert!(parse_discovery_reply(b"IoT_MK#MK2000", localhost()).is_err());
        assert!(parse_discovery_reply(b"IoT_MK#MK2000:", localhost()).is_err());
        assert!(parse_discovery_reply(&[0xFF, 0x3A, 0x41], localhost()).is_err());
    }

    #[tokio::test]
    async fn probe_accepts_mk2000() {
        let info = probe(Box::new(SimulatedController::new()), Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.serial, "SIM0001");
    }

    #[tokio::test]
    async fn probe_rejects_other_devices() {
        let state = SimState {
            company: "Acme".into(),
            ..SimState::default()
        };
        let result = probe(Box::new(SimulatedController::with_state(state)), Duration::from_millis(50)).await;
        assert_eq!(result.unwrap(), None);

        let state = SimState {
            model: "MK1000".into(),
            ..SimState::default()
        };
        let result = probe(Box::new(SimulatedController::with_state(state)), Duration::from_millis(50)).await;
        assert_eq!(result.unwrap(), None);
    }

    #[tokio::test]
    async fn probe_of_silent_port_fails() {
        let mut mock = MockTransport::new();
        mock.expect_write(b"*IDN?\n");
        let result = probe(Box::new(mock), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(Error::ReceiveFailed(_))));
    }
}
