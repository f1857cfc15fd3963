//! instec-test-harness: Test utilities and mock transports for the Instec
//! driver.
//!
//! - [`MockTransport`] replays scripted request/reply exchanges, optionally
//!   splitting each reply into small chunks.
//! - [`MockTcpServer`] does the same over a real loopback TCP socket.
//! - [`SimulatedController`] is a stateful in-memory MK2000 that understands
//!   the command vocabulary, for tests that need read-after-write behavior.

pub mod mock_tcp;
pub mod mock_transport;
pub mod simulator;

pub use mock_tcp::MockTcpServer;
pub use mock_transport::{MockMonitor, MockTransport};
pub use simulator::{SimHandle, SimProfile, SimState, SimulatedController};
