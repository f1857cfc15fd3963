//! instec-mk2000: driver for Instec MK2000 temperature controllers.
//!
//! The controller speaks a line-oriented ASCII protocol (`TEMP:` and `PROF:`
//! command families) over USB serial or TCP. This crate layers:
//!
//! - [`channel`] -- request/reply framing over any [`Transport`](instec_core::Transport)
//! - [`commands`] -- command builders and reply decoders
//! - [`validate`] -- client-side range and parameter checks
//! - [`controller`] / [`profile`] -- the [`Controller`] API
//! - [`builder`] -- [`ControllerBuilder`] and [`ConnectionConfig`]
//! - [`discovery`] -- finding controllers by serial number
//!
//! # Example
//!
//! ```no_run
//! use instec_mk2000::ControllerBuilder;
//!
//! # async fn example() -> instec_core::Result<()> {
//! let controller = ControllerBuilder::new()
//!     .network_address("192.168.1.50".parse().unwrap())
//!     .build()
//!     .await?;
//! controller.connect().await?;
//!
//! controller.ramp(80.0, 10.0).await?;
//! let snapshot = controller.runtime_information().await?;
//! println!("{} -> {} ({})", snapshot.process_variable, snapshot.target_set_point, snapshot.system_status);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod channel;
pub mod commands;
pub mod controller;
pub mod discovery;
pub mod profile;
pub mod protocol;
pub mod validate;

pub use builder::{ConnectionConfig, ControllerBuilder};
pub use channel::CommandChannel;
pub use controller::Controller;
pub use discovery::{DiscoveredController, SerialController};
pub use profile::{LoopNesting, loop_nesting};
