//! instec-core: Core traits, types, and error definitions for the Instec
//! temperature controller driver.
//!
//! This crate holds everything that is shared between the transport layer,
//! the MK2000 protocol implementation, and the test harness, without pulling
//! in any I/O.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`RuntimeSnapshot`] -- one decoded runtime-information reply
//! - [`ProfileItem`] -- a stored profile instruction
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use transport::Transport;
pub use types::*;
