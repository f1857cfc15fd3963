//! # instec -- Instec MK2000 temperature controller driver
//!
//! `instec` is an asynchronous Rust driver for Instec MK2000 and MK2000B
//! temperature controllers, reached over their USB serial port or their
//! Ethernet control port.
//!
//! ## Quick Start
//!
//! ```no_run
//! use instec::ControllerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> instec::Result<()> {
//!     let controller = ControllerBuilder::new()
//!         .serial_number("A1B2C3")
//!         .build()
//!         .await?;
//!     controller.connect().await?;
//!
//!     controller.hold(37.0).await?;
//!     let snapshot = controller.runtime_information().await?;
//!     println!("PV {} °C, status {}", snapshot.process_variable, snapshot.system_status);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                          |
//! |-----------------------|--------------------------------------------------|
//! | `instec-core`         | [`Transport`] trait, domain types, [`Error`]     |
//! | `instec-transport`    | Serial, TCP, and UDP transports                  |
//! | `instec-mk2000`       | Command protocol, validation, profiles, discovery |
//! | **`instec`**          | This facade crate -- re-exports everything       |
//!
//! ## Long-running operations
//!
//! `hold`, `ramp`, `purge`, and `start_profile` return once the controller
//! has accepted the command. Poll
//! [`runtime_information`](Controller::runtime_information) or
//! [`profile_state`](Controller::profile_state) to follow progress, and call
//! [`stop`](Controller::stop) to cancel.

pub use instec_core::*;

pub use instec_mk2000::{
    CommandChannel, ConnectionConfig, Controller, ControllerBuilder, DiscoveredController,
    LoopNesting, SerialController, loop_nesting,
};
pub use instec_mk2000::validate::{ITEM_LIMIT, MAX_PROFILE_NAME_LEN, PROFILE_COUNT};

/// Controller discovery on serial ports and the local network.
pub mod discovery {
    pub use instec_mk2000::discovery::*;
}

/// Serial, TCP, and UDP transports.
pub mod transport {
    pub use instec_transport::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use instec_test_harness::SimulatedController;

    #[tokio::test]
    async fn facade_drives_a_profile() {
        let controller = ControllerBuilder::new()
            .build_with_transport(Box::new(SimulatedController::new()))
            .await
            .unwrap();

        controller.delete_profile(0).await.unwrap();
        for item in [
            ProfileItem::LoopBegin { count: 2 },
            ProfileItem::Ramp { tsp: 60.0, rate: 10.0 },
            ProfileItem::Hold { tsp: 60.0 },
            ProfileItem::LoopEnd,
            ProfileItem::Stop,
        ] {
            controller.append_item(0, item).await.unwrap();
        }

        let items = controller.read_profile(0).await.unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(loop_nesting(&items), LoopNesting::Balanced);

        controller.start_profile(0).await.unwrap();
        assert_eq!(
            controller.profile_state().await.unwrap().status,
            ProfileStatus::Run
        );
    }
}
