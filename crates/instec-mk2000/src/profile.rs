//! Profile engine: editing and playback of the controller's stored
//! profiles.
//!
//! A profile is an ordered list of up to 255 [`ProfileItem`]s held by the
//! controller in one of five slots. Nothing is cached here: every read goes
//! to the controller, and every write is validated first.
//!
//! [`insert_item`](Controller::insert_item) and
//! [`set_item`](Controller::set_item) share one validation path, so an item
//! accepted by one is accepted by the other.

use tracing::debug;

use instec_core::{ProfileItem, ProfileState, Result};

use crate::commands;
use crate::controller::Controller;
use crate::validate::{self, Limits};

/// Loop structure of a sequence of profile items.
///
/// The controller accepts unbalanced loops; this is a report for callers,
/// never enforced by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopNesting {
    Balanced,
    /// `LOOP_BEGIN`s left open at the end, by count.
    Unclosed(usize),
    /// Index of the first `LOOP_END` with no open loop.
    UnmatchedEnd(usize),
}

/// Report how `LOOP_BEGIN`/`LOOP_END` pair up in `items`.
///
/// ```
/// use instec_core::ProfileItem;
/// use instec_mk2000::profile::{loop_nesting, LoopNesting};
///
/// let items = [
///     ProfileItem::LoopBegin { count: 2 },
///     ProfileItem::Hold { tsp: 40.0 },
///     ProfileItem::LoopEnd,
/// ];
/// assert_eq!(loop_nesting(&items), LoopNesting::Balanced);
/// ```
pub fn loop_nesting(items: &[ProfileItem]) -> LoopNesting {
    let mut depth = 0usize;
    for (index, item) in items.iter().enumerate() {
        match item {
            ProfileItem::LoopBegin { .. } => depth += 1,
            ProfileItem::LoopEnd => {
                let Some(d) = depth.checked_sub(1) else {
                    return LoopNesting::UnmatchedEnd(index);
                };
                depth = d;
            }
            _ => {}
        }
    }
    if depth == 0 {
        LoopNesting::Balanced
    } else {
        LoopNesting::Unclosed(depth)
    }
}

impl Controller {
    // ---------------------------------------------------------------
    // Playback
    // ---------------------------------------------------------------

    /// Playback status, active profile, and instruction index.
    pub async fn profile_state(&self) -> Result<ProfileState> {
        let reply = self.channel.query(&commands::cmd_profile_state()).await?;
        commands::parse_profile_state(&reply)
    }

    /// Start running `profile`. Returns once the controller has accepted the
    /// command; poll [`profile_state`](Controller::profile_state) to follow it.
    pub async fn start_profile(&self, profile: u8) -> Result<()> {
        validate::check_profile(profile)?;
        debug!(profile, "starting profile");
        self.channel
            .write(&commands::cmd_start_profile(profile))
            .await
    }

    /// Pause after the current instruction completes.
    pub async fn pause_profile(&self) -> Result<()> {
        debug!("pausing profile");
        self.channel.write(&commands::cmd_pause_profile()).await
    }

    pub async fn resume_profile(&self) -> Result<()> {
        debug!("resuming profile");
        self.channel.write(&commands::cmd_resume_profile()).await
    }

    pub async fn stop_profile(&self) -> Result<()> {
        debug!("stopping profile");
        self.channel.write(&commands::cmd_stop_profile()).await
    }

    // ---------------------------------------------------------------
    // Editing
    // ---------------------------------------------------------------

    /// Delete every item of `profile`.
    pub async fn delete_profile(&self, profile: u8) -> Result<()> {
        validate::check_profile(profile)?;
        debug!(profile, "clearing profile");
        self.channel
            .write(&commands::cmd_delete_profile(profile))
            .await
    }

    /// Delete one item. Later items shift down by one.
    pub async fn delete_item(&self, profile: u8, index: u8) -> Result<()> {
        validate::check_profile(profile)?;
        validate::check_item_index(index)?;
        debug!(profile, index, "deleting profile item");
        self.channel
            .write(&commands::cmd_delete_item(profile, index))
            .await
    }

    /// Insert `item` before position `index`.
    ///
    /// Fails with [`Error::InvalidItem`](instec_core::Error::InvalidItem),
    /// and sends nothing, if the item's parameters break its rule.
    pub async fn insert_item(&self, profile: u8, index: u8, item: ProfileItem) -> Result<()> {
        self.check_edit(profile, index, &item).await?;
        debug!(profile, index, %item, "inserting profile item");
        self.channel
            .write(&commands::cmd_insert_item(profile, index, &item))
            .await
    }

    /// Insert `item` after the last item.
    pub async fn append_item(&self, profile: u8, item: ProfileItem) -> Result<()> {
        let count = self.item_count(profile).await?;
        self.insert_item(profile, count, item).await
    }

    /// Replace the item at `index` in place.
    pub async fn set_item(&self, profile: u8, index: u8, item: ProfileItem) -> Result<()> {
        self.check_edit(profile, index, &item).await?;
        debug!(profile, index, %item, "replacing profile item");
        self.channel
            .write(&commands::cmd_edit_item(profile, index, &item))
            .await
    }

    /// Replace the parameters of the item at `index`, keeping its type.
    ///
    /// Supply exactly as many parameters as the stored type takes.
    pub async fn set_item_params(
        &self,
        profile: u8,
        index: u8,
        b1: Option<f64>,
        b2: Option<f64>,
    ) -> Result<()> {
        let kind = self.item(profile, index).await?.kind();
        let item = ProfileItem::from_parts(kind, b1, b2)?;
        self.set_item(profile, index, item).await
    }

    /// Read the item at `index`.
    ///
    /// Positions past the end read back as [`ProfileItem::End`].
    pub async fn item(&self, profile: u8, index: u8) -> Result<ProfileItem> {
        validate::check_profile(profile)?;
        validate::check_item_index(index)?;
        let reply = self
            .channel
            .query(&commands::cmd_read_item(profile, index))
            .await?;
        commands::parse_item(&reply)
    }

    pub async fn item_count(&self, profile: u8) -> Result<u8> {
        validate::check_profile(profile)?;
        let reply = self
            .channel
            .query(&commands::cmd_item_count(profile))
            .await?;
        commands::parse_int(&reply)
    }

    /// Read every item of `profile` in order.
    pub async fn read_profile(&self, profile: u8) -> Result<Vec<ProfileItem>> {
        let count = self.item_count(profile).await?;
        let mut items = Vec::with_capacity(usize::from(count));
        for index in 0..count {
            items.push(self.item(profile, index).await?);
        }
        Ok(items)
    }

    pub async fn profile_name(&self, profile: u8) -> Result<String> {
        validate::check_profile(profile)?;
        let reply = self
            .channel
            .query(&commands::cmd_profile_name(profile))
            .await?;
        Ok(reply.trim().trim_matches('"').to_string())
    }

    /// Rename `profile`. At most 14 characters, no `"`.
    pub async fn set_profile_name(&self, profile: u8, name: &str) -> Result<()> {
        validate::check_profile(profile)?;
        validate::check_profile_name(name)?;
        debug!(profile, name, "renaming profile");
        self.channel
            .write(&commands::cmd_set_profile_name(profile, name))
            .await
    }

    /// Bounds, then the item's rule against only the ranges it needs.
    async fn check_edit(&self, profile: u8, index: u8, item: &ProfileItem) -> Result<()> {
        validate::check_profile(profile)?;
        validate::check_item_index(index)?;

        let rule = validate::rule(item.kind());
        let mut limits = Limits::default();
        if rule.needs_operation_range {
            limits.operation = Some(self.operation_range().await?);
        }
        if rule.needs_ramp_rate_range {
            limits.ramp_rate = Some(self.ramp_rate_range().await?);
        }
        if rule.needs_power_range {
            limits.power = Some(self.power_range().await?);
        }

        validate::check_item(item, &limits)
            .inspect_err(|e| debug!(profile, index, error = %e, "profile item rejected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ControllerBuilder;
    use instec_core::{Error, ProfileStatus, SystemStatus, TemperatureMode};
    use instec_test_harness::{MockMonitor, MockTransport, SimHandle, SimulatedController};
    use std::time::Duration;

    async fn make_simulated() -> (Controller, SimHandle) {
        let sim = SimulatedController::new().with_chunk_size(4);
        let handle = sim.handle();
        let controller = ControllerBuilder::new()
            .read_timeout(Duration::from_millis(50))
            .build_with_transport(Box::new(sim))
            .await
            .unwrap();
        (controller, handle)
    }

    async fn make_test_controller(mock: MockTransport) -> (Controller, MockMonitor) {
        let monitor = mock.monitor();
        let controller = ControllerBuilder::new()
            .read_timeout(Duration::from_millis(50))
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        (controller, monitor)
    }

    fn every_variant() -> Vec<ProfileItem> {
        vec![
            ProfileItem::End,
            ProfileItem::Hold { tsp: 50.0 },
            ProfileItem::Ramp { tsp: -20.5, rate: 2.5 },
            ProfileItem::Wait { minutes: 1.25 },
            ProfileItem::LoopBegin { count: 3 },
            ProfileItem::LoopEnd,
            ProfileItem::Purge { delay: 0.0, hold: 5.0 },
            ProfileItem::Stop,
            ProfileItem::HeatingAndCooling,
            ProfileItem::HeatingOnly,
            ProfileItem::Rpp { power: -0.35 },
            ProfileItem::CoolingOnly,
        ]
    }

    #[tokio::test]
    async fn insert_then_read_back_every_variant() {
        let (c, _) = make_simulated().await;
        for (i, item) in every_variant().into_iter().enumerate() {
            let index = i as u8;
            c.insert_item(1, index, item).await.unwrap();
            assert_eq!(c.item(1, index).await.unwrap(), item, "variant {item}");
        }
        assert_eq!(c.item_count(1).await.unwrap(), 12);
        assert_eq!(c.read_profile(1).await.unwrap(), every_variant());
    }

    #[tokio::test]
    async fn delete_shifts_items_down() {
        let (c, _) = make_simulated().await;
        c.append_item(0, ProfileItem::Hold { tsp: 10.0 }).await.unwrap();
        c.append_item(0, ProfileItem::Wait { minutes: 2.0 }).await.unwrap();
        c.append_item(0, ProfileItem::Hold { tsp: 30.0 }).await.unwrap();

        let next = c.item(0, 2).await.unwrap();
        c.delete_item(0, 1).await.unwrap();
        assert_eq!(c.item(0, 1).await.unwrap(), next);
        assert_eq!(c.item_count(0).await.unwrap(), 2);

        c.delete_profile(0).await.unwrap();
        assert_eq!(c.item_count(0).await.unwrap(), 0);
        assert_eq!(c.item(0, 0).await.unwrap(), ProfileItem::End);
    }

    #[tokio::test]
    async fn playback_state_machine() {
        let (c, _) = make_simulated().await;
        c.append_item(2, ProfileItem::Hold { tsp: 40.0 }).await.unwrap();

        let mut visited = Vec::new();
        c.start_profile(2).await.unwrap();
        visited.push(c.profile_state().await.unwrap().status);
        c.pause_profile().await.unwrap();
        visited.push(c.profile_state().await.unwrap().status);
        c.resume_profile().await.unwrap();
        visited.push(c.profile_state().await.unwrap().status);
        c.stop_profile().await.unwrap();
        visited.push(c.profile_state().await.unwrap().status);

        assert_eq!(
            visited,
            vec![
                ProfileStatus::Run,
                ProfileStatus::Pause,
                ProfileStatus::Run,
                ProfileStatus::Stop
            ]
        );
    }

    #[tokio::test]
    async fn start_reports_active_profile() {
        let (c, _) = make_simulated().await;
        c.start_profile(4).await.unwrap();
        let state = c.profile_state().await.unwrap();
        assert_eq!(state.profile, 4);
        assert_eq!(state.index, 0);
        assert_eq!(
            c.runtime_information().await.unwrap().system_status,
            instec_core::SystemStatus::Profile
        );
    }

    fn invalid_items() -> Vec<ProfileItem> {
        vec![
            ProfileItem::Hold { tsp: 300.5 },
            ProfileItem::Ramp { tsp: 50.0, rate: 0.0 },
            ProfileItem::Ramp { tsp: -151.0, rate: 1.0 },
            ProfileItem::Wait { minutes: -1.0 },
            ProfileItem::Purge { delay: -0.5, hold: 1.0 },
            ProfileItem::Purge { delay: 0.0, hold: 0.0 },
            ProfileItem::Rpp { power: 1.5 },
            ProfileItem::Wait { minutes: f64::NAN },
        ]
    }

    #[tokio::test]
    async fn invalid_items_are_rejected_identically_without_writes() {
        let (c, handle) = make_simulated().await;
        c.append_item(3, ProfileItem::Stop).await.unwrap();

        for item in invalid_items() {
            let inserted = c.insert_item(3, 0, item).await;
            let replaced = c.set_item(3, 0, item).await;
            assert!(matches!(inserted, Err(Error::InvalidItem(_))), "{item}: {inserted:?}");
            assert!(matches!(replaced, Err(Error::InvalidItem(_))), "{item}: {replaced:?}");
        }

        let edits = handle
            .commands()
            .iter()
            .filter(|cmd| cmd.starts_with("PROF:EDIT:IINS") || cmd.starts_with("PROF:EDIT:IED"))
            .count();
        assert_eq!(edits, 1);
        assert_eq!(c.item(3, 0).await.unwrap(), ProfileItem::Stop);
    }

    #[tokio::test]
    async fn rpp_item_follows_mode_power_range() {
        let (c, _) = make_simulated().await;
        c.set_cooling_heating_status(TemperatureMode::CoolingOnly)
            .await
            .unwrap();
        assert!(matches!(
            c.insert_item(0, 0, ProfileItem::Rpp { power: 0.2 }).await,
            Err(Error::InvalidItem(_))
        ));
        c.insert_item(0, 0, ProfileItem::Rpp { power: -0.2 }).await.unwrap();
    }

    #[tokio::test]
    async fn only_needed_ranges_are_queried() {
        let mut mock = MockTransport::new();
        mock.expect(b"TEMP:RANG?\n", b"200,-40\r\n");
        mock.expect(b"TEMP:RTR?\n", b"100,0.1,200,20,0.1\r\n");
        let (c, monitor) = make_test_controller(mock).await;

        let result = c
            .insert_item(0, 0, ProfileItem::Ramp { tsp: 50.0, rate: 150.0 })
            .await;
        assert!(matches!(result, Err(Error::InvalidItem(_))));

        let result = c.insert_item(0, 0, ProfileItem::Wait { minutes: -5.0 }).await;
        assert!(matches!(result, Err(Error::InvalidItem(_))));

        assert_eq!(monitor.sent_lines(), vec!["TEMP:RANG?", "TEMP:RTR?"]);
    }

    #[tokio::test]
    async fn bounds_are_checked_before_any_traffic() {
        let (c, monitor) = make_test_controller(MockTransport::new()).await;
        let hold = ProfileItem::Hold { tsp: 20.0 };

        assert!(matches!(c.insert_item(5, 0, hold).await, Err(Error::InvalidIndex(_))));
        assert!(matches!(c.insert_item(0, 255, hold).await, Err(Error::InvalidIndex(_))));
        assert!(matches!(c.set_item(0, 255, hold).await, Err(Error::InvalidIndex(_))));
        assert!(matches!(c.delete_item(0, 255).await, Err(Error::InvalidIndex(_))));
        assert!(matches!(c.item(7, 0).await, Err(Error::InvalidIndex(_))));
        assert!(matches!(c.start_profile(5).await, Err(Error::InvalidIndex(_))));
        assert!(matches!(c.delete_profile(5).await, Err(Error::InvalidIndex(_))));
        assert!(matches!(c.item_count(5).await, Err(Error::InvalidIndex(_))));
        assert!(monitor.sent_data().is_empty());
    }

    #[tokio::test]
    async fn append_to_full_profile_is_invalid_index() {
        let (c, handle) = make_simulated().await;
        handle.with(|s| s.profiles[0].items = vec![(7, 0.0, 0.0); 255]);
        assert!(matches!(
            c.append_item(0, ProfileItem::Stop).await,
            Err(Error::InvalidIndex(_))
        ));
    }

    #[tokio::test]
    async fn set_item_params_keeps_stored_type() {
        let (c, _) = make_simulated().await;
        c.append_item(1, ProfileItem::Ramp { tsp: 10.0, rate: 1.0 })
            .await
            .unwrap();

        c.set_item_params(1, 0, Some(80.0), Some(4.0)).await.unwrap();
        assert_eq!(
            c.item(1, 0).await.unwrap(),
            ProfileItem::Ramp { tsp: 80.0, rate: 4.0 }
        );

        assert!(matches!(
            c.set_item_params(1, 0, Some(80.0), None).await,
            Err(Error::InvalidItem(_))
        ));
        assert!(matches!(
            c.set_item_params(1, 0, Some(900.0), Some(4.0)).await,
            Err(Error::InvalidItem(_))
        ));
    }

    #[tokio::test]
    async fn insert_in_the_middle() {
        let (c, _) = make_simulated().await;
        c.append_item(0, ProfileItem::Hold { tsp: 1.0 }).await.unwrap();
        c.append_item(0, ProfileItem::Hold { tsp: 3.0 }).await.unwrap();
        c.insert_item(0, 1, ProfileItem::Hold { tsp: 2.0 }).await.unwrap();
        assert_eq!(
            c.read_profile(0).await.unwrap(),
            vec![
                ProfileItem::Hold { tsp: 1.0 },
                ProfileItem::Hold { tsp: 2.0 },
                ProfileItem::Hold { tsp: 3.0 },
            ]
        );
    }

    #[tokio::test]
    async fn profile_names() {
        let (c, _) = make_simulated().await;
        assert_eq!(c.profile_name(0).await.unwrap(), "1 Profile");

        c.set_profile_name(0, "Anneal 200C").await.unwrap();
        assert_eq!(c.profile_name(0).await.unwrap(), "Anneal 200C");

        assert!(matches!(
            c.set_profile_name(0, "fifteen chars!!").await,
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            c.set_profile_name(0, "say \"hi\"").await,
            Err(Error::InvalidParameter(_))
        ));
        c.set_profile_name(0, "").await.unwrap();
        assert_eq!(c.profile_name(0).await.unwrap(), "");
    }

    #[tokio::test]
    async fn profile_name_cannot_smuggle_commands() {
        let (c, handle) = make_simulated().await;
        let before = handle.commands().len();

        for bad in ["\nTEMP:RPP 1;x", "a;b"] {
            assert!(matches!(
                c.set_profile_name(0, bad).await,
                Err(Error::InvalidParameter(_))
            ));
        }
        assert_eq!(handle.commands().len(), before);
        assert_eq!(c.system_status().await.unwrap(), SystemStatus::Stop);
        assert_eq!(c.profile_name(0).await.unwrap(), "1 Profile");
    }

    #[test]
    fn nesting_reports() {
        use ProfileItem::*;
        assert_eq!(loop_nesting(&[]), LoopNesting::Balanced);
        assert_eq!(
            loop_nesting(&[LoopBegin { count: 2 }, LoopBegin { count: 3 }, LoopEnd, LoopEnd]),
            LoopNesting::Balanced
        );
        assert_eq!(
            loop_nesting(&[LoopBegin { count: 2 }, LoopBegin { count: 3 }, LoopEnd]),
            LoopNesting::Unclosed(1)
        );
        assert_eq!(
            loop_nesting(&[Hold { tsp: 5.0 }, LoopEnd, LoopBegin { count: 1 }]),
            LoopNesting::UnmatchedEnd(1)
        );
    }

    #[tokio::test]
    async fn unbalanced_loops_are_not_enforced() {
        let (c, _) = make_simulated().await;
        c.append_item(0, ProfileItem::LoopEnd).await.unwrap();
        c.append_item(0, ProfileItem::LoopBegin { count: 0 }).await.unwrap();
        let items = c.read_profile(0).await.unwrap();
        assert_eq!(loop_nesting(&items), LoopNesting::UnmatchedEnd(0));
    }
}
