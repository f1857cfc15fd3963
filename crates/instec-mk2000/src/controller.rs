//! Controller -- the MK2000 driver.
//!
//! Ties the command builders and reply decoders ([`commands`]) and the
//! client-side checks ([`validate`]) to a [`CommandChannel`]. Every getter
//! is a fresh round trip; nothing read from the controller is cached.
//!
//! Long-running operations (`hold`, `ramp`, `purge`, profile playback)
//! return as soon as the controller has accepted the command. Poll
//! [`Controller::runtime_information`] to follow progress.
//!
//! Profile editing and playback live in [`crate::profile`].

use tracing::{debug, info, warn};

use instec_core::{
    Error, OperationRange, Pid, PidEntry, PidTable, PowerRange, Precision, RampRateRange, Result,
    RuntimeSnapshot, SystemInfo, SystemStatus, TemperatureMode, UnitType,
};

use crate::builder::ConnectionConfig;
use crate::channel::CommandChannel;
use crate::commands;
use crate::validate::{self, DEVICE_ERR_OUT_OF_RANGE};

/// A configured MK2000 controller.
///
/// Constructed via [`ControllerBuilder`](crate::builder::ControllerBuilder).
/// The connection is not opened until [`connect`](Controller::connect).
pub struct Controller {
    pub(crate) channel: CommandChannel,
    connection: Option<ConnectionConfig>,
}

impl Controller {
    pub(crate) fn new(channel: CommandChannel, connection: Option<ConnectionConfig>) -> Self {
        Controller {
            channel,
            connection,
        }
    }

    /// How this controller is reached, if it was built from a configuration
    /// rather than an injected transport.
    pub fn connection(&self) -> Option<&ConnectionConfig> {
        self.connection.as_ref()
    }

    // ---------------------------------------------------------------
    // Connection
    // ---------------------------------------------------------------

    /// Open the connection.
    pub async fn connect(&self) -> Result<()> {
        self.channel.open().await?;
        match &self.connection {
            Some(conn) => info!(connection = %conn, "connected to controller"),
            None => info!("connected to controller"),
        }
        Ok(())
    }

    /// Close the connection. It is not reopened implicitly.
    pub async fn disconnect(&self) -> Result<()> {
        self.channel.close().await?;
        info!("disconnected from controller");
        Ok(())
    }

    /// Whether the link is still usable.
    ///
    /// On a network connection this probes the socket, so a controller that
    /// has dropped the connection is detected without sending a command.
    pub async fn is_connected(&self) -> bool {
        self.channel.is_alive().await
    }

    // ---------------------------------------------------------------
    // Identification and telemetry
    // ---------------------------------------------------------------

    /// Company, model, serial number, and firmware version.
    pub async fn system_information(&self) -> Result<SystemInfo> {
        debug!("reading identification");
        let reply = self.channel.query(&commands::cmd_identify()).await?;
        commands::parse_system_info(&reply)
    }

    pub async fn serial_number(&self) -> Result<String> {
        let reply = self.channel.query(&commands::cmd_serial_number()).await?;
        Ok(reply.trim().to_string())
    }

    /// One decoded runtime-information reply.
    pub async fn runtime_information(&self) -> Result<RuntimeSnapshot> {
        let reply = self
            .channel
            .query(&commands::cmd_runtime_information())
            .await?;
        commands::parse_runtime_information(&reply)
    }

    /// Target set point (TSP).
    pub async fn set_point_temperature(&self) -> Result<f64> {
        Ok(self.runtime_information().await?.target_set_point)
    }

    /// Current set point (CSP).
    pub async fn current_set_point(&self) -> Result<f64> {
        Ok(self.runtime_information().await?.current_set_point)
    }

    pub async fn ramp_rate(&self) -> Result<f64> {
        Ok(self.runtime_information().await?.ramp_rate)
    }

    /// Output power as a fraction in `[-1, 1]`.
    pub async fn power(&self) -> Result<f64> {
        Ok(self.runtime_information().await?.percent_power)
    }

    pub async fn system_status(&self) -> Result<SystemStatus> {
        Ok(self.runtime_information().await?.system_status)
    }

    /// Error code from the runtime information, 0 if none.
    pub async fn error_code(&self) -> Result<i32> {
        Ok(self.runtime_information().await?.error_code)
    }

    /// Process variable of every slave; index 0 is slave 1.
    pub async fn process_variables(&self) -> Result<Vec<f64>> {
        let reply = self.channel.query(&commands::cmd_process_variables()).await?;
        commands::parse_float_list(&reply)
    }

    /// Monitor value of every slave; index 0 is slave 1.
    pub async fn monitor_values(&self) -> Result<Vec<f64>> {
        let reply = self.channel.query(&commands::cmd_monitor_values()).await?;
        commands::parse_float_list(&reply)
    }

    /// Protection sensor reading of every slave; index 0 is slave 1.
    pub async fn protection_sensors(&self) -> Result<Vec<f64>> {
        let reply = self
            .channel
            .query(&commands::cmd_protection_sensors())
            .await?;
        commands::parse_float_list(&reply)
    }

    /// Process variable of the operating slave.
    pub async fn process_variable(&self) -> Result<f64> {
        let slave = self.operating_slave().await?;
        let values = self.process_variables().await?;
        select_slave(&values, slave)
    }

    /// Monitor value of the operating slave.
    pub async fn monitor_value(&self) -> Result<f64> {
        let slave = self.operating_slave().await?;
        let values = self.monitor_values().await?;
        select_slave(&values, slave)
    }

    /// The controller's current error code (`TEMP:ERR?`).
    pub async fn error(&self) -> Result<i32> {
        let reply = self.channel.query(&commands::cmd_error()).await?;
        commands::parse_int(&reply)
    }

    pub async fn powerboard_temperature(&self) -> Result<f64> {
        let reply = self
            .channel
            .query(&commands::cmd_powerboard_temperature())
            .await?;
        commands::parse_float(&reply)
    }

    /// Slave currently driving the loop (1-based).
    pub async fn operating_slave(&self) -> Result<u8> {
        let reply = self.channel.query(&commands::cmd_operating_slave()).await?;
        commands::parse_int(&reply)
    }

    /// Select the slave that drives the loop, `1..=slave_count()`.
    pub async fn set_operating_slave(&self, slave: u8) -> Result<()> {
        let count = self.slave_count().await?;
        if slave == 0 || slave > count {
            return Err(Error::InvalidIndex(format!(
                "slave {slave} (valid 1..={count})"
            )));
        }
        debug!(slave, "setting operating slave");
        self.channel
            .write(&commands::cmd_set_operating_slave(slave))
            .await
    }

    pub async fn slave_count(&self) -> Result<u8> {
        let reply = self.channel.query(&commands::cmd_slave_count()).await?;
        commands::parse_int(&reply)
    }

    pub async fn pv_unit_type(&self) -> Result<UnitType> {
        let reply = self.channel.query(&commands::cmd_pv_unit_type()).await?;
        commands::parse_unit_type(&reply)
    }

    pub async fn mv_unit_type(&self) -> Result<UnitType> {
        let reply = self.channel.query(&commands::cmd_mv_unit_type()).await?;
        commands::parse_unit_type(&reply)
    }

    /// Display precision of PV and MV.
    pub async fn precision(&self) -> Result<Precision> {
        let reply = self.channel.query(&commands::cmd_precision()).await?;
        commands::parse_precision(&reply)
    }

    // ---------------------------------------------------------------
    // Temperature control
    // ---------------------------------------------------------------

    /// Hold at `tsp` °C.
    ///
    /// Rejected with [`Error::OutOfRange`] before anything is sent if `tsp`
    /// is outside the operation range. If the controller itself reports the
    /// set point out of range, the driver stops the controller and returns
    /// [`Error::OutOfRange`].
    pub async fn hold(&self, tsp: f64) -> Result<()> {
        let range = self.operation_range().await?;
        validate::check_set_point(tsp, &range).inspect_err(|e| debug!(tsp, error = %e, "hold rejected"))?;

        debug!(tsp, "holding");
        let reply = self.channel.query(&commands::cmd_hold(tsp)).await?;
        self.check_set_point_accepted(&reply, "hold").await
    }

    /// Ramp to `tsp` °C at `rate` °C/min.
    ///
    /// `tsp` is checked like [`hold`](Controller::hold). A rate beyond the
    /// controller's limit is clamped by the controller, not rejected; read
    /// back [`ramp_rate`](Controller::ramp_rate) to see the rate in effect.
    pub async fn ramp(&self, tsp: f64, rate: f64) -> Result<()> {
        let range = self.operation_range().await?;
        validate::check_set_point(tsp, &range).inspect_err(|e| debug!(tsp, error = %e, "ramp rejected"))?;

        debug!(tsp, rate, "ramping");
        let reply = self.channel.query(&commands::cmd_ramp(tsp, rate)).await?;
        self.check_set_point_accepted(&reply, "ramp").await
    }

    /// Drive a fixed output power, `-1.0..=1.0`.
    pub async fn rpp(&self, power: f64) -> Result<()> {
        validate::check_power(power, &PowerRange::FULL)?;
        debug!(power, "setting fixed power");
        self.channel.write(&commands::cmd_rpp(power)).await
    }

    /// Purge after `delay` minutes for `hold` minutes.
    pub async fn purge(&self, delay: f64, hold: f64) -> Result<()> {
        validate::check_purge(delay, hold)?;
        debug!(delay, hold, "starting purge");
        self.channel.write(&commands::cmd_purge(delay, hold)).await
    }

    /// Stop all temperature control.
    pub async fn stop(&self) -> Result<()> {
        debug!("stopping");
        self.channel.write(&commands::cmd_stop()).await
    }

    pub async fn cooling_heating_status(&self) -> Result<TemperatureMode> {
        let reply = self
            .channel
            .query(&commands::cmd_cooling_heating_status())
            .await?;
        commands::parse_temperature_mode(&reply)
    }

    pub async fn set_cooling_heating_status(&self, mode: TemperatureMode) -> Result<()> {
        debug!(%mode, "setting cooling/heating mode");
        self.channel
            .write(&commands::cmd_set_cooling_heating_status(mode))
            .await
    }

    /// Interpret the error code chained after a HOLD/RAMP.
    async fn check_set_point_accepted(&self, reply: &str, op: &str) -> Result<()> {
        let code: i32 = commands::parse_int(reply)?;
        if code == DEVICE_ERR_OUT_OF_RANGE {
            warn!(op, "controller rejected set point as out of range, stopping");
            self.stop().await?;
            return Err(Error::OutOfRange(format!(
                "controller rejected {op} set point"
            )));
        }
        if code != 0 {
            warn!(op, code, "controller reported error after set point");
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Ranges
    // ---------------------------------------------------------------

    /// Absolute temperature limits of the stage.
    pub async fn stage_range(&self) -> Result<OperationRange> {
        let reply = self.channel.query(&commands::cmd_stage_range()).await?;
        commands::parse_range(&reply)
    }

    /// Window set points must fall within.
    pub async fn operation_range(&self) -> Result<OperationRange> {
        let reply = self.channel.query(&commands::cmd_operation_range()).await?;
        commands::parse_range(&reply)
    }

    pub async fn default_operation_range(&self) -> Result<OperationRange> {
        let reply = self
            .channel
            .query(&commands::cmd_default_operation_range())
            .await?;
        commands::parse_range(&reply)
    }

    /// Set the operation range.
    ///
    /// `min <= max` and the range must lie within the stage range, which is
    /// queried fresh for every call.
    pub async fn set_operation_range(&self, max: f64, min: f64) -> Result<()> {
        let stage = self.stage_range().await?;
        let range = validate::check_operation_range(max, min, &stage)
            .inspect_err(|e| debug!(max, min, error = %e, "operation range rejected"))?;
        debug!(%range, "setting operation range");
        self.channel
            .write(&commands::cmd_set_operation_range(range.max(), range.min()))
            .await
    }

    pub async fn ramp_rate_range(&self) -> Result<RampRateRange> {
        let reply = self.channel.query(&commands::cmd_ramp_rate_range()).await?;
        commands::parse_ramp_rate_range(&reply)
    }

    /// Output power window for the current cooling/heating mode.
    pub async fn power_range(&self) -> Result<PowerRange> {
        Ok(self.cooling_heating_status().await?.power_range())
    }

    pub async fn is_in_operation_range(&self, temperature: f64) -> Result<bool> {
        Ok(self.operation_range().await?.contains(temperature))
    }

    pub async fn is_in_ramp_rate_range(&self, rate: f64) -> Result<bool> {
        Ok(self.ramp_rate_range().await?.contains(rate))
    }

    pub async fn is_in_power_range(&self, power: f64) -> Result<bool> {
        Ok(self.power_range().await?.contains(power))
    }

    // ---------------------------------------------------------------
    // PID
    // ---------------------------------------------------------------

    /// Gains currently in use.
    pub async fn current_pid(&self) -> Result<Pid> {
        let reply = self.channel.query(&commands::cmd_current_pid()).await?;
        commands::parse_pid(&reply)
    }

    /// Read one row of a PID table.
    pub async fn pid(&self, table: PidTable, index: u8) -> Result<PidEntry> {
        validate::check_pid_index(index)?;
        let reply = self.channel.query(&commands::cmd_pid(table, index)).await?;
        commands::parse_pid_entry(&reply)
    }

    /// Write one row of a PID table.
    ///
    /// Requires `p > 0`, `i >= 0`, `d >= 0`, and `temperature` within the
    /// operation range.
    pub async fn set_pid(
        &self,
        table: PidTable,
        index: u8,
        temperature: f64,
        p: f64,
        i: f64,
        d: f64,
    ) -> Result<()> {
        validate::check_pid_index(index)?;
        validate::check_pid_gains(p, i, d)?;
        let range = self.operation_range().await?;
        validate::check_set_point(temperature, &range)?;

        debug!(%table, index, temperature, p, i, d, "writing PID entry");
        self.channel
            .write(&commands::cmd_set_pid(table, index, temperature, Pid { p, i, d }))
            .await
    }
}

fn select_slave(values: &[f64], slave: u8) -> Result<f64> {
    usize::from(slave)
        .checked_sub(1)
        .and_then(|i| values.get(i).copied())
        .ok_or_else(|| {
            Error::Decode(format!(
                "operating slave {slave} has no reading among {} values",
                values.len()
            ))
        })
}
