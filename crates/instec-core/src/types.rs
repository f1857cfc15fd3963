//! Core types used throughout the driver.
//!
//! Status enumerations map one-to-one onto the small integer codes the
//! controller reports. Decoding an unknown code is always an
//! [`Error::Decode`], never a fallback variant, so that firmware drift
//! surfaces immediately instead of being masked.

use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------
// Status enumerations
// ---------------------------------------------------------------

/// What the temperature loop is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemStatus {
    /// Idle, no active control.
    Stop,
    /// Holding at the target set point.
    Hold,
    /// Ramping toward the target set point.
    Ramp,
    /// Ramp or hold paused.
    Pause,
    /// Executing a stored profile.
    Profile,
    /// Driving a fixed percent power (RPP).
    Pp,
    /// Running a purge cycle.
    Purge,
}

impl SystemStatus {
    /// Decode a status code as reported in the runtime information reply.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(SystemStatus::Stop),
            1 => Ok(SystemStatus::Hold),
            2 => Ok(SystemStatus::Ramp),
            3 => Ok(SystemStatus::Pause),
            4 => Ok(SystemStatus::Profile),
            5 => Ok(SystemStatus::Pp),
            6 => Ok(SystemStatus::Purge),
            other => Err(Error::Decode(format!("unknown system status code {other}"))),
        }
    }

    /// The wire code for this status.
    pub fn code(&self) -> u8 {
        match self {
            SystemStatus::Stop => 0,
            SystemStatus::Hold => 1,
            SystemStatus::Ramp => 2,
            SystemStatus::Pause => 3,
            SystemStatus::Profile => 4,
            SystemStatus::Pp => 5,
            SystemStatus::Purge => 6,
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SystemStatus::Stop => "STOP",
            SystemStatus::Hold => "HOLD",
            SystemStatus::Ramp => "RAMP",
            SystemStatus::Pause => "PAUSE",
            SystemStatus::Profile => "PROFILE",
            SystemStatus::Pp => "PP",
            SystemStatus::Purge => "PURGE",
        };
        write!(f, "{s}")
    }
}

/// Playback state of the profile executor.
///
/// Transitions are driven by the controller: `Stop -> Run` on start,
/// `Run -> Pause` once the in-flight instruction completes after a pause
/// request, `Pause -> Run` on resume, and `Run | Pause -> Stop` on stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileStatus {
    Stop,
    Run,
    Pause,
}

impl ProfileStatus {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ProfileStatus::Stop),
            1 => Ok(ProfileStatus::Run),
            2 => Ok(ProfileStatus::Pause),
            other => Err(Error::Decode(format!("unknown profile status code {other}"))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ProfileStatus::Stop => 0,
            ProfileStatus::Run => 1,
            ProfileStatus::Pause => 2,
        }
    }
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProfileStatus::Stop => "STOP",
            ProfileStatus::Run => "RUN",
            ProfileStatus::Pause => "PAUSE",
        };
        write!(f, "{s}")
    }
}

/// Which output stages the controller may drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemperatureMode {
    HeatingAndCooling,
    HeatingOnly,
    CoolingOnly,
}

impl TemperatureMode {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(TemperatureMode::HeatingAndCooling),
            1 => Ok(TemperatureMode::HeatingOnly),
            2 => Ok(TemperatureMode::CoolingOnly),
            other => Err(Error::Decode(format!(
                "unknown cooling/heating mode code {other}"
            ))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            TemperatureMode::HeatingAndCooling => 0,
            TemperatureMode::HeatingOnly => 1,
            TemperatureMode::CoolingOnly => 2,
        }
    }

    /// The percent-power window available in this mode.
    pub fn power_range(&self) -> PowerRange {
        match self {
            TemperatureMode::HeatingAndCooling => PowerRange { max: 1.0, min: -1.0 },
            TemperatureMode::HeatingOnly => PowerRange { max: 1.0, min: 0.0 },
            TemperatureMode::CoolingOnly => PowerRange { max: 0.0, min: -1.0 },
        }
    }
}

impl fmt::Display for TemperatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TemperatureMode::HeatingAndCooling => "HEATING_AND_COOLING",
            TemperatureMode::HeatingOnly => "HEATING_ONLY",
            TemperatureMode::CoolingOnly => "COOLING_ONLY",
        };
        write!(f, "{s}")
    }
}

/// PID table selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PidTable {
    /// Heating in heating-and-cooling mode.
    HeatingHnc,
    /// Cooling in heating-and-cooling mode.
    CoolingHnc,
    /// Heating in heating-only mode.
    HeatingHo,
    /// Cooling in cooling-only mode.
    CoolingCo,
}

impl PidTable {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(PidTable::HeatingHnc),
            1 => Ok(PidTable::CoolingHnc),
            2 => Ok(PidTable::HeatingHo),
            3 => Ok(PidTable::CoolingCo),
            other => Err(Error::Decode(format!("unknown PID table code {other}"))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            PidTable::HeatingHnc => 0,
            PidTable::CoolingHnc => 1,
            PidTable::HeatingHo => 2,
            PidTable::CoolingCo => 3,
        }
    }
}

impl fmt::Display for PidTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PidTable::HeatingHnc => "HEATING_HNC",
            PidTable::CoolingHnc => "COOLING_HNC",
            PidTable::HeatingHo => "HEATING_HO",
            PidTable::CoolingCo => "COOLING_CO",
        };
        write!(f, "{s}")
    }
}

/// Unit in which a process or monitor variable is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitType {
    Kelvin,
    Celsius,
    Volts,
    Ohms,
}

impl UnitType {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(UnitType::Kelvin),
            1 => Ok(UnitType::Celsius),
            2 => Ok(UnitType::Volts),
            3 => Ok(UnitType::Ohms),
            other => Err(Error::Decode(format!("unknown unit type code {other}"))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            UnitType::Kelvin => 0,
            UnitType::Celsius => 1,
            UnitType::Volts => 2,
            UnitType::Ohms => 3,
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitType::Kelvin => "K",
            UnitType::Celsius => "°C",
            UnitType::Volts => "V",
            UnitType::Ohms => "Ω",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------
// Telemetry records
// ---------------------------------------------------------------

/// Identification reply (`*IDN?`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub company: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

/// One decoded runtime-information reply (`TEMP:RTIN?`).
///
/// Produced fresh on every query; the driver never mutates or caches it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeSnapshot {
    /// Slave currently driving the loop (1-based).
    pub active_slave: u8,
    /// Process variable of the active slave.
    pub process_variable: f64,
    /// Monitor value of the active slave.
    pub monitor_value: f64,
    /// Target set point (TSP).
    pub target_set_point: f64,
    /// Current set point (CSP), the live intermediate target during a ramp.
    pub current_set_point: f64,
    /// Ramp rate in °C/min.
    pub ramp_rate: f64,
    /// Output power as a fraction, `-1.0..=1.0`.
    pub percent_power: f64,
    pub system_status: SystemStatus,
    pub profile_status: ProfileStatus,
    /// Profile slot selected for playback.
    pub active_profile: u8,
    /// Instruction index the profile executor is at.
    pub instruction_index: u8,
    /// Error code reported by the controller, 0 if none.
    pub error_code: i32,
}

/// Profile executor state (`PROF:RTST?`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileState {
    pub status: ProfileStatus,
    pub profile: u8,
    pub index: u8,
}

/// Proportional/integral/derivative gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pid {
    pub p: f64,
    pub i: f64,
    pub d: f64,
}

/// One row of a PID table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidEntry {
    pub table: PidTable,
    pub index: u8,
    /// Temperature at which this row applies.
    pub temperature: f64,
    pub pid: Pid,
}

/// Number of decimal places displayed for PV and MV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Precision {
    pub pv_decimals: u8,
    pub mv_decimals: u8,
}

// ---------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------

/// Inclusive temperature window `[min, max]`.
///
/// Used for the operation range, the absolute stage range, and the default
/// operation range. `min <= max` always holds for a constructed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationRange {
    max: f64,
    min: f64,
}

impl OperationRange {
    /// Build a range, rejecting `min > max` (or NaN bounds) with
    /// [`Error::OutOfRange`].
    pub fn new(max: f64, min: f64) -> Result<Self> {
        if !(min <= max) {
            return Err(Error::OutOfRange(format!(
                "range minimum {min} exceeds maximum {max}"
            )));
        }
        Ok(OperationRange { max, min })
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    /// Whether `value` lies within the range, bounds inclusive.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Whether `other` lies entirely within this range.
    pub fn encloses(&self, other: &OperationRange) -> bool {
        other.min >= self.min && other.max <= self.max
    }
}

impl fmt::Display for OperationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Ramp-rate limits (`TEMP:RTR?`).
///
/// Above `limit_value` the controller restricts the rate to the narrower
/// `[limit_min, limit_max]` window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampRateRange {
    pub max: f64,
    pub min: f64,
    pub limit_value: f64,
    pub limit_max: f64,
    pub limit_min: f64,
}

impl RampRateRange {
    pub fn contains(&self, rate: f64) -> bool {
        rate >= self.min && rate <= self.max
    }
}

/// Fractional output power window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerRange {
    pub max: f64,
    pub min: f64,
}

impl PowerRange {
    /// The full bipolar window every RPP command must fall within.
    pub const FULL: PowerRange = PowerRange { max: 1.0, min: -1.0 };

    pub fn contains(&self, power: f64) -> bool {
        power >= self.min && power <= self.max
    }
}

// ---------------------------------------------------------------
// Profile instructions
// ---------------------------------------------------------------

/// Instruction type of a profile item, as encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileItemKind {
    /// End-of-profile marker; what an unused slot reads back as.
    End,
    Hold,
    Ramp,
    Wait,
    LoopBegin,
    LoopEnd,
    Purge,
    Stop,
    HeatingAndCooling,
    HeatingOnly,
    Rpp,
    CoolingOnly,
}

impl ProfileItemKind {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ProfileItemKind::End),
            1 => Ok(ProfileItemKind::Hold),
            2 => Ok(ProfileItemKind::Ramp),
            3 => Ok(ProfileItemKind::Wait),
            4 => Ok(ProfileItemKind::LoopBegin),
            5 => Ok(ProfileItemKind::LoopEnd),
            6 => Ok(ProfileItemKind::Purge),
            7 => Ok(ProfileItemKind::Stop),
            8 => Ok(ProfileItemKind::HeatingAndCooling),
            9 => Ok(ProfileItemKind::HeatingOnly),
            10 => Ok(ProfileItemKind::Rpp),
            11 => Ok(ProfileItemKind::CoolingOnly),
            other => Err(Error::Decode(format!("unknown profile item code {other}"))),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            ProfileItemKind::End => 0,
            ProfileItemKind::Hold => 1,
            ProfileItemKind::Ramp => 2,
            ProfileItemKind::Wait => 3,
            ProfileItemKind::LoopBegin => 4,
            ProfileItemKind::LoopEnd => 5,
            ProfileItemKind::Purge => 6,
            ProfileItemKind::Stop => 7,
            ProfileItemKind::HeatingAndCooling => 8,
            ProfileItemKind::HeatingOnly => 9,
            ProfileItemKind::Rpp => 10,
            ProfileItemKind::CoolingOnly => 11,
        }
    }

    /// Number of numeric parameters an item of this kind carries.
    pub fn param_count(&self) -> usize {
        match self {
            ProfileItemKind::Hold
            | ProfileItemKind::Wait
            | ProfileItemKind::LoopBegin
            | ProfileItemKind::Rpp => 1,
            ProfileItemKind::Ramp | ProfileItemKind::Purge => 2,
            ProfileItemKind::End
            | ProfileItemKind::LoopEnd
            | ProfileItemKind::Stop
            | ProfileItemKind::HeatingAndCooling
            | ProfileItemKind::HeatingOnly
            | ProfileItemKind::CoolingOnly => 0,
        }
    }
}

impl fmt::Display for ProfileItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProfileItemKind::End => "END",
            ProfileItemKind::Hold => "HOLD",
            ProfileItemKind::Ramp => "RAMP",
            ProfileItemKind::Wait => "WAIT",
            ProfileItemKind::LoopBegin => "LOOP_BEGIN",
            ProfileItemKind::LoopEnd => "LOOP_END",
            ProfileItemKind::Purge => "PURGE",
            ProfileItemKind::Stop => "STOP",
            ProfileItemKind::HeatingAndCooling => "HEATING_AND_COOLING",
            ProfileItemKind::HeatingOnly => "HEATING_ONLY",
            ProfileItemKind::Rpp => "RPP",
            ProfileItemKind::CoolingOnly => "COOLING_ONLY",
        };
        write!(f, "{s}")
    }
}

/// One stored profile instruction with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfileItem {
    End,
    /// Hold at `tsp` °C.
    Hold { tsp: f64 },
    /// Ramp to `tsp` °C at `rate` °C/min.
    Ramp { tsp: f64, rate: f64 },
    /// Wait for `minutes`.
    Wait { minutes: f64 },
    /// Repeat the enclosed block `count` times.
    LoopBegin { count: u32 },
    LoopEnd,
    /// Purge after `delay` minutes for `hold` minutes.
    Purge { delay: f64, hold: f64 },
    Stop,
    HeatingAndCooling,
    HeatingOnly,
    /// Run at fixed fractional `power`.
    Rpp { power: f64 },
    CoolingOnly,
}

impl ProfileItem {
    pub fn kind(&self) -> ProfileItemKind {
        match self {
            ProfileItem::End => ProfileItemKind::End,
            ProfileItem::Hold { .. } => ProfileItemKind::Hold,
            ProfileItem::Ramp { .. } => ProfileItemKind::Ramp,
            ProfileItem::Wait { .. } => ProfileItemKind::Wait,
            ProfileItem::LoopBegin { .. } => ProfileItemKind::LoopBegin,
            ProfileItem::LoopEnd => ProfileItemKind::LoopEnd,
            ProfileItem::Purge { .. } => ProfileItemKind::Purge,
            ProfileItem::Stop => ProfileItemKind::Stop,
            ProfileItem::HeatingAndCooling => ProfileItemKind::HeatingAndCooling,
            ProfileItem::HeatingOnly => ProfileItemKind::HeatingOnly,
            ProfileItem::Rpp { .. } => ProfileItemKind::Rpp,
            ProfileItem::CoolingOnly => ProfileItemKind::CoolingOnly,
        }
    }

    /// The item's numeric parameters in wire order.
    pub fn params(&self) -> (Option<f64>, Option<f64>) {
        match *self {
            ProfileItem::Hold { tsp } => (Some(tsp), None),
            ProfileItem::Ramp { tsp, rate } => (Some(tsp), Some(rate)),
            ProfileItem::Wait { minutes } => (Some(minutes), None),
            ProfileItem::LoopBegin { count } => (Some(f64::from(count)), None),
            ProfileItem::Purge { delay, hold } => (Some(delay), Some(hold)),
            ProfileItem::Rpp { power } => (Some(power), None),
            ProfileItem::End
            | ProfileItem::LoopEnd
            | ProfileItem::Stop
            | ProfileItem::HeatingAndCooling
            | ProfileItem::HeatingOnly
            | ProfileItem::CoolingOnly => (None, None),
        }
    }

    /// Build an item from its kind and positional parameters.
    ///
    /// The number of supplied parameters must match
    /// [`ProfileItemKind::param_count`] exactly; a loop count must be a
    /// non-negative integer. Violations are [`Error::InvalidItem`].
    pub fn from_parts(kind: ProfileItemKind, b1: Option<f64>, b2: Option<f64>) -> Result<Self> {
        let supplied = usize::from(b1.is_some()) + usize::from(b2.is_some());
        if b1.is_none() && b2.is_some() || supplied != kind.param_count() {
            return Err(Error::InvalidItem(format!(
                "{kind} takes {} parameter(s), got {supplied}",
                kind.param_count()
            )));
        }

        let a = b1.unwrap_or_default();
        let b = b2.unwrap_or_default();
        let item = match kind {
            ProfileItemKind::End => ProfileItem::End,
            ProfileItemKind::Hold => ProfileItem::Hold { tsp: a },
            ProfileItemKind::Ramp => ProfileItem::Ramp { tsp: a, rate: b },
            ProfileItemKind::Wait => ProfileItem::Wait { minutes: a },
            ProfileItemKind::LoopBegin => {
                if !(a >= 0.0) || a.fract() != 0.0 || a > f64::from(u32::MAX) {
                    return Err(Error::InvalidItem(format!(
                        "LOOP_BEGIN count must be a non-negative integer, got {a}"
                    )));
                }
                ProfileItem::LoopBegin { count: a as u32 }
            }
            ProfileItemKind::LoopEnd => ProfileItem::LoopEnd,
            ProfileItemKind::Purge => ProfileItem::Purge { delay: a, hold: b },
            ProfileItemKind::Stop => ProfileItem::Stop,
            ProfileItemKind::HeatingAndCooling => ProfileItem::HeatingAndCooling,
            ProfileItemKind::HeatingOnly => ProfileItem::HeatingOnly,
            ProfileItemKind::Rpp => ProfileItem::Rpp { power: a },
            ProfileItemKind::CoolingOnly => ProfileItem::CoolingOnly,
        };
        Ok(item)
    }
}

impl fmt::Display for ProfileItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ProfileItem::Hold { tsp } => write!(f, "HOLD {tsp}°C"),
            ProfileItem::Ramp { tsp, rate } => write!(f, "RAMP {tsp}°C @ {rate}°C/min"),
            ProfileItem::Wait { minutes } => write!(f, "WAIT {minutes} min"),
            ProfileItem::LoopBegin { count } => write!(f, "LOOP_BEGIN x{count}"),
            ProfileItem::Purge { delay, hold } => {
                write!(f, "PURGE delay {delay} min, hold {hold} min")
            }
            ProfileItem::Rpp { power } => write!(f, "RPP {power}"),
            other => write!(f, "{}", other.kind()),
        }
    }
}
