//! MK2000 command builders and reply decoders.
//!
//! Builders return the command line without its terminator; the
//! [`CommandChannel`](crate::channel::CommandChannel) frames it. Decoders take
//! the reply text with the terminator already stripped.
//!
//! All functions are pure. Any reply that does not have the expected number
//! of fields, holds a value that does not parse, or carries an unknown
//! enumeration code is an [`Error::Decode`].
//!
//! # Reply shapes
//!
//! | Command | Reply |
//! |---|---|
//! | `*IDN?` | `company,model,serial,firmware` |
//! | `TEMP:RTIN?` | `...MK#slave:pv:mv:tsp:csp:rt:pp:sys:prof,profile,index:err` |
//! | `TEMP:CTEM?` etc. | `v1,v2,...` (one value per slave) |
//! | `TEMP:RANG?` etc. | `max,min` |
//! | `TEMP:RTR?` | `max,min,limit_value,limit_max,limit_min` |
//! | `TEMP:GPID t,i` | `table,index,temp,p,i,d` |
//! | `PROF:RTST?` | `status,profile,index` |
//! | `PROF:EDIT:IRE p,i` | `type,b1,b2` |

use std::str::FromStr;

use instec_core::{
    Error, OperationRange, Pid, PidEntry, PidTable, Precision, ProfileItem, ProfileItemKind,
    ProfileState, ProfileStatus, RampRateRange, Result, RuntimeSnapshot, SystemInfo,
    SystemStatus, TemperatureMode, UnitType,
};

/// Marker preceding the runtime-information fields.
const RTIN_MARKER: &str = "MK#";

// ---------------------------------------------------------------
// Identification and telemetry
// ---------------------------------------------------------------

pub fn cmd_identify() -> String {
    "*IDN?".into()
}

pub fn cmd_serial_number() -> String {
    "TEMP:SNUM?".into()
}

pub fn cmd_runtime_information() -> String {
    "TEMP:RTIN?".into()
}

/// Process variables of every slave (`TEMP:CTEM?`).
pub fn cmd_process_variables() -> String {
    "TEMP:CTEM?".into()
}

/// Monitor values of every slave (`TEMP:MTEM?`).
pub fn cmd_monitor_values() -> String {
    "TEMP:MTEM?".into()
}

/// Protection sensor readings of every slave (`TEMP:PTEM?`).
pub fn cmd_protection_sensors() -> String {
    "TEMP:PTEM?".into()
}

pub fn cmd_error() -> String {
    "TEMP:ERR?".into()
}

pub fn cmd_powerboard_temperature() -> String {
    "TEMP:TP?".into()
}

pub fn cmd_operating_slave() -> String {
    "TEMP:OPSL?".into()
}

pub fn cmd_set_operating_slave(slave: u8) -> String {
    format!("TEMP:OPSL {slave}")
}

pub fn cmd_slave_count() -> String {
    "TEMP:SLAV?".into()
}

pub fn cmd_pv_unit_type() -> String {
    "TEMP:TCUN?".into()
}

pub fn cmd_mv_unit_type() -> String {
    "TEMP:TMUN?".into()
}

pub fn cmd_precision() -> String {
    "TEMP:PREC?".into()
}

// ---------------------------------------------------------------
// Temperature control
// ---------------------------------------------------------------

/// Hold at `tsp`, chained with an error query so the controller reports
/// whether it accepted the set point.
pub fn cmd_hold(tsp: f64) -> String {
    format!("TEMP:HOLD {tsp}; ERR?")
}

/// Ramp to `tsp` at `rate` °C/min, chained with an error query.
pub fn cmd_ramp(tsp: f64, rate: f64) -> String {
    format!("TEMP:RAMP {tsp},{rate}; ERR?")
}

pub fn cmd_rpp(power: f64) -> String {
    format!("TEMP:RPP {power}")
}

pub fn cmd_stop() -> String {
    "TEMP:STOP".into()
}

pub fn cmd_purge(delay: f64, hold: f64) -> String {
    format!("TEMP:PURG {delay},{hold}")
}

pub fn cmd_cooling_heating_status() -> String {
    "TEMP:COOL?".into()
}

pub fn cmd_set_cooling_heating_status(mode: TemperatureMode) -> String {
    format!("TEMP:COOL {}", mode.code())
}

// ---------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------

pub fn cmd_operation_range() -> String {
    "TEMP:RANG?".into()
}

pub fn cmd_set_operation_range(max: f64, min: f64) -> String {
    format!("TEMP:RANG {max},{min}")
}

pub fn cmd_stage_range() -> String {
    "TEMP:SRAN?".into()
}

pub fn cmd_default_operation_range() -> String {
    "TEMP:DRAN?".into()
}

pub fn cmd_ramp_rate_range() -> String {
    "TEMP:RTR?".into()
}

// ---------------------------------------------------------------
// PID
// ---------------------------------------------------------------

pub fn cmd_current_pid() -> String {
    "TEMP:PID?".into()
}

pub fn cmd_pid(table: PidTable, index: u8) -> String {
    format!("TEMP:GPID {},{index}", table.code())
}

pub fn cmd_set_pid(table: PidTable, index: u8, temperature: f64, pid: Pid) -> String {
    format!(
        "TEMP:SPID {},{index},{temperature},{},{},{}",
        table.code(),
        pid.p,
        pid.i,
        pid.d
    )
}

// ---------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------

pub fn cmd_profile_state() -> String {
    "PROF:RTST?".into()
}

pub fn cmd_start_profile(profile: u8) -> String {
    format!("PROF:STAR {profile}")
}

pub fn cmd_pause_profile() -> String {
    "PROF:PAUS".into()
}

pub fn cmd_resume_profile() -> String {
    "PROF:RES".into()
}

pub fn cmd_stop_profile() -> String {
    "PROF:STOP".into()
}

/// Delete every item of a profile.
pub fn cmd_delete_profile(profile: u8) -> String {
    format!("PROF:EDIT:PDEL {profile}")
}

/// Delete one item; later items shift down.
pub fn cmd_delete_item(profile: u8, index: u8) -> String {
    format!("PROF:EDIT:PDEL {profile},{index}")
}

/// Insert `item` before position `index`.
pub fn cmd_insert_item(profile: u8, index: u8, item: &ProfileItem) -> String {
    format!("PROF:EDIT:IINS {}", item_fields(profile, index, item))
}

/// Replace the item at `index` in place.
pub fn cmd_edit_item(profile: u8, index: u8, item: &ProfileItem) -> String {
    format!("PROF:EDIT:IED {}", item_fields(profile, index, item))
}

pub fn cmd_read_item(profile: u8, index: u8) -> String {
    format!("PROF:EDIT:IRE {profile},{index}")
}

pub fn cmd_item_count(profile: u8) -> String {
    format!("PROF:EDIT:ICO {profile}")
}

pub fn cmd_profile_name(profile: u8) -> String {
    format!("PROF:EDIT:GNAM {profile}")
}

pub fn cmd_set_profile_name(profile: u8, name: &str) -> String {
    format!("PROF:EDIT:SNAM {profile},\"{name}\"")
}

/// `profile,index,type[,b1[,b2]]`, with a loop count as an integer.
fn item_fields(profile: u8, index: u8, item: &ProfileItem) -> String {
    let mut out = format!("{profile},{index},{}", item.kind().code());
    match *item {
        ProfileItem::LoopBegin { count } => out.push_str(&format!(",{count}")),
        _ => {
            let (b1, b2) = item.params();
            for value in [b1, b2].into_iter().flatten() {
                out.push_str(&format!(",{value}"));
            }
        }
    }
    out
}

// ---------------------------------------------------------------
// Reply decoders
// ---------------------------------------------------------------

fn parse_field<T: FromStr>(field: &str, what: &str) -> Result<T> {
    field
        .trim()
        .parse()
        .map_err(|_| Error::Decode(format!("invalid {what}: {field:?}")))
}

/// Split `reply` on `sep` and require exactly `n` fields.
fn fields<'a>(reply: &'a str, sep: char, n: usize, what: &str) -> Result<Vec<&'a str>> {
    let parts: Vec<&str> = reply.split(sep).collect();
    if parts.len() != n {
        return Err(Error::Decode(format!(
            "{what}: expected {n} fields, got {} in {reply:?}",
            parts.len()
        )));
    }
    Ok(parts)
}

/// Parse a single float reply (`TEMP:TP?` and similar).
pub fn parse_float(reply: &str) -> Result<f64> {
    parse_field(reply, "number")
}

/// Parse a single integer reply.
pub fn parse_int<T: FromStr>(reply: &str) -> Result<T> {
    parse_field(reply, "integer")
}

/// Parse `*IDN?` into its four trimmed fields.
pub fn parse_system_info(reply: &str) -> Result<SystemInfo> {
    let f = fields(reply, ',', 4, "identification")?;
    Ok(SystemInfo {
        company: f[0].trim().to_string(),
        model: f[1].trim().to_string(),
        serial: f[2].trim().to_string(),
        firmware: f[3].trim().to_string(),
    })
}

/// Parse a `TEMP:RTIN?` reply.
///
/// ```
/// use instec_core::SystemStatus;
/// use instec_mk2000::commands::parse_runtime_information;
///
/// let s = parse_runtime_information("MK#1:25.0:24.9:50.0:50.0:5.0:12.3:1:0,0,0:0").unwrap();
/// assert_eq!(s.system_status, SystemStatus::Hold);
/// assert_eq!(s.percent_power, 12.3);
/// ```
pub fn parse_runtime_information(reply: &str) -> Result<RuntimeSnapshot> {
    let start = reply
        .rfind(RTIN_MARKER)
        .ok_or_else(|| Error::Decode(format!("runtime information without marker: {reply:?}")))?;
    let body = reply[start + RTIN_MARKER.len()..].trim();

    let f = fields(body, ':', 10, "runtime information")?;
    let profile = fields(f[8], ',', 3, "runtime profile state")?;

    Ok(RuntimeSnapshot {
        active_slave: parse_field(f[0], "active slave")?,
        process_variable: parse_field(f[1], "process variable")?,
        monitor_value: parse_field(f[2], "monitor value")?,
        target_set_point: parse_field(f[3], "target set point")?,
        current_set_point: parse_field(f[4], "current set point")?,
        ramp_rate: parse_field(f[5], "ramp rate")?,
        percent_power: parse_field(f[6], "percent power")?,
        system_status: SystemStatus::from_code(parse_field(f[7], "system status")?)?,
        profile_status: ProfileStatus::from_code(parse_field(profile[0], "profile status")?)?,
        active_profile: parse_field(profile[1], "active profile")?,
        instruction_index: parse_field(profile[2], "instruction index")?,
        error_code: parse_field(f[9], "error code")?,
    })
}

/// Parse a comma-separated vector of floats, one per slave.
///
/// An empty reply is an empty list and a single trailing comma is tolerated.
/// Any other empty field is a decode error since it would shift the slave
/// numbering.
pub fn parse_float_list(reply: &str) -> Result<Vec<f64>> {
    let reply = reply.trim();
    let reply = reply.strip_suffix(',').unwrap_or(reply);
    if reply.is_empty() {
        return Ok(Vec::new());
    }
    reply
        .split(',')
        .map(str::trim)
        .map(|v| {
            if v.is_empty() {
                Err(Error::Decode(format!("empty sensor value in {reply:?}")))
            } else {
                parse_field(v, "sensor value")
            }
        })
        .collect()
}

/// Parse a `max,min` range reply.
pub fn parse_range(reply: &str) -> Result<OperationRange> {
    let f = fields(reply, ',', 2, "range")?;
    let max: f64 = parse_field(f[0], "range maximum")?;
    let min: f64 = parse_field(f[1], "range minimum")?;
    OperationRange::new(max, min).map_err(|_| Error::Decode(format!("inverted range: {reply:?}")))
}

pub fn parse_ramp_rate_range(reply: &str) -> Result<RampRateRange> {
    let f = fields(reply, ',', 5, "ramp rate range")?;
    Ok(RampRateRange {
        max: parse_field(f[0], "ramp rate maximum")?,
        min: parse_field(f[1], "ramp rate minimum")?,
        limit_value: parse_field(f[2], "ramp rate limit value")?,
        limit_max: parse_field(f[3], "limited ramp rate maximum")?,
        limit_min: parse_field(f[4], "limited ramp rate minimum")?,
    })
}

pub fn parse_pid(reply: &str) -> Result<Pid> {
    let f = fields(reply, ',', 3, "PID")?;
    Ok(Pid {
        p: parse_field(f[0], "P")?,
        i: parse_field(f[1], "I")?,
        d: parse_field(f[2], "D")?,
    })
}

pub fn parse_pid_entry(reply: &str) -> Result<PidEntry> {
    let f = fields(reply, ',', 6, "PID table entry")?;
    Ok(PidEntry {
        table: PidTable::from_code(parse_field(f[0], "PID table")?)?,
        index: parse_field(f[1], "PID index")?,
        temperature: parse_field(f[2], "PID temperature")?,
        pid: Pid {
            p: parse_field(f[3], "P")?,
            i: parse_field(f[4], "I")?,
            d: parse_field(f[5], "D")?,
        },
    })
}

pub fn parse_profile_state(reply: &str) -> Result<ProfileState> {
    let f = fields(reply, ',', 3, "profile state")?;
    Ok(ProfileState {
        status: ProfileStatus::from_code(parse_field(f[0], "profile status")?)?,
        profile: parse_field(f[1], "profile")?,
        index: parse_field(f[2], "item index")?,
    })
}

pub fn parse_precision(reply: &str) -> Result<Precision> {
    let f = fields(reply, ',', 2, "precision")?;
    Ok(Precision {
        pv_decimals: parse_field(f[0], "PV decimals")?,
        mv_decimals: parse_field(f[1], "MV decimals")?,
    })
}

pub fn parse_unit_type(reply: &str) -> Result<UnitType> {
    UnitType::from_code(parse_field(reply, "unit type")?)
}

pub fn parse_temperature_mode(reply: &str) -> Result<TemperatureMode> {
    TemperatureMode::from_code(parse_field(reply, "cooling/heating mode")?)
}

/// Parse a `PROF:EDIT:IRE` reply (`type,b1,b2`).
///
/// The controller always reports both parameter slots; only those the
/// instruction type uses are kept.
pub fn parse_item(reply: &str) -> Result<ProfileItem> {
    let f = fields(reply, ',', 3, "profile item")?;
    let kind = ProfileItemKind::from_code(parse_field(f[0], "item type")?)?;
    let b1: f64 = parse_field(f[1], "item parameter 1")?;
    let b2: f64 = parse_field(f[2], "item parameter 2")?;

    let count = kind.param_count();
    let b1 = (count >= 1).then_some(b1);
    let b2 = (count >= 2).then_some(b2);
    ProfileItem::from_parts(kind, b1, b2).map_err(|e| Error::Decode(format!("{reply:?}: {e}")))
}
