//! Client-side range and parameter checks.
//!
//! Everything here is pure: the controller fetches whatever ranges a check
//! needs, fresh, and passes them in. A failed check means no command is
//! sent.
//!
//! Profile items are checked through a rule table with one entry per
//! instruction type ([`rule`]). Each rule declares which device ranges it
//! needs and carries the function that checks an item against them. Insert
//! and edit both go through [`check_item`], so they can never disagree.

use instec_core::{
    Error, OperationRange, PowerRange, ProfileItem, ProfileItemKind, RampRateRange, Result,
};

/// Number of profile slots.
pub const PROFILE_COUNT: u8 = 5;

/// Items per profile; valid indices are `0..ITEM_LIMIT`.
pub const ITEM_LIMIT: u8 = 255;

/// Longest profile name the controller stores.
pub const MAX_PROFILE_NAME_LEN: usize = 14;

/// Rows per PID table.
pub const PID_TABLE_LEN: u8 = 8;

/// Error code the controller reports for a parameter out of range.
pub const DEVICE_ERR_OUT_OF_RANGE: i32 = 5;

// ---------------------------------------------------------------
// Index and argument checks
// ---------------------------------------------------------------

pub fn check_profile(profile: u8) -> Result<()> {
    if profile >= PROFILE_COUNT {
        return Err(Error::InvalidIndex(format!(
            "profile {profile} (valid 0..{PROFILE_COUNT})"
        )));
    }
    Ok(())
}

pub fn check_item_index(index: u8) -> Result<()> {
    if index >= ITEM_LIMIT {
        return Err(Error::InvalidIndex(format!(
            "item {index} (valid 0..{ITEM_LIMIT})"
        )));
    }
    Ok(())
}

pub fn check_pid_index(index: u8) -> Result<()> {
    if index >= PID_TABLE_LEN {
        return Err(Error::InvalidIndex(format!(
            "PID table index {index} (valid 0..{PID_TABLE_LEN})"
        )));
    }
    Ok(())
}

pub fn check_profile_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len > MAX_PROFILE_NAME_LEN {
        return Err(Error::InvalidParameter(format!(
            "profile name is {len} characters, at most {MAX_PROFILE_NAME_LEN} allowed"
        )));
    }
    // The name is sent quoted inside a single command line.
    if let Some(bad) = name
        .chars()
        .find(|&c| !(c.is_ascii_graphic() || c == ' ') || c == '"' || c == ';')
    {
        return Err(Error::InvalidParameter(format!(
            "profile name may not contain {bad:?}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------
// Range checks for direct commands
// ---------------------------------------------------------------

pub fn check_set_point(tsp: f64, range: &OperationRange) -> Result<()> {
    if !range.contains(tsp) {
        return Err(Error::OutOfRange(format!(
            "set point {tsp} outside operation range {range}"
        )));
    }
    Ok(())
}

pub fn check_ramp_rate(rate: f64, range: &RampRateRange) -> Result<()> {
    if !range.contains(rate) {
        return Err(Error::OutOfRange(format!(
            "ramp rate {rate} outside [{}, {}]",
            range.min, range.max
        )));
    }
    Ok(())
}

pub fn check_power(power: f64, range: &PowerRange) -> Result<()> {
    if !range.contains(power) {
        return Err(Error::OutOfRange(format!(
            "power {power} outside [{}, {}]",
            range.min, range.max
        )));
    }
    Ok(())
}

pub fn check_purge(delay: f64, hold: f64) -> Result<()> {
    if !(delay >= 0.0) {
        return Err(Error::OutOfRange(format!("purge delay {delay} must be >= 0")));
    }
    if !(hold > 0.0) {
        return Err(Error::OutOfRange(format!("purge hold {hold} must be > 0")));
    }
    Ok(())
}

pub fn check_pid_gains(p: f64, i: f64, d: f64) -> Result<()> {
    if !(p > 0.0 && i >= 0.0 && d >= 0.0) {
        return Err(Error::OutOfRange(format!(
            "PID gains ({p}, {i}, {d}) require p > 0, i >= 0, d >= 0"
        )));
    }
    Ok(())
}

/// A new operation range must be ordered and lie within the stage range.
pub fn check_operation_range(max: f64, min: f64, stage: &OperationRange) -> Result<OperationRange> {
    let range = OperationRange::new(max, min)?;
    if !stage.encloses(&range) {
        return Err(Error::OutOfRange(format!(
            "operation range {range} outside stage range {stage}"
        )));
    }
    Ok(range)
}

// ---------------------------------------------------------------
// Profile item rule table
// ---------------------------------------------------------------

/// Device ranges fetched for one item check. A rule only reads the ranges
/// it declared.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    pub operation: Option<OperationRange>,
    pub ramp_rate: Option<RampRateRange>,
    pub power: Option<PowerRange>,
}

type Check = fn(&ProfileItem, &Limits) -> std::result::Result<(), String>;

/// Validation rule for one instruction type.
pub struct ItemRule {
    pub needs_operation_range: bool,
    pub needs_ramp_rate_range: bool,
    pub needs_power_range: bool,
    check: Check,
}

const fn rule_with(operation: bool, ramp_rate: bool, power: bool, check: Check) -> ItemRule {
    ItemRule {
        needs_operation_range: operation,
        needs_ramp_rate_range: ramp_rate,
        needs_power_range: power,
        check,
    }
}

/// Indexed by [`ProfileItemKind::code`].
static RULES: [ItemRule; 12] = [
    rule_with(false, false, false, no_params),     // END
    rule_with(true, false, false, hold_rule),      // HOLD
    rule_with(true, true, false, ramp_rule),       // RAMP
    rule_with(false, false, false, wait_rule),     // WAIT
    rule_with(false, false, false, no_params),     // LOOP_BEGIN
    rule_with(false, false, false, no_params),     // LOOP_END
    rule_with(false, false, false, purge_rule),    // PURGE
    rule_with(false, false, false, no_params),     // STOP
    rule_with(false, false, false, no_params),     // HEATING_AND_COOLING
    rule_with(false, false, false, no_params),     // HEATING_ONLY
    rule_with(false, false, true, rpp_rule),       // RPP
    rule_with(false, false, false, no_params),     // COOLING_ONLY
];

/// The rule for an instruction type.
pub fn rule(kind: ProfileItemKind) -> &'static ItemRule {
    &RULES[usize::from(kind.code())]
}

/// Check `item` against its rule. Violations are [`Error::InvalidItem`].
pub fn check_item(item: &ProfileItem, limits: &Limits) -> Result<()> {
    (rule(item.kind()).check)(item, limits)
        .map_err(|reason| Error::InvalidItem(format!("{item}: {reason}")))
}

// A loop count is non-negative by construction (`u32`).
fn no_params(_: &ProfileItem, _: &Limits) -> std::result::Result<(), String> {
    Ok(())
}

fn operation_range(limits: &Limits) -> std::result::Result<&OperationRange, String> {
    limits
        .operation
        .as_ref()
        .ok_or_else(|| "operation range unavailable".to_string())
}

fn hold_rule(item: &ProfileItem, limits: &Limits) -> std::result::Result<(), String> {
    let &ProfileItem::Hold { tsp } = item else {
        return Ok(());
    };
    let range = operation_range(limits)?;
    if !range.contains(tsp) {
        return Err(format!("set point outside operation range {range}"));
    }
    Ok(())
}

fn ramp_rule(item: &ProfileItem, limits: &Limits) -> std::result::Result<(), String> {
    let &ProfileItem::Ramp { tsp, rate } = item else {
        return Ok(());
    };
    let range = operation_range(limits)?;
    if !range.contains(tsp) {
        return Err(format!("set point outside operation range {range}"));
    }
    let rates = limits
        .ramp_rate
        .as_ref()
        .ok_or_else(|| "ramp rate range unavailable".to_string())?;
    if !rates.contains(rate) {
        return Err(format!("rate outside [{}, {}]", rates.min, rates.max));
    }
    Ok(())
}

fn wait_rule(item: &ProfileItem, _: &Limits) -> std::result::Result<(), String> {
    match *item {
        ProfileItem::Wait { minutes } if !(minutes >= 0.0) => {
            Err("wait time must be >= 0".into())
        }
        _ => Ok(()),
    }
}

fn purge_rule(item: &ProfileItem, _: &Limits) -> std::result::Result<(), String> {
    let &ProfileItem::Purge { delay, hold } = item else {
        return Ok(());
    };
    if !(delay >= 0.0) {
        return Err("delay must be >= 0".into());
    }
    if !(hold > 0.0) {
        return Err("hold must be > 0".into());
    }
    Ok(())
}

fn rpp_rule(item: &ProfileItem, limits: &Limits) -> std::result::Result<(), String> {
    let &ProfileItem::Rpp { power } = item else {
        return Ok(());
    };
    let range = limits
        .power
        .as_ref()
        .ok_or_else(|| "power range unavailable".to_string())?;
    if !range.contains(power) {
        return Err(format!("power outside [{}, {}]", range.min, range.max));
    }
    Ok(())
}
