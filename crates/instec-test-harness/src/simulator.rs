//! A stateful in-memory MK2000 controller.
//!
//! [`SimulatedController`] implements [`Transport`] by interpreting every
//! command line it is sent against a [`SimState`], and queueing the reply
//! for `receive()`. It covers the temperature, range, PID, and profile
//! command sets, which is enough to test read-after-write behavior such as
//! profile editing and playback without hardware.
//!
//! The state is shared: keep a [`SimHandle`] to inspect or tweak it after
//! moving the simulator into a controller.
//!
//! ```
//! use instec_test_harness::SimulatedController;
//!
//! let sim = SimulatedController::new();
//! let handle = sim.handle();
//! handle.with(|s| s.operation_range = (150.0, -50.0));
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use instec_core::error::{Error, Result};
use instec_core::transport::Transport;

/// Error code the controller reports for a parameter out of range.
pub const ERR_OUT_OF_RANGE: i32 = 5;

const PROFILE_COUNT: usize = 5;
const ITEM_LIMIT: usize = 255;

/// One stored profile.
#[derive(Debug, Clone, PartialEq)]
pub struct SimProfile {
    pub name: String,
    /// `(type code, b1, b2)` per item.
    pub items: Vec<(u8, f64, f64)>,
}

/// Everything the simulated controller remembers.
///
/// Enumerations are kept as raw wire codes so tests can plant invalid ones.
#[derive(Debug, Clone)]
pub struct SimState {
    pub company: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,

    pub slave_count: u8,
    pub operating_slave: u8,
    pub process_variables: Vec<f64>,
    pub monitor_values: Vec<f64>,
    pub protection_sensors: Vec<f64>,
    pub pv_unit: u8,
    pub mv_unit: u8,
    pub precision: (u8, u8),
    pub powerboard_temperature: f64,

    /// `(max, min)`
    pub stage_range: (f64, f64),
    pub operation_range: (f64, f64),
    pub default_range: (f64, f64),
    /// `(max, min, limit_value, limit_max, limit_min)`
    pub ramp_rate_range: (f64, f64, f64, f64, f64),
    pub cooling_mode: u8,

    pub target_set_point: f64,
    pub current_set_point: f64,
    pub ramp_rate: f64,
    pub power: f64,
    pub system_status: u8,
    pub profile_status: u8,
    pub active_profile: u8,
    pub instruction_index: u8,
    pub error_code: i32,

    pub current_pid: (f64, f64, f64),
    /// `[table][index] = (temperature, p, i, d)`
    pub pid_tables: [[(f64, f64, f64, f64); 8]; 4],
    pub profiles: Vec<SimProfile>,

    /// Make the controller reject every HOLD/RAMP set point as out of range,
    /// as if the range changed after the client checked it.
    pub reject_set_points: bool,
    /// Every command received, after header resolution.
    pub commands: Vec<String>,
}

impl Default for SimState {
    fn default() -> Self {
        SimState {
            company: "Instec".into(),
            model: "MK2000".into(),
            serial: "SIM0001".into(),
            firmware: "1.0".into(),
            slave_count: 1,
            operating_slave: 1,
            process_variables: vec![25.0],
            monitor_values: vec![24.9],
            protection_sensors: vec![25.1],
            pv_unit: 1,
            mv_unit: 1,
            precision: (3, 3),
            powerboard_temperature: 35.0,
            stage_range: (400.0, -190.0),
            operation_range: (300.0, -150.0),
            default_range: (300.0, -150.0),
            ramp_rate_range: (100.0, 0.1, 200.0, 20.0, 0.1),
            cooling_mode: 0,
            target_set_point: 25.0,
            current_set_point: 25.0,
            ramp_rate: 0.0,
            power: 0.0,
            system_status: 0,
            profile_status: 0,
            active_profile: 0,
            instruction_index: 0,
            error_code: 0,
            current_pid: (10.0, 2.0, 0.5),
            pid_tables: [[(0.0, 1.0, 0.0, 0.0); 8]; 4],
            profiles: (1..=PROFILE_COUNT)
                .map(|n| SimProfile {
                    name: format!("{n} Profile"),
                    items: Vec::new(),
                })
                .collect(),
            reject_set_points: false,
            commands: Vec::new(),
        }
    }
}

impl SimState {
    fn in_operation_range(&self, t: f64) -> bool {
        t >= self.operation_range.1 && t <= self.operation_range.0
    }

    /// Execute one resolved command; `Some` carries the query reply.
    fn execute(&mut self, header: &str, args: &[&str]) -> Option<String> {
        let num = |i: usize| args.get(i).and_then(|a| a.trim().parse::<f64>().ok());
        let int = |i: usize| args.get(i).and_then(|a| a.trim().parse::<usize>().ok());

        match header {
            "*IDN?" => Some(format!(
                "{},{},{},{}",
                self.company, self.model, self.serial, self.firmware
            )),
            "TEMP:SNUM?" => Some(self.serial.clone()),
            "TEMP:RTIN?" => {
                let slot = usize::from(self.operating_slave.saturating_sub(1));
                Some(format!(
                    "MK#{}:{}:{}:{}:{}:{}:{}:{}:{},{},{}:{}",
                    self.operating_slave,
                    self.process_variables.get(slot).copied().unwrap_or_default(),
                    self.monitor_values.get(slot).copied().unwrap_or_default(),
                    self.target_set_point,
                    self.current_set_point,
                    self.ramp_rate,
                    self.power,
                    self.system_status,
                    self.profile_status,
                    self.active_profile,
                    self.instruction_index,
                    self.error_code
                ))
            }
            "TEMP:CTEM?" => Some(join(&self.process_variables)),
            "TEMP:MTEM?" => Some(join(&self.monitor_values)),
            "TEMP:PTEM?" => Some(join(&self.protection_sensors)),
            "TEMP:ERR?" => Some(self.error_code.to_string()),
            "TEMP:TP?" => Some(self.powerboard_temperature.to_string()),
            "TEMP:OPSL?" => Some(self.operating_slave.to_string()),
            "TEMP:SLAV?" => Some(self.slave_count.to_string()),
            "TEMP:TCUN?" => Some(self.pv_unit.to_string()),
            "TEMP:TMUN?" => Some(self.mv_unit.to_string()),
            "TEMP:PREC?" => Some(format!("{},{}", self.precision.0, self.precision.1)),
            "TEMP:COOL?" => Some(self.cooling_mode.to_string()),
            "TEMP:RANG?" => Some(pair(self.operation_range)),
            "TEMP:SRAN?" => Some(pair(self.stage_range)),
            "TEMP:DRAN?" => Some(pair(self.default_range)),
            "TEMP:RTR?" => {
                let (max, min, lv, lmax, lmin) = self.ramp_rate_range;
                Some(format!("{max},{min},{lv},{lmax},{lmin}"))
            }
            "TEMP:PID?" => {
                let (p, i, d) = self.current_pid;
                Some(format!("{p},{i},{d}"))
            }
            "TEMP:GPID" | "TEMP:GPID?" => {
                let (table, index) = (int(0)?, int(1)?);
                let (t, p, i, d) = *self.pid_tables.get(table)?.get(index)?;
                Some(format!("{table},{index},{t},{p},{i},{d}"))
            }
            "PROF:RTST?" => Some(format!(
                "{},{},{}",
                self.profile_status, self.active_profile, self.instruction_index
            )),
            "PROF:EDIT:IRE" | "PROF:EDIT:IRE?" => {
                let profile = self.profiles.get(int(0)?)?;
                let (code, b1, b2) = profile.items.get(int(1)?).copied().unwrap_or((0, 0.0, 0.0));
                Some(format!("{code},{b1},{b2}"))
            }
            "PROF:EDIT:ICO" | "PROF:EDIT:ICO?" => {
                Some(self.profiles.get(int(0)?)?.items.len().to_string())
            }
            "PROF:EDIT:GNAM" | "PROF:EDIT:GNAM?" => Some(self.profiles.get(int(0)?)?.name.clone()),

            "TEMP:HOLD" => {
                let tsp = num(0)?;
                if self.reject_set_points || !self.in_operation_range(tsp) {
                    self.error_code = ERR_OUT_OF_RANGE;
                } else {
                    self.error_code = 0;
                    self.target_set_point = tsp;
                    self.current_set_point = tsp;
                    self.system_status = 1;
                }
                None
            }
            "TEMP:RAMP" => {
                let (tsp, rate) = (num(0)?, num(1)?);
                if self.reject_set_points || !self.in_operation_range(tsp) {
                    self.error_code = ERR_OUT_OF_RANGE;
                } else {
                    let (max, min, ..) = self.ramp_rate_range;
                    self.error_code = 0;
                    self.target_set_point = tsp;
                    self.ramp_rate = rate.clamp(min, max);
                    self.system_status = 2;
                }
                None
            }
            "TEMP:RPP" => {
                self.power = num(0)?;
                self.system_status = 5;
                None
            }
            "TEMP:STOP" => {
                self.system_status = 0;
                self.power = 0.0;
                None
            }
            "TEMP:PURG" => {
                let (_delay, _hold) = (num(0)?, num(1)?);
                self.system_status = 6;
                None
            }
            "TEMP:COOL" => {
                self.cooling_mode = u8::try_from(int(0)?).ok()?;
                None
            }
            "TEMP:OPSL" => {
                let slave = u8::try_from(int(0)?).ok()?;
                if (1..=self.slave_count).contains(&slave) {
                    self.operating_slave = slave;
                }
                None
            }
            "TEMP:RANG" => {
                let (max, min) = (num(0)?, num(1)?);
                if min <= max && min >= self.stage_range.1 && max <= self.stage_range.0 {
                    self.operation_range = (max, min);
                } else {
                    self.error_code = ERR_OUT_OF_RANGE;
                }
                None
            }
            "TEMP:SPID" => {
                let (table, index) = (int(0)?, int(1)?);
                let row = (num(2)?, num(3)?, num(4)?, num(5)?);
                *self.pid_tables.get_mut(table)?.get_mut(index)? = row;
                None
            }
            "PROF:STAR" => {
                self.active_profile = u8::try_from(int(0)?).ok()?;
                self.profile_status = 1;
                self.instruction_index = 0;
                self.system_status = 4;
                None
            }
            "PROF:PAUS" => {
                if self.profile_status == 1 {
                    self.profile_status = 2;
                    self.system_status = 3;
                }
                None
            }
            "PROF:RES" => {
                if self.profile_status == 2 {
                    self.profile_status = 1;
                    self.system_status = 4;
                }
                None
            }
            "PROF:STOP" => {
                self.profile_status = 0;
                self.system_status = 0;
                None
            }
            "PROF:EDIT:PDEL" => {
                let profile = self.profiles.get_mut(int(0)?)?;
                match int(1) {
                    Some(index) if index < profile.items.len() => {
                        profile.items.remove(index);
                    }
                    Some(_) => {}
                    None => profile.items.clear(),
                }
                None
            }
            "PROF:EDIT:IINS" | "PROF:EDIT:IED" => {
                let index = int(1)?;
                let code = u8::try_from(int(2)?).ok()?;
                let item = (code, num(3).unwrap_or_default(), num(4).unwrap_or_default());
                let profile = self.profiles.get_mut(int(0)?)?;
                if header.ends_with("IINS") {
                    if profile.items.len() < ITEM_LIMIT {
                        let at = index.min(profile.items.len());
                        profile.items.insert(at, item);
                    }
                } else if let Some(slot) = profile.items.get_mut(index) {
                    *slot = item;
                }
                None
            }
            "PROF:EDIT:SNAM" => {
                let name = args.get(1)?.trim().trim_matches('"').to_string();
                self.profiles.get_mut(int(0)?)?.name = name;
                None
            }
            other => {
                tracing::warn!(cmd = %other, "Simulator ignoring unknown command");
                None
            }
        }
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn pair((max, min): (f64, f64)) -> String {
    format!("{max},{min}")
}

/// Shared access to a simulator's state.
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Run `f` with the state locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Every command line received so far.
    pub fn commands(&self) -> Vec<String> {
        self.with(|s| s.commands.clone())
    }
}

/// A [`Transport`] backed by a [`SimState`].
#[derive(Debug)]
pub struct SimulatedController {
    state: Arc<Mutex<SimState>>,
    outbox: Vec<u8>,
    cursor: usize,
    chunk_size: usize,
    connected: bool,
}

impl SimulatedController {
    /// A connected simulator in its power-on state.
    pub fn new() -> Self {
        Self::with_state(SimState::default())
    }

    pub fn with_state(state: SimState) -> Self {
        SimulatedController {
            state: Arc::new(Mutex::new(state)),
            outbox: Vec::new(),
            cursor: 0,
            chunk_size: usize::MAX,
            connected: true,
        }
    }

    /// Deliver replies at most `chunk_size` bytes per `receive()`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Interpret one line, resolving relative headers against the previous
    /// command's subsystem (`TEMP:HOLD 5; ERR?` means `TEMP:ERR?`).
    fn process_line(&mut self, line: &str) -> Vec<String> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut prefix = String::new();
        let mut replies = Vec::new();

        for segment in line.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (head, rest) = segment.split_once(' ').unwrap_or((segment, ""));
            let header = if head.starts_with('*') || head.contains(':') {
                if let Some(pos) = head.rfind(':') {
                    prefix = head[..=pos].to_string();
                }
                head.to_ascii_uppercase()
            } else {
                format!("{prefix}{head}").to_ascii_uppercase()
            };

            let args: Vec<&str> = if rest.is_empty() {
                Vec::new()
            } else {
                rest.split(',').collect()
            };

            state.commands.push(if rest.is_empty() {
                header.clone()
            } else {
                format!("{header} {rest}")
            });
            if let Some(reply) = state.execute(&header, &args) {
                replies.push(reply);
            }
        }
        replies
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimulatedController {
    async fn open(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let text = String::from_utf8_lossy(data).into_owned();
        for line in text.lines() {
            let replies = self.process_line(line);
            if !replies.is_empty() {
                self.outbox.extend_from_slice(replies.join(";").as_bytes());
                self.outbox.extend_from_slice(b"\r\n");
            }
        }
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        let remaining = &self.outbox[self.cursor..];
        if remaining.is_empty() {
            return Err(Error::Timeout);
        }
        let n = remaining.len().min(buf.len()).min(self.chunk_size);
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        if self.cursor == self.outbox.len() {
            self.outbox.clear();
            self.cursor = 0;
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.outbox.clear();
        self.cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
