use crate::base::address::LampAddress;
use crate::calibration::sensor::LightSensor;
use crate::error::DynFuture;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Highest level a lamp accepts in a level command.
pub const MAX_LEVEL: u8 = 255;
/// Highest rate (levels per second) accepted by a move command.
pub const MAX_RATE: u8 = 254;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MoveMode {
    Up,
    Down,
}

impl fmt::Display for MoveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveMode::Up => f.write_str("up"),
            MoveMode::Down => f.write_str("down"),
        }
    }
}

/// Commands understood by a dimmable lamp endpoint.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LevelCommand {
    /// Move to `level` over `transition_ds` deciseconds.
    MoveToLevel { level: u8, transition_ds: u16 },
    /// Same as `MoveToLevel` but also switches the lamp on or off at the extremes.
    MoveToLevelWithOnOff { level: u8, transition_ds: u16 },
    /// Start moving continuously at `rate` levels per second.
    Move { mode: MoveMode, rate: u8 },
    /// Stop an ongoing move.
    Stop,
}

impl LevelCommand {
    /// Target level of the command, if it has one.
    pub fn level(&self) -> Option<u8> {
        match *self {
            LevelCommand::MoveToLevel { level, .. }
            | LevelCommand::MoveToLevelWithOnOff { level, .. } => Some(level),
            _ => None,
        }
    }
}

impl fmt::Display for LevelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelCommand::MoveToLevel {
                level,
                transition_ds,
            } => write!(f, "move to level {} in {} ds", level, transition_ds),
            LevelCommand::MoveToLevelWithOnOff {
                level,
                transition_ds,
            } => write!(f, "move to level {} in {} ds (on/off)", level, transition_ds),
            LevelCommand::Move { mode, rate } => write!(f, "move {} at {}/s", mode, rate),
            LevelCommand::Stop => f.write_str("stop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Ok,
    Timeout,
    Rejected,
    DriverError(String),
}

impl SendResult {
    pub fn check_send(self) -> Result<(), SendResult> {
        match self {
            SendResult::Ok => Ok(()),
            e => Err(e),
        }
    }
}

impl Error for SendResult {}

impl fmt::Display for SendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendResult::Ok => write!(f, "Command accepted"),
            SendResult::Timeout => write!(f, "Timeout"),
            SendResult::Rejected => write!(f, "Command rejected by transport"),
            SendResult::DriverError(e) => write!(f, "Driver error: {}", e),
        }
    }
}

pub trait LevelDriver: Send {
    /// Queue a command for a lamp. The future resolves when the transport
    /// has accepted (or refused) the request.
    fn send_command(&mut self, target: &LampAddress, cmd: LevelCommand)
        -> DynFuture<'_, SendResult>;

    /// Light sensor attached to the driver, if any.
    fn light_sensor(&self) -> Option<Arc<dyn LightSensor>> {
        None
    }
}

pub type SyncDriver = Arc<tokio::sync::Mutex<Box<dyn LevelDriver>>>;

#[derive(Debug)]
pub enum OpenError {
    NotFound,
    InvalidParameter(String),
    DriverError(Box<dyn Error + Send + Sync>),
}

impl Error for OpenError {}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::NotFound => write!(f, "Driver not found"),
            OpenError::InvalidParameter(p) => write!(f, "Invalid driver parameter: {}", p),
            OpenError::DriverError(e) => write!(f, "Driver error: {}", e),
        }
    }
}

pub struct DriverInfo {
    pub name: String,
    pub description: String,
    pub open: fn(HashMap<String, String>) -> Result<Box<dyn LevelDriver>, OpenError>,
}

lazy_static! {
    static ref DRIVERS: Mutex<Vec<DriverInfo>> = Mutex::new(Vec::new());
}

pub fn add_driver(info: DriverInfo) {
    if let Ok(mut drivers) = DRIVERS.lock() {
        drivers.retain(|d| d.name != info.name);
        drivers.push(info);
    }
}

pub fn driver_descriptions() -> Vec<(String, String)> {
    match DRIVERS.lock() {
        Ok(drivers) => drivers
            .iter()
            .map(|d| (d.name.clone(), d.description.clone()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Split `NAME:key=value,key=value` into the driver name and its parameters.
pub fn parse_device_name(
    device: &str,
) -> Result<(String, HashMap<String, String>), OpenError> {
    let (name, params_str) = match device.split_once(':') {
        Some((n, p)) => (n, p),
        None => (device, ""),
    };
    let mut params = HashMap::new();
    for kv in params_str.split(',').filter(|s| !s.is_empty()) {
        let Some((k, v)) = kv.split_once('=') else {
            return Err(OpenError::InvalidParameter(kv.to_string()));
        };
        params.insert(k.trim().to_string(), v.trim().to_string());
    }
    Ok((name.trim().to_string(), params))
}

/// Open a driver by name. `default` opens the first registered driver.
pub fn open(device: &str) -> Result<Box<dyn LevelDriver>, OpenError> {
    let (name, params) = parse_device_name(device)?;
    let open_fn = {
        let drivers = DRIVERS
            .lock()
            .map_err(|e| OpenError::DriverError(e.to_string().into()))?;
        let info = if name == "default" {
            drivers.first()
        } else {
            drivers.iter().find(|d| d.name.eq_ignore_ascii_case(&name))
        };
        match info {
            Some(info) => info.open,
            None => return Err(OpenError::NotFound),
        }
    };
    open_fn(params)
}

#[test]
fn device_name_test() {
    let (name, params) = parse_device_name("SIM:lamps=3, gamma=2.2").unwrap();
    assert_eq!(name, "SIM");
    assert_eq!(params.get("lamps").map(String::as_str), Some("3"));
    assert_eq!(params.get("gamma").map(String::as_str), Some("2.2"));

    let (name, params) = parse_device_name("DUMMY").unwrap();
    assert_eq!(name, "DUMMY");
    assert!(params.is_empty());

    assert!(matches!(
        parse_device_name("SIM:lamps"),
        Err(OpenError::InvalidParameter(_))
    ));
}

#[test]
fn registry_test() {
    crate::drivers::init().unwrap();
    let names: Vec<String> = driver_descriptions()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert!(names.iter().any(|n| n == "DUMMY"));
    assert!(open("dummy").is_ok());
    assert!(matches!(open("NOPE"), Err(OpenError::NotFound)));
}
