use super::lamp::SimLamp;
use crate::base::address::LampAddress;
use crate::calibration::sensor::LightSensor;
use crate::drivers::driver::{
    DriverInfo, LevelCommand, LevelDriver, OpenError, SendResult, MAX_LEVEL,
};
use crate::error::DynFuture;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use std::future;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// How the simulated sensor sees the lamps.
#[derive(Debug, Clone, PartialEq)]
pub struct SimResponse {
    /// Reading contributed by one lamp at full level
    pub full_scale: f64,
    /// Output is proportional to `level^gamma`
    pub gamma: f64,
    pub ambient: f64,
    /// Readings get uniform noise within +/- this value
    pub noise: f64,
}

impl Default for SimResponse {
    fn default() -> Self {
        SimResponse {
            full_scale: 4000.0,
            gamma: 2.2,
            ambient: 50.0,
            noise: 2.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CommandRecord {
    pub time: Instant,
    pub target: LampAddress,
    pub command: LevelCommand,
}

struct SimState {
    lamps: BTreeMap<LampAddress, SimLamp>,
    response: SimResponse,
    rng: StdRng,
    log: Vec<CommandRecord>,
}

/// Lamps and a light sensor sharing one room. Clones share the same state.
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimState>>,
}

impl Simulator {
    /// Lamps are created on the first command sent to them. `seed` makes the
    /// sensor noise repeatable.
    pub fn new(response: SimResponse, seed: Option<u64>) -> Simulator {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Simulator {
            state: Arc::new(Mutex::new(SimState {
                lamps: BTreeMap::new(),
                response,
                rng,
                log: Vec::new(),
            })),
        }
    }

    pub fn level(&self, address: &LampAddress) -> Option<f64> {
        let state = self.state.lock().ok()?;
        state.lamps.get(address).map(|l| l.level(Instant::now()))
    }

    pub fn is_on(&self, address: &LampAddress) -> Option<bool> {
        let state = self.state.lock().ok()?;
        state.lamps.get(address).map(|l| l.is_on())
    }

    /// All commands received so far, oldest first.
    pub fn commands(&self) -> Vec<CommandRecord> {
        match self.state.lock() {
            Ok(state) => state.log.clone(),
            Err(_) => Vec::new(),
        }
    }

    pub fn clear_commands(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.log.clear();
        }
    }

    pub fn reading(&self) -> i64 {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        let now = Instant::now();
        let r = state.response.clone();
        let mut light = r.ambient;
        for lamp in state.lamps.values() {
            if lamp.is_on() {
                let level = lamp.level(now) / MAX_LEVEL as f64;
                light += r.full_scale * level.powf(r.gamma);
            }
        }
        if r.noise > 0.0 {
            light += state.rng.gen_range(-r.noise..=r.noise);
        }
        light.round() as i64
    }

    fn handle(&self, target: &LampAddress, cmd: LevelCommand) -> SendResult {
        let Ok(mut state) = self.state.lock() else {
            return SendResult::DriverError("Simulator state poisoned".to_string());
        };
        let now = Instant::now();
        state
            .lamps
            .entry(*target)
            .or_insert_with(|| SimLamp::new(0, false))
            .handle(&cmd, now);
        state.log.push(CommandRecord {
            time: now,
            target: *target,
            command: cmd,
        });
        SendResult::Ok
    }

    pub fn driver(&self) -> SimDriver {
        SimDriver { sim: self.clone() }
    }

    pub fn sensor(&self) -> Arc<SimSensor> {
        Arc::new(SimSensor { sim: self.clone() })
    }
}

pub struct SimDriver {
    sim: Simulator,
}

impl LevelDriver for SimDriver {
    fn send_command(
        &mut self,
        target: &LampAddress,
        cmd: LevelCommand,
    ) -> DynFuture<'_, SendResult> {
        debug!("SIM {}: {}", target, cmd);
        Box::pin(future::ready(self.sim.handle(target, cmd)))
    }

    fn light_sensor(&self) -> Option<Arc<dyn LightSensor>> {
        let sensor: Arc<dyn LightSensor> = self.sim.sensor();
        Some(sensor)
    }
}

pub struct SimSensor {
    sim: Simulator,
}

impl LightSensor for SimSensor {
    fn current_reading(&self) -> i64 {
        self.sim.reading()
    }
}

fn parse_param(key: &str, value: &str) -> Result<f64, OpenError> {
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(OpenError::InvalidParameter(format!("{}={}", key, value))),
    }
}

fn driver_open(params: HashMap<String, String>) -> Result<Box<dyn LevelDriver>, OpenError> {
    let mut response = SimResponse::default();
    let mut seed = None;
    for (key, value) in &params {
        match key.as_str() {
            "gamma" => response.gamma = parse_param(key, value)?,
            "full_scale" => response.full_scale = parse_param(key, value)?,
            "ambient" => response.ambient = parse_param(key, value)?,
            "noise" => response.noise = parse_param(key, value)?.abs(),
            "seed" => {
                seed = Some(value.parse::<u64>().map_err(|_| {
                    OpenError::InvalidParameter(format!("{}={}", key, value))
                })?)
            }
            _ => return Err(OpenError::InvalidParameter(key.clone())),
        }
    }
    Ok(Box::new(Simulator::new(response, seed).driver()))
}

pub fn driver_info() -> DriverInfo {
    DriverInfo {
        name: "SIM".to_string(),
        description: "Simulated lamps and light sensor. \
                      Parameters: gamma, full_scale, ambient, noise, seed."
            .to_string(),
        open: driver_open,
    }
}
