use super::config::{ConfigError, LightConfig};
use super::scheduler::{run_lamp, FadeControl};
use super::strategy::FadePlan;
use crate::base::address::LampAddress;
use crate::calibration::calibrate::{calibrate, CalibrationReport, CalibrationSettings};
use crate::calibration::sensor::LightSensor;
use crate::config_store::{load_or_default, ConfigStore, StoreError};
use crate::drivers::driver::SyncDriver;
use crate::drivers::driver_utils::LevelDriverExt;
use futures::future::join_all;
use log::{error, info, warn};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum ControlError {
    NoSensor,
    NoLamps,
    Config(ConfigError),
    Store(StoreError),
}

impl Error for ControlError {}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::NoSensor => write!(f, "No light sensor available"),
            ControlError::NoLamps => write!(f, "No lamps configured"),
            ControlError::Config(e) => write!(f, "{}", e),
            ControlError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl From<ConfigError> for ControlError {
    fn from(e: ConfigError) -> Self {
        ControlError::Config(e)
    }
}

impl From<StoreError> for ControlError {
    fn from(e: StoreError) -> Self {
        ControlError::Store(e)
    }
}

struct LampTask {
    address: LampAddress,
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Owns the configuration and the lamp tasks running it.
///
/// Every change to the configuration stops all lamp tasks before the new
/// configuration is installed and then starts a fresh set.
pub struct FadeController {
    driver: SyncDriver,
    sensor: Option<Arc<dyn LightSensor>>,
    store: Box<dyn ConfigStore>,
    config: LightConfig,
    control: Arc<FadeControl>,
    calibration: CalibrationSettings,
    tasks: Vec<LampTask>,
}

impl FadeController {
    pub fn new(driver: SyncDriver, store: Box<dyn ConfigStore>, config: LightConfig) -> Self {
        FadeController {
            driver,
            sensor: None,
            store,
            config,
            control: Arc::new(FadeControl::new(false)),
            calibration: CalibrationSettings::default(),
            tasks: Vec::new(),
        }
    }

    pub fn set_sensor(&mut self, sensor: Option<Arc<dyn LightSensor>>) {
        self.sensor = sensor;
    }

    pub fn set_calibration_settings(&mut self, settings: CalibrationSettings) {
        self.calibration = settings;
    }

    pub fn config(&self) -> &LightConfig {
        &self.config
    }

    /// Compile the current configuration without starting anything.
    pub fn plan(&self) -> FadePlan {
        FadePlan::new(&self.config)
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn pause(&self) {
        info!("Fades paused");
        self.control.set_paused(true);
    }

    pub fn resume(&self) {
        info!("Fades resumed");
        self.control.set_paused(false);
    }

    /// Lamps with a fade task that is still running.
    pub fn running_lamps(&self) -> Vec<LampAddress> {
        self.tasks
            .iter()
            .filter(|t| !t.join.is_finished())
            .map(|t| t.address)
            .collect()
    }

    /// (Re)start the fades from the current configuration.
    pub async fn start(&mut self) {
        self.stop().await;
        let plan = FadePlan::new(&self.config);
        if plan.table().is_truncated() {
            warn!("Step table truncated, increase scan_step");
        }
        for lamp in &self.config.lamps {
            let res = self
                .driver
                .lock()
                .await
                .set_level_with_onoff(&lamp.address, self.config.level_min, 0)
                .await;
            if let Err(e) = res.check_send() {
                warn!("{}: initial level failed: {}", lamp.address, e);
            }
        }
        for lamp in &self.config.lamps {
            let (stop, stop_rx) = watch::channel(false);
            let join = tokio::spawn(run_lamp(
                lamp.address,
                plan.strategy(lamp.offset),
                self.driver.clone(),
                self.control.clone(),
                stop_rx,
            ));
            self.tasks.push(LampTask {
                address: lamp.address,
                stop,
                join,
            });
        }
        info!(
            "Started {} lamp(s), {:?} mode, period {:.1} s, {} steps",
            self.tasks.len(),
            self.config.fade_mode,
            plan.period(),
            plan.table().len()
        );
    }

    /// Stop all lamp tasks and wait for them to finish.
    pub async fn stop(&mut self) {
        let tasks: Vec<LampTask> = self.tasks.drain(..).collect();
        for t in &tasks {
            // A task that already ended has dropped its receiver
            let _ = t.stop.send(true);
        }
        let (addresses, joins): (Vec<LampAddress>, Vec<JoinHandle<()>>) =
            tasks.into_iter().map(|t| (t.address, t.join)).unzip();
        for (address, res) in addresses.iter().zip(join_all(joins).await) {
            if let Err(e) = res {
                error!("{}: fade task failed: {}", address, e);
            }
        }
    }

    /// Set one configuration parameter and restart the fades. Nothing is
    /// changed if the value is rejected.
    pub async fn set_field(&mut self, name: &str, values: &[&str]) -> Result<(), ControlError> {
        let mut config = self.config.clone();
        config.set_field(name, values)?;
        self.stop().await;
        self.config = config;
        self.start().await;
        Ok(())
    }

    /// Replace the whole configuration and restart the fades.
    pub async fn set_config(&mut self, config: LightConfig) -> Result<(), ControlError> {
        config.validate()?;
        self.stop().await;
        self.config = config;
        self.start().await;
        Ok(())
    }

    /// Measure the first lamp, store the results in the configuration and
    /// restart the fades. The fades are stopped during the measurement.
    pub async fn calibrate(&mut self) -> Result<CalibrationReport, ControlError> {
        let sensor = self.sensor.clone().ok_or(ControlError::NoSensor)?;
        let lamps = self.config.lamp_addresses();
        let (reference, others) = lamps.split_first().ok_or(ControlError::NoLamps)?;
        self.stop().await;
        let report = calibrate(
            &self.driver,
            sensor.as_ref(),
            reference,
            others,
            &self.calibration,
        )
        .await;
        self.config.apply_calibration(&report);
        self.start().await;
        Ok(report)
    }

    pub fn save(&self) -> Result<(), ControlError> {
        self.store.save(&self.config)?;
        Ok(())
    }

    /// Go back to the default configuration.
    pub async fn reset(&mut self) {
        self.stop().await;
        self.config = LightConfig::default();
        self.start().await;
    }

    /// Reload the stored configuration, or the defaults if that fails.
    pub async fn reload(&mut self) {
        self.stop().await;
        self.config = load_or_default(self.store.as_ref());
        self.start().await;
    }
}
