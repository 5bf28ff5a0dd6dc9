use super::lookup::{normalize, InverseLookupTable, LUT_SIZE};
use super::sensor::{stable_reading, LightSensor, StableReadingParams};
use crate::base::address::LampAddress;
use crate::curves::fit::{fit_power, fit_quadratic, PowerFit, QuadraticFit};
use crate::drivers::driver::{LevelCommand, SyncDriver};
use log::{debug, info, warn};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CalibrationSettings {
    /// Wait after darkening the lamps before the sweep starts
    pub dark_wait: Duration,
    /// Wait after each level change before measuring
    pub settle: Duration,
    pub reading: StableReadingParams,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        CalibrationSettings {
            dark_wait: Duration::from_millis(500),
            settle: Duration::from_millis(150),
            reading: StableReadingParams::default(),
        }
    }
}

/// Everything derived from one calibration sweep.
#[derive(Debug, Clone)]
pub struct CalibrationReport {
    /// Stable sensor reading for each command level
    pub readings: Vec<f64>,
    pub lut: InverseLookupTable,
    /// Normalised brightness as a power of the normalised command level
    pub power: PowerFit,
    /// Normalised command level as a quadratic in normalised brightness
    pub inverse_quadratic: QuadraticFit,
}

async fn send_logged(driver: &SyncDriver, addr: &LampAddress, cmd: LevelCommand) {
    let res = driver.lock().await.send_command(addr, cmd).await;
    if let Err(e) = res.check_send() {
        warn!("{}: '{}' failed: {}", addr, cmd, e);
    }
}

/// Measure the response of `reference` at every command level while the
/// lamps in `others` are kept dark.
pub async fn sweep(
    driver: &SyncDriver,
    sensor: &dyn LightSensor,
    reference: &LampAddress,
    others: &[LampAddress],
    settings: &CalibrationSettings,
) -> [f64; LUT_SIZE] {
    for addr in others {
        send_logged(
            driver,
            addr,
            LevelCommand::MoveToLevelWithOnOff {
                level: 0,
                transition_ds: 0,
            },
        )
        .await;
    }
    // Make sure the reference lamp is switched on before driving it with
    // plain level commands
    send_logged(
        driver,
        reference,
        LevelCommand::MoveToLevelWithOnOff {
            level: 10,
            transition_ds: 0,
        },
    )
    .await;
    send_logged(
        driver,
        reference,
        LevelCommand::MoveToLevel {
            level: 0,
            transition_ds: 0,
        },
    )
    .await;
    tokio::time::sleep(settings.dark_wait).await;

    let mut readings = [0.0; LUT_SIZE];
    for (level, r) in readings.iter_mut().enumerate() {
        send_logged(
            driver,
            reference,
            LevelCommand::MoveToLevel {
                level: level as u8,
                transition_ds: 0,
            },
        )
        .await;
        tokio::time::sleep(settings.settle).await;
        *r = stable_reading(sensor, &settings.reading).await;
        debug!("Level={:3} -> reading={:.2}", level, r);
    }
    readings
}

/// Derive the lookup table and curve fits from sweep readings.
pub fn analyse(readings: &[f64; LUT_SIZE]) -> CalibrationReport {
    let lut = InverseLookupTable::from_readings(readings);
    let brightness = normalize(readings);
    let levels: Vec<f64> = (0..LUT_SIZE).map(|i| i as f64 / 255.0).collect();
    let power = fit_power(&levels, &brightness);
    let inverse_quadratic = fit_quadratic(&brightness, &levels);
    CalibrationReport {
        readings: readings.to_vec(),
        lut,
        power,
        inverse_quadratic,
    }
}

pub async fn calibrate(
    driver: &SyncDriver,
    sensor: &dyn LightSensor,
    reference: &LampAddress,
    others: &[LampAddress],
    settings: &CalibrationSettings,
) -> CalibrationReport {
    info!("Starting calibration on {}", reference);
    let readings = sweep(driver, sensor, reference, others, settings).await;
    let report = analyse(&readings);
    info!(
        "Calibration complete: a={:.4} gamma={:.4}",
        report.power.a, report.power.gamma
    );
    for (d, l) in report.lut.entries().iter().enumerate() {
        debug!("{:3} -> {:3}", d, l);
    }
    report
}
