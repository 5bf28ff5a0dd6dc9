use crate::base::address::LampAddress;
use crate::calibration::calibrate::{calibrate, CalibrationSettings};
use crate::calibration::sensor::{LightSensor, StableReadingParams};
use crate::drivers::driver::{LevelDriver, SyncDriver};
use crate::drivers::driver_utils::LevelDriverExt;
use crate::drivers::simulator::simulator::{SimResponse, Simulator};
use std::sync::Arc;
use std::time::Duration;

fn quiet(full_scale: f64, gamma: f64, ambient: f64) -> Simulator {
    Simulator::new(
        SimResponse {
            full_scale,
            gamma,
            ambient,
            noise: 0.0,
        },
        Some(1),
    )
}

#[tokio::test(start_paused = true)]
async fn sensor_sees_lamps() {
    let sim = quiet(1000.0, 2.0, 10.0);
    let sensor = sim.sensor();
    let mut driver = sim.driver();
    let a = LampAddress::from(1);
    let b = LampAddress::from(2);
    assert_eq!(sensor.current_reading(), 10);

    driver.set_level_with_onoff(&a, 255, 0).await.check_send().unwrap();
    assert_eq!(sensor.current_reading(), 1010);
    driver.set_level(&a, 128, 0).await.check_send().unwrap();
    assert_eq!(sensor.current_reading(), 262);

    // Level commands without on/off do not switch a lamp on
    driver.set_level(&b, 255, 0).await.check_send().unwrap();
    assert_eq!(sensor.current_reading(), 262);
    driver.set_level_with_onoff(&b, 255, 0).await.check_send().unwrap();
    assert_eq!(sensor.current_reading(), 1262);

    assert_eq!(sim.commands().len(), 4);
    assert_eq!(sim.commands()[3].target, b);
}

#[tokio::test(start_paused = true)]
async fn fades_follow_time() {
    let sim = quiet(1000.0, 1.0, 0.0);
    let mut driver = sim.driver();
    let a = LampAddress::from(1);
    driver.set_level_with_onoff(&a, 10, 0).await.check_send().unwrap();
    driver.set_level(&a, 110, 10).await.check_send().unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!((sim.level(&a).unwrap() - 60.0).abs() < 1e-6);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sim.level(&a), Some(110.0));
}

#[tokio::test(start_paused = true)]
async fn noise_is_repeatable() {
    let response = SimResponse {
        full_scale: 1000.0,
        gamma: 1.0,
        ambient: 500.0,
        noise: 20.0,
    };
    let a = Simulator::new(response.clone(), Some(42));
    let b = Simulator::new(response, Some(42));
    let ra: Vec<i64> = (0..100).map(|_| a.reading()).collect();
    let rb: Vec<i64> = (0..100).map(|_| b.reading()).collect();
    assert_eq!(ra, rb);
    assert!(ra.iter().all(|r| (480..=520).contains(r)));
    assert!(ra.iter().any(|&r| r != ra[0]));
}

#[tokio::test(start_paused = true)]
async fn calibrate_simulated_lamp() {
    let sim = quiet(1e6, 2.2, 100.0);
    let reference = LampAddress::from(0x10);
    let other = LampAddress::from(0x20);
    sim.driver()
        .set_level_with_onoff(&other, 200, 0)
        .await
        .check_send()
        .unwrap();

    let boxed: Box<dyn LevelDriver> = Box::new(sim.driver());
    let driver: SyncDriver = Arc::new(tokio::sync::Mutex::new(boxed));
    let sensor = sim.sensor();
    let settings = CalibrationSettings {
        reading: StableReadingParams {
            sample_count: 5,
            ..StableReadingParams::default()
        },
        ..CalibrationSettings::default()
    };
    let report = calibrate(&driver, sensor.as_ref(), &reference, &[other], &settings).await;

    assert_eq!(sim.is_on(&other), Some(false));
    assert!((report.power.gamma - 2.2).abs() < 0.05, "{:?}", report.power);
    assert!((report.power.a - 1.0).abs() < 0.05, "{:?}", report.power);
    let lut = report.lut.entries();
    assert_eq!(lut[0], 0);
    assert_eq!(lut[255], 255);
    assert!((lut[128] as i32 - 186).abs() <= 2, "{}", lut[128]);
    assert!(lut.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(report.readings[0], 100.0);
}
