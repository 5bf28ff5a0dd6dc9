use crate::base::address::LampAddress;
use crate::calibration::calibrate::CalibrationSettings;
use crate::calibration::sensor::{LightSensor, StableReadingParams};
use crate::config_store::MemoryStore;
use crate::console::{execute, ConsoleCommand};
use crate::drivers::driver::{LevelCommand, LevelDriver, SendResult, SyncDriver};
use crate::drivers::simulator::simulator::{CommandRecord, SimResponse, Simulator};
use crate::error::DynFuture;
use crate::light_control::config::{FadeMode, LampConfig, LightConfig};
use crate::light_control::controller::{ControlError, FadeController};
use crate::light_control::scheduler::PAUSE_POLL;
use crate::light_control::strategy::{FadePlan, ScheduledCommand};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

const LAMP_A: LampAddress = LampAddress::new([0, 0, 0, 0, 0, 0, 0, 0xa]);
const LAMP_B: LampAddress = LampAddress::new([0, 0, 0, 0, 0, 0, 0, 0xb]);

/// Six second cycle on one lamp
fn config(mode: FadeMode) -> LightConfig {
    LightConfig {
        transition_time: 2.0,
        on_fraction: 0.5,
        off_fraction: 0.5,
        scan_step: 0.05,
        fade_mode: mode,
        lamps: vec![LampConfig {
            address: LAMP_A,
            offset: 0.0,
        }],
        ..LightConfig::default()
    }
}

fn sync_driver(driver: Box<dyn LevelDriver>) -> SyncDriver {
    Arc::new(tokio::sync::Mutex::new(driver))
}

fn setup(config: LightConfig) -> (Simulator, FadeController) {
    let sim = Simulator::new(
        SimResponse {
            noise: 0.0,
            ..SimResponse::default()
        },
        Some(3),
    );
    let mut ctrl = FadeController::new(
        sync_driver(Box::new(sim.driver())),
        Box::new(MemoryStore::new()),
        config,
    );
    let sensor: Arc<dyn LightSensor> = sim.sensor();
    ctrl.set_sensor(Some(sensor));
    (sim, ctrl)
}

fn records_for(sim: &Simulator, lamp: &LampAddress) -> Vec<CommandRecord> {
    sim.commands()
        .into_iter()
        .filter(|r| r.target == *lamp)
        .collect()
}

fn expected(config: &LightConfig, offset: f64, until: f64) -> Vec<ScheduledCommand> {
    let mut strategy = FadePlan::new(config).strategy(offset);
    let mut cmds = Vec::new();
    while let Some(c) = strategy.next_command() {
        if c.at > until {
            break;
        }
        cmds.push(c);
    }
    cmds
}

fn secs(from: Instant, to: Instant) -> f64 {
    to.saturating_duration_since(from).as_secs_f64()
}

#[tokio::test(start_paused = true)]
async fn table_commands_follow_schedule() {
    let cfg = config(FadeMode::Table);
    let (sim, mut ctrl) = setup(cfg.clone());
    let t0 = Instant::now();
    ctrl.start().await;
    sleep(Duration::from_secs_f64(12.01)).await;
    ctrl.stop().await;

    let records = records_for(&sim, &LAMP_A);
    assert_eq!(
        records[0].command,
        LevelCommand::MoveToLevelWithOnOff {
            level: 5,
            transition_ds: 0
        }
    );
    let want = expected(&cfg, 0.0, 12.01);
    assert_eq!(records.len() - 1, want.len());
    for (r, w) in records[1..].iter().zip(want.iter()) {
        assert_eq!(r.command, w.command);
        let t = secs(t0, r.time);
        assert!((t - w.at).abs() < 0.002, "{} vs {}", t, w.at);
    }
    // Two full cycles were replayed
    assert!(want.iter().any(|c| c.at == 12.0));
}

#[tokio::test(start_paused = true)]
async fn pause_holds_cycle_position() {
    let cfg = config(FadeMode::Table);
    let (sim, mut ctrl) = setup(cfg.clone());
    let t0 = Instant::now();
    ctrl.start().await;
    sleep(Duration::from_secs(1)).await;
    ctrl.pause();
    assert!(ctrl.is_paused());
    sleep(Duration::from_secs(5)).await;
    ctrl.resume();
    sleep(Duration::from_secs(3)).await;
    ctrl.stop().await;

    let records = records_for(&sim, &LAMP_A);
    let fades = &records[1..];
    let pause_end = 1.0 + PAUSE_POLL.as_secs_f64();
    assert!(fades
        .iter()
        .all(|r| !(pause_end < secs(t0, r.time) && secs(t0, r.time) < 6.0)));

    // Same commands as an uninterrupted run, nothing skipped or repeated
    let want = expected(&cfg, 0.0, 100.0);
    for (r, w) in fades.iter().zip(want.iter()) {
        assert_eq!(r.command, w.command);
    }
    // Commands after the pause are late by the paused time only
    let late: Vec<f64> = fades
        .iter()
        .zip(want.iter())
        .filter(|(r, _)| secs(t0, r.time) >= 6.0)
        .map(|(r, w)| secs(t0, r.time) - w.at)
        .collect();
    assert!(!late.is_empty());
    let shift = late[0];
    let poll = PAUSE_POLL.as_secs_f64();
    assert!(shift > 5.0 - poll - 0.01 && shift < 5.0 + poll + 0.01, "{}", shift);
    assert!(late.iter().all(|l| (l - shift).abs() < 0.002));
    // About four seconds of the cycle were played
    let last = want[fades.len() - 1].at;
    assert!(last > 3.8 && last < 4.2, "{}", last);
}

#[tokio::test(start_paused = true)]
async fn offsets_stagger_lamps() {
    let mut cfg = config(FadeMode::Table);
    cfg.lamps.push(LampConfig {
        address: LAMP_B,
        offset: 0.5,
    });
    let (sim, mut ctrl) = setup(cfg.clone());
    ctrl.start().await;
    sleep(Duration::from_millis(10)).await;
    assert_eq!(sim.level(&LAMP_A), Some(5.0));
    // Half a cycle in is the start of the falling leg
    assert_eq!(sim.level(&LAMP_B), Some(254.0));
    assert_eq!(sim.is_on(&LAMP_B), Some(true));
    assert_eq!(ctrl.running_lamps(), vec![LAMP_A, LAMP_B]);
    ctrl.stop().await;
    assert!(ctrl.running_lamps().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_is_prompt() {
    let mut cfg = config(FadeMode::Table);
    cfg.transition_time = 1000.0;
    let (_sim, mut ctrl) = setup(cfg);
    ctrl.start().await;
    sleep(Duration::from_millis(1050)).await;
    let before = Instant::now();
    ctrl.stop().await;
    assert!(Instant::now() - before < PAUSE_POLL);

    ctrl.pause();
    ctrl.start().await;
    sleep(Duration::from_secs(2)).await;
    let before = Instant::now();
    ctrl.stop().await;
    assert!(Instant::now() - before < PAUSE_POLL);
}

#[tokio::test(start_paused = true)]
async fn reconfigure_restarts_tasks() {
    let mut cfg = config(FadeMode::Table);
    cfg.lamps.push(LampConfig {
        address: LAMP_B,
        offset: 0.25,
    });
    let (sim, mut ctrl) = setup(cfg);
    ctrl.start().await;
    sleep(Duration::from_secs(1)).await;

    ctrl.set_field("level_min", &["20"]).await.unwrap();
    assert_eq!(ctrl.config().level_min, 20);
    assert_eq!(ctrl.running_lamps().len(), 2);
    let initial = |level| LevelCommand::MoveToLevelWithOnOff {
        level,
        transition_ds: 0,
    };
    let inits = |sim: &Simulator| {
        sim.commands()
            .iter()
            .filter(|r| r.command == initial(20))
            .count()
    };
    assert_eq!(inits(&sim), 2);

    // Rejected values change nothing and do not restart
    sim.clear_commands();
    let res = ctrl.set_field("level_min", &["254"]).await;
    assert!(matches!(res, Err(ControlError::Config(_))));
    let res = ctrl.set_field("no_such_param", &["1"]).await;
    assert!(matches!(res, Err(ControlError::Config(_))));
    assert_eq!(ctrl.config().level_min, 20);
    assert_eq!(inits(&sim), 0);

    sleep(Duration::from_secs(1)).await;
    assert!(sim
        .commands()
        .iter()
        .all(|r| r.command.level().map_or(true, |l| l >= 20)));
    ctrl.stop().await;
}

struct FailingDriver {
    calls: Arc<AtomicUsize>,
}

impl LevelDriver for FailingDriver {
    fn send_command(
        &mut self,
        _target: &LampAddress,
        _cmd: LevelCommand,
    ) -> DynFuture<'_, SendResult> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Box::pin(async { SendResult::Timeout })
    }
}

#[tokio::test(start_paused = true)]
async fn failing_sink_does_not_stop_fades() {
    let calls = Arc::new(AtomicUsize::new(0));
    let driver = sync_driver(Box::new(FailingDriver {
        calls: calls.clone(),
    }));
    let mut ctrl = FadeController::new(
        driver,
        Box::new(MemoryStore::new()),
        config(FadeMode::Table),
    );
    ctrl.start().await;
    sleep(Duration::from_secs(3)).await;
    let cfg = config(FadeMode::Table);
    // Initial level plus everything due in the first three seconds
    let due = expected(&cfg, 0.0, 3.0).len();
    assert_eq!(calls.load(Ordering::Relaxed), due + 1);
    assert_eq!(ctrl.running_lamps(), vec![LAMP_A]);
    ctrl.stop().await;
}

#[tokio::test(start_paused = true)]
async fn rate_mode_follows_legs() {
    let (sim, mut ctrl) = setup(config(FadeMode::Rate));
    ctrl.start().await;
    sleep(Duration::from_secs(1)).await;
    // 249 levels in two seconds gives a rate of 125
    let level = sim.level(&LAMP_A).unwrap();
    assert!((level - 130.0).abs() < 1.0, "{}", level);
    sleep(Duration::from_millis(1500)).await;
    assert_eq!(sim.level(&LAMP_A), Some(254.0));
    sleep(Duration::from_secs(3)).await;
    assert_eq!(sim.level(&LAMP_A), Some(5.0));
    ctrl.stop().await;
}

#[tokio::test(start_paused = true)]
async fn continuous_mode_tracks_cycle() {
    let cfg = config(FadeMode::Continuous);
    let (sim, mut ctrl) = setup(cfg.clone());
    let t0 = Instant::now();
    ctrl.start().await;
    sleep(Duration::from_secs(6)).await;
    ctrl.stop().await;

    let plan = FadePlan::new(&cfg);
    let records = records_for(&sim, &LAMP_A);
    assert!(records.len() > 60);
    for r in &records[1..] {
        let t = secs(t0, r.time);
        let want = plan.cycle().level_at(t) as i32;
        let got = r.command.level().unwrap() as i32;
        assert!((want - got).abs() <= 1, "t={} {} {}", t, want, got);
    }
}

#[tokio::test(start_paused = true)]
async fn calibration_stops_fades() {
    let mut cfg = config(FadeMode::Table);
    cfg.lamps.push(LampConfig {
        address: LAMP_B,
        offset: 0.5,
    });
    let (sim, mut ctrl) = setup(cfg);
    ctrl.set_calibration_settings(CalibrationSettings {
        dark_wait: Duration::from_millis(50),
        settle: Duration::from_millis(10),
        reading: StableReadingParams {
            sample_count: 2,
            sample_interval: Duration::from_millis(1),
            ..StableReadingParams::default()
        },
    });
    ctrl.start().await;
    sleep(Duration::from_secs(1)).await;
    sim.clear_commands();

    let report = ctrl.calibrate().await.unwrap();
    let records = sim.commands();
    let set = |level| LevelCommand::MoveToLevel {
        level,
        transition_ds: 0,
    };
    assert_eq!(records[0].target, LAMP_B);
    assert_eq!(
        records[0].command,
        LevelCommand::MoveToLevelWithOnOff {
            level: 0,
            transition_ds: 0
        }
    );
    assert_eq!(records[1].target, LAMP_A);
    assert_eq!(records[2].command, set(0));
    for (level, r) in records[3..259].iter().enumerate() {
        assert_eq!(r.target, LAMP_A);
        assert_eq!(r.command, set(level as u8));
    }

    let config = ctrl.config();
    assert_eq!(config.inverse_lut.as_ref(), Some(&report.lut));
    assert!((config.power_gamma - 2.2).abs() < 0.1, "{}", config.power_gamma);
    assert_eq!(config.poly, report.inverse_quadratic.a);
    assert_eq!(ctrl.running_lamps().len(), 2);
    ctrl.stop().await;
}

#[tokio::test(start_paused = true)]
async fn calibration_needs_sensor_and_lamps() {
    let mut ctrl = FadeController::new(
        sync_driver(Box::new(Simulator::new(SimResponse::default(), Some(1)).driver())),
        Box::new(MemoryStore::new()),
        config(FadeMode::Table),
    );
    assert!(matches!(ctrl.calibrate().await, Err(ControlError::NoSensor)));

    let mut cfg = config(FadeMode::Table);
    cfg.lamps.clear();
    let (_sim, mut ctrl) = setup(cfg);
    assert!(matches!(ctrl.calibrate().await, Err(ControlError::NoLamps)));
}

#[tokio::test(start_paused = true)]
async fn save_reset_reload() {
    let (_sim, mut ctrl) = setup(config(FadeMode::Table));
    ctrl.start().await;
    ctrl.set_field("level_min", &["30"]).await.unwrap();
    ctrl.save().unwrap();
    ctrl.reset().await;
    assert_eq!(ctrl.config(), &LightConfig::default());
    assert_eq!(ctrl.running_lamps().len(), 2);
    ctrl.reload().await;
    assert_eq!(ctrl.config().level_min, 30);
    assert_eq!(ctrl.running_lamps(), vec![LAMP_A]);
    ctrl.stop().await;
}

#[tokio::test(start_paused = true)]
async fn console_session() {
    let (_sim, mut ctrl) = setup(config(FadeMode::Table));
    ctrl.start().await;
    let run = |line: &str| line.parse::<ConsoleCommand>().unwrap();

    let out = execute(&mut ctrl, run("get")).await;
    assert!(out.lines().any(|l| l == "VALUE level_min 5"));
    assert!(out.lines().any(|l| l == "VALUE paused false"));

    assert_eq!(execute(&mut ctrl, run("set level_max 200")).await, "OK");
    assert_eq!(ctrl.config().level_max, 200);
    assert!(execute(&mut ctrl, run("set level_max x")).await.starts_with("ERROR"));

    assert_eq!(execute(&mut ctrl, run("pause")).await, "OK");
    assert!(ctrl.is_paused());
    assert_eq!(execute(&mut ctrl, run("resume")).await, "OK");
    assert!(!ctrl.is_paused());

    let steps = execute(&mut ctrl, run("steps")).await;
    let plan = ctrl.plan();
    assert_eq!(steps.lines().count(), plan.table().len() + 1);
    assert!(steps.lines().last().unwrap().contains("steps, period 6.000 s"));
    ctrl.stop().await;
}
