use super::strategy::{FadeStrategy, ScheduledCommand};
use crate::base::address::LampAddress;
use crate::drivers::driver::SyncDriver;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// How often a paused task checks whether it has been resumed. Also the
/// longest single sleep while waiting for a command.
pub const PAUSE_POLL: Duration = Duration::from_millis(100);

/// State shared between the controller and all lamp tasks.
#[derive(Debug, Default)]
pub struct FadeControl {
    paused: AtomicBool,
}

impl FadeControl {
    pub fn new(paused: bool) -> FadeControl {
        FadeControl {
            paused: AtomicBool::new(paused),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed)
    }
}

/// Maps virtual cycle time to wall clock instants. Virtual time does not
/// advance while paused.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: Instant,
    paused_total: Duration,
    paused_since: Option<Instant>,
}

impl VirtualClock {
    pub fn new(origin: Instant) -> VirtualClock {
        VirtualClock {
            origin,
            paused_total: Duration::ZERO,
            paused_since: None,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_since.is_none() {
            self.paused_since = Some(now);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += now.saturating_duration_since(since);
        }
    }

    /// Virtual time passed at `now`.
    pub fn elapsed(&self, now: Instant) -> Duration {
        let now = self.paused_since.unwrap_or(now);
        now.saturating_duration_since(self.origin)
            .saturating_sub(self.paused_total)
    }

    /// Wall clock instant of virtual time `at` seconds, assuming no further
    /// pauses.
    pub fn deadline(&self, at: f64) -> Instant {
        let at = if at > 0.0 && at.is_finite() { at } else { 0.0 };
        self.origin + self.paused_total + Duration::from_secs_f64(at)
    }
}

async fn issue(driver: &SyncDriver, address: &LampAddress, next: &ScheduledCommand) {
    debug!("{} t={:.2}: {}", address, next.at, next.command);
    let res = driver.lock().await.send_command(address, next.command).await;
    if let Err(e) = res.check_send() {
        warn!("{}: '{}' failed: {}", address, next.command, e);
    }
}

/// Sleep until `until`, returning false if stopped first.
async fn wait(until: Instant, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return false;
    }
    let changed = tokio::select! {
        _ = tokio::time::sleep_until(until) => None,
        res = stop.changed() => Some(res.is_ok()),
    };
    match changed {
        None => true,
        Some(true) => !*stop.borrow(),
        // Sender dropped
        Some(false) => false,
    }
}

/// Fade loop for one lamp. Runs until `stop` is set or its sender is dropped.
///
/// Deadlines are computed from the task's start instant so that delays in
/// issuing one command do not shift the following ones.
pub async fn run_lamp(
    address: LampAddress,
    mut strategy: FadeStrategy,
    driver: SyncDriver,
    control: Arc<FadeControl>,
    mut stop: watch::Receiver<bool>,
) {
    debug!("{}: fade task started ({:?})", address, strategy.mode());
    let mut clock = VirtualClock::new(Instant::now());
    let mut next = strategy.next_command();
    loop {
        let now = Instant::now();
        if control.is_paused() {
            if !clock.is_paused() {
                clock.pause(now);
                debug!("{}: paused at t={:.2}", address, clock.elapsed(now).as_secs_f64());
            }
            if !wait(now + PAUSE_POLL, &mut stop).await {
                break;
            }
            continue;
        }
        if clock.is_paused() {
            clock.resume(now);
            debug!("{}: resumed", address);
        }
        let Some(cmd) = next else {
            // Nothing left to send, idle until stopped
            if !wait(now + PAUSE_POLL, &mut stop).await {
                break;
            }
            continue;
        };
        let deadline = clock.deadline(cmd.at);
        if now < deadline {
            if !wait(deadline.min(now + PAUSE_POLL), &mut stop).await {
                break;
            }
            continue;
        }
        if *stop.borrow() {
            break;
        }
        issue(&driver, &address, &cmd).await;
        next = strategy.next_command();
    }
    debug!("{}: fade task stopped", address);
}
