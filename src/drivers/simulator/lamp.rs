use crate::drivers::driver::{LevelCommand, MoveMode, MAX_LEVEL};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Copy, Clone, PartialEq)]
enum Motion {
    Steady(f64),
    Fade {
        from: f64,
        to: f64,
        start: Instant,
        duration: Duration,
    },
    /// Signed rate in levels per second
    Move { from: f64, start: Instant, rate: f64 },
}

/// A dimmable lamp following level commands.
#[derive(Debug, Clone, PartialEq)]
pub struct SimLamp {
    on: bool,
    motion: Motion,
}

fn clamp_level(level: f64) -> f64 {
    level.clamp(0.0, MAX_LEVEL as f64)
}

impl SimLamp {
    pub fn new(level: u8, on: bool) -> SimLamp {
        SimLamp {
            on,
            motion: Motion::Steady(level as f64),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Actual level at `now`, including fractional levels during a fade.
    pub fn level(&self, now: Instant) -> f64 {
        match self.motion {
            Motion::Steady(level) => level,
            Motion::Fade {
                from,
                to,
                start,
                duration,
            } => {
                let elapsed = now.saturating_duration_since(start);
                if elapsed >= duration {
                    to
                } else {
                    from + (to - from) * elapsed.as_secs_f64() / duration.as_secs_f64()
                }
            }
            Motion::Move { from, start, rate } => {
                let elapsed = now.saturating_duration_since(start).as_secs_f64();
                clamp_level(from + rate * elapsed)
            }
        }
    }

    pub fn handle(&mut self, cmd: &LevelCommand, now: Instant) {
        let current = self.level(now);
        match *cmd {
            LevelCommand::MoveToLevel {
                level,
                transition_ds,
            } => self.fade_to(current, level, transition_ds, now),
            LevelCommand::MoveToLevelWithOnOff {
                level,
                transition_ds,
            } => {
                self.on = level > 0;
                self.fade_to(current, level, transition_ds, now);
            }
            LevelCommand::Move { mode, rate } => {
                let rate = rate as f64;
                self.motion = Motion::Move {
                    from: current,
                    start: now,
                    rate: match mode {
                        MoveMode::Up => rate,
                        MoveMode::Down => -rate,
                    },
                };
            }
            LevelCommand::Stop => self.motion = Motion::Steady(current),
        }
    }

    fn fade_to(&mut self, current: f64, level: u8, transition_ds: u16, now: Instant) {
        self.motion = if transition_ds == 0 {
            Motion::Steady(level as f64)
        } else {
            Motion::Fade {
                from: current,
                to: level as f64,
                start: now,
                duration: Duration::from_millis(transition_ds as u64 * 100),
            }
        };
    }
}
