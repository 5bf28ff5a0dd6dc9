//! Turning a brightness cycle into a stream of timed lamp commands.
//!
//! A [`FadePlan`] is compiled once from a configuration and shared by all
//! lamps. Each lamp task gets its own [`FadeStrategy`] cursor, shifted by the
//! lamp's phase offset. Command times are virtual seconds since the task
//! started, not counting time spent paused.

use super::config::{DimmingCommand, FadeMode, LightConfig};
use super::cycle::BrightnessCycle;
use super::step_table::StepTable;
use crate::drivers::driver::{LevelCommand, MoveMode, MAX_RATE};
use std::collections::VecDeque;
use std::sync::Arc;

/// Longest transition time that can be requested, in deciseconds.
const MAX_TRANSITION_DS: f64 = 65534.0;
/// Upper bound on the number of rate changes within one leg.
const MAX_RATE_SEGMENTS: usize = 32;
/// Cycle times closer than this to the period are treated as the period.
const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScheduledCommand {
    /// Virtual time in seconds when the command is due
    pub at: f64,
    pub command: LevelCommand,
}

fn level_command(dimming: DimmingCommand, level: u8, transition_ds: u16) -> LevelCommand {
    match dimming {
        DimmingCommand::MoveToLevel => LevelCommand::MoveToLevel {
            level,
            transition_ds,
        },
        DimmingCommand::MoveToLevelWithOnOff => LevelCommand::MoveToLevelWithOnOff {
            level,
            transition_ds,
        },
    }
}

fn deciseconds(secs: f64) -> u16 {
    if secs.is_nan() {
        return 0;
    }
    (secs * 10.0).round().clamp(0.0, MAX_TRANSITION_DS) as u16
}

/// Levels per second needed to change by `delta` in `secs`.
fn move_rate(delta: f64, secs: f64) -> u8 {
    if !(secs > 0.0) {
        return MAX_RATE;
    }
    (delta.abs() / secs).round().clamp(1.0, MAX_RATE as f64) as u8
}

/// Commands for one cycle, ordered by their time within the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCycle {
    entries: Vec<ScheduledCommand>,
    period: f64,
}

impl CommandCycle {
    /// One level command per step table entry. The transition time of each
    /// command is the time until the next entry.
    pub fn from_table(table: &StepTable, dimming: DimmingCommand) -> CommandCycle {
        let entries = table
            .steps()
            .iter()
            .enumerate()
            .map(|(i, s)| ScheduledCommand {
                at: s.time,
                command: level_command(dimming, s.level, deciseconds(table.duration(i))),
            })
            .collect();
        CommandCycle {
            entries,
            period: table.period(),
        }
    }

    /// Level moves following each leg of the cycle. A leg is split into
    /// segments and each segment gets the rate of the brightness change over
    /// it, so the lamp follows the curve. At the end of the leg the move is
    /// stopped and a level command sets the exact end level.
    pub fn from_legs(
        cycle: &BrightnessCycle,
        dimming: DimmingCommand,
        scan_step: f64,
    ) -> CommandCycle {
        let period = cycle.period();
        // Stop and level commands sort before a move due at the same time
        let mut timed: Vec<(ScheduledCommand, u8)> = Vec::new();
        for leg in cycle.legs() {
            let from = cycle.level_at(leg.start);
            let to = cycle.level_at(leg.end);
            if from == to {
                continue;
            }
            let leg_mode = if to > from { MoveMode::Up } else { MoveMode::Down };
            let duration = leg.end - leg.start;
            let window = scan_step.max(duration / MAX_RATE_SEGMENTS as f64);
            let segments = ((duration / window).ceil() as usize).clamp(1, MAX_RATE_SEGMENTS);
            let mut last = None;
            let mut t0 = leg.start;
            let mut b0 = cycle.brightness_at(t0);
            for i in 1..=segments {
                let t1 = if i == segments {
                    leg.end
                } else {
                    leg.start + duration * i as f64 / segments as f64
                };
                let b1 = cycle.brightness_at(t1);
                let mode = if b1 > b0 {
                    MoveMode::Up
                } else if b1 < b0 {
                    MoveMode::Down
                } else {
                    leg_mode
                };
                let command = LevelCommand::Move {
                    mode,
                    rate: move_rate(b1 - b0, t1 - t0),
                };
                if last != Some(command) {
                    timed.push((ScheduledCommand { at: t0, command }, 1));
                    last = Some(command);
                }
                t0 = t1;
                b0 = b1;
            }
            let end = cycle.wrap(leg.end);
            let end = if period - end < TIME_EPSILON { 0.0 } else { end };
            timed.push((
                ScheduledCommand {
                    at: end,
                    command: LevelCommand::Stop,
                },
                0,
            ));
            timed.push((
                ScheduledCommand {
                    at: end,
                    command: level_command(dimming, to, 0),
                },
                0,
            ));
        }
        timed.sort_by(|a, b| a.0.at.total_cmp(&b.0.at).then(a.1.cmp(&b.1)));
        CommandCycle {
            entries: timed.into_iter().map(|(c, _)| c).collect(),
            period,
        }
    }

    pub fn entries(&self) -> &[ScheduledCommand] {
        &self.entries
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// The last move or stop issued at or before cycle time `t`.
    fn active_move(&self, t: f64) -> Option<LevelCommand> {
        let idx = self.entries.partition_point(|e| e.at <= t);
        let (before, after) = self.entries.split_at(idx);
        before
            .iter()
            .rev()
            .chain(after.iter().rev())
            .map(|e| e.command)
            .find(|c| matches!(c, LevelCommand::Move { .. } | LevelCommand::Stop))
    }
}

/// Cursor replaying a [`CommandCycle`] from a phase offset.
#[derive(Debug, Clone)]
pub struct CycleReplay {
    commands: Arc<CommandCycle>,
    index: usize,
    /// Virtual time of the start of the current cycle
    base: f64,
    pending: VecDeque<LevelCommand>,
}

impl CycleReplay {
    /// `initial` is issued at virtual time 0, followed by the first entry
    /// after `shift`.
    fn new(commands: Arc<CommandCycle>, shift: f64, initial: Vec<LevelCommand>) -> CycleReplay {
        let index = commands.entries.partition_point(|e| e.at <= shift);
        CycleReplay {
            commands,
            index,
            base: -shift,
            pending: initial.into(),
        }
    }

    fn next_command(&mut self) -> Option<ScheduledCommand> {
        if let Some(command) = self.pending.pop_front() {
            return Some(ScheduledCommand { at: 0.0, command });
        }
        let entries = &self.commands.entries;
        if entries.is_empty() {
            return None;
        }
        if self.index >= entries.len() {
            self.index = 0;
            self.base += self.commands.period;
        }
        let e = entries[self.index];
        self.index += 1;
        Some(ScheduledCommand {
            at: self.base + e.at,
            command: e.command,
        })
    }
}

/// Re-evaluates the brightness cycle every scan step and issues a command
/// whenever the level changes.
#[derive(Debug, Clone)]
pub struct ContinuousFade {
    cycle: Arc<BrightnessCycle>,
    scan_step: f64,
    shift: f64,
    dimming: DimmingCommand,
    sample: u64,
    last: Option<u8>,
    since_last: u64,
    /// Samples per period, an unchanged level is reissued this often
    refresh: u64,
}

impl ContinuousFade {
    fn next_command(&mut self) -> Option<ScheduledCommand> {
        loop {
            let at = self.sample as f64 * self.scan_step;
            self.sample += 1;
            self.since_last += 1;
            let level = self.cycle.level_at(at + self.shift);
            if self.last != Some(level) || self.since_last >= self.refresh {
                self.last = Some(level);
                self.since_last = 0;
                return Some(ScheduledCommand {
                    at,
                    command: level_command(self.dimming, level, deciseconds(self.scan_step)),
                });
            }
        }
    }
}

/// Per lamp command source, selected once when the lamp task is created.
#[derive(Debug, Clone)]
pub enum FadeStrategy {
    Continuous(ContinuousFade),
    Table(CycleReplay),
    Rate(CycleReplay),
}

impl FadeStrategy {
    /// Next command to issue. `None` if the cycle has nothing to send.
    pub fn next_command(&mut self) -> Option<ScheduledCommand> {
        match self {
            FadeStrategy::Continuous(f) => f.next_command(),
            FadeStrategy::Table(r) | FadeStrategy::Rate(r) => r.next_command(),
        }
    }

    pub fn mode(&self) -> FadeMode {
        match self {
            FadeStrategy::Continuous(_) => FadeMode::Continuous,
            FadeStrategy::Table(_) => FadeMode::Table,
            FadeStrategy::Rate(_) => FadeMode::Rate,
        }
    }
}

/// Everything the lamp tasks need, compiled from one configuration snapshot.
#[derive(Debug, Clone)]
pub struct FadePlan {
    cycle: Arc<BrightnessCycle>,
    table: Arc<StepTable>,
    commands: Arc<CommandCycle>,
    mode: FadeMode,
    dimming: DimmingCommand,
    scan_step: f64,
}

impl FadePlan {
    pub fn new(config: &LightConfig) -> FadePlan {
        let cycle = BrightnessCycle::new(config);
        let table = StepTable::from_cycle(&cycle, config.scan_step);
        let commands = match config.fade_mode {
            FadeMode::Rate => {
                CommandCycle::from_legs(&cycle, config.dimming_command, config.scan_step)
            }
            _ => CommandCycle::from_table(&table, config.dimming_command),
        };
        FadePlan {
            cycle: Arc::new(cycle),
            table: Arc::new(table),
            commands: Arc::new(commands),
            mode: config.fade_mode,
            dimming: config.dimming_command,
            scan_step: config.scan_step,
        }
    }

    pub fn period(&self) -> f64 {
        self.cycle.period()
    }

    pub fn cycle(&self) -> &BrightnessCycle {
        &self.cycle
    }

    pub fn table(&self) -> &StepTable {
        &self.table
    }

    pub fn commands(&self) -> &CommandCycle {
        &self.commands
    }

    /// Cursor for a lamp whose cycle is shifted by `offset` periods.
    pub fn strategy(&self, offset: f64) -> FadeStrategy {
        let shift = self.cycle.wrap(offset.rem_euclid(1.0) * self.period());
        match self.mode {
            FadeMode::Continuous => FadeStrategy::Continuous(ContinuousFade {
                cycle: self.cycle.clone(),
                scan_step: self.scan_step,
                shift,
                dimming: self.dimming,
                sample: 0,
                last: None,
                since_last: 0,
                refresh: (self.period() / self.scan_step).ceil().max(1.0) as u64,
            }),
            FadeMode::Table => {
                let level = self
                    .table
                    .level_at(shift)
                    .unwrap_or_else(|| self.cycle.level_at(shift));
                let initial = vec![level_command(self.dimming, level, 0)];
                FadeStrategy::Table(CycleReplay::new(self.commands.clone(), shift, initial))
            }
            FadeMode::Rate => {
                let mut initial = vec![level_command(self.dimming, self.cycle.level_at(shift), 0)];
                if let Some(m @ LevelCommand::Move { .. }) = self.commands.active_move(shift) {
                    initial.push(m);
                }
                FadeStrategy::Rate(CycleReplay::new(self.commands.clone(), shift, initial))
            }
        }
    }
}
