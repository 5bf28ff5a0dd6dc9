use super::cycle::BrightnessCycle;
use log::warn;

/// Upper bound on the number of entries in a step table.
pub const MAX_STEPS: usize = 1024;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Step {
    /// Seconds from the start of the cycle
    pub time: f64,
    pub level: u8,
}

/// The points in one cycle where the integer level changes.
#[derive(Debug, Clone, PartialEq)]
pub struct StepTable {
    steps: Vec<Step>,
    period: f64,
    truncated: bool,
}

impl StepTable {
    /// Sample `brightness` every `scan_step` seconds over one period and
    /// record each change of its floor. The first sample is always recorded.
    pub fn generate<F>(brightness: F, period: f64, scan_step: f64) -> StepTable
    where
        F: Fn(f64) -> f64,
    {
        let mut steps = Vec::new();
        let mut truncated = false;
        if period > 0.0 && period.is_finite() && scan_step > 0.0 && scan_step.is_finite() {
            let mut last = None;
            let mut i: u64 = 0;
            loop {
                // Multiply rather than accumulate so rounding errors do not add up
                let time = i as f64 * scan_step;
                if time >= period {
                    break;
                }
                i += 1;
                let b = brightness(time);
                let level = if b.is_nan() {
                    0
                } else {
                    b.floor().clamp(0.0, 255.0) as u8
                };
                if last == Some(level) {
                    continue;
                }
                if steps.len() == MAX_STEPS {
                    warn!(
                        "Step table full at t={:.3}s, dropping the rest of the cycle",
                        time
                    );
                    truncated = true;
                    break;
                }
                steps.push(Step { time, level });
                last = Some(level);
            }
        }
        StepTable {
            steps,
            period,
            truncated,
        }
    }

    pub fn from_cycle(cycle: &BrightnessCycle, scan_step: f64) -> StepTable {
        Self::generate(|t| cycle.brightness_at(t), cycle.period(), scan_step)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// True if the cycle had more level changes than fit in the table.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Index of the entry in effect at cycle time `t`.
    pub fn index_at(&self, t: f64) -> Option<usize> {
        if self.steps.is_empty() {
            return None;
        }
        let t = ((t % self.period) + self.period) % self.period;
        let after = self.steps.partition_point(|s| s.time <= t);
        // Before the first entry the last one of the previous cycle holds
        Some(if after == 0 {
            self.steps.len() - 1
        } else {
            after - 1
        })
    }

    /// Level in effect at cycle time `t`.
    pub fn level_at(&self, t: f64) -> Option<u8> {
        self.index_at(t).map(|i| self.steps[i].level)
    }

    /// Time from entry `index` until the next entry, wrapping at the end of
    /// the cycle.
    pub fn duration(&self, index: usize) -> f64 {
        let now = self.steps[index].time;
        match self.steps.get(index + 1) {
            Some(next) => next.time - now,
            None => self.steps[0].time + self.period - now,
        }
    }
}
