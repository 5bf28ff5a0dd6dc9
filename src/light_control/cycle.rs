use super::config::LightConfig;
use crate::calibration::lookup::InverseLookupTable;
use crate::curves::curve::{shape_down, shape_up, Curve};

/// Part of the cycle where the brightness is changing.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Leg {
    pub start: f64,
    pub end: f64,
}

/// Brightness as a function of time for one rise, hold, fall, hold cycle.
///
/// The rising leg starts at t=0 and lasts `transition` seconds, followed by
/// the on hold, the falling leg and the off hold.
#[derive(Debug, Clone, PartialEq)]
pub struct BrightnessCycle {
    level_min: f64,
    level_max: f64,
    transition: f64,
    on_hold: f64,
    off_hold: f64,
    smooth: f64,
    curve: Curve,
    lut: Option<InverseLookupTable>,
}

impl BrightnessCycle {
    pub fn new(config: &LightConfig) -> BrightnessCycle {
        BrightnessCycle {
            level_min: config.level_min as f64,
            level_max: config.level_max as f64,
            transition: config.transition_time,
            on_hold: config.transition_time * config.on_fraction,
            off_hold: config.transition_time * config.off_fraction,
            smooth: config.smooth,
            curve: config.curve(),
            lut: if config.use_calibration {
                config.inverse_lut.clone()
            } else {
                None
            },
        }
    }

    pub fn period(&self) -> f64 {
        2.0 * self.transition + self.on_hold + self.off_hold
    }

    /// Map any time, including negative ones, into [0, period).
    pub fn wrap(&self, t: f64) -> f64 {
        let p = self.period();
        let w = ((t % p) + p) % p;
        // Rounding of a tiny negative t can land exactly on p
        if w >= p {
            0.0
        } else {
            w
        }
    }

    /// Position along the brightness range before curve correction.
    fn position(&self, t: f64) -> f64 {
        let t = self.wrap(t);
        let rise_end = self.transition;
        let fall_start = rise_end + self.on_hold;
        let fall_end = fall_start + self.transition;
        if t < rise_end {
            shape_up(t / self.transition, self.smooth)
        } else if t < fall_start {
            1.0
        } else if t < fall_end {
            shape_down((t - fall_start) / self.transition, self.smooth)
        } else {
            0.0
        }
    }

    /// Curve corrected brightness fraction in [0,1].
    pub fn fraction_at(&self, t: f64) -> f64 {
        self.curve.evaluate(self.position(t))
    }

    /// Brightness in levels. Without calibration this is within
    /// [level_min, level_max], with calibration it is the command level that
    /// produced that brightness.
    pub fn brightness_at(&self, t: f64) -> f64 {
        let b = self.level_min + self.fraction_at(t) * (self.level_max - self.level_min);
        match &self.lut {
            Some(lut) => lut.lookup(b / 255.0),
            None => b,
        }
    }

    pub fn level_at(&self, t: f64) -> u8 {
        let b = self.brightness_at(t);
        if b.is_nan() {
            return 0;
        }
        b.floor().clamp(0.0, 255.0) as u8
    }

    /// The rising and falling legs of the cycle. The falling leg never ends
    /// after the period.
    pub fn legs(&self) -> [Leg; 2] {
        let fall_start = self.transition + self.on_hold;
        [
            Leg {
                start: 0.0,
                end: self.transition,
            },
            Leg {
                start: fall_start,
                end: self.period() - self.off_hold,
            },
        ]
    }
}
