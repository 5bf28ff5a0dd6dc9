use super::bezier::BezierCurve;
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    Linear,
    Power,
    Polynomial,
    Logarithmic,
    Sine,
    Bezier,
}

impl CurveKind {
    pub const ALL: [CurveKind; 6] = [
        CurveKind::Linear,
        CurveKind::Power,
        CurveKind::Polynomial,
        CurveKind::Logarithmic,
        CurveKind::Sine,
        CurveKind::Bezier,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CurveKind::Linear => "linear",
            CurveKind::Power => "power",
            CurveKind::Polynomial => "polynomial",
            CurveKind::Logarithmic => "logarithmic",
            CurveKind::Sine => "sine",
            CurveKind::Bezier => "bezier",
        }
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CurveKind {
    type Err = ();
    /// Accepts the curve name or its numeric index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<usize>() {
            return CurveKind::ALL.get(n).copied().ok_or(());
        }
        CurveKind::ALL
            .iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or(())
    }
}

/// Blend between a straight ramp and a smoothstep.
///
/// `s` is the weight of the smoothstep, 0 gives a linear ramp.
pub fn shape_up(x: f64, s: f64) -> f64 {
    (1.0 - s) * x + s * (3.0 * x * x - 2.0 * x * x * x)
}

/// Mirror of [`shape_up`] used for the falling leg.
pub fn shape_down(x: f64, s: f64) -> f64 {
    1.0 - shape_up(x, s)
}

/// Brightness correction curve mapping a time fraction to a brightness fraction.
#[derive(Debug, Clone, PartialEq)]
pub enum Curve {
    Linear,
    Power { gamma: f64, scale: f64 },
    Polynomial { a: [f64; 3] },
    Logarithmic { base: f64 },
    /// Full weight ease, `shape_up(x, 1)`
    Sine,
    Bezier(BezierCurve),
}

impl Curve {
    /// Power law curve `scale * x^(1/gamma)`. A zero gamma is replaced by 1.
    pub fn power(gamma: f64, scale: f64) -> Curve {
        let gamma = if gamma == 0.0 || !gamma.is_finite() {
            1.0
        } else {
            gamma
        };
        Curve::Power { gamma, scale }
    }

    pub fn kind(&self) -> CurveKind {
        match self {
            Curve::Linear => CurveKind::Linear,
            Curve::Power { .. } => CurveKind::Power,
            Curve::Polynomial { .. } => CurveKind::Polynomial,
            Curve::Logarithmic { .. } => CurveKind::Logarithmic,
            Curve::Sine => CurveKind::Sine,
            Curve::Bezier(_) => CurveKind::Bezier,
        }
    }

    /// Evaluate the curve. Input is clamped to [0,1] and so is the output.
    pub fn evaluate(&self, x: f64) -> f64 {
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        let y = match self {
            Curve::Linear => x,
            Curve::Power { gamma, scale } => {
                let gamma = if *gamma == 0.0 { 1.0 } else { *gamma };
                scale * x.powf(1.0 / gamma)
            }
            Curve::Polynomial { a } => a[0] + a[1] * x + a[2] * x * x,
            Curve::Logarithmic { base } => {
                if *base > 0.0 {
                    (1.0 + base * x).ln() / (1.0 + base).ln()
                } else {
                    x
                }
            }
            Curve::Sine => shape_up(x, 1.0),
            Curve::Bezier(b) => b.evaluate(x),
        };
        if y.is_nan() {
            0.0
        } else {
            y.clamp(0.0, 1.0)
        }
    }
}
