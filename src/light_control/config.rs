use crate::base::address::LampAddress;
use crate::calibration::calibrate::CalibrationReport;
use crate::calibration::lookup::InverseLookupTable;
use crate::curves::bezier::{BezierCurve, MAX_BEZIER_POINTS};
use crate::curves::curve::{Curve, CurveKind};
use log::warn;
use serde_derive::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::str::FromStr;

/// Shortest scan step accepted, in seconds.
pub const MIN_SCAN_STEP: f64 = 0.001;

/// How a lamp task turns the brightness cycle into commands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeMode {
    /// Evaluate the brightness function every scan step
    Continuous,
    /// Replay the precomputed step table
    Table,
    /// Level move/stop commands derived from the step table
    Rate,
}

impl FadeMode {
    const ALL: [FadeMode; 3] = [FadeMode::Continuous, FadeMode::Table, FadeMode::Rate];

    pub fn name(&self) -> &'static str {
        match self {
            FadeMode::Continuous => "continuous",
            FadeMode::Table => "table",
            FadeMode::Rate => "rate",
        }
    }
}

impl FromStr for FadeMode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named(s, &Self::ALL, Self::name)
    }
}

/// Level command used by the continuous and table modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimmingCommand {
    MoveToLevel,
    MoveToLevelWithOnOff,
}

impl DimmingCommand {
    const ALL: [DimmingCommand; 2] = [
        DimmingCommand::MoveToLevel,
        DimmingCommand::MoveToLevelWithOnOff,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DimmingCommand::MoveToLevel => "move_to_level",
            DimmingCommand::MoveToLevelWithOnOff => "move_to_level_with_onoff",
        }
    }
}

impl FromStr for DimmingCommand {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_named(s, &Self::ALL, Self::name)
    }
}

fn parse_named<T: Copy>(s: &str, all: &[T], name: fn(&T) -> &'static str) -> Result<T, ()> {
    let s = s.trim();
    if let Ok(n) = s.parse::<usize>() {
        return all.get(n).copied().ok_or(());
    }
    all.iter()
        .find(|v| name(v).eq_ignore_ascii_case(s))
        .copied()
        .ok_or(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LampConfig {
    pub address: LampAddress,
    /// Phase offset as a fraction of the cycle
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    UnknownParameter(String),
    MissingValue(String),
    InvalidValue { name: String, value: String },
    OutOfRange { name: String, reason: String },
}

impl Error for ConfigError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownParameter(p) => write!(f, "Unknown parameter: {}", p),
            ConfigError::MissingValue(p) => write!(f, "Missing value for {}", p),
            ConfigError::InvalidValue { name, value } => {
                write!(f, "Invalid value '{}' for {}", value, name)
            }
            ConfigError::OutOfRange { name, reason } => {
                write!(f, "{} out of range: {}", name, reason)
            }
        }
    }
}

fn out_of_range(name: &str, reason: &str) -> ConfigError {
    ConfigError::OutOfRange {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Everything that defines the breathing fade. A snapshot of this is taken
/// each time the fades are (re)started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub level_min: u8,
    pub level_max: u8,
    /// Duration of one rising or falling leg, in seconds
    pub transition_time: f64,
    /// Hold at full brightness, as a multiple of `transition_time`
    pub on_fraction: f64,
    /// Hold at minimum brightness, as a multiple of `transition_time`
    pub off_fraction: f64,
    /// Smoothstep blend of the rising and falling legs, 0..=1
    pub smooth: f64,
    pub curve_kind: CurveKind,
    pub power_gamma: f64,
    pub power_scale: f64,
    pub poly: [f64; 3],
    pub log_base: f64,
    pub bezier_points: Vec<(f64, f64)>,
    pub fade_mode: FadeMode,
    pub dimming_command: DimmingCommand,
    /// Time resolution of the step table, in seconds
    pub scan_step: f64,
    /// Map brightness through `inverse_lut` before commanding a level
    pub use_calibration: bool,
    pub inverse_lut: Option<InverseLookupTable>,
    pub lamps: Vec<LampConfig>,
}

impl Default for LightConfig {
    fn default() -> Self {
        LightConfig {
            level_min: 5,
            level_max: 254,
            transition_time: 20.0,
            on_fraction: 0.5,
            off_fraction: 0.5,
            smooth: 0.0,
            curve_kind: CurveKind::Linear,
            power_gamma: 2.2,
            power_scale: 1.0,
            poly: [0.0, 1.0, 0.0],
            log_base: 10.0,
            bezier_points: vec![(0.0, 0.0), (0.42, 0.0), (0.58, 1.0), (1.0, 1.0)],
            fade_mode: FadeMode::Table,
            dimming_command: DimmingCommand::MoveToLevel,
            scan_step: 0.05,
            use_calibration: false,
            inverse_lut: None,
            lamps: vec![
                LampConfig {
                    address: LampAddress::new([0x5d, 0x23, 0x38, 0xfe, 0xff, 0xf8, 0xe2, 0x44]),
                    offset: 0.0,
                },
                LampConfig {
                    address: LampAddress::new([0xd0, 0x46, 0x3a, 0xfe, 0xff, 0xf8, 0xe2, 0x44]),
                    offset: 0.5,
                },
            ],
        }
    }
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Index of a numbered per-lamp field, `offset_1` gives 0.
fn lamp_index(name: &str, prefix: &str) -> Option<usize> {
    let n: usize = name.strip_prefix(prefix)?.parse().ok()?;
    n.checked_sub(1)
}

impl LightConfig {
    /// Length of one full rise, hold, fall, hold cycle in seconds.
    pub fn period(&self) -> f64 {
        self.transition_time * (2.0 + self.on_fraction + self.off_fraction)
    }

    /// The correction curve selected by `curve_kind`.
    pub fn curve(&self) -> Curve {
        match self.curve_kind {
            CurveKind::Linear => Curve::Linear,
            CurveKind::Power => Curve::power(self.power_gamma, self.power_scale),
            CurveKind::Polynomial => Curve::Polynomial { a: self.poly },
            CurveKind::Logarithmic => Curve::Logarithmic {
                base: self.log_base,
            },
            CurveKind::Sine => Curve::Sine,
            CurveKind::Bezier => Curve::Bezier(BezierCurve::new(&self.bezier_points)),
        }
    }

    pub fn lamp_addresses(&self) -> Vec<LampAddress> {
        self.lamps.iter().map(|l| l.address).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level_min >= self.level_max {
            return Err(out_of_range("level_min", "must be below level_max"));
        }
        if !(self.transition_time > 0.0 && self.transition_time.is_finite()) {
            return Err(out_of_range("transition_time", "must be positive"));
        }
        if !(self.on_fraction >= 0.0 && self.on_fraction.is_finite()) {
            return Err(out_of_range("on_fraction", "must not be negative"));
        }
        if !(self.off_fraction >= 0.0 && self.off_fraction.is_finite()) {
            return Err(out_of_range("off_fraction", "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.smooth) {
            return Err(out_of_range("smooth", "must be within 0..1"));
        }
        if !(self.scan_step >= MIN_SCAN_STEP && self.scan_step.is_finite()) {
            return Err(out_of_range("scan_step", "must be at least 0.001 s"));
        }
        if self.bezier_points.len() > MAX_BEZIER_POINTS {
            return Err(out_of_range("bezier_points", "too many points"));
        }
        for lamp in &self.lamps {
            if !(0.0..1.0).contains(&lamp.offset) {
                return Err(out_of_range("offset", "must be within 0..1"));
            }
        }
        Ok(())
    }

    /// Set one named parameter. The configuration is left untouched unless
    /// the new value is accepted.
    pub fn set_field(&mut self, name: &str, values: &[&str]) -> Result<(), ConfigError> {
        let mut new = self.clone();
        new.apply_field(name, values)?;
        new.validate()?;
        *self = new;
        Ok(())
    }

    fn apply_field(&mut self, name: &str, values: &[&str]) -> Result<(), ConfigError> {
        if name == "bezier_points" {
            return self.set_bezier_points(values);
        }
        let Some(&value) = values.first() else {
            return Err(ConfigError::MissingValue(name.to_string()));
        };
        match name {
            "level_min" => self.level_min = parse_value(name, value)?,
            "level_max" => self.level_max = parse_value(name, value)?,
            "transition_time" => self.transition_time = parse_value(name, value)?,
            "on_fraction" => self.on_fraction = parse_value(name, value)?,
            "off_fraction" => self.off_fraction = parse_value(name, value)?,
            "smooth" => {
                let s: f64 = parse_value(name, value)?;
                if s.is_nan() {
                    return Err(out_of_range(name, "not a number"));
                }
                self.smooth = s.clamp(0.0, 1.0);
            }
            "curve_kind" | "dimming_mode" => self.curve_kind = parse_value(name, value)?,
            "power_gamma" | "gamma" => self.power_gamma = parse_value(name, value)?,
            "power_scale" => self.power_scale = parse_value(name, value)?,
            "poly_a0" => self.poly[0] = parse_value(name, value)?,
            "poly_a1" => self.poly[1] = parse_value(name, value)?,
            "poly_a2" => self.poly[2] = parse_value(name, value)?,
            "log_base" => self.log_base = parse_value(name, value)?,
            "fade_mode" => self.fade_mode = parse_value(name, value)?,
            "dimming_command" | "dimming_strategy" => {
                self.dimming_command = parse_value(name, value)?
            }
            "scan_step" => self.scan_step = parse_value(name, value)?,
            "use_calibration" => self.use_calibration = parse_bool(name, value)?,
            _ => {
                if let Some(i) = lamp_index(name, "offset_") {
                    let offset: f64 = parse_value(name, value)?;
                    if !offset.is_finite() {
                        return Err(out_of_range(name, "not a number"));
                    }
                    let lamp = self
                        .lamps
                        .get_mut(i)
                        .ok_or_else(|| ConfigError::UnknownParameter(name.to_string()))?;
                    lamp.offset = offset.rem_euclid(1.0);
                } else if let Some(i) = lamp_index(name, "lamp_") {
                    let address: LampAddress = parse_value(name, value)?;
                    if i < self.lamps.len() {
                        self.lamps[i].address = address;
                    } else if i == self.lamps.len() {
                        self.lamps.push(LampConfig {
                            address,
                            offset: 0.0,
                        });
                    } else {
                        return Err(ConfigError::UnknownParameter(name.to_string()));
                    }
                } else {
                    return Err(ConfigError::UnknownParameter(name.to_string()));
                }
            }
        }
        Ok(())
    }

    fn set_bezier_points(&mut self, values: &[&str]) -> Result<(), ConfigError> {
        let name = "bezier_points";
        if values.len() < 2 || values.len() % 2 != 0 {
            return Err(ConfigError::InvalidValue {
                name: name.to_string(),
                value: values.join(" "),
            });
        }
        let mut points = Vec::with_capacity(values.len() / 2);
        for pair in values.chunks(2) {
            points.push((parse_value(name, pair[0])?, parse_value(name, pair[1])?));
        }
        if points.len() > MAX_BEZIER_POINTS {
            warn!(
                "{} bezier points given, keeping the first {}",
                points.len(),
                MAX_BEZIER_POINTS
            );
            points.truncate(MAX_BEZIER_POINTS);
        }
        self.bezier_points = points;
        Ok(())
    }

    /// All parameters as (name, value) pairs, in the names `set_field` accepts.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut f = vec![
            ("level_min".to_string(), self.level_min.to_string()),
            ("level_max".to_string(), self.level_max.to_string()),
            ("transition_time".to_string(), self.transition_time.to_string()),
            ("on_fraction".to_string(), self.on_fraction.to_string()),
            ("off_fraction".to_string(), self.off_fraction.to_string()),
            ("smooth".to_string(), self.smooth.to_string()),
            ("curve_kind".to_string(), self.curve_kind.to_string()),
            ("power_gamma".to_string(), self.power_gamma.to_string()),
            ("power_scale".to_string(), self.power_scale.to_string()),
            ("poly_a0".to_string(), self.poly[0].to_string()),
            ("poly_a1".to_string(), self.poly[1].to_string()),
            ("poly_a2".to_string(), self.poly[2].to_string()),
            ("log_base".to_string(), self.log_base.to_string()),
            ("fade_mode".to_string(), self.fade_mode.name().to_string()),
            (
                "dimming_command".to_string(),
                self.dimming_command.name().to_string(),
            ),
            ("scan_step".to_string(), self.scan_step.to_string()),
            ("use_calibration".to_string(), self.use_calibration.to_string()),
        ];
        let points: Vec<String> = self
            .bezier_points
            .iter()
            .map(|(x, y)| format!("{} {}", x, y))
            .collect();
        f.push(("bezier_points".to_string(), points.join(" ")));
        for (i, lamp) in self.lamps.iter().enumerate() {
            f.push((format!("lamp_{}", i + 1), lamp.address.to_string()));
            f.push((format!("offset_{}", i + 1), lamp.offset.to_string()));
        }
        f
    }

    /// Store the results of a calibration run.
    pub fn apply_calibration(&mut self, report: &CalibrationReport) {
        self.inverse_lut = Some(report.lut.clone());
        let (gamma, scale) = report.power.inverse_curve();
        self.power_gamma = gamma;
        self.power_scale = scale;
        self.poly = report.inverse_quadratic.a;
    }
}
