//! Line based operator commands.

use crate::light_control::controller::FadeController;
use std::error::Error;
use std::fmt;
use std::fmt::Write;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Get,
    Set { name: String, values: Vec<String> },
    StartCalibration,
    Save,
    Reset,
    Reload,
    Pause,
    Resume,
    Steps,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleError {
    Empty,
    UnknownCommand(String),
    MissingArgument(&'static str),
}

impl Error for ConsoleError {}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Empty => write!(f, "Empty command"),
            ConsoleError::UnknownCommand(c) => write!(f, "Unknown command: {}", c),
            ConsoleError::MissingArgument(a) => write!(f, "Missing argument: {}", a),
        }
    }
}

const HELP: &str = "\
get                      Show all parameters
set <param> <value...>   Set a parameter and restart the fades
start_calibration        Measure the first lamp and update the curve
save_light_config        Store the current configuration
reset_light_config       Go back to the default configuration
reload_light_config      Load the stored configuration
pause                    Pause all fades
resume                   Resume all fades
steps                    Show the step table
help                     Show this text";

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return Err(ConsoleError::Empty);
        };
        Ok(match cmd {
            "get" => ConsoleCommand::Get,
            "set" => {
                let name = words.next().ok_or(ConsoleError::MissingArgument("param"))?;
                let values: Vec<String> = words.map(str::to_string).collect();
                if values.is_empty() {
                    return Err(ConsoleError::MissingArgument("value"));
                }
                ConsoleCommand::Set {
                    name: name.to_string(),
                    values,
                }
            }
            "start_calibration" => ConsoleCommand::StartCalibration,
            "save_light_config" => ConsoleCommand::Save,
            "reset_light_config" => ConsoleCommand::Reset,
            "reload_light_config" => ConsoleCommand::Reload,
            "pause" => ConsoleCommand::Pause,
            "resume" => ConsoleCommand::Resume,
            "steps" => ConsoleCommand::Steps,
            "help" | "?" => ConsoleCommand::Help,
            _ => return Err(ConsoleError::UnknownCommand(cmd.to_string())),
        })
    }
}

/// Run a command and return the text to show the operator.
pub async fn execute(ctrl: &mut FadeController, cmd: ConsoleCommand) -> String {
    match cmd {
        ConsoleCommand::Get => {
            let mut out = String::new();
            for (name, value) in ctrl.config().fields() {
                let _ = writeln!(out, "VALUE {} {}", name, value);
            }
            let _ = write!(out, "VALUE paused {}", ctrl.is_paused());
            out
        }
        ConsoleCommand::Set { name, values } => {
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            match ctrl.set_field(&name, &values).await {
                Ok(()) => "OK".to_string(),
                Err(e) => format!("ERROR {}", e),
            }
        }
        ConsoleCommand::StartCalibration => match ctrl.calibrate().await {
            Ok(report) => format!(
                "OK a={:.4} gamma={:.4} poly={:.4} {:.4} {:.4}",
                report.power.a,
                report.power.gamma,
                report.inverse_quadratic.a[0],
                report.inverse_quadratic.a[1],
                report.inverse_quadratic.a[2]
            ),
            Err(e) => format!("ERROR {}", e),
        },
        ConsoleCommand::Save => match ctrl.save() {
            Ok(()) => "OK".to_string(),
            Err(e) => format!("ERROR {}", e),
        },
        ConsoleCommand::Reset => {
            ctrl.reset().await;
            "OK".to_string()
        }
        ConsoleCommand::Reload => {
            ctrl.reload().await;
            "OK".to_string()
        }
        ConsoleCommand::Pause => {
            ctrl.pause();
            "OK".to_string()
        }
        ConsoleCommand::Resume => {
            ctrl.resume();
            "OK".to_string()
        }
        ConsoleCommand::Steps => {
            let plan = ctrl.plan();
            let table = plan.table();
            let mut out = String::new();
            for s in table.steps() {
                let _ = writeln!(out, "{:8.3} {:3}", s.time, s.level);
            }
            let _ = write!(
                out,
                "{} steps, period {:.3} s{}",
                table.len(),
                table.period(),
                if table.is_truncated() { ", truncated" } else { "" }
            );
            out
        }
        ConsoleCommand::Help => HELP.to_string(),
    }
}
