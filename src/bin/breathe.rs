use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{debug, error, info, warn};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use fade::base::address::LampAddress;
use fade::config_store::{load_or_default, ConfigStore, JsonFileStore};
use fade::console::{self, ConsoleCommand};
use fade::drivers::driver::{OpenError, SyncDriver};
use fade::light_control::config::LampConfig;
use fade::light_control::controller::FadeController;
use fade_tools as fade;

/// Parse `ADDRESS[@OFFSET]`
fn parse_lamp(arg: &str) -> Result<LampConfig, String> {
    let (addr, offset) = match arg.split_once('@') {
        Some((a, o)) => (a, o.trim().parse::<f64>().map_err(|e| e.to_string())?),
        None => (arg, 0.0),
    };
    let address: LampAddress = addr.trim().parse().map_err(|e| format!("{}", e))?;
    if !offset.is_finite() {
        return Err("Offset must be finite".to_string());
    }
    Ok(LampConfig {
        address,
        offset: offset.rem_euclid(1.0),
    })
}

#[derive(Parser, Debug)]
/// Run breathing fades on a set of lamps
struct CmdArgs {
    /// Select lamp driver
    #[arg(short = 'd', long, default_value = "SIM")]
    device: String,
    /// Light configuration file
    #[arg(short = 'c', long, default_value = "light_config.json")]
    config: String,
    /// Lamp to drive, replaces the configured lamps. ADDRESS[@OFFSET]
    #[arg(short = 'l', long = "lamp", value_parser = parse_lamp)]
    lamps: Vec<LampConfig>,
    /// Start with the fades paused
    #[arg(long)]
    paused: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    if let Err(e) = fade::drivers::init() {
        error!("Failed to initialize lamp drivers: {}", e);
    }
    let args = CmdArgs::parse();

    let driver = match fade::drivers::open(&args.device) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to open lamp driver: {}", e);
            if let OpenError::NotFound = e {
                info!("Available drivers:");
                for (name, description) in fade::drivers::driver_descriptions() {
                    info!("  {}: {}", name, description);
                }
            }
            return ExitCode::FAILURE;
        }
    };
    let sensor = driver.light_sensor();
    if sensor.is_none() {
        warn!("Driver has no light sensor, calibration is not available");
    }
    let driver: SyncDriver = Arc::new(Mutex::new(driver));

    let store = JsonFileStore::new(&args.config);
    let mut config = load_or_default(&store);
    if !args.lamps.is_empty() {
        config.lamps = args.lamps;
    }
    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    let store: Box<dyn ConfigStore> = Box::new(store);
    let mut ctrl = FadeController::new(driver, store, config);
    ctrl.set_sensor(sensor);
    if args.paused {
        ctrl.pause();
    }
    ctrl.start().await;

    let mut stdout = io::stdout();
    let mut lines = LinesStream::new(BufReader::new(io::stdin()).lines());
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to read input: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        let reply = match line.parse::<ConsoleCommand>() {
            Ok(cmd) => {
                debug!("Command: {:?}", cmd);
                console::execute(&mut ctrl, cmd).await
            }
            Err(e) => format!("ERROR {}", e),
        };
        if let Err(e) = stdout.write_all(format!("{}\n", reply).as_bytes()).await {
            error!("Failed to write reply: {}", e);
            break;
        }
        let _ = stdout.flush().await;
    }
    ctrl.stop().await;
    debug!("main done");
    ExitCode::SUCCESS
}
