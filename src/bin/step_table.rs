use std::process::ExitCode;

use clap::Parser;
use log::error;

use fade::config_store::{load_or_default, JsonFileStore};
use fade::light_control::strategy::FadePlan;
use fade_tools as fade;

#[derive(Parser, Debug)]
/// Print the step table for a light configuration
struct CmdArgs {
    /// Light configuration file
    #[arg(short = 'c', long, default_value = "light_config.json")]
    config: String,
    /// Override the scan step (seconds)
    #[arg(short = 's', long)]
    scan_step: Option<f64>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let args = CmdArgs::parse();
    let mut config = load_or_default(&JsonFileStore::new(&args.config));
    if let Some(step) = args.scan_step {
        config.scan_step = step;
    }
    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    let plan = FadePlan::new(&config);
    let table = plan.table();
    for (i, s) in table.steps().iter().enumerate() {
        println!("{:4} {:8.3} {:3} {:6.3}", i, s.time, s.level, table.duration(i));
    }
    println!(
        "{} steps, period {:.3} s{}",
        table.len(),
        table.period(),
        if table.is_truncated() { ", truncated" } else { "" }
    );
    ExitCode::SUCCESS
}
