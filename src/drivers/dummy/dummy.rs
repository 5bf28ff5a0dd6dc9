use crate::base::address::LampAddress;
use crate::drivers;
use crate::error::DynFuture;
use drivers::driver::{DriverInfo, LevelCommand, LevelDriver, OpenError, SendResult};
use log::info;
use std::collections::HashMap;
use std::time::Duration;

/// Accepts every command after a short delay and logs it.
pub struct DummyDriver;

impl LevelDriver for DummyDriver {
    fn send_command(
        &mut self,
        target: &LampAddress,
        cmd: LevelCommand,
    ) -> DynFuture<'_, SendResult> {
        let target = *target;
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(9)).await;
            info!("{}: {}", target, cmd);
            SendResult::Ok
        })
    }
}

fn driver_open(_params: HashMap<String, String>) -> Result<Box<dyn LevelDriver>, OpenError> {
    Ok(Box::new(DummyDriver))
}

pub fn driver_info() -> DriverInfo {
    DriverInfo {
        name: "DUMMY".to_string(),
        description: "Dummy driver. Logs commands, no lamps.".to_string(),
        open: driver_open,
    }
}
