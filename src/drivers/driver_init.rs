use crate::drivers;
use crate::error::DynResult;
use drivers::driver::add_driver;
use drivers::dummy::dummy;
#[cfg(feature = "simulator")]
use drivers::simulator::simulator;

pub fn init() -> DynResult<()> {
    #[cfg(feature = "simulator")]
    add_driver(simulator::driver_info());
    add_driver(dummy::driver_info());
    Ok(())
}
