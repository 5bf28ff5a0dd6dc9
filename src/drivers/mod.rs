pub mod driver;
pub mod driver_init;
pub use driver::driver_descriptions;
pub use driver::open;
pub use driver_init::init;

pub mod driver_utils;

pub mod dummy {
    pub mod dummy;
}

#[cfg(feature = "simulator")]
pub mod simulator {
    pub mod lamp;
    pub mod simulator;
    #[cfg(test)]
    mod test;
}
