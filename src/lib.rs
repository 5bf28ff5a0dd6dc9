pub mod error;

pub mod base {
    pub mod address;
}

pub mod curves {
    pub mod bezier;
    pub mod curve;
    pub mod fit;
}

pub mod calibration {
    pub mod calibrate;
    pub mod lookup;
    pub mod sensor;
}

pub mod drivers;

pub mod light_control {
    pub mod config;
    pub mod controller;
    pub mod cycle;
    pub mod scheduler;
    pub mod step_table;
    pub mod strategy;
    #[cfg(all(test, feature = "simulator"))]
    mod test;
}

pub mod config_store;
pub mod console;
