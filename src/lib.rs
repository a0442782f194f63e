pub mod config;
pub mod constants;
pub mod ctx;
pub mod download;
pub mod env_state;
pub mod isis;
pub mod pds;
pub mod planetary;
pub mod planetary_errors;
pub mod pool;
pub mod spice;
pub mod time;
pub mod utils;
