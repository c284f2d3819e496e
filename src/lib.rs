pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use domain::*;
pub use storage::Repository;
