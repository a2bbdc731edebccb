pub mod cli;
pub mod config;
pub mod error;
pub mod poller;
pub mod scanner;
pub mod wiring;

pub use config::AppConfig;
pub use error::MonitorError;
pub use scanner::{CycleReport, MarketScanner};
