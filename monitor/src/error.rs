use market::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("invalid configuration {key}={value:?}: {reason}")]
    Config {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("price source failure: {0}")]
    Source(#[from] SourceError),
}
