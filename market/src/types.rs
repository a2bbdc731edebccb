use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

pub type InstrumentId = i64;

/// Threshold applied when an instrument has none configured. At 100% it
/// effectively silences ordinary alerting for that instrument.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentCategory {
    Crypto,
    Commodity,
    Index,
    Equity,
}

impl fmt::Display for InstrumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstrumentCategory::Crypto => "crypto",
            InstrumentCategory::Commodity => "commodity",
            InstrumentCategory::Index => "index",
            InstrumentCategory::Equity => "equity",
        };
        f.write_str(s)
    }
}

impl FromStr for InstrumentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crypto" => Ok(InstrumentCategory::Crypto),
            "commodity" => Ok(InstrumentCategory::Commodity),
            "index" => Ok(InstrumentCategory::Index),
            "equity" => Ok(InstrumentCategory::Equity),
            other => Err(format!("invalid instrument category: {other}")),
        }
    }
}

/// A monitored symbol as configured in the instrument registry.
///
/// Read-only from the detector's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    pub id: InstrumentId,
    /// Symbol as understood by `source`, e.g. `BTCUSDT` or `SPY`.
    pub code: String,
    pub name: String,
    pub category: InstrumentCategory,
    /// Price source id (`binance`, `finnhub`, `metals-api`).
    pub source: String,
    /// Fractional move that raises an alert (0.01 = 1%). `None` means unset.
    pub alert_threshold: Option<f64>,
    pub active: bool,
}

impl Instrument {
    pub fn effective_threshold(&self) -> f64 {
        self.alert_threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD)
    }
}

/// Registry input for an instrument that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInstrument {
    pub code: String,
    pub name: String,
    pub category: InstrumentCategory,
    pub source: String,
    pub alert_threshold: Option<f64>,
    pub active: bool,
}

impl NewInstrument {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: InstrumentCategory,
        source: impl Into<String>,
        alert_threshold: Option<f64>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            category,
            source: source.into(),
            alert_threshold,
            active: true,
        }
    }
}

/// Latest price reported by a source for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub code: String,
    pub price: f64,
    pub volume: Option<f64>,
    /// Timestamp reported by the market, or receipt time when the source has none.
    pub market_time: DateTime<Utc>,
    pub source: String,
}
