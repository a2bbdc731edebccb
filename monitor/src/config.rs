use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use market::sources::{binance::BINANCE_BASE_URL, finnhub::FINNHUB_BASE_URL, metals::METALS_BASE_URL};

use crate::error::MonitorError;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// SQLite connection string. The file is created on first use.
    pub database_url: String,

    // =========================
    // Polling
    // =========================
    /// Time between scan cycles in `run` mode.
    pub poll_interval: Duration,

    /// Upper bound for every outbound HTTP request (sources and webhook).
    pub http_timeout: Duration,

    // =========================
    // Price sources
    // =========================
    pub binance_base_url: String,
    pub finnhub_base_url: String,
    pub metals_base_url: String,

    /// Finnhub is only registered when a key is present.
    pub finnhub_api_key: Option<String>,
    /// Same for Metals-API.
    pub metals_api_key: Option<String>,

    // =========================
    // Alert delivery
    // =========================
    /// Takes precedence over `alert_command`. Console when neither is set.
    pub alert_webhook_url: Option<String>,
    pub alert_command: Option<String>,

    // =========================
    // Logging
    // =========================
    /// JSON logs when running with `APP_ENV=production`.
    pub production: bool,

    /// Directory for the daily log files. `LOG_DIR=off` keeps logs on the console only.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, MonitorError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MonitorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let string_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: string_or("DATABASE_URL", "sqlite://data/market_monitor.db"),

            poll_interval: Duration::from_secs(parse_or(
                "POLL_INTERVAL_SECS",
                get("POLL_INTERVAL_SECS"),
                300u64,
            )?),
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                10u64,
            )?),

            binance_base_url: string_or("BINANCE_BASE_URL", BINANCE_BASE_URL),
            finnhub_base_url: string_or("FINNHUB_BASE_URL", FINNHUB_BASE_URL),
            metals_base_url: string_or("METALS_API_BASE_URL", METALS_BASE_URL),

            finnhub_api_key: get("FINNHUB_API_KEY"),
            metals_api_key: get("METALS_API_KEY"),

            alert_webhook_url: get("ALERT_WEBHOOK_URL"),
            alert_command: get("ALERT_COMMAND"),

            production: get("APP_ENV").as_deref() == Some("production"),

            log_dir: match get("LOG_DIR") {
                Some(v) if v.eq_ignore_ascii_case("off") => None,
                Some(v) => Some(PathBuf::from(v)),
                None => Some(PathBuf::from("logs")),
            },
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, MonitorError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };

    let value = raw.parse::<T>().map_err(|e| MonitorError::Config {
        key,
        value: raw.clone(),
        reason: e.to_string(),
    })?;

    if value <= T::default() {
        return Err(MonitorError::Config {
            key,
            value: raw,
            reason: "must be greater than zero".into(),
        });
    }

    Ok(value)
}
