use chrono::Utc;
use market::{InstrumentCategory, NewInstrument};
use sqlx::SqlitePool;

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Instruments
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS instruments (
  instrument_id INTEGER PRIMARY KEY AUTOINCREMENT,
  code TEXT NOT NULL UNIQUE,
  name TEXT NOT NULL,
  category TEXT NOT NULL,
  source TEXT NOT NULL,
  alert_threshold REAL,
  active INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0,1)),
  created_ms INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Price history
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS price_observations (
  observation_id INTEGER PRIMARY KEY AUTOINCREMENT,
  instrument_id INTEGER NOT NULL REFERENCES instruments(instrument_id),
  market_time_ms INTEGER NOT NULL,
  local_time_ms INTEGER NOT NULL,
  price REAL NOT NULL,
  volume REAL,
  source TEXT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Alert state, one row per instrument
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS alert_states (
  instrument_id INTEGER PRIMARY KEY REFERENCES instruments(instrument_id),
  medium_up INTEGER NOT NULL DEFAULT 0,
  medium_down INTEGER NOT NULL DEFAULT 0,
  medium_last_trigger_ms INTEGER,
  medium_last_direction TEXT CHECK (medium_last_direction IN ('up','down')),
  long_up INTEGER NOT NULL DEFAULT 0,
  long_down INTEGER NOT NULL DEFAULT 0,
  long_last_trigger_ms INTEGER,
  long_last_direction TEXT CHECK (long_last_direction IN ('up','down')),
  updated_ms INTEGER NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_price_observations_instrument_time ON price_observations(instrument_id, market_time_ms);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Instruments installed on a fresh database.
///
/// Gold and silver carry no threshold and fall back to the 100% default.
pub fn default_instruments() -> Vec<NewInstrument> {
    use InstrumentCategory::*;

    vec![
        NewInstrument::new("BTCUSDT", "Bitcoin", Crypto, "binance", Some(0.02)),
        NewInstrument::new("ETHUSDT", "Ethereum", Crypto, "binance", Some(0.02)),
        NewInstrument::new("GLD", "Gold ETF", Commodity, "finnhub", None),
        NewInstrument::new("SLV", "Silver ETF", Commodity, "finnhub", None),
        NewInstrument::new("USO", "Crude Oil ETF", Commodity, "finnhub", Some(0.012)),
        NewInstrument::new("SPY", "S&P 500 ETF", Index, "finnhub", Some(0.008)),
        NewInstrument::new("DIA", "Dow Jones ETF", Index, "finnhub", Some(0.008)),
        NewInstrument::new("QQQ", "NASDAQ ETF", Index, "finnhub", Some(0.008)),
    ]
}

/// Inserts the default instruments, leaving existing codes untouched.
/// Returns how many rows were added.
pub async fn seed_defaults(pool: &SqlitePool) -> anyhow::Result<u64> {
    let now_ms = Utc::now().timestamp_millis();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for i in default_instruments() {
        inserted += sqlx::query(
            r#"
INSERT OR IGNORE INTO instruments (code, name, category, source, alert_threshold, active, created_ms)
VALUES (?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(&i.code)
        .bind(&i.name)
        .bind(i.category.to_string())
        .bind(&i.source)
        .bind(i.alert_threshold)
        .bind(i.active)
        .bind(now_ms)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}
