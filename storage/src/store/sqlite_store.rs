//! SqliteStore
//! -----------
//! SQLite-backed implementation of every store contract. Timestamps are
//! stored as Unix milliseconds.
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market::{Instrument, InstrumentCategory, InstrumentId, NewInstrument};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument, warn};

use super::{AlertStateStore, InstrumentRegistry, PriceHistoryStore};
use crate::model::{AlertState, Direction, PriceObservation, Track};

const INSTRUMENT_COLUMNS: &str =
    "instrument_id, code, name, category, source, alert_threshold, active";

const STATE_COLUMNS: &str = r#"
  instrument_id,
  medium_up, medium_down, medium_last_trigger_ms, medium_last_direction,
  long_up, long_down, long_last_trigger_ms, long_last_direction"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reads an instrument's state without creating it.
    pub async fn peek_state(&self, instrument_id: InstrumentId) -> anyhow::Result<Option<AlertState>> {
        let row = sqlx::query(&format!(
            "SELECT {STATE_COLUMNS} FROM alert_states WHERE instrument_id = ?;"
        ))
        .bind(instrument_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_state).transpose()
    }

    async fn fetch_instruments(&self, only_active: bool) -> anyhow::Result<Vec<Instrument>> {
        let filter = if only_active { "WHERE active = 1" } else { "" };
        let rows = sqlx::query(&format!(
            "SELECT {INSTRUMENT_COLUMNS} FROM instruments {filter} ORDER BY instrument_id;"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_instrument(&r) {
                Ok(i) => out.push(i),
                Err(e) => {
                    // one bad row must not hide the rest of the registry
                    warn!(error = %e, "skipping malformed instrument row");
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl InstrumentRegistry for SqliteStore {
    async fn active_instruments(&self) -> anyhow::Result<Vec<Instrument>> {
        self.fetch_instruments(true).await
    }

    async fn all_instruments(&self) -> anyhow::Result<Vec<Instrument>> {
        self.fetch_instruments(false).await
    }

    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Instrument>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTRUMENT_COLUMNS} FROM instruments WHERE code = ?;"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_instrument).transpose()
    }

    #[instrument(skip(self, instrument), fields(code = %instrument.code))]
    async fn upsert_instrument(&self, instrument: &NewInstrument) -> anyhow::Result<InstrumentId> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
INSERT INTO instruments (code, name, category, source, alert_threshold, active, created_ms)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(code) DO UPDATE SET
  name = excluded.name,
  category = excluded.category,
  source = excluded.source,
  alert_threshold = excluded.alert_threshold,
  active = excluded.active
RETURNING instrument_id;
"#,
        )
        .bind(&instrument.code)
        .bind(&instrument.name)
        .bind(instrument.category.to_string())
        .bind(&instrument.source)
        .bind(instrument.alert_threshold)
        .bind(instrument.active)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl PriceHistoryStore for SqliteStore {
    #[instrument(skip(self, observation), fields(instrument_id = observation.instrument_id), level = "debug")]
    async fn append(&self, observation: &PriceObservation) -> anyhow::Result<i64> {
        let id = sqlx::query(
            r#"
INSERT INTO price_observations (instrument_id, market_time_ms, local_time_ms, price, volume, source)
VALUES (?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(observation.instrument_id)
        .bind(observation.market_time.timestamp_millis())
        .bind(observation.local_time.timestamp_millis())
        .bind(observation.price)
        .bind(observation.volume)
        .bind(&observation.source)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(id)
    }

    async fn price_at_or_before(
        &self,
        instrument_id: InstrumentId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>> {
        let price = sqlx::query_scalar::<_, f64>(
            r#"
SELECT price FROM price_observations
WHERE instrument_id = ? AND market_time_ms <= ?
ORDER BY market_time_ms DESC, observation_id DESC
LIMIT 1;
"#,
        )
        .bind(instrument_id)
        .bind(at.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(price)
    }

    async fn latest_price(&self, instrument_id: InstrumentId) -> anyhow::Result<Option<f64>> {
        let price = sqlx::query_scalar::<_, f64>(
            r#"
SELECT price FROM price_observations
WHERE instrument_id = ?
ORDER BY market_time_ms DESC, observation_id DESC
LIMIT 1;
"#,
        )
        .bind(instrument_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(price)
    }

    async fn recent(
        &self,
        instrument_id: InstrumentId,
        limit: usize,
    ) -> anyhow::Result<Vec<PriceObservation>> {
        let limit = i64::try_from(limit).context("history limit out of range")?;
        let rows = sqlx::query(
            r#"
SELECT instrument_id, market_time_ms, local_time_ms, price, volume, source
FROM price_observations
WHERE instrument_id = ?
ORDER BY market_time_ms DESC, observation_id DESC
LIMIT ?;
"#,
        )
        .bind(instrument_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_observation).collect()
    }
}

#[async_trait]
impl AlertStateStore for SqliteStore {
    #[instrument(skip(self), level = "debug")]
    async fn get_or_create(&self, instrument_id: InstrumentId) -> anyhow::Result<AlertState> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            r#"
INSERT OR IGNORE INTO alert_states (instrument_id, medium_up, medium_down, long_up, long_down, updated_ms)
VALUES (?, 0, 0, 0, 0, ?);
"#,
        )
        .bind(instrument_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?
        .rows_affected()
        == 1;

        let row = sqlx::query(&format!(
            "SELECT {STATE_COLUMNS} FROM alert_states WHERE instrument_id = ?;"
        ))
        .bind(instrument_id)
        .fetch_one(&mut *tx)
        .await?;

        let state = row_to_state(&row)?;
        tx.commit().await?;

        if created {
            debug!("alert state created");
        }

        Ok(state)
    }

    #[instrument(skip(self, state), fields(instrument_id = state.instrument_id), level = "debug")]
    async fn save(&self, state: &AlertState) -> anyhow::Result<()> {
        sqlx::query(
            r#"
INSERT INTO alert_states (
  instrument_id,
  medium_up, medium_down, medium_last_trigger_ms, medium_last_direction,
  long_up, long_down, long_last_trigger_ms, long_last_direction,
  updated_ms
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(instrument_id) DO UPDATE SET
  medium_up = excluded.medium_up,
  medium_down = excluded.medium_down,
  medium_last_trigger_ms = excluded.medium_last_trigger_ms,
  medium_last_direction = excluded.medium_last_direction,
  long_up = excluded.long_up,
  long_down = excluded.long_down,
  long_last_trigger_ms = excluded.long_last_trigger_ms,
  long_last_direction = excluded.long_last_direction,
  updated_ms = excluded.updated_ms;
"#,
        )
        .bind(state.instrument_id)
        .bind(i64::from(state.medium.up))
        .bind(i64::from(state.medium.down))
        .bind(state.medium.last_trigger_at.map(|t| t.timestamp_millis()))
        .bind(state.medium.last_direction.map(|d| d.to_string()))
        .bind(i64::from(state.long.up))
        .bind(i64::from(state.long.down))
        .bind(state.long.last_trigger_at.map(|t| t.timestamp_millis()))
        .bind(state.long.last_direction.map(|d| d.to_string()))
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_instrument(r: &SqliteRow) -> anyhow::Result<Instrument> {
    let category: String = r.try_get("category")?;
    let active: i64 = r.try_get("active")?;

    Ok(Instrument {
        id: r.try_get("instrument_id")?,
        code: r.try_get("code")?,
        name: r.try_get("name")?,
        category: category
            .parse::<InstrumentCategory>()
            .map_err(|e| anyhow!(e))?,
        source: r.try_get("source")?,
        alert_threshold: r.try_get("alert_threshold")?,
        active: active == 1,
    })
}

fn row_to_observation(r: &SqliteRow) -> anyhow::Result<PriceObservation> {
    Ok(PriceObservation {
        instrument_id: r.try_get("instrument_id")?,
        market_time: ms_to_utc(r.try_get("market_time_ms")?)?,
        local_time: ms_to_utc(r.try_get("local_time_ms")?)?,
        price: r.try_get("price")?,
        volume: r.try_get("volume")?,
        source: r.try_get("source")?,
    })
}

fn row_to_state(r: &SqliteRow) -> anyhow::Result<AlertState> {
    Ok(AlertState {
        instrument_id: r.try_get("instrument_id")?,
        medium: row_to_track(r, "medium")?,
        long: row_to_track(r, "long")?,
    })
}

fn row_to_track(r: &SqliteRow, prefix: &str) -> anyhow::Result<Track> {
    let up: i64 = r.try_get(format!("{prefix}_up").as_str())?;
    let down: i64 = r.try_get(format!("{prefix}_down").as_str())?;
    let last_ms: Option<i64> = r.try_get(format!("{prefix}_last_trigger_ms").as_str())?;
    let last_dir: Option<String> = r.try_get(format!("{prefix}_last_direction").as_str())?;

    Ok(Track {
        up: i64_to_u32(up)?,
        down: i64_to_u32(down)?,
        last_trigger_at: last_ms.map(ms_to_utc).transpose()?,
        last_direction: last_dir.map(|d| d.parse::<Direction>()).transpose()?,
    })
}

/* =========================
Numeric safety helpers
========================= */

fn ms_to_utc(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

fn i64_to_u32(v: i64) -> anyhow::Result<u32> {
    u32::try_from(v).map_err(|_| anyhow!("out of range for u32: {v}"))
}
