//! Store contracts used by the detector and the scan cycle.
//!
//! Implementations must make each call atomic: a failed `save` leaves the
//! previously stored row intact.

pub mod memory;
pub mod sqlite_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market::{Instrument, InstrumentId, NewInstrument};

use crate::model::{AlertState, PriceObservation};

#[async_trait]
pub trait InstrumentRegistry: Send + Sync {
    async fn active_instruments(&self) -> anyhow::Result<Vec<Instrument>>;

    async fn all_instruments(&self) -> anyhow::Result<Vec<Instrument>>;

    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Instrument>>;

    /// Inserts, or updates the instrument with the same code.
    async fn upsert_instrument(&self, instrument: &NewInstrument) -> anyhow::Result<InstrumentId>;
}

#[async_trait]
pub trait PriceHistoryStore: Send + Sync {
    /// Appends one observation and returns its id.
    async fn append(&self, observation: &PriceObservation) -> anyhow::Result<i64>;

    /// Price of the most recent observation whose market time is `<= at`.
    async fn price_at_or_before(
        &self,
        instrument_id: InstrumentId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>>;

    async fn latest_price(&self, instrument_id: InstrumentId) -> anyhow::Result<Option<f64>>;

    /// Up to `limit` observations, newest market time first.
    async fn recent(
        &self,
        instrument_id: InstrumentId,
        limit: usize,
    ) -> anyhow::Result<Vec<PriceObservation>>;
}

#[async_trait]
pub trait AlertStateStore: Send + Sync {
    /// Loads the instrument's state, persisting a zeroed row first if none exists.
    async fn get_or_create(&self, instrument_id: InstrumentId) -> anyhow::Result<AlertState>;

    /// Overwrites the row keyed by `state.instrument_id`.
    async fn save(&self, state: &AlertState) -> anyhow::Result<()>;
}
