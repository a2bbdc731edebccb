use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use market::{Instrument, InstrumentId, NewInstrument};
use parking_lot::Mutex;

use super::{AlertStateStore, InstrumentRegistry, PriceHistoryStore};
use crate::model::{AlertState, PriceObservation};

#[derive(Default)]
struct Inner {
    instruments: Vec<Instrument>,
    observations: HashMap<InstrumentId, Vec<PriceObservation>>,
    states: HashMap<InstrumentId, AlertState>,
    next_observation_id: i64,
}

/// Process-local implementation of every store contract.
///
/// Same semantics as the SQLite store, minus durability.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads an instrument's state without creating it.
    pub fn peek_state(&self, instrument_id: InstrumentId) -> Option<AlertState> {
        self.inner.lock().states.get(&instrument_id).cloned()
    }
}

#[async_trait]
impl InstrumentRegistry for InMemoryStore {
    async fn active_instruments(&self) -> anyhow::Result<Vec<Instrument>> {
        Ok(self
            .inner
            .lock()
            .instruments
            .iter()
            .filter(|i| i.active)
            .cloned()
            .collect())
    }

    async fn all_instruments(&self) -> anyhow::Result<Vec<Instrument>> {
        Ok(self.inner.lock().instruments.clone())
    }

    async fn find_by_code(&self, code: &str) -> anyhow::Result<Option<Instrument>> {
        Ok(self
            .inner
            .lock()
            .instruments
            .iter()
            .find(|i| i.code == code)
            .cloned())
    }

    async fn upsert_instrument(&self, new: &NewInstrument) -> anyhow::Result<InstrumentId> {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.instruments.iter_mut().find(|i| i.code == new.code) {
            existing.name = new.name.clone();
            existing.category = new.category;
            existing.source = new.source.clone();
            existing.alert_threshold = new.alert_threshold;
            existing.active = new.active;
            return Ok(existing.id);
        }

        let id = inner.instruments.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        inner.instruments.push(Instrument {
            id,
            code: new.code.clone(),
            name: new.name.clone(),
            category: new.category,
            source: new.source.clone(),
            alert_threshold: new.alert_threshold,
            active: new.active,
        });

        Ok(id)
    }
}

#[async_trait]
impl PriceHistoryStore for InMemoryStore {
    async fn append(&self, observation: &PriceObservation) -> anyhow::Result<i64> {
        let mut inner = self.inner.lock();
        inner.next_observation_id += 1;
        let id = inner.next_observation_id;

        inner
            .observations
            .entry(observation.instrument_id)
            .or_default()
            .push(observation.clone());

        Ok(id)
    }

    async fn price_at_or_before(
        &self,
        instrument_id: InstrumentId,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<f64>> {
        let inner = self.inner.lock();

        // max_by_key keeps the last of equal keys, matching insertion order as tiebreak
        Ok(inner.observations.get(&instrument_id).and_then(|obs| {
            obs.iter()
                .filter(|o| o.market_time <= at)
                .max_by_key(|o| o.market_time)
                .map(|o| o.price)
        }))
    }

    async fn latest_price(&self, instrument_id: InstrumentId) -> anyhow::Result<Option<f64>> {
        let inner = self.inner.lock();

        Ok(inner
            .observations
            .get(&instrument_id)
            .and_then(|obs| obs.iter().max_by_key(|o| o.market_time).map(|o| o.price)))
    }

    async fn recent(
        &self,
        instrument_id: InstrumentId,
        limit: usize,
    ) -> anyhow::Result<Vec<PriceObservation>> {
        let inner = self.inner.lock();

        let mut obs = inner
            .observations
            .get(&instrument_id)
            .cloned()
            .unwrap_or_default();
        // stable sort, then reverse: newest first, later inserts first on ties
        obs.sort_by_key(|o| o.market_time);
        obs.reverse();
        obs.truncate(limit);

        Ok(obs)
    }
}

#[async_trait]
impl AlertStateStore for InMemoryStore {
    async fn get_or_create(&self, instrument_id: InstrumentId) -> anyhow::Result<AlertState> {
        Ok(self
            .inner
            .lock()
            .states
            .entry(instrument_id)
            .or_insert_with(|| AlertState::new(instrument_id))
            .clone())
    }

    async fn save(&self, state: &AlertState) -> anyhow::Result<()> {
        self.inner
            .lock()
            .states
            .insert(state.instrument_id, state.clone());
        Ok(())
    }
}
