use std::sync::Arc;
use std::time::Instant;

use alerting::{AlertDecision, AlertDispatcher, VolatilityDetector};
use anyhow::Context;
use chrono::{DateTime, TimeDelta, Utc};
use common::logger::{TraceId, child_span, cycle_span};
use market::{Instrument, SourceRegistry};
use storage::{AlertStateStore, InstrumentRegistry, PriceHistoryStore, PriceObservation};
use tracing::{Instrument as _, error, info, warn};

use crate::error::MonitorError;

/// Outcome of one pass over the instrument registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Instruments left out because there was nothing to evaluate.
    pub skipped: usize,
    /// `"CODE: error"` per failed instrument, plus the dispatch failure if any.
    pub errors: Vec<String>,
    pub alerts: usize,
    pub delivered: bool,
}

impl CycleReport {
    fn record_failure(&mut self, code: &str, err: &anyhow::Error) {
        self.failed += 1;
        self.errors.push(format!("{code}: {err:#}"));
    }
}

/// Fetch, persist, evaluate and dispatch, one instrument at a time.
pub struct MarketScanner {
    instruments: Arc<dyn InstrumentRegistry>,
    history: Arc<dyn PriceHistoryStore>,
    sources: SourceRegistry,
    detector: VolatilityDetector,
    dispatcher: AlertDispatcher,
}

impl MarketScanner {
    pub fn new(
        instruments: Arc<dyn InstrumentRegistry>,
        history: Arc<dyn PriceHistoryStore>,
        states: Arc<dyn AlertStateStore>,
        sources: SourceRegistry,
        dispatcher: AlertDispatcher,
    ) -> Self {
        Self {
            instruments,
            detector: VolatilityDetector::new(history.clone(), states),
            history,
            sources,
            dispatcher,
        }
    }

    /// Wires every store role to one backing store.
    pub fn with_store<S>(store: Arc<S>, sources: SourceRegistry, dispatcher: AlertDispatcher) -> Self
    where
        S: InstrumentRegistry + PriceHistoryStore + AlertStateStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store, sources, dispatcher)
    }

    /// Fetches a fresh quote for every active instrument.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> anyhow::Result<CycleReport> {
        let trace_id = TraceId::default();

        async {
            let instruments = self
                .instruments
                .active_instruments()
                .await
                .context("failed to load active instruments")?;

            info!(instruments = instruments.len(), "scan cycle started");

            let report = self.fetch_and_evaluate(&instruments, now).await;

            info!(
                succeeded = report.succeeded,
                failed = report.failed,
                alerts = report.alerts,
                delivered = report.delivered,
                "scan cycle finished"
            );

            Ok::<_, anyhow::Error>(report)
        }
        .instrument(cycle_span("scan", &trace_id))
        .await
    }

    /// Same as a cycle, restricted to one instrument looked up by code.
    pub async fn fetch_single(&self, code: &str, now: DateTime<Utc>) -> anyhow::Result<CycleReport> {
        let trace_id = TraceId::default();

        async {
            tracing::Span::current().record("instrument", code);

            let instrument = self
                .instruments
                .find_by_code(code)
                .await
                .context("instrument lookup failed")?
                .ok_or_else(|| MonitorError::UnknownInstrument(code.to_string()))?;

            let report = self
                .fetch_and_evaluate(std::slice::from_ref(&instrument), now)
                .await;
            Ok::<_, anyhow::Error>(report)
        }
        .instrument(cycle_span("fetch", &trace_id))
        .await
    }

    /// Re-evaluates every active instrument against its latest stored price
    /// without calling any source. Instruments with no history are skipped.
    pub async fn scan_stored(&self, now: DateTime<Utc>) -> anyhow::Result<CycleReport> {
        let trace_id = TraceId::default();

        async {
            let instruments = self
                .instruments
                .active_instruments()
                .await
                .context("failed to load active instruments")?;

            let mut report = CycleReport {
                total: instruments.len(),
                ..CycleReport::default()
            };
            let mut decisions = Vec::new();

            for instrument in &instruments {
                let span = child_span("scan_stored", &instrument.code);
                let outcome = self.evaluate_stored(instrument, now).instrument(span).await;

                match outcome {
                    Ok(None) => report.skipped += 1,
                    Ok(Some(decision)) => {
                        report.succeeded += 1;
                        decisions.extend(decision);
                    }
                    Err(e) => {
                        warn!(instrument = %instrument.code, error = ?e, "stored scan failed");
                        report.record_failure(&instrument.code, &e);
                    }
                }
            }

            self.dispatch(decisions, now, &mut report).await;

            info!(
                succeeded = report.succeeded,
                skipped = report.skipped,
                failed = report.failed,
                alerts = report.alerts,
                "stored scan finished"
            );

            Ok::<_, anyhow::Error>(report)
        }
        .instrument(cycle_span("scan_stored", &trace_id))
        .await
    }

    async fn fetch_and_evaluate(&self, instruments: &[Instrument], now: DateTime<Utc>) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport {
            total: instruments.len(),
            ..CycleReport::default()
        };
        let mut decisions = Vec::new();

        for instrument in instruments {
            let span = child_span("fetch_and_evaluate", &instrument.code);

            match self.scan_instrument(instrument, now, started).instrument(span).await {
                Ok(decision) => {
                    report.succeeded += 1;
                    decisions.extend(decision);
                }
                Err(e) => {
                    warn!(instrument = %instrument.code, error = ?e, "instrument scan failed");
                    report.record_failure(&instrument.code, &e);
                }
            }
        }

        self.dispatch(decisions, now, &mut report).await;
        report
    }

    /// Fetches, stores and evaluates one instrument.
    ///
    /// `cycle_start` is advanced by the wall time spent so far in the cycle,
    /// and never placed before the fresh sample's market time, so the next
    /// poll's window lookups land on or after this sample.
    async fn scan_instrument(
        &self,
        instrument: &Instrument,
        cycle_start: DateTime<Utc>,
        started: Instant,
    ) -> anyhow::Result<Option<AlertDecision>> {
        let source = self.sources.get(&instrument.source)?;

        let quote = source
            .fetch_quote(&instrument.code)
            .await
            .with_context(|| format!("{} quote failed", source.id()))?;

        let received_at = cycle_start + elapsed_since(started);

        self.history
            .append(&PriceObservation {
                instrument_id: instrument.id,
                market_time: quote.market_time,
                local_time: received_at,
                price: quote.price,
                volume: quote.volume,
                source: quote.source.clone(),
            })
            .await
            .context("failed to store observation")?;

        let evaluated_at = received_at.max(quote.market_time);

        self.detector
            .evaluate(instrument, quote.price, evaluated_at)
            .await
    }

    /// `Ok(None)` when the instrument has no stored price yet.
    async fn evaluate_stored(
        &self,
        instrument: &Instrument,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Option<AlertDecision>>> {
        let Some(price) = self
            .history
            .latest_price(instrument.id)
            .await
            .context("latest price lookup failed")?
        else {
            return Ok(None);
        };

        Ok(Some(self.detector.evaluate(instrument, price, now).await?))
    }

    async fn dispatch(&self, decisions: Vec<AlertDecision>, now: DateTime<Utc>, report: &mut CycleReport) {
        report.alerts = decisions.len();

        match self.dispatcher.dispatch(&decisions, now).await {
            Ok(delivered) => report.delivered = delivered,
            Err(e) => {
                error!(error = ?e, "alert delivery failed");
                report.errors.push(format!("dispatch: {e:#}"));
            }
        }
    }
}

fn elapsed_since(started: Instant) -> TimeDelta {
    TimeDelta::from_std(started.elapsed()).unwrap_or(TimeDelta::zero())
}
