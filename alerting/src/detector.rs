use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use common::logger::warn_if_slow;
use market::{Instrument, InstrumentId};
use storage::{AlertState, AlertStateStore, Direction, PriceHistoryStore, Track};
use tracing::{debug, info, instrument};

use crate::decision::{AlertDecision, Triggers, Window, WindowChanges};

/// `(current - past) / past`, or 0.0 when there is no past price or it is zero.
pub fn fractional_change(current: f64, past: Option<f64>) -> f64 {
    match past {
        Some(p) if p != 0.0 => (current - p) / p,
        _ => 0.0,
    }
}

/// Direction in which `track` fires for `change`, if any.
fn track_trigger(track: &Track, change: f64, threshold: f64) -> Option<Direction> {
    if change >= track.escalated_threshold(Direction::Up, threshold) {
        Some(Direction::Up)
    } else if change < 0.0 && change.abs() >= track.escalated_threshold(Direction::Down, threshold)
    {
        Some(Direction::Down)
    } else {
        None
    }
}

/// Applies one evaluation to `state`: decay, trigger checks, counter updates.
///
/// Counters of a track that did not fire are left as they are; only decay
/// clears them.
pub fn assess(
    state: &mut AlertState,
    changes: &WindowChanges,
    threshold: f64,
    now: DateTime<Utc>,
) -> Triggers {
    if state.medium.decay(now, Window::Medium.duration()) {
        debug!("medium track decayed");
    }
    if state.long.decay(now, Window::Long.duration()) {
        debug!("long track decayed");
    }

    let triggers = Triggers {
        short: changes.short.abs() >= threshold,
        medium: track_trigger(&state.medium, changes.medium, threshold),
        long: track_trigger(&state.long, changes.long, threshold),
    };

    if let Some(direction) = triggers.medium {
        state.medium.record(direction, now);
    }
    if let Some(direction) = triggers.long {
        state.long.record(direction, now);
    }

    triggers
}

/// Evaluates instruments one at a time against their stored history and
/// adaptive alert state.
pub struct VolatilityDetector {
    history: Arc<dyn PriceHistoryStore>,
    states: Arc<dyn AlertStateStore>,
}

impl VolatilityDetector {
    pub fn new(history: Arc<dyn PriceHistoryStore>, states: Arc<dyn AlertStateStore>) -> Self {
        Self { history, states }
    }

    /// Runs one evaluation for `instrument` at `current_price`.
    ///
    /// The alert state is saved on every successful call, fired or not, so
    /// decay resets are persisted too. A store failure aborts the evaluation
    /// before anything but the lazily created state row is written.
    #[instrument(
        skip(self, instrument),
        fields(instrument = %instrument.code),
        level = "debug"
    )]
    pub async fn evaluate(
        &self,
        instrument: &Instrument,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<AlertDecision>> {
        let changes = self
            .window_changes(instrument.id, current_price, now)
            .await
            .context("price history lookup failed")?;

        let threshold = instrument.effective_threshold();

        let mut state = self
            .states
            .get_or_create(instrument.id)
            .await
            .context("failed to load alert state")?;

        let triggers = assess(&mut state, &changes, threshold, now);

        warn_if_slow("alert_state_save", StdDuration::from_millis(50), async {
            self.states.save(&state).await
        })
        .await
        .context("failed to persist alert state")?;

        debug!(
            change_5m = changes.short,
            change_30m = changes.medium,
            change_2h = changes.long,
            n1 = state.medium.up,
            n2 = state.medium.down,
            m1 = state.long.up,
            m2 = state.long.down,
            "instrument evaluated"
        );

        if !triggers.any() {
            return Ok(None);
        }

        let decision = AlertDecision::new(instrument, threshold, changes, triggers);

        info!(
            threshold,
            triggered_5m = decision.triggered_5m,
            triggered_30m = decision.triggered_30m,
            triggered_2h = decision.triggered_2h,
            direction = %decision.direction,
            "volatility alert raised"
        );

        Ok(Some(decision))
    }

    async fn window_changes(
        &self,
        instrument_id: InstrumentId,
        current_price: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<WindowChanges> {
        let short = self.price_back(instrument_id, now, Window::Short).await?;
        let medium = self.price_back(instrument_id, now, Window::Medium).await?;
        let long = self.price_back(instrument_id, now, Window::Long).await?;

        Ok(WindowChanges {
            short: fractional_change(current_price, short),
            medium: fractional_change(current_price, medium),
            long: fractional_change(current_price, long),
        })
    }

    async fn price_back(
        &self,
        instrument_id: InstrumentId,
        now: DateTime<Utc>,
        window: Window,
    ) -> anyhow::Result<Option<f64>> {
        warn_if_slow("price_at_or_before", StdDuration::from_millis(50), async {
            self.history
                .price_at_or_before(instrument_id, now - window.duration())
                .await
        })
        .await
        .with_context(|| format!("{} lookup", window.label()))
    }
}
