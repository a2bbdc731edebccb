use chrono::Duration;
use market::{Instrument, InstrumentId};
use storage::Direction;

/// Lookback windows. Short is checked against a fixed threshold; medium and
/// long escalate through their own tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Short,
    Medium,
    Long,
}

impl Window {
    pub fn duration(self) -> Duration {
        match self {
            Window::Short => Duration::minutes(5),
            Window::Medium => Duration::minutes(30),
            Window::Long => Duration::hours(2),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Window::Short => "5m",
            Window::Medium => "30m",
            Window::Long => "2h",
        }
    }
}

/// Fractional change over each window; 0.0 where no usable past price exists.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowChanges {
    pub short: f64,
    pub medium: f64,
    pub long: f64,
}

/// What fired during one evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Triggers {
    pub short: bool,
    pub medium: Option<Direction>,
    pub long: Option<Direction>,
}

impl Triggers {
    pub fn any(&self) -> bool {
        self.short || self.medium.is_some() || self.long.is_some()
    }
}

/// Outcome of an evaluation that fired at least one window.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub instrument_id: InstrumentId,
    pub code: String,
    pub name: String,
    /// Base threshold used, after the unset-threshold default was applied.
    pub threshold: f64,
    pub change_5m: f64,
    pub change_30m: f64,
    pub change_2h: f64,
    pub triggered_5m: bool,
    pub triggered_30m: bool,
    pub triggered_2h: bool,
    /// Sign of the 5 minute change, whichever window fired.
    pub direction: Direction,
}

impl AlertDecision {
    pub fn new(
        instrument: &Instrument,
        threshold: f64,
        changes: WindowChanges,
        triggers: Triggers,
    ) -> Self {
        Self {
            instrument_id: instrument.id,
            code: instrument.code.clone(),
            name: instrument.name.clone(),
            threshold,
            change_5m: changes.short,
            change_30m: changes.medium,
            change_2h: changes.long,
            triggered_5m: triggers.short,
            triggered_30m: triggers.medium.is_some(),
            triggered_2h: triggers.long.is_some(),
            direction: Direction::of_change(changes.short),
        }
    }
}
