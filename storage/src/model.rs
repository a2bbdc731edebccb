use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use market::InstrumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Sign convention used throughout: zero counts as up.
    pub fn of_change(change: f64) -> Self {
        if change >= 0.0 {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "up",
            Direction::Down => "down",
        })
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(anyhow::anyhow!("invalid direction value: {}", other)),
        }
    }
}

/// Escalation bookkeeping for one lookback window.
///
/// At most one of `up` / `down` is non-zero: recording a trigger in one
/// direction clears the opposite streak.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    /// Consecutive upward triggers inside the window.
    pub up: u32,
    /// Consecutive downward triggers inside the window.
    pub down: u32,
    pub last_trigger_at: Option<DateTime<Utc>>,
    pub last_direction: Option<Direction>,
}

impl Track {
    /// Zeroes both streaks once strictly more than `window` has passed since
    /// the last trigger. The trigger timestamp itself is kept.
    ///
    /// Returns true if a non-zero streak was cleared.
    pub fn decay(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_trigger_at {
            Some(at) if now - at > window => {
                let cleared = self.up > 0 || self.down > 0;
                self.up = 0;
                self.down = 0;
                cleared
            }
            _ => false,
        }
    }

    pub fn streak(&self, direction: Direction) -> u32 {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        }
    }

    /// `(1 + streak) * base`: the move required to fire again in `direction`.
    pub fn escalated_threshold(&self, direction: Direction, base: f64) -> f64 {
        (1.0 + f64::from(self.streak(direction))) * base
    }

    pub fn record(&mut self, direction: Direction, now: DateTime<Utc>) {
        match direction {
            Direction::Up => {
                self.up = self.up.saturating_add(1);
                self.down = 0;
            }
            Direction::Down => {
                self.down = self.down.saturating_add(1);
                self.up = 0;
            }
        }
        self.last_trigger_at = Some(now);
        self.last_direction = Some(direction);
    }

    pub fn is_exclusive(&self) -> bool {
        self.up == 0 || self.down == 0
    }
}

/// Per-instrument alert bookkeeping, one row per instrument.
///
/// `medium` holds the 30 minute track (`n1`/`n2`), `long` the 2 hour track
/// (`m1`/`m2`).
#[derive(Debug, Clone, PartialEq)]
pub struct AlertState {
    pub instrument_id: InstrumentId,
    pub medium: Track,
    pub long: Track,
}

impl AlertState {
    pub fn new(instrument_id: InstrumentId) -> Self {
        Self {
            instrument_id,
            medium: Track::default(),
            long: Track::default(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.medium.is_exclusive() && self.long.is_exclusive()
    }
}

/// One stored price sample. Append-only.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub instrument_id: InstrumentId,
    /// Time reported by the market; window lookups order by this.
    pub market_time: DateTime<Utc>,
    /// Time the sample was received locally.
    pub local_time: DateTime<Utc>,
    pub price: f64,
    pub volume: Option<f64>,
    pub source: String,
}
