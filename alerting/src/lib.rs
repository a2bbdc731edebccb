//! Volatility detection and alert delivery.
//!
//! For each evaluated instrument the detector:
//!   1. Looks up prices 5 minutes, 30 minutes and 2 hours back.
//!   2. Decays escalation streaks whose window has lapsed.
//!   3. Compares each window's change with its (escalated) threshold.
//!   4. Persists the updated alert state and returns a decision if anything fired.
//!
//! Decisions collected over a scan cycle are handed to the dispatcher once.

pub mod channel;
pub mod decision;
pub mod detector;
pub mod dispatcher;

pub use channel::{CommandChannel, ConsoleChannel, DeliveryChannel, WebhookChannel};
pub use decision::{AlertDecision, Triggers, Window, WindowChanges};
pub use detector::{VolatilityDetector, assess, fractional_change};
pub use dispatcher::AlertDispatcher;
pub use storage::Direction;
