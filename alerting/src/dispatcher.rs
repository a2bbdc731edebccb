use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use storage::Direction;
use tracing::{debug, info, instrument};

use crate::channel::DeliveryChannel;
use crate::decision::AlertDecision;

/// Renders a cycle's decisions and hands them to a delivery channel.
/// Purely presentational; it never feeds back into detector state.
pub struct AlertDispatcher {
    channel: Arc<dyn DeliveryChannel>,
}

impl AlertDispatcher {
    pub fn new(channel: Arc<dyn DeliveryChannel>) -> Self {
        Self { channel }
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    /// `🔴 BTCUSDT: 5m +2.30% | 30m +5.10% | 2h +8.50%`
    ///
    /// Red marks an upward move, green a downward one.
    pub fn format_line(decision: &AlertDecision) -> String {
        let marker = match decision.direction {
            Direction::Up => "🔴",
            Direction::Down => "🟢",
        };

        format!(
            "{marker} {}: 5m {} | 30m {} | 2h {}",
            decision.code,
            percent(decision.change_5m),
            percent(decision.change_30m),
            percent(decision.change_2h),
        )
    }

    /// Header plus one line per decision, in input order. `None` when empty.
    pub fn format_summary(decisions: &[AlertDecision], now: DateTime<Utc>) -> Option<String> {
        if decisions.is_empty() {
            return None;
        }

        let header = format!(
            "📊 Market alert {}",
            now.with_timezone(&Local).format("%m-%d %H:%M")
        );

        let lines: Vec<String> = decisions.iter().map(Self::format_line).collect();

        Some(format!("{header}\n{}", lines.join("\n")))
    }

    /// Delivers the batch. Returns whether anything was sent.
    #[instrument(skip_all, fields(alerts = decisions.len(), channel = self.channel.name()))]
    pub async fn dispatch(
        &self,
        decisions: &[AlertDecision],
        now: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let Some(message) = Self::format_summary(decisions, now) else {
            debug!("no alerts this cycle; delivery skipped");
            return Ok(false);
        };

        self.channel
            .deliver(&message)
            .await
            .with_context(|| format!("{} delivery failed", self.channel.name()))?;

        info!("alert batch delivered");
        Ok(true)
    }
}

fn percent(change: f64) -> String {
    format!("{:+.2}%", change * 100.0)
}
