//! Builds price sources and the delivery channel from configuration.

use std::sync::Arc;

use alerting::{CommandChannel, ConsoleChannel, DeliveryChannel, WebhookChannel};
use market::SourceRegistry;
use market::sources::{BinanceClient, FinnhubClient, MetalsApiClient};
use tracing::info;

use crate::config::AppConfig;
use crate::error::MonitorError;

/// Binance is always available; keyed sources only when their key is set.
pub fn build_source_registry(cfg: &AppConfig) -> Result<SourceRegistry, MonitorError> {
    let mut registry = SourceRegistry::new();

    registry.register(Arc::new(BinanceClient::new(
        cfg.binance_base_url.clone(),
        cfg.http_timeout,
    )?));

    if let Some(key) = &cfg.finnhub_api_key {
        registry.register(Arc::new(FinnhubClient::new(
            cfg.finnhub_base_url.clone(),
            key.clone(),
            cfg.http_timeout,
        )?));
    }

    if let Some(key) = &cfg.metals_api_key {
        registry.register(Arc::new(MetalsApiClient::new(
            cfg.metals_base_url.clone(),
            key.clone(),
            cfg.http_timeout,
        )?));
    }

    info!(sources = ?registry.ids(), "price sources registered");

    Ok(registry)
}

pub fn build_channel(cfg: &AppConfig) -> anyhow::Result<Arc<dyn DeliveryChannel>> {
    if let Some(url) = &cfg.alert_webhook_url {
        return Ok(Arc::new(WebhookChannel::new(url.clone(), cfg.http_timeout)?));
    }

    if let Some(channel) = cfg
        .alert_command
        .as_deref()
        .and_then(CommandChannel::from_command_line)
    {
        return Ok(Arc::new(channel));
    }

    Ok(Arc::new(ConsoleChannel))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(pairs: &[(&str, &str)]) -> AppConfig {
        AppConfig::from_lookup(|k| {
            pairs
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.to_string())
        })
        .unwrap()
    }

    #[test]
    fn keyed_sources_need_keys() {
        let registry = build_source_registry(&cfg(&[])).unwrap();
        assert_eq!(registry.ids(), vec!["binance"]);

        let registry = build_source_registry(&cfg(&[
            ("FINNHUB_API_KEY", "a"),
            ("METALS_API_KEY", "b"),
        ]))
        .unwrap();
        assert_eq!(registry.ids(), vec!["binance", "finnhub", "metals-api"]);
    }

    #[test]
    fn channel_selection_prefers_webhook_then_command() {
        assert_eq!(build_channel(&cfg(&[])).unwrap().name(), "console");
        assert_eq!(
            build_channel(&cfg(&[("ALERT_COMMAND", "notify-send")])).unwrap().name(),
            "command"
        );
        assert_eq!(
            build_channel(&cfg(&[
                ("ALERT_COMMAND", "notify-send"),
                ("ALERT_WEBHOOK_URL", "http://127.0.0.1:9/hook"),
            ]))
            .unwrap()
            .name(),
            "webhook"
        );
    }
}
