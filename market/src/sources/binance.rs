use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{PriceSource, SourceError, http_client, parse_f64};
use crate::types::Quote;

pub const BINANCE_SOURCE_ID: &str = "binance";
pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Subset of `GET /api/v3/ticker/24hr`. Binance sends decimals as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: String,
    pub volume: String,
    /// Close of the rolling 24h window, Unix ms.
    pub close_time: i64,
}

impl Ticker24h {
    pub fn into_quote(self) -> Result<Quote, SourceError> {
        let price = parse_f64("lastPrice", &self.last_price)?;
        let volume = parse_f64("volume", &self.volume)?;
        let market_time =
            DateTime::from_timestamp_millis(self.close_time).ok_or_else(|| SourceError::Parse {
                field: "closeTime",
                value: self.close_time.to_string(),
            })?;

        Ok(Quote {
            code: self.symbol,
            price,
            volume: Some(volume),
            market_time,
            source: BINANCE_SOURCE_ID.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    url: String,
}

impl BinanceClient {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client(timeout)?,
            url,
        })
    }
}

#[async_trait]
impl PriceSource for BinanceClient {
    fn id(&self) -> &'static str {
        BINANCE_SOURCE_ID
    }

    #[instrument(skip(self), fields(source = BINANCE_SOURCE_ID), level = "debug")]
    async fn fetch_quote(&self, code: &str) -> Result<Quote, SourceError> {
        let url = format!("{}/api/v3/ticker/24hr", self.url);

        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", code)])
            .send()
            .await?
            .error_for_status()?;

        let ticker: Ticker24h = resp.json().await?;
        let quote = ticker.into_quote()?;

        debug!(price = quote.price, market_time = %quote.market_time, "binance ticker fetched");

        Ok(quote)
    }
}
