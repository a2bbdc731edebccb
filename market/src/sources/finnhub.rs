use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{PriceSource, SourceError, http_client};
use crate::types::Quote;

pub const FINNHUB_SOURCE_ID: &str = "finnhub";
pub const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

/// `GET /quote` payload. Only `c` is required; the rest are informational.
#[derive(Debug, Deserialize)]
pub struct FinnhubQuote {
    /// Current price.
    pub c: f64,
    pub v: Option<f64>,
    pub o: Option<f64>,
    pub h: Option<f64>,
    pub l: Option<f64>,
    /// Previous close.
    pub pc: Option<f64>,
}

impl FinnhubQuote {
    /// Finnhub does not report a trade timestamp we can rely on, so the
    /// receipt time stands in for market time.
    pub fn into_quote(self, code: &str, received_at: DateTime<Utc>) -> Result<Quote, SourceError> {
        // An unknown symbol comes back as all zeros rather than an error status.
        if self.c <= 0.0 {
            return Err(SourceError::Api {
                source_id: FINNHUB_SOURCE_ID,
                message: format!("no quote for {code}"),
            });
        }

        Ok(Quote {
            code: code.to_string(),
            price: self.c,
            volume: self.v,
            market_time: received_at,
            source: FINNHUB_SOURCE_ID.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct FinnhubClient {
    http: Client,
    url: String,
    api_key: String,
}

impl FinnhubClient {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client(timeout)?,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl PriceSource for FinnhubClient {
    fn id(&self) -> &'static str {
        FINNHUB_SOURCE_ID
    }

    #[instrument(skip(self), fields(source = FINNHUB_SOURCE_ID), level = "debug")]
    async fn fetch_quote(&self, code: &str) -> Result<Quote, SourceError> {
        let url = format!("{}/quote", self.url);

        let resp = self
            .http
            .get(&url)
            .query(&[("symbol", code), ("token", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;

        let raw: FinnhubQuote = resp.json().await?;
        let quote = raw.into_quote(code, Utc::now())?;

        debug!(price = quote.price, "finnhub quote fetched");

        Ok(quote)
    }
}
