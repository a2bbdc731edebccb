use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{PriceSource, SourceError, http_client};
use crate::types::Quote;

pub const METALS_SOURCE_ID: &str = "metals-api";
pub const METALS_BASE_URL: &str = "https://metals-api.com/api";

/// `GET /latest?base=USD` payload. Rates are quoted as metal per USD
/// (gold at 0.0005 means 2000 USD/oz).
#[derive(Debug, Deserialize)]
pub struct LatestRates {
    pub success: bool,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub rates: HashMap<String, f64>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl LatestRates {
    pub fn into_quote(self, code: &str) -> Result<Quote, SourceError> {
        if !self.success {
            let message = self
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(SourceError::Api {
                source_id: METALS_SOURCE_ID,
                message,
            });
        }

        let rate = match self.rates.get(code) {
            Some(r) if *r > 0.0 => *r,
            _ => return Err(SourceError::MissingRate(code.to_string())),
        };

        let ts = self.timestamp.ok_or_else(|| SourceError::Parse {
            field: "timestamp",
            value: "null".to_string(),
        })?;
        let market_time = DateTime::from_timestamp(ts, 0).ok_or_else(|| SourceError::Parse {
            field: "timestamp",
            value: ts.to_string(),
        })?;

        Ok(Quote {
            code: code.to_string(),
            price: 1.0 / rate,
            volume: None,
            market_time,
            source: METALS_SOURCE_ID.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct MetalsApiClient {
    http: Client,
    url: String,
    api_key: String,
}

impl MetalsApiClient {
    pub fn new(url: String, api_key: String, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            http: http_client(timeout)?,
            url,
            api_key,
        })
    }
}

#[async_trait]
impl PriceSource for MetalsApiClient {
    fn id(&self) -> &'static str {
        METALS_SOURCE_ID
    }

    #[instrument(skip(self), fields(source = METALS_SOURCE_ID), level = "debug")]
    async fn fetch_quote(&self, code: &str) -> Result<Quote, SourceError> {
        let url = format!("{}/latest", self.url);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("access_key", self.api_key.as_str()),
                ("base", "USD"),
                ("symbols", code),
            ])
            .send()
            .await?
            .error_for_status()?;

        let rates: LatestRates = resp.json().await?;
        let quote = rates.into_quote(code)?;

        debug!(price = quote.price, "metals-api rate fetched");

        Ok(quote)
    }
}
