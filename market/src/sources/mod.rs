//! Price sources.
//!
//! Each source wraps one public HTTP API and turns its response into a
//! [`Quote`]. The scan cycle looks sources up by the id stored on the
//! instrument, through a [`SourceRegistry`].

pub mod binance;
pub mod finnhub;
pub mod metals;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::types::Quote;

pub use binance::BinanceClient;
pub use finnhub::FinnhubClient;
pub use metals::MetalsApiClient;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{source_id} rejected the request: {message}")]
    Api {
        source_id: &'static str,
        message: String,
    },

    #[error("no usable rate for {0}")]
    MissingRate(String),

    #[error("unparsable field `{field}`: {value}")]
    Parse { field: &'static str, value: String },

    #[error("price source not available: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Id stored on instruments that use this source.
    fn id(&self) -> &'static str;

    async fn fetch_quote(&self, code: &str) -> Result<Quote, SourceError>;
}

/// Shared reqwest client settings for every source.
pub(crate) fn http_client(timeout: Duration) -> Result<Client, SourceError> {
    let http = Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .build()?;

    Ok(http)
}

pub(crate) fn parse_f64(field: &'static str, value: &str) -> Result<f64, SourceError> {
    value.parse::<f64>().map_err(|_| SourceError::Parse {
        field,
        value: value.to_string(),
    })
}

/// Lookup table from source id to client.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: HashMap<&'static str, Arc<dyn PriceSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source` under its own id, replacing any previous entry.
    pub fn register(&mut self, source: Arc<dyn PriceSource>) -> &mut Self {
        self.sources.insert(source.id(), source);
        self
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn PriceSource>, SourceError> {
        self.sources
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::Unavailable(id.to_string()))
    }

    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.sources.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
