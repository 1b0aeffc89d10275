//! External financial-data collaborator
//!
//! The engine owns normalization and caching; the provider owns transport.
//! One trait method per data facet so the agent issues exactly one outbound
//! call for each.

use crate::error::{Result, WorkflowError};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Raw price facet straight from the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub price: f64,
    pub change_percent: f64,
    pub volume: u64,
    pub as_of: DateTime<Utc>,
}

/// Raw summary-metrics facet.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryMetrics {
    pub market_cap: f64,
    pub pe_ratio: Option<f64>,
}

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn price_snapshot(&self, symbol: &str, timeframe: &str) -> Result<PriceSnapshot>;
    async fn summary_metrics(&self, symbol: &str) -> Result<SummaryMetrics>;
}

//
// ================= HTTP provider =================
//

pub struct HttpMarketDataProvider {
    client: Client,
    base_url: String,
}

impl HttpMarketDataProvider {
    /// Configured from `MARKET_DATA_BASE_URL`; `None` when unset.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let base_url = env::var("MARKET_DATA_BASE_URL").ok()?;

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let response = self.client.get(&url).send().await.map_err(|e| {
            WorkflowError::ExternalServiceUnavailable(format!(
                "market data request failed for {}: {}",
                path, e
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::ExternalServiceUnavailable(format!(
                "market data provider returned {} for {}",
                status, path
            )));
        }

        response.json::<T>().await.map_err(|e| {
            WorkflowError::ExternalServiceUnavailable(format!(
                "invalid provider payload for {}: {}",
                path, e
            ))
        })
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    async fn price_snapshot(&self, symbol: &str, timeframe: &str) -> Result<PriceSnapshot> {
        self.get_json(&format!("/api/v1/quote/{}?range={}", symbol, timeframe))
            .await
    }

    async fn summary_metrics(&self, symbol: &str) -> Result<SummaryMetrics> {
        self.get_json(&format!("/api/v1/metrics/{}", symbol)).await
    }
}

//
// ================= Fixed-data provider =================
//

/// Mock provider for development and tests. Counts fetches so cache
/// single-fetch properties can be asserted.
#[derive(Default)]
pub struct MockMarketDataProvider {
    fetch_count: AtomicUsize,
}

impl MockMarketDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for MockMarketDataProvider {
    async fn price_snapshot(&self, symbol: &str, _timeframe: &str) -> Result<PriceSnapshot> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        Ok(PriceSnapshot {
            symbol: symbol.to_uppercase(),
            price: 189.45,
            change_percent: 1.23,
            volume: 48_210_000,
            as_of: Utc::now(),
        })
    }

    async fn summary_metrics(&self, _symbol: &str) -> Result<SummaryMetrics> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        Ok(SummaryMetrics {
            market_cap: 2.95e12,
            pe_ratio: Some(31.4),
        })
    }
}
