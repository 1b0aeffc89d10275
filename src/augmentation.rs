//! Data Augmentation Agent
//!
//! Fetches and normalizes external financial data for one symbol/timeframe,
//! independent of which operation ultimately runs. Cache-first, retry-bounded,
//! and never fatal to the workflow: any failure here is recorded upstream and
//! the request proceeds without live figures.

use crate::cache::QuoteCache;
use crate::config::EngineConfig;
use crate::error::{Result, WorkflowError};
use crate::models::FinancialDataRecord;
use crate::nlu::{ExtractedEntities, LanguageModel};
use crate::provider::{MarketDataProvider, PriceSnapshot, SummaryMetrics};
use crate::router::scan_ticker_symbol;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_TIMEFRAME: &str = "1d";

pub struct AugmentationAgent {
    nlu: Arc<dyn LanguageModel>,
    provider: Arc<dyn MarketDataProvider>,
    cache: QuoteCache,
    config: EngineConfig,
}

impl AugmentationAgent {
    pub fn new(
        nlu: Arc<dyn LanguageModel>,
        provider: Arc<dyn MarketDataProvider>,
        cache: QuoteCache,
        config: EngineConfig,
    ) -> Self {
        Self {
            nlu,
            provider,
            cache,
            config,
        }
    }

    /// Produce a normalized financial record for the request, serving from
    /// cache when possible. Fails with `ParameterExtraction` when no symbol
    /// can be found and `ExternalServiceUnavailable` when the provider stays
    /// down through the retry budget.
    pub async fn augment(&self, raw_request: &str) -> Result<FinancialDataRecord> {
        let entities = match self.nlu.extract_entities(raw_request).await {
            Ok(entities) => entities,
            Err(e) => {
                // Extraction degrades to the deterministic ticker scan.
                warn!(error = %e, "Entity extraction failed; falling back to ticker scan");
                ExtractedEntities {
                    symbol: scan_ticker_symbol(raw_request),
                    timeframe: None,
                }
            }
        };

        let symbol = entities
            .symbol
            .or_else(|| scan_ticker_symbol(raw_request))
            .ok_or_else(|| {
                WorkflowError::ParameterExtraction(
                    "no ticker symbol found in request".to_string(),
                )
            })?;

        let timeframe = entities
            .timeframe
            .unwrap_or_else(|| DEFAULT_TIMEFRAME.to_string());

        if let Some(hit) = self.cache.get(&symbol, &timeframe).await {
            return Ok(hit);
        }

        debug!(symbol = %symbol, timeframe = %timeframe, "Quote cache miss; fetching live");

        // The fetch runs in this future: dropping it cancels the in-flight
        // call and any remaining retries.
        let record =
            fetch_and_normalize(self.provider.clone(), &symbol, &timeframe, &self.config)
                .await?;

        // Only the cache write is detached, so a result obtained just before
        // the caller abandons the request still lands in the cache.
        let cache = self.cache.clone();
        let write = record.clone();
        let write_handle =
            tokio::spawn(async move { cache.insert(&symbol, &timeframe, write).await });
        let _ = write_handle.await;

        Ok(record)
    }
}

async fn fetch_and_normalize(
    provider: Arc<dyn MarketDataProvider>,
    symbol: &str,
    timeframe: &str,
    config: &EngineConfig,
) -> Result<FinancialDataRecord> {
    // One outbound call per facet, each behind the same retry budget.
    let snapshot = {
        let provider = provider.clone();
        let symbol = symbol.to_string();
        let timeframe = timeframe.to_string();
        with_retry(config, "price snapshot", move || {
            let provider = provider.clone();
            let symbol = symbol.clone();
            let timeframe = timeframe.clone();
            async move { provider.price_snapshot(&symbol, &timeframe).await }
        })
        .await?
    };

    let metrics = {
        let provider = provider.clone();
        let symbol = symbol.to_string();
        with_retry(config, "summary metrics", move || {
            let provider = provider.clone();
            let symbol = symbol.clone();
            async move { provider.summary_metrics(&symbol).await }
        })
        .await?
    };

    Ok(normalize(snapshot, metrics))
}

/// Bounded retry with exponential backoff; each attempt is capped by the
/// configured fetch timeout, and a timeout counts as a provider failure.
async fn with_retry<T, Fut, F>(config: &EngineConfig, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        let outcome = tokio::time::timeout(config.fetch_timeout, op()).await;

        let failure = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", config.fetch_timeout),
        };

        if attempt >= config.max_fetch_retries {
            return Err(WorkflowError::ExternalServiceUnavailable(format!(
                "{} failed after {} attempts: {}",
                what,
                attempt + 1,
                failure
            )));
        }

        let delay = config.backoff_base * 2u32.saturating_pow(attempt);
        warn!(
            what,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "Fetch attempt failed; backing off"
        );

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Deterministic normalization: a fixed template over the numeric fields, no
/// second model call.
fn normalize(snapshot: PriceSnapshot, metrics: SummaryMetrics) -> FinancialDataRecord {
    let market_cap = format_market_cap(metrics.market_cap);
    let volume = format_volume(snapshot.volume);

    let formatted_summary = format!(
        "{} is trading at ${:.2} ({:+.2}%), market cap {}, volume {}.",
        snapshot.symbol, snapshot.price, snapshot.change_percent, market_cap, volume
    );

    FinancialDataRecord {
        symbol: snapshot.symbol,
        current_price: snapshot.price,
        change_percent: snapshot.change_percent,
        market_cap,
        pe_ratio: metrics.pe_ratio,
        volume,
        formatted_summary,
        source_timestamp: snapshot.as_of,
        is_stale: false,
    }
}

fn format_market_cap(value: f64) -> String {
    if value >= 1e12 {
        format!("{:.2}T", value / 1e12)
    } else if value >= 1e9 {
        format!("{:.2}B", value / 1e9)
    } else if value >= 1e6 {
        format!("{:.2}M", value / 1e6)
    } else {
        format!("{:.0}", value)
    }
}

fn format_volume(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    grouped
}
