//! Quote response cache
//!
//! Entries are idempotent snapshots of the same external fact, keyed by
//! `(symbol, timeframe, minute bucket)`. Concurrent reads are cheap and
//! concurrent inserts are last-writer-wins. Entries younger than the
//! freshness window are served fresh, entries younger than the hard expiry
//! are served with `is_stale = true`, and anything older is never served.

use crate::models::FinancialDataRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuoteKey {
    symbol: String,
    timeframe: String,
    minute_bucket: i64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    record: FinancialDataRecord,
    inserted_at: DateTime<Utc>,
}

fn minute_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp() / 60
}

#[derive(Clone)]
pub struct QuoteCache {
    entries: Arc<RwLock<HashMap<QuoteKey, CacheEntry>>>,
    freshness: chrono::Duration,
    hard_expiry: chrono::Duration,
}

impl QuoteCache {
    pub fn new(freshness: Duration, hard_expiry: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            freshness: chrono::Duration::from_std(freshness)
                .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            hard_expiry: chrono::Duration::from_std(hard_expiry)
                .unwrap_or_else(|_| chrono::Duration::seconds(900)),
        }
    }

    /// Look up a quote, walking back over the minute buckets inside the hard
    /// expiry horizon. The returned record carries the computed staleness.
    pub async fn get(&self, symbol: &str, timeframe: &str) -> Option<FinancialDataRecord> {
        let now = Utc::now();
        let current = minute_bucket(now);
        let horizon = self.hard_expiry.num_minutes().max(1);

        let entries = self.entries.read().await;

        for age_minutes in 0..=horizon {
            let key = QuoteKey {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                minute_bucket: current - age_minutes,
            };

            if let Some(entry) = entries.get(&key) {
                let age = now - entry.inserted_at;
                if age > self.hard_expiry {
                    continue;
                }

                let mut record = entry.record.clone();
                record.is_stale = age > self.freshness;

                debug!(
                    symbol,
                    timeframe,
                    age_secs = age.num_seconds(),
                    is_stale = record.is_stale,
                    "Quote cache hit"
                );

                return Some(record);
            }
        }

        None
    }

    /// Insert a freshly fetched quote under the current minute bucket and
    /// drop buckets past the expiry horizon.
    pub async fn insert(&self, symbol: &str, timeframe: &str, record: FinancialDataRecord) {
        let now = Utc::now();
        self.insert_at(symbol, timeframe, record, now).await;
    }

    async fn insert_at(
        &self,
        symbol: &str,
        timeframe: &str,
        record: FinancialDataRecord,
        at: DateTime<Utc>,
    ) {
        let key = QuoteKey {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            minute_bucket: minute_bucket(at),
        };

        let oldest_live = minute_bucket(Utc::now()) - self.hard_expiry.num_minutes();

        let mut entries = self.entries.write().await;
        entries.retain(|k, _| k.minute_bucket >= oldest_live);
        entries.insert(
            key,
            CacheEntry {
                record,
                inserted_at: at,
            },
        );
    }

    /// Test hook: insert with a backdated timestamp to exercise the
    /// staleness and expiry paths without sleeping.
    #[cfg(test)]
    pub(crate) async fn insert_backdated(
        &self,
        symbol: &str,
        timeframe: &str,
        record: FinancialDataRecord,
        age: Duration,
    ) {
        let at = Utc::now()
            - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
        self.insert_at(symbol, timeframe, record, at).await;
    }
}
