//! Market data abstractions shared by providers and the answer generator.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Snapshot of one coin in one quote currency. `None` means the provider
/// did not report the figure, not zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceInfo {
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub volume_24h: Option<f64>,
    pub change_24h: Option<f64>,
}

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Current snapshots for `ids` quoted in `vs_currency`, keyed by coin id.
    async fn prices(&self, ids: &[String], vs_currency: &str)
    -> Result<HashMap<String, PriceInfo>>;

    /// Snapshot of `id` on `date`, keyed by quote currency.
    async fn historical(&self, id: &str, date: NaiveDate) -> Result<HashMap<String, PriceInfo>>;
}
