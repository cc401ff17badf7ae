//! CoinGecko-backed market data source.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::clock::Clock;
use crate::error::UpstreamError;
use crate::market_data::{MarketDataSource, PriceInfo};

pub struct CoinGeckoProvider {
    base_url: String,
    client: reqwest::Client,
    cache: Cache<String, String>,
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    id: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    market_data: Option<HistoryMarketData>,
}

#[derive(Debug, Deserialize)]
struct HistoryMarketData {
    #[serde(default)]
    current_price: HashMap<String, f64>,
    #[serde(default)]
    market_cap: HashMap<String, f64>,
    #[serde(default)]
    total_volume: HashMap<String, f64>,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, price_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        CoinGeckoProvider {
            base_url: base_url.to_string(),
            client: reqwest::Client::new(),
            cache: Cache::new(price_ttl, clock),
        }
    }

    /// Fetches a URL through the response cache. The URL is the cache key;
    /// a fresh entry is returned verbatim with no upstream call.
    async fn cached_fetch(&self, url: String) -> Result<String> {
        if let Some(body) = self.cache.get(&url).await {
            return Ok(body);
        }

        debug!("Requesting market data from {}", url);
        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Request failed for {url}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError { url, status }.into());
        }
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body for {url}"))?;
        self.cache.put(url, body.clone()).await;
        Ok(body)
    }

    /// Primary current-price endpoint: one quote currency, many ids.
    async fn markets(&self, ids: &[String], vs_currency: &str) -> Result<HashMap<String, PriceInfo>> {
        let url = format!(
            "{}/coins/markets?vs_currency={}&ids={}&price_change_percentage=24h",
            self.base_url,
            vs_currency,
            ids.join(",")
        );
        let body = self.cached_fetch(url).await?;
        let rows: Vec<MarketRow> =
            serde_json::from_str(&body).context("Failed to parse markets response")?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let info = PriceInfo {
                    price: row.current_price,
                    market_cap: row.market_cap,
                    volume_24h: row.total_volume,
                    change_24h: row.price_change_percentage_24h,
                };
                (row.id, info)
            })
            .collect())
    }

    /// Fallback endpoint reshaped into the same snapshot form as `markets`.
    async fn simple_price(
        &self,
        ids: &[String],
        vs_currency: &str,
    ) -> Result<HashMap<String, PriceInfo>> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_market_cap=true&include_24hr_vol=true&include_24hr_change=true",
            self.base_url,
            ids.join(","),
            vs_currency
        );
        let body = self.cached_fetch(url).await?;
        let rows: HashMap<String, HashMap<String, f64>> =
            serde_json::from_str(&body).context("Failed to parse simple price response")?;
        Ok(rows
            .into_iter()
            .map(|(id, fields)| {
                let info = PriceInfo {
                    price: fields.get(vs_currency).copied(),
                    market_cap: fields.get(&format!("{vs_currency}_market_cap")).copied(),
                    volume_24h: fields.get(&format!("{vs_currency}_24h_vol")).copied(),
                    change_24h: fields.get(&format!("{vs_currency}_24h_change")).copied(),
                };
                (id, info)
            })
            .collect())
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoProvider {
    async fn prices(
        &self,
        ids: &[String],
        vs_currency: &str,
    ) -> Result<HashMap<String, PriceInfo>> {
        match self.markets(ids, vs_currency).await {
            Ok(snapshots) => Ok(snapshots),
            Err(e) => {
                warn!("Markets endpoint failed, falling back to simple price: {e:#}");
                self.simple_price(ids, vs_currency).await
            }
        }
    }

    async fn historical(&self, id: &str, date: NaiveDate) -> Result<HashMap<String, PriceInfo>> {
        let url = format!(
            "{}/coins/{}/history?date={}",
            self.base_url,
            id,
            date.format("%d-%m-%Y")
        );
        let body = self.cached_fetch(url).await?;
        let parsed: HistoryResponse =
            serde_json::from_str(&body).context("Failed to parse history response")?;
        let Some(data) = parsed.market_data else {
            return Ok(HashMap::new());
        };

        let mut snapshots: HashMap<String, PriceInfo> = HashMap::new();
        for (currency, price) in data.current_price {
            snapshots.entry(currency).or_default().price = Some(price);
        }
        for (currency, cap) in data.market_cap {
            snapshots.entry(currency).or_default().market_cap = Some(cap);
        }
        for (currency, volume) in data.total_volume {
            snapshots.entry(currency).or_default().volume_24h = Some(volume);
        }
        Ok(snapshots)
    }
}
