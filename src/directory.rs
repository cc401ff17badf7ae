//! Directory of known coins with alias, exact and fuzzy lookup.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::UpstreamError;

/// Hand-curated shortcuts from common tickers and misspellings to canonical
/// coin ids. A hit here skips fuzzy matching entirely.
const ALIASES: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("xbt", "bitcoin"),
    ("bitcon", "bitcoin"),
    ("eth", "ethereum"),
    ("etherium", "ethereum"),
    ("doge", "dogecoin"),
    ("ada", "cardano"),
    ("sol", "solana"),
    ("dot", "polkadot"),
    ("ltc", "litecoin"),
    ("xrp", "ripple"),
    ("bnb", "binancecoin"),
    ("usdt", "tether"),
    ("usdc", "usd-coin"),
    ("usd", "usd-coin"),
    ("shib", "shiba-inu"),
    ("matic", "matic-network"),
    ("link", "chainlink"),
    ("avax", "avalanche-2"),
    ("xlm", "stellar"),
    ("xmr", "monero"),
];

/// A load below this size is treated as truncated and retried on next use.
const MIN_COINS: usize = 500;

/// Fuzzy matches at this distance or beyond are rejected.
const MAX_FUZZY_DISTANCE: usize = 3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Coin {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

#[derive(Default)]
struct DirectoryIndex {
    coins: Vec<Coin>,
    by_symbol: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    loaded_at: Option<DateTime<Utc>>,
}

impl DirectoryIndex {
    /// Builds all three lookup maps from one coin list. Duplicate keys keep
    /// the first occurrence in upstream order.
    fn build(coins: Vec<Coin>, loaded_at: DateTime<Utc>) -> Self {
        let mut by_symbol = HashMap::new();
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for (pos, coin) in coins.iter().enumerate() {
            by_symbol.entry(coin.symbol.to_lowercase()).or_insert(pos);
            by_id.entry(coin.id.to_lowercase()).or_insert(pos);
            by_name.entry(coin.name.to_lowercase()).or_insert(pos);
        }
        DirectoryIndex {
            coins,
            by_symbol,
            by_id,
            by_name,
            loaded_at: Some(loaded_at),
        }
    }
}

pub struct CoinDirectory {
    base_url: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
    index: Mutex<DirectoryIndex>,
}

impl CoinDirectory {
    pub fn new(base_url: &str, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        CoinDirectory {
            base_url: base_url.to_string(),
            ttl,
            clock,
            client: reqwest::Client::new(),
            index: Mutex::new(DirectoryIndex::default()),
        }
    }

    /// Directory pre-populated with a fixed coin set, bypassing `load`.
    #[cfg(test)]
    pub(crate) fn with_coins(coins: Vec<Coin>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(crate::clock::SystemClock);
        let index = DirectoryIndex::build(coins, clock.now());
        CoinDirectory {
            base_url: String::new(),
            ttl: Duration::hours(24),
            clock,
            client: reqwest::Client::new(),
            index: Mutex::new(index),
        }
    }

    /// Fetches the full coin list and atomically replaces the index. No-op
    /// while the previous load is fresh and looks complete.
    pub async fn load(&self) -> Result<()> {
        {
            let index = self.index.lock().await;
            if let Some(loaded_at) = index.loaded_at {
                if self.clock.now() - loaded_at < self.ttl && index.coins.len() > MIN_COINS {
                    debug!("Coin directory is fresh, skipping reload");
                    return Ok(());
                }
            }
        }

        let url = format!("{}/coins/list", self.base_url);
        debug!("Loading coin directory from {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to request coin list from {url}"))?;
        if !response.status().is_success() {
            return Err(UpstreamError {
                url,
                status: response.status(),
            }
            .into());
        }
        let coins: Vec<Coin> = response
            .json()
            .await
            .context("Failed to parse coin list response")?;
        info!("Loaded {} coins into the directory", coins.len());

        let rebuilt = DirectoryIndex::build(coins, self.clock.now());
        *self.index.lock().await = rebuilt;
        Ok(())
    }

    /// Resolves a free-text reference to a coin: alias table first, then
    /// exact symbol/id/name, then nearest symbol by edit distance.
    pub async fn find(&self, reference: &str) -> Option<Coin> {
        let needle = reference.to_lowercase();
        let index = self.index.lock().await;

        if let Some((_, id)) = ALIASES.iter().find(|(alias, _)| *alias == needle) {
            if let Some(&pos) = index.by_id.get(*id) {
                return Some(index.coins[pos].clone());
            }
        }

        for map in [&index.by_symbol, &index.by_id, &index.by_name] {
            if let Some(&pos) = map.get(&needle) {
                return Some(index.coins[pos].clone());
            }
        }

        // Nearest symbol wins; ties keep the earliest coin in upstream order.
        let mut best: Option<(usize, usize)> = None;
        for (pos, coin) in index.coins.iter().enumerate() {
            let distance = levenshtein(&needle, &coin.symbol.to_lowercase());
            if best.is_none_or(|(d, _)| distance < d) {
                best = Some((distance, pos));
            }
        }
        match best {
            Some((distance, pos)) if distance < MAX_FUZZY_DISTANCE => {
                Some(index.coins[pos].clone())
            }
            _ => None,
        }
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
