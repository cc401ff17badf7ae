pub mod answer;
pub mod cache;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod log;
pub mod market_data;
pub mod providers;
pub mod query;

use std::sync::Arc;

use anyhow::Result;
use chrono::Duration;
use tracing::{debug, info};

use crate::answer::AnswerGenerator;
use crate::clock::{Clock, SystemClock};
use crate::directory::CoinDirectory;
use crate::providers::coingecko::CoinGeckoProvider;

/// Output rendering requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Json,
    Markdown,
}

pub async fn run(prompt: &str, format: OutputFormat, config_path: Option<&str>) -> Result<String> {
    info!("coinquery starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let directory = Arc::new(CoinDirectory::new(
        &config.provider.base_url,
        Duration::hours(config.provider.directory_ttl_hours as i64),
        Arc::clone(&clock),
    ));
    let source = Arc::new(CoinGeckoProvider::new(
        &config.provider.base_url,
        Duration::seconds(config.provider.price_ttl_secs as i64),
        Arc::clone(&clock),
    ));

    directory.load().await?;

    let generator = AnswerGenerator::new(Arc::clone(&directory), source, clock);
    let result = generator
        .generate(prompt, format == OutputFormat::Markdown)
        .await;

    Ok(match format {
        OutputFormat::Json => {
            serde_json::json!({ "prompt": prompt, "result": result }).to_string()
        }
        _ => result,
    })
}
