use thiserror::Error;

/// Non-success response from the market-data provider.
#[derive(Debug, Error)]
#[error("upstream request failed with status {status}: {url}")]
pub struct UpstreamError {
    pub url: String,
    pub status: reqwest::StatusCode,
}
