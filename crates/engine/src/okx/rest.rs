use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use common::{Error, Result, TickerSource};

pub const DEFAULT_BASE_URL: &str = "https://www.okx.com";

const TICKER_PATH: &str = "/api/v5/market/ticker";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Public REST client for OKX market data. Only the unauthenticated ticker
/// endpoint is used.
pub struct OkxClient {
    base_url: String,
    http: Client,
}

impl OkxClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }
}

impl Default for OkxClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl TickerSource for OkxClient {
    async fn last_price(&self, inst_id: &str) -> Result<f64> {
        let url = format!("{}{TICKER_PATH}", self.base_url);
        debug!(%inst_id, "Requesting OKX ticker");

        let resp = self
            .http
            .get(&url)
            .query(&[("instId", inst_id)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("{inst_id}: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Unavailable(format!("{inst_id}: {e}")))?;

        if !status.is_success() {
            return Err(Error::Unavailable(format!("{inst_id}: HTTP {status}")));
        }
        parse_ticker(inst_id, &body)
    }
}

/// Extract the last price from a ticker response body. Requires
/// `code == "0"` and a non-empty `data` array.
pub fn parse_ticker(inst_id: &str, body: &str) -> Result<f64> {
    let resp: TickerResponse = serde_json::from_str(body)
        .map_err(|e| Error::Unavailable(format!("{inst_id}: malformed response: {e}")))?;

    if resp.code != "0" {
        return Err(Error::Unavailable(format!(
            "{inst_id}: code {} {}",
            resp.code, resp.msg
        )));
    }

    let ticker = resp
        .data
        .first()
        .ok_or_else(|| Error::Unavailable(format!("{inst_id}: empty ticker data")))?;

    let price = ticker
        .last
        .parse::<f64>()
        .map_err(|e| Error::Unavailable(format!("{inst_id}: bad price '{}': {e}", ticker.last)))?;

    if !price.is_finite() {
        return Err(Error::Unavailable(format!("{inst_id}: non-finite price")));
    }
    Ok(price)
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TickerResponse {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<Ticker>,
}

#[derive(Deserialize)]
struct Ticker {
    last: String,
}
