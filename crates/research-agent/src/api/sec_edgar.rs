//! SEC EDGAR API client for the ticker reference set and company payloads
//!
//! SEC EDGAR is the Electronic Data Gathering, Analysis, and Retrieval system
//! used by the U.S. Securities and Exchange Commission.
//!
//! Rate limit: 10 requests per second (as per SEC fair access policy)
//! User-Agent requirement: Must include company name and contact email

use crate::config::ResearchConfig;
use crate::error::{Result, SourceError};
use crate::services::{FilingSource, ReferenceSource};
use async_trait::async_trait;
use reqwest::Client;
use research_core::TickerRecord;
use research_resilience::{JsonFileCache, RateLimiter, RetryPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SERVICE: &str = "SEC EDGAR";
const SEC_BASE_URL: &str = "https://data.sec.gov";
const SEC_COMPANY_TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SEC_ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";

/// Build the archive URL of one filing document
pub fn filing_url(cik10: &str, accession_number: &str, document: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        SEC_ARCHIVES_URL,
        cik10,
        accession_number.replace('-', ""),
        document
    )
}

/// Flatten the tickers payload into records
///
/// The SEC publishes an object keyed by row number; a plain array is
/// accepted too. Rows that do not parse are skipped.
pub fn parse_tickers(payload: serde_json::Value) -> Vec<TickerRecord> {
    let rows: Vec<serde_json::Value> = match payload {
        serde_json::Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        serde_json::Value::Array(items) => items,
        _ => Vec::new(),
    };

    let total = rows.len();
    let records: Vec<TickerRecord> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value(row).ok())
        .collect();
    if records.len() < total {
        warn!("Skipped {} malformed ticker rows", total - records.len());
    }
    records
}

/// SEC EDGAR API client
pub struct SecEdgarClient {
    client: Client,
    user_agent: String,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    tickers_cache: JsonFileCache,
    payload_dir: PathBuf,
    payload_ttl: Duration,
}

impl SecEdgarClient {
    /// Create a client from the run configuration
    pub fn new(config: &ResearchConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let retry = config
            .retry_policy()
            .map_err(|e| SourceError::unexpected(SERVICE, e.to_string()))?;

        Ok(Self {
            client,
            user_agent: config.sec_user_agent.clone(),
            rate_limiter: RateLimiter::new(config.sec_rate_limit)?,
            retry,
            tickers_cache: JsonFileCache::new(
                config.tickers_cache_path(),
                config.tickers_cache_ttl,
            ),
            payload_dir: config.cache_dir.join("sec"),
            payload_ttl: config.sec_cache_ttl,
        })
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        self.rate_limiter.acquire().await;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::status(SERVICE, status, body));
        }

        Ok(response.json().await?)
    }

    async fn get_with_retry(&self, operation: &str, url: &str) -> Result<serde_json::Value> {
        self.retry.execute(operation, || self.get_json(url)).await
    }

    /// Fetch a per-company payload through its JSON cache
    async fn cached_payload(&self, kind: &str, cik10: &str, url: String) -> Result<serde_json::Value> {
        let cache = JsonFileCache::new(
            self.payload_dir.join(format!("{kind}_{cik10}.json")),
            self.payload_ttl,
        );
        if let Some(cached) = cache.load().await {
            return Ok(cached);
        }

        let payload = self.get_with_retry(kind, &url).await?;
        if let Err(e) = cache.save(&payload).await {
            warn!("Failed to cache {} for CIK {}: {}", kind, cik10, e);
        }
        Ok(payload)
    }
}

#[async_trait]
impl ReferenceSource for SecEdgarClient {
    #[instrument(skip(self))]
    async fn company_tickers(&self) -> Result<Vec<TickerRecord>> {
        if let Some(cached) = self.tickers_cache.load::<Vec<TickerRecord>>().await {
            if !cached.is_empty() {
                info!("Loaded {} tickers from cache", cached.len());
                return Ok(cached);
            }
        }

        let payload = self
            .get_with_retry("company_tickers", SEC_COMPANY_TICKERS_URL)
            .await?;
        let records = parse_tickers(payload);

        if let Err(e) = self.tickers_cache.save(&records).await {
            warn!("Failed to cache company tickers: {}", e);
        }
        info!("Loaded {} tickers from SEC", records.len());
        Ok(records)
    }
}

#[async_trait]
impl FilingSource for SecEdgarClient {
    async fn company_facts(&self, cik10: &str) -> Result<serde_json::Value> {
        let url = format!("{SEC_BASE_URL}/api/xbrl/companyfacts/CIK{cik10}.json");
        self.cached_payload("companyfacts", cik10, url).await
    }

    async fn submissions(&self, cik10: &str) -> Result<serde_json::Value> {
        let url = format!("{SEC_BASE_URL}/submissions/CIK{cik10}.json");
        self.cached_payload("submissions", cik10, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(dir: &std::path::Path) -> ResearchConfig {
        ResearchConfig {
            cache_dir: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_filing_url() {
        assert_eq!(
            filing_url("0000320193", "0000320193-24-000123", "aapl-20240928.htm"),
            "https://www.sec.gov/Archives/edgar/data/0000320193/000032019324000123/aapl-20240928.htm"
        );
    }

    #[test]
    fn test_parse_tickers() {
        let payload = json!({
            "0": {"cik_str": 320193, "ticker": "AAPL", "title": "Apple Inc."},
            "1": {"cik_str": "789019", "ticker": "MSFT", "title": "MICROSOFT CORP"},
            "2": {"ticker": "BROKEN"}
        });
        let mut records = parse_tickers(payload);
        records.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cik_str, "320193");
        assert_eq!(records[1].title, "MICROSOFT CORP");

        assert!(parse_tickers(json!("nope")).is_empty());
    }

    #[tokio::test]
    async fn test_tickers_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        JsonFileCache::new(config.tickers_cache_path(), config.tickers_cache_ttl)
            .save(&vec![TickerRecord::new("320193", "AAPL", "Apple Inc.")])
            .await
            .unwrap();

        let client = SecEdgarClient::new(&config).unwrap();
        let records = client.company_tickers().await.unwrap();
        assert_eq!(records, vec![TickerRecord::new("320193", "AAPL", "Apple Inc.")]);
    }

    #[tokio::test]
    async fn test_payload_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        JsonFileCache::new(
            dir.path().join("sec/submissions_0000320193.json"),
            config.sec_cache_ttl,
        )
        .save(&json!({"name": "Apple Inc."}))
        .await
        .unwrap();

        let client = SecEdgarClient::new(&config).unwrap();
        let submissions = client.submissions("0000320193").await.unwrap();
        assert_eq!(submissions["name"], "Apple Inc.");
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_live_tickers() {
        let dir = tempfile::tempdir().unwrap();
        let client = SecEdgarClient::new(&config(dir.path())).unwrap();
        let records = client.company_tickers().await.unwrap();
        assert!(records.iter().any(|r| r.ticker == "AAPL"));
    }
}
