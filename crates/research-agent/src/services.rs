//! Collaborator seams used by the stages
//!
//! Every external system is reached through one of the traits below so that
//! stages can run against in-memory fakes. [`Services`] bundles one
//! implementation of each with the run configuration and is shared by all
//! stages through an `Arc`.

use crate::api::{HttpPageFetcher, SearchClient, SecEdgarClient};
use crate::config::ResearchConfig;
use crate::error::Result;
use async_trait::async_trait;
use research_core::{CompanyMatch, SearchResult, TickerRecord};
use research_llm::LLMProvider;
use research_llm::providers::GeminiProvider;
use std::sync::Arc;
use tracing::warn;

/// Identity reference set (SEC `company_tickers.json`)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn company_tickers(&self) -> Result<Vec<TickerRecord>>;
}

/// Raw SEC filing payloads for a ten digit CIK
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FilingSource: Send + Sync {
    async fn company_facts(&self, cik10: &str) -> Result<serde_json::Value>;

    async fn submissions(&self, cik10: &str) -> Result<serde_json::Value>;
}

/// Web search returning normalized results
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Fetches a page and returns its visible text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Asks a human to pick one of the candidate companies
///
/// The answer is a 1-based index as text or `"none"`; `None` means no
/// answer could be obtained.
#[async_trait]
pub trait HumanResolver: Send + Sync {
    async fn select(&self, prompt: &str, options: &[CompanyMatch]) -> Option<String>;
}

/// Everything a stage may call out to
#[derive(Clone)]
pub struct Services {
    pub config: Arc<ResearchConfig>,
    pub reference: Arc<dyn ReferenceSource>,
    pub filings: Arc<dyn FilingSource>,
    pub search: Arc<dyn WebSearch>,
    pub pages: Arc<dyn PageFetcher>,
    pub llm: Arc<dyn LLMProvider>,
    pub resolver: Option<Arc<dyn HumanResolver>>,
}

impl Services {
    /// Build the production clients for the given configuration
    pub fn live(config: ResearchConfig) -> research_core::Result<Self> {
        for key in config.missing_credentials() {
            warn!("{} is not set; dependent stages will degrade", key);
        }

        let sec = Arc::new(SecEdgarClient::new(&config)?);
        let search = Arc::new(SearchClient::new(&config)?);
        let pages = Arc::new(HttpPageFetcher::new(config.request_timeout)?);
        let llm = GeminiProvider::new(
            config.google_api_key.clone().unwrap_or_default(),
            config.request_timeout * 4,
        )
        .map_err(|e| research_core::Error::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            reference: Arc::clone(&sec) as Arc<dyn ReferenceSource>,
            filings: sec,
            search,
            pages,
            llm: Arc::new(llm),
            resolver: None,
        })
    }

    /// Attach the resolver consulted when no human response was supplied
    pub fn with_resolver(mut self, resolver: Arc<dyn HumanResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}
