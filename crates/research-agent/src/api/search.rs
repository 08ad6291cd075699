//! Web search with Tavily first and DuckDuckGo as fallback
//!
//! Tavily is only part of the chain when an API key is configured. Non-empty
//! results are cached per query for `search_cache_ttl`.

use crate::config::ResearchConfig;
use crate::error::{Result, SourceError};
use crate::services::WebSearch;
use async_trait::async_trait;
use reqwest::Client;
use research_core::{SearchResult, SearchSource};
use research_resilience::{CacheStore, FallbackChain};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TAVILY_URL: &str = "https://api.tavily.com/search";
const DUCKDUCKGO_URL: &str = "https://api.duckduckgo.com/";

#[derive(Debug, Clone)]
struct SearchQuery {
    query: String,
    max_results: usize,
}

/// Tavily search API client
pub struct TavilyClient {
    client: Client,
    api_key: String,
    search_depth: String,
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    raw_content: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
}

impl From<TavilyResult> for SearchResult {
    fn from(item: TavilyResult) -> Self {
        let mut result = SearchResult::new(item.title, item.url, SearchSource::Tavily)
            .with_snippet(item.content.unwrap_or_default())
            .with_content(item.raw_content.unwrap_or_default());
        if let Some(date) = item.published_date {
            result = result.with_published_date(date);
        }
        result
    }
}

impl TavilyClient {
    pub fn new(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            search_depth: "advanced".to_string(),
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        info!("Searching Tavily: {}", query);
        let response = self
            .client
            .post(TAVILY_URL)
            .bearer_auth(&self.api_key)
            .json(&TavilyRequest {
                query,
                search_depth: &self.search_depth,
                max_results,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::status("Tavily", status, body));
        }

        let body: TavilyResponse = response.json().await?;
        let results: Vec<SearchResult> = body
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .map(SearchResult::from)
            .collect();
        info!("Tavily returned {} results", results.len());
        Ok(results)
    }
}

/// DuckDuckGo instant answer API client
pub struct DuckDuckGoClient {
    client: Client,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: String,
    #[serde(rename = "FirstURL", default)]
    first_url: String,
    /// Present on topic groups instead of `text`
    #[serde(default)]
    topics: Vec<RelatedTopic>,
}

impl InstantAnswer {
    fn into_results(self, max_results: usize) -> Vec<SearchResult> {
        let mut results = Vec::new();
        if !self.abstract_url.is_empty() {
            results.push(
                SearchResult::new(self.heading, self.abstract_url, SearchSource::DuckDuckGo)
                    .with_snippet(self.abstract_text),
            );
        }

        let topics = self
            .related_topics
            .into_iter()
            .flat_map(|t| if t.topics.is_empty() { vec![t] } else { t.topics });
        for topic in topics {
            if topic.first_url.is_empty() || topic.text.is_empty() {
                continue;
            }
            let title = topic.text.split(" - ").next().unwrap_or(&topic.text).to_string();
            results.push(
                SearchResult::new(title, topic.first_url, SearchSource::DuckDuckGo)
                    .with_snippet(&topic.text),
            );
        }

        results.truncate(max_results);
        results
    }
}

impl DuckDuckGoClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        info!("Searching DuckDuckGo: {}", query);
        let response = self
            .client
            .get(DUCKDUCKGO_URL)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::status("DuckDuckGo", status, body));
        }

        let answer: InstantAnswer = response.json().await?;
        let results = answer.into_results(max_results);
        info!("DuckDuckGo returned {} results", results.len());
        Ok(results)
    }
}

/// Search client combining both backends behind a fallback chain
pub struct SearchClient {
    chain: FallbackChain<SearchQuery, Vec<SearchResult>, SourceError>,
    cache: CacheStore,
}

impl SearchClient {
    pub fn new(config: &ResearchConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let mut chain = FallbackChain::new("web_search");

        let tavily_key = config
            .tavily_api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty() && !k.contains("your_"));
        if let Some(key) = tavily_key {
            let tavily = Arc::new(TavilyClient::new(client.clone(), key));
            chain = chain.add_strategy("Tavily", move |q: SearchQuery| {
                let tavily = Arc::clone(&tavily);
                async move { tavily.search(&q.query, q.max_results).await }
            });
        }

        let ddg = Arc::new(DuckDuckGoClient::new(client));
        chain = chain.add_strategy("DuckDuckGo", move |q: SearchQuery| {
            let ddg = Arc::clone(&ddg);
            async move { ddg.search(&q.query, q.max_results).await }
        });

        info!("Web search configured with {} backend(s)", chain.len());
        Ok(Self {
            chain,
            cache: CacheStore::new(&config.cache_dir, "search", config.search_cache_ttl),
        })
    }

    /// Number of configured backends
    pub fn backends(&self) -> usize {
        self.chain.len()
    }
}

#[async_trait]
impl WebSearch for SearchClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let key = format!("{query}_{max_results}");
        if let Some(cached) = self.cache.get::<Vec<SearchResult>>(&key).await {
            debug!("Search cache hit: {}", query);
            return Ok(cached);
        }

        let results = self
            .chain
            .execute(SearchQuery {
                query: query.to_string(),
                max_results,
            })
            .await?;

        if !results.is_empty() {
            if let Err(e) = self.cache.set(&key, &results, None).await {
                warn!("Failed to cache search results for '{}': {}", query, e);
            }
        }
        Ok(results)
    }
}
