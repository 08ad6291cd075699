//! Configuration for research runs

use research_core::{Error, Result};
use research_resilience::RetryPolicy;
use research_utils::env;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a research run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// User-Agent sent to SEC EDGAR (name and contact email)
    pub sec_user_agent: String,

    /// SEC EDGAR requests per second
    pub sec_rate_limit: f64,

    /// Google AI API key
    #[serde(skip_serializing)]
    pub google_api_key: Option<String>,

    /// Model used for synthesis
    pub primary_model: String,

    /// Model used for validation, extraction and sentiment, and as the
    /// synthesis fallback
    pub secondary_model: String,

    pub temperature_validation: f32,
    pub temperature_extraction: f32,
    pub temperature_suggestions: f32,
    pub temperature_synthesis: f32,

    pub max_tokens_validation: usize,
    pub max_tokens_suggestions: usize,
    pub max_tokens_sentiment: usize,
    pub max_tokens_synthesis: usize,

    /// Tavily API key; DuckDuckGo is used alone without it
    #[serde(skip_serializing)]
    pub tavily_api_key: Option<String>,

    pub tavily_max_results: usize,

    /// TTL for cached search results
    pub search_cache_ttl: Duration,

    /// Root directory of all caches
    pub cache_dir: PathBuf,

    /// TTL for the SEC ticker reference set
    pub tickers_cache_ttl: Duration,

    /// TTL for raw companyfacts and submissions payloads
    pub sec_cache_ttl: Duration,

    /// Where Markdown and JSON reports are written
    pub reports_dir: PathBuf,

    pub max_news_items: usize,
    pub max_sentiment_samples: usize,
    pub sentiment_snippet_length: usize,
    pub max_competitors: usize,

    /// Attempts per external call, including the first
    pub max_retry_attempts: u32,

    pub retry_backoff_factor: f64,

    /// Upper bound on a single retry wait
    pub retry_max_wait: Duration,

    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            sec_user_agent: "company-research-rs research@company-research.dev".to_string(),
            sec_rate_limit: 10.0,
            google_api_key: None,
            primary_model: "gemini-2.5-pro".to_string(),
            secondary_model: "gemini-2.5-flash".to_string(),
            temperature_validation: 0.1,
            temperature_extraction: 0.2,
            temperature_suggestions: 0.3,
            temperature_synthesis: 0.4,
            max_tokens_validation: 3000,
            max_tokens_suggestions: 3000,
            max_tokens_sentiment: 3000,
            max_tokens_synthesis: 10_000,
            tavily_api_key: None,
            tavily_max_results: 10,
            search_cache_ttl: Duration::from_secs(3600),         // 1 hour
            cache_dir: PathBuf::from("data"),
            tickers_cache_ttl: Duration::from_secs(24 * 3600),   // 24 hours
            sec_cache_ttl: Duration::from_secs(24 * 3600),
            reports_dir: PathBuf::from("outputs/reports"),
            max_news_items: 50,
            max_sentiment_samples: 50,
            sentiment_snippet_length: 1000,
            max_competitors: 10,
            max_retry_attempts: 3,
            retry_backoff_factor: 2.0,
            retry_max_wait: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ResearchConfig {
    /// Create a new configuration builder
    pub fn builder() -> ResearchConfigBuilder {
        ResearchConfigBuilder::default()
    }

    /// Build a configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        Self::builder().with_env().build()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let agent = self.sec_user_agent.trim();
        if agent.is_empty() || agent.contains("your.email") || agent.contains("your_email") {
            return Err(Error::Config(
                "SEC_USER_AGENT must name you and a contact email".to_string(),
            ));
        }

        if !self.sec_rate_limit.is_finite() || self.sec_rate_limit <= 0.0 {
            return Err(Error::Config(
                "sec_rate_limit must be positive".to_string(),
            ));
        }

        if self.max_retry_attempts == 0 {
            return Err(Error::Config(
                "max_retry_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry_backoff_factor <= 1.0 {
            return Err(Error::Config(
                "retry_backoff_factor must be greater than 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// API keys that are absent or still placeholders
    ///
    /// These are warnings rather than errors: without Tavily the search
    /// falls back to DuckDuckGo, and without Google every LLM-backed stage
    /// degrades to its default.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let missing = |key: &Option<String>| {
            key.as_deref()
                .is_none_or(|k| k.trim().is_empty() || k.contains("your_"))
        };

        let mut out = Vec::new();
        if missing(&self.google_api_key) {
            out.push("GOOGLE_API_KEY");
        }
        if missing(&self.tavily_api_key) {
            out.push("TAVILY_API_KEY");
        }
        out
    }

    /// Retry policy shared by every external call
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.max_retry_attempts, self.retry_backoff_factor)
            .map(|p| p.with_max_backoff(self.retry_max_wait))
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Location of the cached SEC ticker reference set
    pub fn tickers_cache_path(&self) -> PathBuf {
        self.cache_dir.join("company_tickers.json")
    }
}

/// Builder for ResearchConfig
#[derive(Debug, Default)]
pub struct ResearchConfigBuilder {
    sec_user_agent: Option<String>,
    sec_rate_limit: Option<f64>,
    google_api_key: Option<String>,
    primary_model: Option<String>,
    secondary_model: Option<String>,
    tavily_api_key: Option<String>,
    tavily_max_results: Option<usize>,
    cache_dir: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
    max_news_items: Option<usize>,
    max_competitors: Option<usize>,
    max_retry_attempts: Option<u32>,
    retry_backoff_factor: Option<f64>,
    request_timeout: Option<Duration>,
}

impl ResearchConfigBuilder {
    pub fn sec_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.sec_user_agent = Some(agent.into());
        self
    }

    pub fn sec_rate_limit(mut self, per_second: f64) -> Self {
        self.sec_rate_limit = Some(per_second);
        self
    }

    pub fn google_api_key(mut self, key: impl Into<String>) -> Self {
        self.google_api_key = Some(key.into());
        self
    }

    pub fn primary_model(mut self, model: impl Into<String>) -> Self {
        self.primary_model = Some(model.into());
        self
    }

    pub fn secondary_model(mut self, model: impl Into<String>) -> Self {
        self.secondary_model = Some(model.into());
        self
    }

    pub fn tavily_api_key(mut self, key: impl Into<String>) -> Self {
        self.tavily_api_key = Some(key.into());
        self
    }

    pub fn tavily_max_results(mut self, max: usize) -> Self {
        self.tavily_max_results = Some(max);
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reports_dir = Some(dir.into());
        self
    }

    pub fn max_news_items(mut self, max: usize) -> Self {
        self.max_news_items = Some(max);
        self
    }

    pub fn max_competitors(mut self, max: usize) -> Self {
        self.max_competitors = Some(max);
        self
    }

    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    pub fn retry_backoff_factor(mut self, factor: f64) -> Self {
        self.retry_backoff_factor = Some(factor);
        self
    }

    pub fn request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = Some(duration);
        self
    }

    /// Fill unset fields from environment variables
    pub fn with_env(mut self) -> Self {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.sec_user_agent, env::var("SEC_USER_AGENT"));
        fill(&mut self.sec_rate_limit, env::parse("SEC_RATE_LIMIT"));
        fill(&mut self.google_api_key, env::var("GOOGLE_API_KEY"));
        fill(&mut self.primary_model, env::var("PRIMARY_MODEL"));
        fill(&mut self.secondary_model, env::var("SECONDARY_MODEL"));
        fill(&mut self.tavily_api_key, env::var("TAVILY_API_KEY"));
        fill(&mut self.tavily_max_results, env::parse("TAVILY_MAX_RESULTS"));
        fill(&mut self.cache_dir, env::var("CACHE_DIR").map(PathBuf::from));
        fill(&mut self.reports_dir, env::var("REPORTS_DIR").map(PathBuf::from));
        fill(&mut self.max_news_items, env::parse("MAX_NEWS_ITEMS"));
        fill(&mut self.max_competitors, env::parse("MAX_COMPETITORS"));
        fill(&mut self.max_retry_attempts, env::parse("MAX_RETRY_ATTEMPTS"));
        fill(&mut self.retry_backoff_factor, env::parse("RETRY_BACKOFF_FACTOR"));
        fill(&mut self.request_timeout, env::seconds("REQUEST_TIMEOUT"));
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<ResearchConfig> {
        let defaults = ResearchConfig::default();

        let config = ResearchConfig {
            sec_user_agent: self.sec_user_agent.unwrap_or(defaults.sec_user_agent),
            sec_rate_limit: self.sec_rate_limit.unwrap_or(defaults.sec_rate_limit),
            google_api_key: self.google_api_key,
            primary_model: self.primary_model.unwrap_or(defaults.primary_model),
            secondary_model: self.secondary_model.unwrap_or(defaults.secondary_model),
            tavily_api_key: self.tavily_api_key,
            tavily_max_results: self.tavily_max_results.unwrap_or(defaults.tavily_max_results),
            cache_dir: self.cache_dir.unwrap_or(defaults.cache_dir),
            reports_dir: self.reports_dir.unwrap_or(defaults.reports_dir),
            max_news_items: self.max_news_items.unwrap_or(defaults.max_news_items),
            max_competitors: self.max_competitors.unwrap_or(defaults.max_competitors),
            max_retry_attempts: self.max_retry_attempts.unwrap_or(defaults.max_retry_attempts),
            retry_backoff_factor: self
                .retry_backoff_factor
                .unwrap_or(defaults.retry_backoff_factor),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }
}
