//! Canonical domain entities produced by the research stages
//!
//! Every producer emits exactly these types, so consumers such as synthesis
//! and report rendering never branch on representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum characters kept in a search result's snippet or content
pub const MAX_RESULT_TEXT: usize = 5000;

/// Truncate text to at most `max` characters, appending an ellipsis
pub fn truncate_text(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Search backend that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    /// Tavily search API
    Tavily,
    /// DuckDuckGo instant answer API
    DuckDuckGo,
}

impl SearchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchSource::Tavily => "tavily",
            SearchSource::DuckDuckGo => "duck_duck_go",
        }
    }
}

impl std::fmt::Display for SearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: Option<String>,
    pub domain: Option<String>,
    pub published_date: Option<String>,
    pub content: Option<String>,
    pub source: SearchSource,
}

impl SearchResult {
    /// Create a result; the domain is derived from the URL when it parses
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: SearchSource) -> Self {
        let url = url.into();
        let domain = url::Url::parse(&url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        Self {
            title: title.into(),
            url,
            snippet: None,
            domain,
            published_date: None,
            content: None,
            source,
        }
    }

    /// Attach a snippet, truncated to [`MAX_RESULT_TEXT`]
    pub fn with_snippet(mut self, snippet: impl AsRef<str>) -> Self {
        let snippet = snippet.as_ref();
        if !snippet.is_empty() {
            self.snippet = Some(truncate_text(snippet, MAX_RESULT_TEXT));
        }
        self
    }

    /// Attach page content, truncated to [`MAX_RESULT_TEXT`]
    pub fn with_content(mut self, content: impl AsRef<str>) -> Self {
        let content = content.as_ref();
        if !content.is_empty() {
            self.content = Some(truncate_text(content, MAX_RESULT_TEXT));
        }
        self
    }

    /// Attach a publication date as reported by the source
    pub fn with_published_date(mut self, date: impl Into<String>) -> Self {
        self.published_date = Some(date.into());
        self
    }

    /// Best available text body
    pub fn text(&self) -> &str {
        self.snippet
            .as_deref()
            .or(self.content.as_deref())
            .unwrap_or_default()
    }
}

/// Executive listed in a company profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagementMember {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub background: Option<String>,
}

/// Link to an investor-relations document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestorDoc {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
}

/// Aggregated company profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub description: String,
    pub profile_url: Option<String>,
    pub investor_docs: Vec<InvestorDoc>,
    pub founded: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub employees: Option<u64>,
    pub headquarters: Option<String>,
    pub key_products: Vec<String>,
    pub geographic_presence: Vec<String>,
    pub management_team: Vec<ManagementMember>,
}

/// A competing company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    pub description: String,
    pub source: String,
}

/// Single data point taken from SEC filings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetric {
    pub element: String,
    pub value: Option<f64>,
    pub date: Option<String>,
    pub unit: String,
    pub form_type: Option<String>,
}

impl FinancialMetric {
    /// Human-readable value with B/M suffixes
    pub fn formatted_value(&self) -> String {
        let Some(value) = self.value else {
            return "N/A".to_string();
        };
        let abs = value.abs();
        if abs >= 1_000_000_000.0 {
            format!("${:.2}B", value / 1_000_000_000.0)
        } else if abs >= 1_000_000.0 {
            format!("${:.2}M", value / 1_000_000.0)
        } else {
            format!("${}", group_thousands(value.round() as i64))
        }
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 { format!("-{out}") } else { out }
}

/// Financial statements keyed by metric name; `None` marks a metric that was
/// looked for but not found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatements {
    pub income_statement: BTreeMap<String, Option<FinancialMetric>>,
    pub balance_sheet: BTreeMap<String, Option<FinancialMetric>>,
    pub cashflow: BTreeMap<String, Option<FinancialMetric>>,
    pub extraction_date: DateTime<Utc>,
}

impl Default for FinancialStatements {
    fn default() -> Self {
        Self {
            income_statement: BTreeMap::new(),
            balance_sheet: BTreeMap::new(),
            cashflow: BTreeMap::new(),
            extraction_date: Utc::now(),
        }
    }
}

impl FinancialStatements {
    /// True when both income and balance sheet data were found
    pub fn is_complete(&self) -> bool {
        let has = |m: &BTreeMap<String, Option<FinancialMetric>>| m.values().any(Option::is_some);
        has(&self.income_statement) && has(&self.balance_sheet)
    }

    /// Number of metrics with a value across all statements
    pub fn metric_count(&self) -> usize {
        [&self.income_statement, &self.balance_sheet, &self.cashflow]
            .iter()
            .map(|m| m.values().filter(|v| v.is_some()).count())
            .sum()
    }
}

/// Aggregated sentiment counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentimentAggregate {
    pub total_analyzed: usize,
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
    pub mixed: usize,
    pub confidence_avg: f64,
    pub top_themes: Vec<(String, usize)>,
}

impl SentimentAggregate {
    pub fn bullish_ratio(&self) -> f64 {
        if self.total_analyzed == 0 {
            return 0.0;
        }
        self.bullish as f64 / self.total_analyzed as f64
    }

    pub fn bearish_ratio(&self) -> f64 {
        if self.total_analyzed == 0 {
            return 0.0;
        }
        self.bearish as f64 / self.total_analyzed as f64
    }

    /// Bullish ratio minus bearish ratio
    pub fn net_sentiment(&self) -> f64 {
        self.bullish_ratio() - self.bearish_ratio()
    }

    /// Overall direction of the net sentiment
    pub fn label(&self) -> &'static str {
        let net = self.net_sentiment();
        if net > 0.15 {
            "Strongly Bullish"
        } else if net > 0.05 {
            "Bullish"
        } else if net < -0.15 {
            "Strongly Bearish"
        } else if net < -0.05 {
            "Bearish"
        } else {
            "Neutral"
        }
    }

    /// Human-readable label with bullish/bearish/neutral counts
    pub fn summary(&self) -> String {
        format!(
            "{} ({}/{}/{} posts)",
            self.label(),
            self.bullish,
            self.bearish,
            self.neutral
        )
    }
}

/// One analyzed social snippet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSample {
    pub text: String,
    pub sentiment: String,
    pub confidence: f64,
    pub themes: Vec<String>,
}

/// Social sentiment branch output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialSentiment {
    pub aggregate: SentimentAggregate,
    pub top_themes: Vec<(String, usize)>,
    pub samples: Vec<SentimentSample>,
}
