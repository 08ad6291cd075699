//! Social sentiment over search snippets from retail investor venues

use super::{ANALYZE_SOCIAL_SENTIMENT, complete_structured, llm_request};
use crate::patch::ResearchPatch;
use crate::prompts;
use crate::services::Services;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use research_core::{
    ResearchState, Result, SentimentAggregate, SentimentSample, SocialSentiment,
};
use research_workflow::Branch;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const BATCH_SIZE: usize = 10;
const MIN_SNIPPET_CHARS: usize = 100;
const RESULTS_PER_QUERY: usize = 8;
const MAX_THEMES: usize = 10;
const MAX_SAMPLES: usize = 10;

/// Classification of one snippet as returned by the model
#[derive(Debug, Clone, Deserialize)]
pub struct SnippetSentiment {
    #[serde(default = "neutral")]
    pub sentiment: String,
    #[serde(default = "half")]
    pub confidence: f64,
    #[serde(default)]
    pub themes: Vec<String>,
}

fn neutral() -> String {
    "NEUTRAL".to_string()
}

fn half() -> f64 {
    0.5
}

/// Models answer with a bare array or wrap it in `results`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchReply {
    List(Vec<SnippetSentiment>),
    Wrapped { results: Vec<SnippetSentiment> },
}

impl BatchReply {
    fn into_results(self) -> Vec<SnippetSentiment> {
        match self {
            BatchReply::List(results) | BatchReply::Wrapped { results } => results,
        }
    }
}

/// Theme frequencies, most common first; ties keep first-seen order
fn count_themes<'a>(themes: impl Iterator<Item = &'a String>) -> Vec<(String, usize)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for theme in themes {
        let count = counts.entry(theme.clone()).or_insert(0);
        if *count == 0 {
            order.push(theme.clone());
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|theme| {
            let count = counts.get(&theme).copied().unwrap_or_default();
            (theme, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(MAX_THEMES);
    ranked
}

/// Upper-cased label, with anything outside the four known labels read as
/// `NEUTRAL`
fn normalize_label(label: &str) -> String {
    let upper = label.trim().to_uppercase();
    match upper.as_str() {
        "BULLISH" | "BEARISH" | "NEUTRAL" | "MIXED" => upper,
        _ => {
            warn!("Unknown sentiment label '{}', counting as NEUTRAL", label);
            "NEUTRAL".to_string()
        }
    }
}

/// Aggregate per-snippet classifications into the branch output
///
/// Every result lands in exactly one bucket, so the four counts always sum
/// to `total_analyzed`. Samples pair snippets with results by position, up
/// to ten.
pub fn aggregate(snippets: &[String], results: &[SnippetSentiment]) -> SocialSentiment {
    let mut aggregate = SentimentAggregate {
        total_analyzed: results.len(),
        ..Default::default()
    };

    let labels: Vec<String> = results.iter().map(|r| normalize_label(&r.sentiment)).collect();

    let mut confidence_sum = 0.0;
    for (label, result) in labels.iter().zip(results) {
        match label.as_str() {
            "BULLISH" => aggregate.bullish += 1,
            "BEARISH" => aggregate.bearish += 1,
            "MIXED" => aggregate.mixed += 1,
            _ => aggregate.neutral += 1,
        }
        confidence_sum += result.confidence;
    }
    if !results.is_empty() {
        aggregate.confidence_avg = confidence_sum / results.len() as f64;
    }

    let top_themes = count_themes(results.iter().flat_map(|r| r.themes.iter()));
    aggregate.top_themes = top_themes.clone();

    let samples = snippets
        .iter()
        .zip(results.iter().zip(&labels))
        .take(MAX_SAMPLES)
        .map(|(text, (result, label))| SentimentSample {
            text: text.clone(),
            sentiment: label.clone(),
            confidence: result.confidence,
            themes: result.themes.clone(),
        })
        .collect();

    SocialSentiment {
        aggregate,
        top_themes,
        samples,
    }
}

/// Scrapes social snippets and classifies them in batches
pub struct AnalyzeSocialSentiment {
    services: Arc<Services>,
}

impl AnalyzeSocialSentiment {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn scrape_snippets(&self, company: &str) -> Vec<String> {
        let config = &self.services.config;
        let date_filter = format!(
            "after:{}",
            (Utc::now() - Duration::days(365)).format("%Y-%m-%d")
        );
        let queries = [
            format!("{company} stock reddit {date_filter}"),
            format!("{company} twitter discussion {date_filter}"),
            format!("{company} investor forum {date_filter}"),
            format!("{company} stocktwits recent"),
        ];

        let mut snippets = Vec::new();
        for query in &queries {
            let results = match self.services.search.search(query, RESULTS_PER_QUERY).await {
                Ok(results) => results,
                Err(e) => {
                    warn!("Failed to scrape for query '{}': {}", query, e);
                    continue;
                }
            };

            for result in results {
                let text = result.text();
                if text.chars().count() > MIN_SNIPPET_CHARS {
                    snippets.push(text.chars().take(config.sentiment_snippet_length).collect());
                }
                if snippets.len() >= config.max_sentiment_samples {
                    break;
                }
            }
            if snippets.len() >= config.max_sentiment_samples {
                break;
            }
        }

        info!("Scraped {} social snippets", snippets.len());
        snippets
    }

    async fn classify(&self, company: &str, batch: &[String]) -> Result<Vec<SnippetSentiment>> {
        let config = &self.services.config;
        let request = llm_request(
            &config.secondary_model,
            prompts::SENTIMENT_SYSTEM,
            prompts::sentiment_prompt(company, batch)?,
            config.temperature_validation,
            config.max_tokens_sentiment,
        );

        let reply = complete_structured::<BatchReply>(&self.services, ANALYZE_SOCIAL_SENTIMENT, request)
            .await
            .result
            .map_err(|e| research_core::Error::Llm(e.to_string()))?;
        Ok(reply.into_results())
    }
}

#[async_trait]
impl Branch<ResearchState, ResearchPatch> for AnalyzeSocialSentiment {
    fn name(&self) -> &str {
        ANALYZE_SOCIAL_SENTIMENT
    }

    async fn run(&self, snapshot: Arc<ResearchState>) -> Result<ResearchPatch> {
        let Some(found) = snapshot.found() else {
            warn!("Company not resolved, skipping sentiment analysis");
            return Ok(ResearchPatch::default());
        };
        let company = found.title.as_str();
        info!("Analyzing social sentiment for {}", company);

        let snippets = self.scrape_snippets(company).await;
        if snippets.is_empty() {
            warn!("No social snippets found");
            return Ok(ResearchPatch {
                social_sentiment: Some(SocialSentiment::default()),
                ..Default::default()
            });
        }

        let batches: Vec<&[String]> = snippets.chunks(BATCH_SIZE).collect();
        let mut results = Vec::new();
        for (i, batch) in batches.iter().enumerate() {
            match self.classify(company, batch).await {
                Ok(batch_results) => results.extend(batch_results),
                Err(e) => warn!("Batch {} failed: {}", i + 1, e),
            }
            if i + 1 < batches.len() {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }

        let sentiment = aggregate(&snippets, &results);
        info!("Sentiment: {}", sentiment.aggregate.summary());
        Ok(ResearchPatch {
            social_sentiment: Some(sentiment),
            ..Default::default()
        })
    }
}
