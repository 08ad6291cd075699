//! Report synthesis with the primary model and a secondary fallback

use super::{SYNTHESIZE, complete_text, llm_request};
use crate::prompts;
use crate::services::Services;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use regex::Regex;
use research_core::models::truncate_text;
use research_core::{
    FinancialMetric, PipelineStatus, ResearchState, Result, SocialSentiment, Stage,
};
use research_llm::{CompletionRequest, LLMError};
use research_resilience::ServiceFallback;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

const MAX_NEWS: usize = 10;
const MAX_DESCRIPTION: usize = 2000;
const MAX_COMPETITORS: usize = 5;
const MAX_THEMES: usize = 5;
const MAX_NEWS_SNIPPET: usize = 300;

/// Data handed to the synthesis prompt
#[derive(Debug, Clone, Default, Serialize)]
pub struct SynthesisContext {
    pub company_name: String,
    pub ticker: Option<String>,
    pub period_start: String,
    pub period_end: String,
    pub industry: String,
    pub sector: String,
    pub founded: String,
    pub headquarters: String,
    pub employees: String,
    pub key_products: Vec<String>,
    pub description: String,
    pub financials: Vec<String>,
    pub news: Vec<NewsLine>,
    pub sentiment: Option<SentimentLine>,
    pub competitors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsLine {
    pub date: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SentimentLine {
    pub total: usize,
    pub bullish_pct: String,
    pub bearish_pct: String,
    pub neutral_pct: String,
    pub net: String,
    pub label: &'static str,
    pub themes: Vec<String>,
}

fn or_na(value: Option<&String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| "N/A".to_string())
}

/// "operating_cashflow" -> "Operating cashflow"
fn metric_label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn financial_lines(statement: &BTreeMap<String, Option<FinancialMetric>>) -> Vec<String> {
    statement
        .iter()
        .filter_map(|(key, metric)| {
            let metric = metric.as_ref()?;
            let as_of = metric
                .date
                .as_deref()
                .or(metric.form_type.as_deref())
                .unwrap_or("N/A");
            Some(format!(
                "{}: {} (as of {})",
                metric_label(key),
                metric.formatted_value(),
                as_of
            ))
        })
        .collect()
}

fn sentiment_line(sentiment: &SocialSentiment) -> Option<SentimentLine> {
    let agg = &sentiment.aggregate;
    if agg.total_analyzed == 0 {
        return None;
    }
    let pct = |count: usize| format!("{:.1}", count as f64 * 100.0 / agg.total_analyzed as f64);
    Some(SentimentLine {
        total: agg.total_analyzed,
        bullish_pct: pct(agg.bullish),
        bearish_pct: pct(agg.bearish),
        neutral_pct: pct(agg.neutral),
        net: format!("{:+.2}", agg.net_sentiment()),
        label: agg.label(),
        themes: sentiment
            .top_themes
            .iter()
            .take(MAX_THEMES)
            .map(|(theme, _)| theme.clone())
            .collect(),
    })
}

/// Collect and trim everything the synthesis prompt needs
pub fn build_context(state: &ResearchState) -> SynthesisContext {
    let now = Utc::now();
    let mut ctx = SynthesisContext {
        company_name: state
            .found()
            .map_or_else(|| state.company_name.clone(), |f| f.title.clone()),
        ticker: state.found().map(|f| f.ticker.clone()),
        period_start: (now - Duration::days(365)).format("%Y-%m-%d").to_string(),
        period_end: now.format("%Y-%m-%d").to_string(),
        ..Default::default()
    };

    let profile = state.company_profile.as_ref();
    ctx.industry = or_na(profile.and_then(|p| p.industry.as_ref()));
    ctx.sector = or_na(profile.and_then(|p| p.sector.as_ref()));
    ctx.founded = or_na(profile.and_then(|p| p.founded.as_ref()));
    ctx.headquarters = or_na(profile.and_then(|p| p.headquarters.as_ref()));
    ctx.employees = profile
        .and_then(|p| p.employees)
        .map_or_else(|| "N/A".to_string(), |n| n.to_string());
    ctx.key_products = profile.map(|p| p.key_products.clone()).unwrap_or_default();
    ctx.description = match profile.map(|p| p.description.trim()) {
        Some(desc) if !desc.is_empty() => truncate_text(desc, MAX_DESCRIPTION),
        _ => "No description available".to_string(),
    };

    if let Some(financials) = &state.financials_1yr {
        ctx.financials = [
            &financials.income_statement,
            &financials.balance_sheet,
            &financials.cashflow,
        ]
        .into_iter()
        .flat_map(financial_lines)
        .collect();
    }

    ctx.news = state
        .news_timeline
        .iter()
        .take(MAX_NEWS)
        .map(|article| NewsLine {
            date: article
                .published_date
                .clone()
                .unwrap_or_else(|| "Recent".to_string()),
            title: article.title.clone(),
            snippet: article
                .snippet
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(MAX_NEWS_SNIPPET)
                .collect(),
        })
        .collect();

    ctx.sentiment = state.social_sentiment.as_ref().and_then(sentiment_line);
    ctx.competitors = state
        .competitors
        .iter()
        .take(MAX_COMPETITORS)
        .map(|c| c.name.clone())
        .collect();

    ctx
}

/// Spacing repairs applied in order by [`normalize_markdown`]
static MARKDOWN_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\*(\w+)\*\*(\w+)\*", "*$1* *$2*"),
        (r"(\d+)\*(\w+)\*", "$1 *$2*"),
        (r"\*(\w+)\*and\*(\w+)\*", "*$1* and *$2*"),
        (r"\*(\w+)\*of\*(\w+)\*", "*$1* of *$2*"),
        (r"\*([A-Z][a-z]+)([A-Z][a-z]+)\*", "*$1 $2*"),
        (r"([a-zA-Z])\(", "$1 ("),
        // runs of spaces inside a line; leading indentation is kept
        (r"(\S) {2,}", "$1 "),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Some((Regex::new(pattern).ok()?, replacement)))
    .collect()
});

/// Repair spacing the models tend to drop around Markdown emphasis
pub fn normalize_markdown(text: &str) -> String {
    let mut text = text.to_string();
    for (re, replacement) in MARKDOWN_RULES.iter() {
        text = re.replace_all(&text, *replacement).into_owned();
    }
    text
}

/// Writes the research report body
pub struct Synthesize {
    services: Arc<Services>,
    models: ServiceFallback<CompletionRequest, String, LLMError>,
}

impl Synthesize {
    pub fn new(services: Arc<Services>) -> Self {
        let models = ServiceFallback::new(SYNTHESIZE)
            .register(
                "primary",
                0,
                model_call(Arc::clone(&services), services.config.primary_model.clone()),
            )
            .register(
                "secondary",
                1,
                model_call(Arc::clone(&services), services.config.secondary_model.clone()),
            );
        Self { services, models }
    }
}

fn model_call(
    services: Arc<Services>,
    model: String,
) -> impl Fn(CompletionRequest) -> BoxFuture<'static, std::result::Result<String, LLMError>>
+ Send
+ Sync
+ 'static {
    move |request| {
        let services = Arc::clone(&services);
        let request = CompletionRequest {
            model: model.clone(),
            ..request
        };
        async move {
            info!("Generating synthesis with {}...", request.model);
            let operation = format!("{SYNTHESIZE}:{}", request.model);
            complete_text(&services, &operation, request).await.result
        }
        .boxed()
    }
}

#[async_trait]
impl Stage<ResearchState> for Synthesize {
    fn name(&self) -> &str {
        SYNTHESIZE
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        if state.found().is_none() {
            warn!("Company not resolved, skipping synthesis");
            return Ok(());
        }
        state.status = PipelineStatus::Synthesizing;

        let check = state.check();
        for warning in &check.warnings {
            warn!("Synthesis input: {}", warning);
        }

        let config = &self.services.config;
        let request = llm_request(
            &config.primary_model,
            prompts::SYNTHESIS_SYSTEM,
            prompts::synthesis_prompt(&build_context(state))?,
            config.temperature_synthesis,
            config.max_tokens_synthesis,
        );

        match self.models.call(request).await {
            Some(text) => {
                let insights = normalize_markdown(&text);
                info!("Generated {} char synthesis", insights.len());
                state.synthesized_insights = Some(insights);
            }
            None => {
                warn!("Both synthesis models failed");
                state.synthesized_insights = Some("Failed to generate synthesis.".to_string());
                state.record_error(
                    "Synthesis node failed: no model produced a report (fallback attempted)",
                );
            }
        }
        Ok(())
    }
}
