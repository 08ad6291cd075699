//! Markdown and JSON report rendering

use super::GENERATE_REPORT;
use crate::services::Services;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use research_core::{FinancialMetric, ResearchState, Result, Stage};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const DISCLAIMER: &str = "*This report was generated from SEC EDGAR filings, web search results \
and LLM analysis. Information is for research purposes only and should not be considered \
investment advice.*";

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn statements(state: &ResearchState) -> Vec<(&'static str, &BTreeMap<String, Option<FinancialMetric>>)> {
    state
        .financials_1yr
        .as_ref()
        .map(|f| {
            vec![
                ("Income", &f.income_statement),
                ("Balance", &f.balance_sheet),
                ("Cashflow", &f.cashflow),
            ]
        })
        .unwrap_or_default()
}

/// "net_income" -> "Net Income"
fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut output = format!("| {} |\n", headers.join(" | "));
    output.push_str(&format!(
        "|{}|\n",
        headers.iter().map(|_| "---").collect::<Vec<_>>().join("|")
    ));
    for row in rows {
        output.push_str(&format!("| {} |\n", row.join(" | ")));
    }
    output
}

fn percent(count: usize, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", count as f64 * 100.0 / total as f64)
}

/// Render the human-readable report
pub fn render_markdown(state: &ResearchState, generated: DateTime<Local>) -> String {
    let Some(found) = state.found() else {
        return "# Research Report\n\nNo company data available.".to_string();
    };

    let mut out = format!("# Investment Research Report: {}\n\n", found.title);
    out.push_str(&format!(
        "**Generated:** {}\n**Ticker:** {} | **CIK:** {}\n\n---\n\n",
        generated.format("%Y-%m-%d %H:%M:%S"),
        found.ticker,
        found.cik_str
    ));

    if let Some(profile) = &state.company_profile {
        out.push_str("## Company Overview\n\n");
        out.push_str(&format!("**Industry:** {}\n", or_na(profile.industry.as_ref())));
        out.push_str(&format!("**Sector:** {}\n", or_na(profile.sector.as_ref())));
        out.push_str(&format!("**Founded:** {}\n", or_na(profile.founded.as_ref())));
        out.push_str(&format!(
            "**Headquarters:** {}\n",
            or_na(profile.headquarters.as_ref())
        ));
        out.push_str(&format!("**Employees:** {}\n\n", or_na(profile.employees)));

        out.push_str("### Business Description\n");
        if profile.description.is_empty() {
            out.push_str("No description available\n\n");
        } else {
            out.push_str(&format!("{}\n\n", profile.description));
        }

        if !profile.key_products.is_empty() {
            out.push_str(&format!(
                "**Key Products:** {}\n\n",
                profile.key_products.join(", ")
            ));
        }
        if !profile.management_team.is_empty() {
            out.push_str("### Management\n\n");
            for member in &profile.management_team {
                out.push_str(&format!("- **{}**, {}\n", member.name, member.title));
            }
            out.push('\n');
        }
        out.push_str("---\n\n");
    }

    let rows: Vec<Vec<String>> = statements(state)
        .into_iter()
        .flat_map(|(label, statement)| {
            statement.iter().filter_map(move |(key, metric)| {
                let metric = metric.as_ref()?;
                Some(vec![
                    label.to_string(),
                    title_case(key),
                    metric.formatted_value(),
                    or_na(metric.date.as_ref().or(metric.form_type.as_ref())),
                ])
            })
        })
        .collect();
    if state.financials_1yr.is_some() {
        out.push_str("## Financial Analysis\n\n### Key Metrics\n\n");
        out.push_str(&format_table(&["Statement", "Metric", "Value", "Date"], &rows));
        out.push_str("\n---\n\n");
    }

    if !state.news_timeline.is_empty() {
        out.push_str("## Recent News & Events\n\n");
        for article in state.news_timeline.iter().take(10) {
            out.push_str(&format!("### {}\n", article.title));
            out.push_str(&format!(
                "**Date:** {}\n",
                article.published_date.as_deref().unwrap_or("Recent")
            ));
            out.push_str(&format!(
                "**Source:** {}\n\n",
                article
                    .domain
                    .clone()
                    .unwrap_or_else(|| article.source.to_string())
            ));
            out.push_str(&format!(
                "{}\n\n[Read more]({})\n\n",
                article.snippet.as_deref().unwrap_or("No summary available"),
                article.url
            ));
        }
        out.push_str("---\n\n");
    }

    if let Some(sentiment) = &state.social_sentiment {
        let agg = &sentiment.aggregate;
        out.push_str("## Social Sentiment Analysis\n\n");
        out.push_str(&format!("**Total Analyzed:** {}\n", agg.total_analyzed));
        out.push_str(&format!(
            "**Average Confidence:** {:.1}%\n\n",
            agg.confidence_avg * 100.0
        ));
        out.push_str("### Sentiment Distribution\n\n");
        let total = agg.total_analyzed;
        out.push_str(&format_table(
            &["Sentiment", "Count", "Percentage"],
            &[
                vec!["🟢 Bullish".to_string(), agg.bullish.to_string(), percent(agg.bullish, total)],
                vec!["🔴 Bearish".to_string(), agg.bearish.to_string(), percent(agg.bearish, total)],
                vec!["⚪ Neutral".to_string(), agg.neutral.to_string(), percent(agg.neutral, total)],
                vec!["🟡 Mixed".to_string(), agg.mixed.to_string(), percent(agg.mixed, total)],
            ],
        ));
        out.push_str(&format!("\n**Overall:** {}\n\n", agg.summary()));

        if !sentiment.top_themes.is_empty() {
            out.push_str("### Top Discussion Themes\n\n");
            for (theme, count) in &sentiment.top_themes {
                out.push_str(&format!("- {theme} ({count} mentions)\n"));
            }
            out.push('\n');
        }
        out.push_str("---\n\n");
    }

    if !state.competitors.is_empty() {
        out.push_str("## Competitive Landscape\n\n");
        for competitor in state.competitors.iter().take(5) {
            out.push_str(&format!(
                "### {}\n{}\n\n",
                competitor.name, competitor.description
            ));
        }
        out.push_str("---\n\n");
    }

    if !state.investor_materials.is_empty() {
        out.push_str("## SEC Filings (Last 12 Months)\n\n");
        for doc in &state.investor_materials {
            out.push_str(&format!("- [{}]({})\n", doc.title, doc.url));
        }
        out.push_str("\n---\n\n");
    }

    if let Some(insights) = &state.synthesized_insights {
        out.push_str(&format!(
            "## Investment Analysis & Synthesis\n\n{insights}\n\n---\n\n"
        ));
    }

    out.push_str(DISCLAIMER);
    out
}

/// Render the machine-readable report
pub fn render_json(state: &ResearchState, generated: DateTime<Local>) -> Value {
    let found = state.found();

    let metrics: Vec<Value> = statements(state)
        .into_iter()
        .flat_map(|(label, statement)| {
            statement.iter().filter_map(move |(key, metric)| {
                let metric = metric.as_ref()?;
                Some(json!({
                    "statement": label.to_lowercase(),
                    "label": key,
                    "value": metric.value,
                    "unit": metric.unit,
                    "date": metric.date,
                    "form_type": metric.form_type,
                }))
            })
        })
        .collect();

    json!({
        "metadata": {
            "generated_at": generated.to_rfc3339(),
            "run_id": state.run_id,
            "company_name": found.map(|f| &f.title),
            "ticker": found.map(|f| &f.ticker),
            "cik": found.map(|f| &f.cik_str),
            "pipeline_status": state.status,
            "retry_counts": state.retry_counts,
        },
        "company_profile": state.company_profile,
        "financials": state.financials_1yr.as_ref().map(|f| json!({
            "extraction_date": f.extraction_date.to_rfc3339(),
            "metrics": metrics,
        })),
        "news": state.news_timeline.iter().map(|n| json!({
            "title": n.title,
            "url": n.url,
            "source": n.domain.clone().unwrap_or_else(|| n.source.to_string()),
            "date": n.published_date,
            "snippet": n.snippet,
        })).collect::<Vec<_>>(),
        "sentiment": state.social_sentiment.as_ref().map(|s| json!({
            "total_analyzed": s.aggregate.total_analyzed,
            "bullish": s.aggregate.bullish,
            "bearish": s.aggregate.bearish,
            "neutral": s.aggregate.neutral,
            "mixed": s.aggregate.mixed,
            "bullish_ratio": s.aggregate.bullish_ratio(),
            "bearish_ratio": s.aggregate.bearish_ratio(),
            "confidence_avg": s.aggregate.confidence_avg,
            "summary": s.aggregate.summary(),
            "top_themes": s.top_themes,
        })),
        "competitors": state.competitors,
        "investor_materials": state.investor_materials,
        "synthesis": state.synthesized_insights,
        "error_message": state.error_message,
    })
}

/// Paths of a written report pair
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub markdown: PathBuf,
    pub json: PathBuf,
}

/// Write both renderings into `dir` as `<thread_id>_<timestamp>.{md,json}`
pub async fn save_reports(
    state: &ResearchState,
    dir: &Path,
    generated: DateTime<Local>,
) -> Result<(String, ReportPaths)> {
    tokio::fs::create_dir_all(dir).await?;

    let stem = format!("{}_{}", state.thread_id(), generated.format("%Y%m%d_%H%M%S"));
    let paths = ReportPaths {
        markdown: dir.join(format!("{stem}.md")),
        json: dir.join(format!("{stem}.json")),
    };

    let markdown = render_markdown(state, generated);
    let json = serde_json::to_string_pretty(&render_json(state, generated))?;
    tokio::fs::write(&paths.markdown, &markdown).await?;
    tokio::fs::write(&paths.json, json).await?;

    Ok((markdown, paths))
}

/// Writes the reports into the configured directory
pub struct GenerateReport {
    services: Arc<Services>,
}

impl GenerateReport {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<ResearchState> for GenerateReport {
    fn name(&self) -> &str {
        GENERATE_REPORT
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        if state.found().is_none() {
            warn!("No company data to save");
            return Ok(());
        }
        info!("Generating final report...");

        let dir = &self.services.config.reports_dir;
        match save_reports(state, dir, Local::now()).await {
            Ok((markdown, paths)) => {
                info!(
                    "Reports saved: {} and {}",
                    paths.markdown.display(),
                    paths.json.display()
                );
                state.final_report = Some(markdown);
                state.report_path = Some(paths.markdown.display().to_string());
                state.json_report_path = Some(paths.json.display().to_string());
            }
            Err(e) => {
                error!("Report generation failed: {}", e);
                state.record_error(format!("Report generation failed: {e}"));
            }
        }
        Ok(())
    }
}
