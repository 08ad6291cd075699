//! End-to-end runs of the research graph against in-memory collaborators

use async_trait::async_trait;
use chrono::{Duration, Utc};
use research_agent::error::{Result as SourceResult, SourceError};
use research_agent::prompts;
use research_agent::stages::{
    DEEP_RESEARCH_FANOUT, GENERATE_REPORT, LOAD_REFERENCE_DATA, MARK_COMPLETE, MARK_IN_PROGRESS,
    MATCH_CANDIDATES, RESOLVE_SELECTION, SUGGEST_AND_SEARCH, VALIDATE_MATCH,
};
use research_agent::{
    FilingSource, PageFetcher, ReferenceSource, ResearchConfig, ResearchPipeline, Services,
    WebSearch,
};
use research_core::{
    CompanyMatch, Error, PipelineStatus, ResearchState, SearchResult, SearchSource, TickerRecord,
};
use research_llm::{CompletionRequest, CompletionResponse, LLMProvider};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// In-memory collaborators
// ============================================================================

struct Tickers {
    records: Vec<TickerRecord>,
    calls: AtomicUsize,
}

#[async_trait]
impl ReferenceSource for Tickers {
    async fn company_tickers(&self) -> SourceResult<Vec<TickerRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

fn days_ago(days: i64) -> String {
    (Utc::now() - Duration::days(days)).format("%Y-%m-%d").to_string()
}

struct Filings;

#[async_trait]
impl FilingSource for Filings {
    async fn company_facts(&self, _cik10: &str) -> SourceResult<Value> {
        Ok(json!({"facts": {"us-gaap": {
            "Revenues": {"units": {"USD": [{"end": days_ago(100), "val": 94_036_000_000_i64, "form": "10-Q"}]}},
            "Assets": {"units": {"USD": [{"end": days_ago(100), "val": 331_495_000_000_i64, "form": "10-Q"}]}}
        }}}))
    }

    async fn submissions(&self, _cik10: &str) -> SourceResult<Value> {
        Ok(json!({"filings": {"recent": {
            "form": ["10-Q", "4"],
            "accessionNumber": ["0000320193-25-000073", "0000320193-25-000070"],
            "filingDate": [days_ago(60), days_ago(61)],
            "primaryDocument": ["aapl-10q.htm", "form4.xml"]
        }}}))
    }
}

/// An EDGAR outage
struct FailingFilings;

#[async_trait]
impl FilingSource for FailingFilings {
    async fn company_facts(&self, _cik10: &str) -> SourceResult<Value> {
        Err(SourceError::Status {
            service: "SEC".to_string(),
            status: 503,
            message: "Service Unavailable".to_string(),
        })
    }

    async fn submissions(&self, _cik10: &str) -> SourceResult<Value> {
        Err(SourceError::Status {
            service: "SEC".to_string(),
            status: 503,
            message: "Service Unavailable".to_string(),
        })
    }
}

struct Search;

#[async_trait]
impl WebSearch for Search {
    async fn search(&self, _query: &str, _max_results: usize) -> SourceResult<Vec<SearchResult>> {
        let body = "Apple reported record services revenue this quarter and investors on forums \
                    are debating whether the valuation already prices in the next iPhone cycle.";
        Ok(vec![
            SearchResult::new("About Apple", "https://www.apple.com/about/", SearchSource::Tavily)
                .with_snippet(body),
            SearchResult::new(
                "Samsung vs Apple",
                "https://news.example.com/samsung-apple",
                SearchSource::Tavily,
            )
            .with_snippet(body)
            .with_published_date(days_ago(10)),
        ])
    }
}

struct Pages;

#[async_trait]
impl PageFetcher for Pages {
    async fn fetch_text(&self, _url: &str) -> SourceResult<String> {
        Ok("Apple Inc. designs smartphones, computers and wearables. Founded in 1976.".to_string())
    }
}

/// Answers each task by its system prompt
struct ScriptedLlm {
    validation: &'static str,
    suggestions: &'static str,
}

impl ScriptedLlm {
    fn accepting() -> Self {
        Self {
            validation: r#"{"confidence": "HIGH", "match": "YES", "reasoning": "Exact name"}"#,
            suggestions: "Apple Inc.",
        }
    }

    fn doubtful() -> Self {
        Self {
            validation: r#"{"confidence": "LOW", "match": "NO", "reasoning": "Ambiguous"}"#,
            suggestions: "Apple Inc.",
        }
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> research_llm::Result<CompletionResponse> {
        let system = request.system.as_deref().unwrap_or_default();
        let text = if system == prompts::VALIDATION_SYSTEM {
            self.validation
        } else if system == prompts::SUGGESTIONS_SYSTEM {
            self.suggestions
        } else if system == prompts::CLEANING_SYSTEM {
            "Apple Inc. designs smartphones, computers and wearables."
        } else if system == prompts::EXTRACTION_SYSTEM {
            r#"{"industry": "Consumer Electronics", "founded": "1976", "headquarters": "Cupertino, California"}"#
        } else if system == prompts::COMPETITORS_SYSTEM {
            r#"{"competitors": [{"name": "Samsung Electronics", "description": "Android devices"}]}"#
        } else if system == prompts::SENTIMENT_SYSTEM {
            r#"{"results": [{"post_num": 1, "sentiment": "BULLISH", "confidence": 0.8, "themes": ["services"]}]}"#
        } else {
            "## Executive Summary\nApple had a solid year."
        };
        Ok(CompletionResponse::from_text(text))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn records() -> Vec<TickerRecord> {
    vec![
        TickerRecord::new("320193", "AAPL", "Apple Inc."),
        TickerRecord::new("789019", "MSFT", "MICROSOFT CORP"),
    ]
}

struct Harness {
    pipeline: ResearchPipeline,
    tickers: Arc<Tickers>,
    _reports: tempfile::TempDir,
}

fn harness(llm: ScriptedLlm) -> Harness {
    harness_with(llm, Arc::new(Filings))
}

fn harness_with(llm: ScriptedLlm, filings: Arc<dyn FilingSource>) -> Harness {
    let reports = tempfile::tempdir().unwrap();
    let config = ResearchConfig {
        reports_dir: reports.path().to_path_buf(),
        ..Default::default()
    };
    let tickers = Arc::new(Tickers {
        records: records(),
        calls: AtomicUsize::new(0),
    });
    let services = Services {
        config: Arc::new(config),
        reference: Arc::clone(&tickers) as Arc<dyn ReferenceSource>,
        filings,
        search: Arc::new(Search),
        pages: Arc::new(Pages),
        llm: Arc::new(llm),
        resolver: None,
    };
    Harness {
        pipeline: ResearchPipeline::new(Arc::new(services)).unwrap(),
        tickers,
        _reports: reports,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_pre_resolved_company_runs_to_completion() {
    let h = harness(ScriptedLlm::accepting());
    let state =
        ResearchState::with_selected_company(CompanyMatch::new("Apple Inc.", "AAPL", "320193"))
            .unwrap();

    let outcome = h.pipeline.run(state).await.unwrap();
    let state = outcome.state;

    assert_eq!(outcome.visited[0], LOAD_REFERENCE_DATA);
    assert_eq!(outcome.visited[1], MARK_IN_PROGRESS);
    assert!(!outcome.visited.iter().any(|s| s == MATCH_CANDIDATES));
    assert_eq!(outcome.visited.last().map(String::as_str), Some(MARK_COMPLETE));
    assert_eq!(h.tickers.calls.load(Ordering::SeqCst), 0);

    assert_eq!(state.status, PipelineStatus::Completed);
    assert!(state.execution_end.is_some());
    assert!(state.financials_1yr.as_ref().unwrap().is_complete());

    let profile = state.company_profile.as_ref().unwrap();
    assert_eq!(profile.industry.as_deref(), Some("Consumer Electronics"));
    assert_eq!(profile.profile_url.as_deref(), Some("https://www.apple.com/about/"));

    assert_eq!(state.news_timeline.len(), 2);
    assert_eq!(state.competitors[0].name, "Samsung Electronics");
    assert_eq!(state.investor_materials.len(), 1);
    assert_eq!(state.investor_materials[0].form_type.as_deref(), Some("10-Q"));
    assert_eq!(state.social_sentiment.as_ref().unwrap().aggregate.bullish, 1);
    assert_eq!(
        state.synthesized_insights.as_deref(),
        Some("## Executive Summary\nApple had a solid year.")
    );

    let report = state.final_report.as_deref().unwrap();
    assert!(report.starts_with("# Investment Research Report: Apple Inc."));
    assert!(Path::new(state.report_path.as_deref().unwrap()).exists());
    assert!(Path::new(state.json_report_path.as_deref().unwrap()).exists());
    assert!(state.error_message.is_none());
}

#[tokio::test]
async fn test_filing_outage_still_completes_with_web_research() {
    let h = harness_with(ScriptedLlm::accepting(), Arc::new(FailingFilings));
    let state =
        ResearchState::with_selected_company(CompanyMatch::new("Apple Inc.", "AAPL", "320193"))
            .unwrap();

    let outcome = h.pipeline.run(state).await.unwrap();
    let state = outcome.state;

    assert_eq!(state.status, PipelineStatus::Completed);
    assert_eq!(outcome.visited.last().map(String::as_str), Some(MARK_COMPLETE));
    assert!(state.error_message.is_none());

    let profile = state.company_profile.as_ref().unwrap();
    assert_eq!(profile.industry.as_deref(), Some("Consumer Electronics"));
    assert_eq!(state.competitors[0].name, "Samsung Electronics");

    assert!(state.companyfacts.is_none());
    assert!(state.submissions.is_none());
    assert!(state.financials_1yr.is_none());
    assert!(state.investor_materials.is_empty());
    assert!(state.final_report.is_some());
}

#[tokio::test]
async fn test_single_candidate_is_still_validated() {
    let h = harness(ScriptedLlm::accepting());

    let outcome = h.pipeline.run(ResearchState::new("Apple Inc.")).await.unwrap();

    assert_eq!(
        &outcome.visited[..4],
        &[
            LOAD_REFERENCE_DATA.to_string(),
            MATCH_CANDIDATES.to_string(),
            VALIDATE_MATCH.to_string(),
            MARK_IN_PROGRESS.to_string(),
        ]
    );
    assert!(!outcome.visited.iter().any(|s| s == RESOLVE_SELECTION));
    assert!(outcome.visited.iter().any(|s| s == DEEP_RESEARCH_FANOUT));
    assert!(outcome.visited.iter().any(|s| s == GENERATE_REPORT));
    assert_eq!(outcome.state.cik10(), Some("0000320193"));
    assert_eq!(outcome.state.status, PipelineStatus::Completed);
    assert_eq!(h.tickers.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_match_ends_after_suggestions() {
    let h = harness(ScriptedLlm {
        validation: "{}",
        suggestions: "Zzyzx Holdings, Widget World",
    });

    let outcome = h
        .pipeline
        .run(ResearchState::new("Zzyzx Widgets"))
        .await
        .unwrap();

    assert_eq!(
        outcome.visited,
        vec![
            LOAD_REFERENCE_DATA.to_string(),
            MATCH_CANDIDATES.to_string(),
            SUGGEST_AND_SEARCH.to_string(),
        ]
    );
    assert!(outcome.state.found().is_none());
    assert!(outcome.state.match_options.is_empty());
    assert_eq!(outcome.state.llm_suggestions.len(), 2);
    assert!(outcome.state.final_report.is_none());
}

#[tokio::test]
async fn test_doubtful_validation_uses_human_choice() {
    let h = harness(ScriptedLlm::doubtful());

    let state = ResearchState::new("Apple Inc.").with_human_response("1");
    let outcome = h.pipeline.run(state).await.unwrap();

    assert!(outcome.visited.iter().any(|s| s == RESOLVE_SELECTION));
    assert!(!outcome.state.llm_validation_passed);
    assert_eq!(outcome.state.found().map(|f| f.ticker.as_str()), Some("AAPL"));
    assert_eq!(outcome.state.status, PipelineStatus::Completed);
}

#[tokio::test]
async fn test_declined_selection_ends_unresolved() {
    let h = harness(ScriptedLlm::doubtful());

    let state = ResearchState::new("Apple Inc.").with_human_response("none");
    let outcome = h.pipeline.run(state).await.unwrap();

    assert_eq!(outcome.visited.last().map(String::as_str), Some(RESOLVE_SELECTION));
    assert!(outcome.state.found().is_none());
    assert_eq!(outcome.state.status, PipelineStatus::AwaitingHitl);
}

#[tokio::test]
async fn test_invalid_selection_fails_with_preserved_state() {
    let h = harness(ScriptedLlm::doubtful());

    let state = ResearchState::new("Apple Inc.").with_human_response("9");
    let failure = h.pipeline.run(state).await.unwrap_err();

    assert!(matches!(
        failure.error.stage_error(),
        Some(Error::InvalidSelection(_))
    ));
    assert_eq!(failure.visited.last().map(String::as_str), Some(RESOLVE_SELECTION));
    assert_eq!(failure.state.status, PipelineStatus::Failed);
    assert_eq!(failure.state.current_node, RESOLVE_SELECTION);
    assert!(
        failure
            .state
            .error_message
            .as_deref()
            .unwrap()
            .contains("out of range")
    );
    // data gathered before the failure is kept
    assert_eq!(failure.state.match_options.len(), 1);
    assert!(failure.state.validation_result.is_some());
}
