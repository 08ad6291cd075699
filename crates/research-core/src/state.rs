//! Research state threaded through every pipeline stage
//!
//! A single `ResearchState` is created at the start of a run and owned by
//! the workflow engine. Each stage receives it by `&mut` and writes only the
//! fields of its own phase.

use crate::company::{CompanyMatch, TickerRecord, ValidationResult};
use crate::error::{Error, Result};
use crate::models::{
    CompanyProfile, Competitor, FinancialStatements, InvestorDoc, SearchResult, SocialSentiment,
};
use crate::stage::WorkflowState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Status of a research run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Initializing,
    AwaitingHitl,
    FetchingData,
    ResearchInProgress,
    Synthesizing,
    Completed,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Initializing => "initializing",
            PipelineStatus::AwaitingHitl => "awaiting_hitl",
            PipelineStatus::FetchingData => "fetching_data",
            PipelineStatus::ResearchInProgress => "research_in_progress",
            PipelineStatus::Synthesizing => "synthesizing",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable research context for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchState {
    pub run_id: Uuid,
    pub company_name: String,

    pub status: PipelineStatus,
    pub current_node: String,
    pub error_message: Option<String>,

    // Identity resolution
    pub company_tickers: Vec<TickerRecord>,
    pub match_options: Vec<CompanyMatch>,
    pub human_response: Option<String>,
    #[serde(default, deserialize_with = "resolved_company")]
    found: Option<CompanyMatch>,
    pub llm_suggestions: Vec<String>,

    // Validation
    pub llm_validation_passed: bool,
    pub validation_result: Option<ValidationResult>,

    // SEC data
    pub companyfacts: Option<serde_json::Value>,
    pub submissions: Option<serde_json::Value>,
    pub financials_1yr: Option<FinancialStatements>,

    // Web research
    pub company_profile: Option<CompanyProfile>,
    pub news_timeline: Vec<SearchResult>,
    pub social_sentiment: Option<SocialSentiment>,
    pub competitors: Vec<Competitor>,
    pub investor_materials: Vec<InvestorDoc>,

    // Synthesis and report
    pub synthesized_insights: Option<String>,
    pub final_report: Option<String>,
    pub report_path: Option<String>,
    pub json_report_path: Option<String>,

    pub execution_start: DateTime<Utc>,
    pub execution_end: Option<DateTime<Utc>>,
    pub retry_counts: HashMap<String, u32>,
}

impl ResearchState {
    /// Create a state holding only the company name
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            company_name: company_name.into(),
            status: PipelineStatus::Initializing,
            current_node: "start".to_string(),
            error_message: None,
            company_tickers: Vec::new(),
            match_options: Vec::new(),
            human_response: None,
            found: None,
            llm_suggestions: Vec::new(),
            llm_validation_passed: false,
            validation_result: None,
            companyfacts: None,
            submissions: None,
            financials_1yr: None,
            company_profile: None,
            news_timeline: Vec::new(),
            social_sentiment: None,
            competitors: Vec::new(),
            investor_materials: Vec::new(),
            synthesized_insights: None,
            final_report: None,
            report_path: None,
            json_report_path: None,
            execution_start: Utc::now(),
            execution_end: None,
            retry_counts: HashMap::new(),
        }
    }

    /// Create a state whose identity was supplied out of band
    pub fn with_selected_company(company: CompanyMatch) -> Result<Self> {
        let mut state = Self::new(company.title.clone());
        state.resolve_to(company)?;
        Ok(state)
    }

    /// Set a human answer for the selection stage
    pub fn with_human_response(mut self, response: impl Into<String>) -> Self {
        self.human_response = Some(response.into());
        self
    }

    /// Resolved company, if any
    pub fn found(&self) -> Option<&CompanyMatch> {
        self.found.as_ref()
    }

    /// Padded CIK of the resolved company
    ///
    /// Always `Some` once `found()` is.
    pub fn cik10(&self) -> Option<&str> {
        self.found.as_ref().and_then(CompanyMatch::cik10)
    }

    /// Resolve the identity
    ///
    /// A candidate whose CIK is not numeric cannot be queried against EDGAR
    /// and is rejected, leaving the state unresolved.
    pub fn resolve_to(&mut self, company: CompanyMatch) -> Result<()> {
        if company.cik10().is_none() {
            return Err(Error::InvalidSelection(format!(
                "{} has non-numeric CIK '{}'",
                company, company.cik_str
            )));
        }
        self.found = Some(company);
        Ok(())
    }

    /// Record a recoverable failure
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Add a retry to the per-stage counter
    pub fn note_retry(&mut self, stage: &str) {
        *self.retry_counts.entry(stage.to_string()).or_insert(0) += 1;
    }

    /// Normalized identifier used for report file names
    pub fn thread_id(&self) -> String {
        let base = match (&self.found, self.company_name.is_empty()) {
            (Some(found), _) => found.ticker.to_lowercase(),
            (None, false) => self.company_name.to_lowercase(),
            (None, true) => "unknown".to_string(),
        };
        let normalized: String = base
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();
        if normalized.is_empty() {
            "research".to_string()
        } else {
            normalized
        }
    }

    /// Execution duration in seconds, once the run has ended
    pub fn duration(&self) -> Option<f64> {
        self.execution_end
            .map(|end| (end - self.execution_start).num_milliseconds() as f64 / 1000.0)
    }

    /// One-line summary of which phases produced data
    pub fn progress_summary(&self) -> String {
        let mut checks = Vec::new();
        if self.found.is_some() {
            checks.push("✓ Company resolved".to_string());
        }
        if self.financials_1yr.is_some() {
            checks.push("✓ Financials extracted".to_string());
        }
        if self.company_profile.is_some() {
            checks.push("✓ Profile loaded".to_string());
        }
        if !self.news_timeline.is_empty() {
            checks.push(format!("✓ {} news items", self.news_timeline.len()));
        }
        if self.social_sentiment.is_some() {
            checks.push("✓ Sentiment analyzed".to_string());
        }
        if !self.competitors.is_empty() {
            checks.push(format!("✓ {} competitors", self.competitors.len()));
        }
        if !self.investor_materials.is_empty() {
            checks.push(format!("✓ {} filings", self.investor_materials.len()));
        }
        if self.synthesized_insights.is_some() {
            checks.push("✓ Report synthesized".to_string());
        }

        if checks.is_empty() {
            "Starting...".to_string()
        } else {
            checks.join(" | ")
        }
    }

    /// Completeness check run before synthesis
    pub fn check(&self) -> StateCheck {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self.found.is_none() {
            errors.push("Company not resolved".to_string());
        }

        match &self.financials_1yr {
            Some(fin) => {
                if fin.income_statement.is_empty() {
                    warnings.push("Missing income statement data".to_string());
                }
                if fin.balance_sheet.is_empty() {
                    warnings.push("Missing balance sheet data".to_string());
                }
                if fin.cashflow.is_empty() {
                    warnings.push("Missing cash flow data".to_string());
                }
            }
            None => warnings.push("No financial statements available".to_string()),
        }

        if self
            .company_profile
            .as_ref()
            .is_none_or(|p| p.description.is_empty())
        {
            warnings.push("Company profile incomplete".to_string());
        }
        if self.news_timeline.len() < 5 {
            warnings.push(format!(
                "Limited news coverage ({} items)",
                self.news_timeline.len()
            ));
        }
        if self.social_sentiment.is_none() {
            warnings.push("Sentiment analysis not available".to_string());
        }
        if self.competitors.is_empty() {
            warnings.push("No competitor data".to_string());
        }

        StateCheck {
            passed: errors.is_empty(),
            warnings,
            errors,
        }
    }
}

impl WorkflowState for ResearchState {
    fn on_enter(&mut self, node: &str) {
        self.current_node = node.to_string();
    }

    fn on_failure(&mut self, error: &crate::Error) {
        self.status = PipelineStatus::Failed;
        self.error_message = Some(error.to_string());
        self.execution_end = Some(Utc::now());
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.status,
            PipelineStatus::Completed | PipelineStatus::Failed
        )
    }
}

fn resolved_company<'de, D>(deserializer: D) -> std::result::Result<Option<CompanyMatch>, D::Error>
where
    D: Deserializer<'de>,
{
    let company = Option::<CompanyMatch>::deserialize(deserializer)?;
    if let Some(bad) = company.as_ref().filter(|c| c.cik10().is_none()) {
        return Err(serde::de::Error::custom(format!(
            "resolved company {} has non-numeric CIK '{}'",
            bad, bad.cik_str
        )));
    }
    Ok(company)
}

/// Completeness report for a state about to be synthesized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCheck {
    pub passed: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}
