//! Identity resolution: reference data, matching, suggestions, validation
//! and human selection
//!
//! The routers in this module are pure functions of the state. Their labels
//! are wired to targets in [`crate::pipeline`].

use super::{
    LOAD_REFERENCE_DATA, MATCH_CANDIDATES, RESOLVE_SELECTION, SUGGEST_AND_SEARCH, VALIDATE_MATCH,
    complete_structured, complete_text, llm_request,
};
use crate::prompts;
use crate::services::Services;
use async_trait::async_trait;
use research_core::{
    CompanyMatch, Error, PipelineStatus, ResearchState, Result, Stage, TickerRecord,
    ValidationResult,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum candidates offered for selection
const MAX_CANDIDATES: usize = 5;

/// Minimum similarity for a fuzzy title match
const MATCH_CUTOFF: f64 = 0.55;

// ============================================================================
// Routers
// ============================================================================

/// After reference data: skip matching when the identity was supplied
pub fn needs_matching(state: &ResearchState) -> &'static str {
    if state.found().is_some() {
        "skip_match"
    } else {
        "needs_match"
    }
}

/// After matching: validate every candidate set, even a single one
pub fn after_matching(state: &ResearchState) -> &'static str {
    if state.found().is_some() {
        "data_collection"
    } else if state.match_options.is_empty() {
        "suggest"
    } else {
        "validate"
    }
}

pub fn after_suggestions(state: &ResearchState) -> &'static str {
    if state.match_options.is_empty() {
        "end"
    } else {
        "validate"
    }
}

/// After validation: only an accepted verdict bypasses human selection
pub fn after_validation(state: &ResearchState) -> &'static str {
    if state.llm_validation_passed && state.found().is_some() {
        "data_collection"
    } else {
        "resolve"
    }
}

pub fn after_resolution(state: &ResearchState) -> &'static str {
    if state.found().is_some() {
        "data_collection"
    } else {
        "end"
    }
}

// ============================================================================
// Fuzzy matching
// ============================================================================

/// Edit distance between two character sequences
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Case-insensitive similarity in `[0, 1]`: `(|a| + |b| - distance) / (|a| + |b|)`
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let distance = levenshtein(&a, &b);
    (total - distance) as f64 / total as f64
}

/// Closest registrant titles for a free-text company name
///
/// Titles scoring at least 0.55 are ranked best first and the top five
/// kept. Without any close title, titles containing the query
/// (case-insensitive) are used instead. Each title maps to its first
/// reference record.
pub fn fuzzy_match(query: &str, records: &[TickerRecord]) -> Vec<CompanyMatch> {
    let mut seen = HashSet::new();
    let unique: Vec<&TickerRecord> = records
        .iter()
        .filter(|r| seen.insert(r.title.as_str()))
        .collect();

    let mut scored: Vec<(f64, &TickerRecord)> = unique
        .iter()
        .map(|r| (similarity(query, &r.title), *r))
        .filter(|(score, _)| *score >= MATCH_CUTOFF)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    if !scored.is_empty() {
        return scored
            .into_iter()
            .take(MAX_CANDIDATES)
            .map(|(_, r)| r.to_match())
            .collect();
    }

    let needle = query.to_lowercase();
    unique
        .into_iter()
        .filter(|r| r.title.to_lowercase().contains(&needle))
        .take(MAX_CANDIDATES)
        .map(TickerRecord::to_match)
        .collect()
}

/// Reference records for LLM-suggested names
///
/// Each suggestion contributes at most one record: the first title equal to
/// it (case-insensitive), or failing that the first not yet chosen record
/// whose title contains it or is contained in it. Candidates are
/// deduplicated by CIK and ticker and capped at five.
pub fn search_suggestions(suggestions: &[String], records: &[TickerRecord]) -> Vec<CompanyMatch> {
    let mut out: Vec<CompanyMatch> = Vec::new();
    let mut seen = HashSet::new();

    for suggestion in suggestions {
        if out.len() >= MAX_CANDIDATES {
            break;
        }
        let wanted = suggestion.to_lowercase();

        let exact = records.iter().find(|r| r.title.to_lowercase() == wanted);
        let pick = match exact {
            Some(record) => {
                seen.insert((record.cik_str.clone(), record.ticker.clone()))
                    .then_some(record)
            }
            None => records.iter().find(|r| {
                let title = r.title.to_lowercase();
                !title.is_empty()
                    && (title.contains(&wanted) || wanted.contains(&title))
                    && seen.insert((r.cik_str.clone(), r.ticker.clone()))
            }),
        };

        match pick {
            Some(record) => {
                debug!("Suggestion '{}' matched {}", suggestion, record.title);
                out.push(record.to_match());
            }
            None => debug!("Suggestion '{}' matched nothing new", suggestion),
        }
    }
    out
}

/// Split a comma-separated suggestion list into clean names
fn parse_suggestions(text: &str) -> Vec<String> {
    text.split([',', '\n'])
        .map(|s| {
            s.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim()
                .trim_matches(['"', '\''])
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Prompt shown to a human choosing between candidates
pub fn hitl_message(state: &ResearchState) -> String {
    let mut msg = format!("Company search results for '{}':\n", state.company_name);

    if let Some(validation) = &state.validation_result {
        let _ = writeln!(
            msg,
            "\nAutomatic validation: {} confidence, {} - {}",
            validation.confidence,
            if validation.is_match { "match" } else { "no match" },
            validation.reasoning
        );
    }
    if let Some(error) = &state.error_message {
        let _ = writeln!(msg, "\nNote: {error}");
    }

    msg.push_str("\nPlease select the correct company:\n");
    for (i, option) in state.match_options.iter().enumerate() {
        let _ = writeln!(msg, "  {}. {} - CIK {}", i + 1, option, option.cik_str);
    }
    let _ = write!(
        msg,
        "\nEnter a number (1-{}), or 'none' to cancel: ",
        state.match_options.len()
    );
    msg
}

// ============================================================================
// Stages
// ============================================================================

/// Loads the SEC ticker reference set
pub struct LoadReferenceData {
    services: Arc<Services>,
}

impl LoadReferenceData {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<ResearchState> for LoadReferenceData {
    fn name(&self) -> &str {
        LOAD_REFERENCE_DATA
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        if let Some(found) = state.found() {
            info!("Company pre-resolved as {}, skipping reference data", found);
            return Ok(());
        }

        let tickers = self.services.reference.company_tickers().await?;
        if tickers.is_empty() {
            return Err(Error::Config("SEC company tickers dataset is empty".to_string()));
        }

        info!("Loaded {} company tickers", tickers.len());
        state.company_tickers = tickers;
        Ok(())
    }
}

/// Fuzzy-matches the company name against the reference set
#[derive(Default)]
pub struct MatchCandidates;

#[async_trait]
impl Stage<ResearchState> for MatchCandidates {
    fn name(&self) -> &str {
        MATCH_CANDIDATES
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        if state.found().is_some() {
            return Ok(());
        }
        if state.company_name.trim().is_empty() {
            return Err(Error::Config("company_name is required".to_string()));
        }
        if state.company_tickers.is_empty() {
            return Err(Error::Config("Company tickers not loaded".to_string()));
        }

        state.match_options = fuzzy_match(state.company_name.trim(), &state.company_tickers);
        info!(
            "Found {} candidate(s) for '{}'",
            state.match_options.len(),
            state.company_name
        );
        Ok(())
    }
}

/// Asks the LLM for alternate names and looks them up
pub struct SuggestAndSearch {
    services: Arc<Services>,
}

impl SuggestAndSearch {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<ResearchState> for SuggestAndSearch {
    fn name(&self) -> &str {
        SUGGEST_AND_SEARCH
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        let config = &self.services.config;
        let request = llm_request(
            &config.secondary_model,
            prompts::SUGGESTIONS_SYSTEM,
            prompts::suggestions_prompt(&state.company_name)?,
            config.temperature_suggestions,
            config.max_tokens_suggestions,
        );

        let call = complete_text(&self.services, SUGGEST_AND_SEARCH, request).await;
        for _ in 0..call.retries {
            state.note_retry(SUGGEST_AND_SEARCH);
        }

        let suggestions = match call.result {
            Ok(text) => parse_suggestions(&text),
            Err(e) => {
                warn!("Suggestion generation failed: {}", e);
                state.record_error(format!("Could not generate suggestions: {e}"));
                Vec::new()
            }
        };
        info!("LLM suggested {} alternate name(s)", suggestions.len());

        state.match_options = search_suggestions(&suggestions, &state.company_tickers);
        state.llm_suggestions = suggestions;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    confidence: String,
    #[serde(rename = "match")]
    is_match: String,
    #[serde(default)]
    reasoning: String,
}

/// Checks the top candidate with the LLM
pub struct ValidateMatch {
    services: Arc<Services>,
}

impl ValidateMatch {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<ResearchState> for ValidateMatch {
    fn name(&self) -> &str {
        VALIDATE_MATCH
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        state.llm_validation_passed = false;
        let Some(top) = state.match_options.first().cloned() else {
            state.record_error("No company matches found");
            return Ok(());
        };

        let config = &self.services.config;
        let request = llm_request(
            &config.secondary_model,
            prompts::VALIDATION_SYSTEM,
            prompts::validation_prompt(&state.company_name, &top)?,
            config.temperature_validation,
            config.max_tokens_validation,
        );

        let call =
            complete_structured::<Verdict>(&self.services, VALIDATE_MATCH, request).await;
        for _ in 0..call.retries {
            state.note_retry(VALIDATE_MATCH);
        }

        match call.result {
            Ok(verdict) => {
                let result = ValidationResult {
                    confidence: verdict.confidence.trim().to_uppercase(),
                    is_match: verdict.is_match.trim().eq_ignore_ascii_case("YES"),
                    reasoning: verdict.reasoning,
                    validated_company: top.clone(),
                };
                state.llm_validation_passed = result.accepts();
                info!(
                    "Validation of {}: {} confidence, match={}",
                    top, result.confidence, result.is_match
                );
                if state.llm_validation_passed {
                    if let Err(e) = state.resolve_to(top) {
                        warn!("Validated candidate cannot be resolved: {}", e);
                        state.llm_validation_passed = false;
                    }
                }
                state.validation_result = Some(result);
            }
            Err(e) => {
                warn!("Validation failed: {}", e);
                state.record_error(format!("Validation error: {e}"));
                state.validation_result = None;
            }
        }
        Ok(())
    }
}

/// Gets a human choice between the candidates
pub struct ResolveSelection {
    services: Arc<Services>,
}

impl ResolveSelection {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Stage<ResearchState> for ResolveSelection {
    fn name(&self) -> &str {
        RESOLVE_SELECTION
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        state.status = PipelineStatus::AwaitingHitl;
        if state.match_options.is_empty() {
            return Err(Error::Precondition(
                "No company options available for selection".to_string(),
            ));
        }

        let response = match state.human_response.clone() {
            Some(response) => response,
            None => {
                let answer = match &self.services.resolver {
                    Some(resolver) => {
                        resolver
                            .select(&hitl_message(state), &state.match_options)
                            .await
                    }
                    None => None,
                };
                answer.ok_or_else(|| {
                    Error::Precondition(
                        "No human response provided and no resolver configured".to_string(),
                    )
                })?
            }
        };
        state.human_response = Some(response.clone());

        let answer = response.trim();
        if answer.eq_ignore_ascii_case("none") {
            info!("Selection declined; company left unresolved");
            return Ok(());
        }

        let count = state.match_options.len();
        let index: usize = answer.parse().map_err(|_| {
            Error::InvalidSelection(format!(
                "'{answer}'. Please enter a number between 1 and {count}"
            ))
        })?;
        if index < 1 || index > count {
            return Err(Error::InvalidSelection(format!(
                "Selection {index} is out of range. Please choose between 1 and {count}"
            )));
        }

        let selected = state.match_options[index - 1].clone();
        debug!("Human selected option {}", index);
        info!("Company resolved to {}", selected);
        state.resolve_to(selected)
    }
}
