//! Web research branches: company profile, news, competitors and filings

use super::{
    EXTRACT_INVESTOR_MATERIALS, FETCH_COMPANY_PROFILE, FETCH_NEWS_TIMELINE, IDENTIFY_COMPETITORS,
    complete_structured, complete_text, llm_request,
};
use crate::api::filing_url;
use crate::patch::ResearchPatch;
use crate::prompts;
use crate::services::Services;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use research_core::{
    CompanyProfile, Competitor, InvestorDoc, ManagementMember, ResearchState, Result,
    SearchResult,
};
use research_workflow::Branch;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

/// Markers of navigation chrome left over from a scraped page
const NAV_MARKERS: &[&str] = &[
    "Jump to",
    "Contents",
    "Beginning",
    "Change links",
    "Page Talk",
];

/// Long runs of Cyrillic, Arabic or CJK text
static NON_LATIN_RUN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"[\x{0400}-\x{04FF}\x{0600}-\x{06FF}\x{4E00}-\x{9FFF}]{20,}").ok()
});

static FOUNDED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)founded\s+in\s+(\d{4})",
        r"(?i)established\s+in\s+(\d{4})",
        r"(?i)incorporated\s+in\s+(\d{4})",
    ])
});

static HEADQUARTERS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"(?i)headquartered in ([^.\n]+)",
        r"(?i)headquarters[:\s]+([^.\n]+)",
    ])
});

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

const PROFILE_URL_PATTERNS: &[&str] = &["/about", "/company", "/who-we-are", "investor", "/ir/"];

const INVESTOR_LINK_TERMS: &[&str] = &[".pdf", "investor", "/ir", "ir.", "10-k", "annual-report"];

const EXCLUDED_COMPETITOR_TERMS: &[&str] = &[
    "unknown",
    "news",
    "article",
    "analysis",
    "report",
    "top ",
    "list of",
    "alternatives",
];

const TARGET_FORMS: &[&str] = &["10-K", "10-Q", "8-K", "DEF 14A"];

const MAX_DESCRIPTION_CHARS: usize = 5000;
const MAX_INVESTOR_DOCS: usize = 10;
const MAX_COMPETITOR_CONTEXT: usize = 4500;

fn one_year_ago() -> DateTime<Utc> {
    Utc::now() - Duration::days(365)
}

fn take_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Keep the first result for each URL
fn dedupe_by_url(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(r.url.clone()))
        .collect()
}

// ============================================================================
// Company Profile
// ============================================================================

/// Pick the page to build the profile from
///
/// An official about / company / investor page wins, then a URL containing
/// the company name, then English Wikipedia, then the first result.
/// Non-English Wikipedia pages are never picked in the first pass.
pub fn pick_profile_url(company: &str, results: &[SearchResult]) -> Option<String> {
    let keywords: String = company
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '.' | ','))
        .take(10)
        .collect();

    for result in results {
        let url = result.url.to_lowercase();
        if url.contains("wikipedia.org") && !url.starts_with("https://en.wikipedia") {
            continue;
        }
        if PROFILE_URL_PATTERNS.iter().any(|p| url.contains(p)) {
            info!("Selected official company page: {}", result.url);
            return Some(result.url.clone());
        }
        let compact: String = url.chars().filter(|c| !matches!(c, '-' | '_')).collect();
        if !keywords.is_empty() && compact.contains(&keywords) {
            info!("Selected company domain: {}", result.url);
            return Some(result.url.clone());
        }
    }

    results
        .iter()
        .find(|r| r.url.contains("en.wikipedia.org"))
        .or_else(|| results.first())
        .map(|r| r.url.clone())
}

/// First three content-like paragraphs of scraped text
pub fn fallback_paragraphs(raw: &str) -> String {
    let paragraphs: Vec<&str> = raw
        .split("\n\n")
        .map(str::trim)
        .filter(|p| p.chars().count() >= 50)
        .filter(|p| !NAV_MARKERS.iter().any(|m| p.contains(m)))
        .filter(|p| NON_LATIN_RUN.as_ref().is_none_or(|re| !re.is_match(p)))
        .take(3)
        .collect();

    if paragraphs.is_empty() {
        "No relevant company information could be extracted.".to_string()
    } else {
        paragraphs.join("\n\n")
    }
}

/// Founding year and headquarters found by pattern in free text
pub fn regex_profile_facts(text: &str) -> (Option<String>, Option<String>) {
    let first_capture = |patterns: &[Regex]| {
        patterns.iter().find_map(|re| {
            re.captures(text)?
                .get(1)
                .map(|m| m.as_str().trim().to_string())
        })
    };

    (
        first_capture(&FOUNDED_PATTERNS),
        first_capture(&HEADQUARTERS_PATTERNS),
    )
}

/// Investor-relations links among search results
pub fn investor_links(results: &[SearchResult]) -> Vec<InvestorDoc> {
    results
        .iter()
        .filter(|r| {
            let url = r.url.to_lowercase();
            INVESTOR_LINK_TERMS.iter().any(|t| url.contains(t))
        })
        .take(MAX_INVESTOR_DOCS)
        .map(|r| InvestorDoc {
            title: r.title.clone(),
            url: r.url.clone(),
            date: None,
            form_type: None,
        })
        .collect()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProfileExtraction {
    industry: Option<String>,
    sector: Option<String>,
    founded: Option<Value>,
    headquarters: Option<String>,
    employees: Option<Value>,
    key_products: Vec<String>,
    geographic_presence: Vec<String>,
    management_team: Vec<ManagementMember>,
}

/// Models answer years and headcounts as numbers or as text
fn loose_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn loose_count(value: Option<Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.replace([',', '+', ' '], "").parse().ok(),
        _ => None,
    }
}

/// Searches for and condenses the company's profile page
pub struct FetchCompanyProfile {
    services: Arc<Services>,
}

impl FetchCompanyProfile {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        self.services
            .search
            .search(query, max_results)
            .await
            .unwrap_or_else(|e| {
                warn!("Search '{}' failed: {}", query, e);
                Vec::new()
            })
    }

    /// LLM-cleaned description, or heuristically chosen paragraphs
    async fn clean_description(&self, company: &str, raw: &str) -> String {
        let config = &self.services.config;
        let user = match prompts::cleaning_prompt(company, raw) {
            Ok(user) => user,
            Err(e) => {
                warn!("{}", e);
                return fallback_paragraphs(raw);
            }
        };
        let request = llm_request(
            &config.secondary_model,
            prompts::CLEANING_SYSTEM,
            user,
            0.0,
            config.max_tokens_validation,
        );

        match complete_text(&self.services, "profile_cleaning", request).await.result {
            Ok(text) if !text.trim().is_empty() && !NAV_MARKERS.iter().any(|m| text.contains(m)) => {
                info!("LLM cleaned content: {} -> {} chars", raw.len(), text.len());
                text.trim().to_string()
            }
            Ok(_) => {
                warn!("LLM output still contains navigation elements, using paragraph fallback");
                fallback_paragraphs(raw)
            }
            Err(e) => {
                warn!("LLM cleaning failed: {}, using paragraph fallback", e);
                fallback_paragraphs(raw)
            }
        }
    }

    async fn extract(&self, company: &str, description: &str) -> Option<ProfileExtraction> {
        let config = &self.services.config;
        let request = llm_request(
            &config.secondary_model,
            prompts::EXTRACTION_SYSTEM,
            prompts::extraction_prompt(company, description).ok()?,
            config.temperature_extraction,
            config.max_tokens_validation,
        );

        match complete_structured::<ProfileExtraction>(&self.services, "profile_extraction", request)
            .await
            .result
        {
            Ok(extracted) => Some(extracted),
            Err(e) => {
                warn!("Failed to extract structured profile data: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl Branch<ResearchState, ResearchPatch> for FetchCompanyProfile {
    fn name(&self) -> &str {
        FETCH_COMPANY_PROFILE
    }

    async fn run(&self, snapshot: Arc<ResearchState>) -> Result<ResearchPatch> {
        let Some(found) = snapshot.found() else {
            warn!("Company not resolved, skipping profile fetch");
            return Ok(ResearchPatch::default());
        };
        let company = found.title.as_str();
        info!("Fetching company profile for {}", company);

        let results = self
            .search(&format!("{company} about us company overview"), 10)
            .await;
        let profile_url = pick_profile_url(company, &results);

        let mut description = String::new();
        if let Some(url) = &profile_url {
            match self.services.pages.fetch_text(url).await {
                Ok(raw) => description = self.clean_description(company, &raw).await,
                Err(e) => {
                    warn!("Failed to fetch profile content: {}", e);
                    description = results
                        .first()
                        .and_then(|r| r.snippet.clone())
                        .unwrap_or_default();
                }
            }
        }

        let investor_results = self
            .search(&format!("{company} investor relations annual report 10-K"), 5)
            .await;

        let mut profile = CompanyProfile {
            description: take_chars(&description, MAX_DESCRIPTION_CHARS),
            profile_url,
            investor_docs: investor_links(&investor_results),
            ..Default::default()
        };

        if !description.is_empty() {
            match self.extract(company, &description).await {
                Some(extracted) => {
                    profile.industry = extracted.industry;
                    profile.sector = extracted.sector;
                    profile.founded = loose_string(extracted.founded);
                    profile.headquarters = extracted.headquarters;
                    profile.employees = loose_count(extracted.employees);
                    profile.key_products = extracted.key_products;
                    profile.geographic_presence = extracted.geographic_presence;
                    profile.management_team = extracted.management_team;
                }
                None => {
                    let (founded, headquarters) = regex_profile_facts(&description);
                    profile.founded = founded;
                    profile.headquarters = headquarters;
                }
            }
        }

        info!(
            "Profile complete ({} chars, {} docs, {} products, {} executives)",
            profile.description.len(),
            profile.investor_docs.len(),
            profile.key_products.len(),
            profile.management_team.len()
        );
        Ok(ResearchPatch {
            company_profile: Some(profile),
            ..Default::default()
        })
    }
}

// ============================================================================
// News
// ============================================================================

/// Parse the date formats search backends report
pub fn parse_published_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Keep results dated within the window, plus any without a parseable date
///
/// When nothing survives the filter the unfiltered list is kept. URLs are
/// deduplicated, preserving order.
pub fn filter_recent(results: Vec<SearchResult>, cutoff: DateTime<Utc>) -> Vec<SearchResult> {
    let recent: Vec<SearchResult> = results
        .iter()
        .filter(|r| {
            r.published_date
                .as_deref()
                .and_then(parse_published_date)
                .is_none_or(|date| date >= cutoff)
        })
        .cloned()
        .collect();

    let kept = if recent.is_empty() { results } else { recent };
    dedupe_by_url(kept)
}

/// Searches for news from the last year
pub struct FetchNewsTimeline {
    services: Arc<Services>,
}

impl FetchNewsTimeline {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Branch<ResearchState, ResearchPatch> for FetchNewsTimeline {
    fn name(&self) -> &str {
        FETCH_NEWS_TIMELINE
    }

    async fn run(&self, snapshot: Arc<ResearchState>) -> Result<ResearchPatch> {
        let Some(found) = snapshot.found() else {
            warn!("Company not resolved, skipping news fetch");
            return Ok(ResearchPatch::default());
        };

        let cutoff = one_year_ago();
        let query = format!("{} news after:{}", found.title, cutoff.format("%Y-%m-%d"));
        let results = self
            .services
            .search
            .search(&query, self.services.config.max_news_items)
            .await?;

        let news = filter_recent(results, cutoff);
        info!("Found {} news items within the last year", news.len());
        Ok(ResearchPatch {
            news_timeline: news,
            ..Default::default()
        })
    }
}

// ============================================================================
// Competitors
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompetitorList {
    competitors: Vec<CompetitorEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompetitorEntry {
    name: String,
    description: String,
}

/// Keep entries that look like company names
fn filter_competitors(entries: Vec<CompetitorEntry>, company: &str, max: usize) -> Vec<Competitor> {
    entries
        .into_iter()
        .take(max)
        .filter_map(|entry| {
            let name = entry.name.trim().to_string();
            let lower = name.to_lowercase();
            let len = name.chars().count();
            if !(3..=80).contains(&len) || EXCLUDED_COMPETITOR_TERMS.iter().any(|t| lower.contains(t)) {
                return None;
            }
            let description = entry.description.trim();
            Some(Competitor {
                description: if description.is_empty() {
                    format!("Competitor of {company}")
                } else {
                    description.to_string()
                },
                name,
                source: "AI-extracted from market research".to_string(),
            })
        })
        .collect()
}

/// Identifies competitors from search results with the LLM
pub struct IdentifyCompetitors {
    services: Arc<Services>,
}

impl IdentifyCompetitors {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Branch<ResearchState, ResearchPatch> for IdentifyCompetitors {
    fn name(&self) -> &str {
        IDENTIFY_COMPETITORS
    }

    async fn run(&self, snapshot: Arc<ResearchState>) -> Result<ResearchPatch> {
        let Some(found) = snapshot.found() else {
            warn!("Company not resolved, skipping competitor search");
            return Ok(ResearchPatch::default());
        };
        let company = found.title.as_str();

        let mut gathered = Vec::new();
        for query in [
            format!("{company} top competitors"),
            format!("{company} vs competitors comparison"),
        ] {
            match self.services.search.search(&query, 8).await {
                Ok(results) => gathered.extend(results),
                Err(e) => warn!("Competitor search '{}' failed: {}", query, e),
            }
        }

        let mut context = String::new();
        for result in dedupe_by_url(gathered).iter().take(15) {
            context.push_str(&format!("Source: {}\n", result.title));
            if let Some(snippet) = &result.snippet {
                context.push_str(&format!("Content: {snippet}\n"));
            }
            context.push('\n');
        }
        if context.is_empty() {
            warn!("No search context for competitors of {}", company);
            return Ok(ResearchPatch::default());
        }

        let config = &self.services.config;
        let request = llm_request(
            &config.secondary_model,
            prompts::COMPETITORS_SYSTEM,
            prompts::competitors_prompt(company, &take_chars(&context, MAX_COMPETITOR_CONTEXT))?,
            config.temperature_extraction,
            config.max_tokens_validation,
        );

        let competitors =
            match complete_structured::<CompetitorList>(&self.services, IDENTIFY_COMPETITORS, request)
                .await
                .result
            {
                Ok(list) => filter_competitors(list.competitors, company, config.max_competitors),
                Err(e) => {
                    warn!("Failed to extract competitors: {}", e);
                    Vec::new()
                }
            };

        info!("Found {} competitors", competitors.len());
        Ok(ResearchPatch {
            competitors,
            ..Default::default()
        })
    }
}

// ============================================================================
// Investor Materials
// ============================================================================

/// Recent key filings from a submissions payload
///
/// Scans the 50 most recent filings for 10-K, 10-Q, 8-K and DEF 14A forms
/// filed on or after `cutoff` and keeps the first ten.
pub fn recent_filings(submissions: &Value, cik10: &str, cutoff: &str) -> Vec<InvestorDoc> {
    let recent = &submissions["filings"]["recent"];
    let column = |name: &str| -> Vec<&str> {
        recent[name]
            .as_array()
            .map(|items| items.iter().map(|v| v.as_str().unwrap_or_default()).collect())
            .unwrap_or_default()
    };

    let forms = column("form");
    let accessions = column("accessionNumber");
    let dates = column("filingDate");
    let documents = column("primaryDocument");

    forms
        .iter()
        .take(50)
        .enumerate()
        .filter(|(_, form)| TARGET_FORMS.contains(form))
        .filter_map(|(i, form)| {
            let date = dates.get(i).copied().unwrap_or_default();
            if !date.is_empty() && date < cutoff {
                return None;
            }
            let accession = accessions.get(i).copied().unwrap_or_default();
            let document = documents.get(i).copied().unwrap_or_default();
            Some(InvestorDoc {
                title: format!("{form} Filing - {date}"),
                url: filing_url(cik10, accession, document),
                date: Some(date.to_string()),
                form_type: Some((*form).to_string()),
            })
        })
        .take(MAX_INVESTOR_DOCS)
        .collect()
}

/// Lists the last year's key SEC filings
#[derive(Default)]
pub struct ExtractInvestorMaterials;

#[async_trait]
impl Branch<ResearchState, ResearchPatch> for ExtractInvestorMaterials {
    fn name(&self) -> &str {
        EXTRACT_INVESTOR_MATERIALS
    }

    async fn run(&self, snapshot: Arc<ResearchState>) -> Result<ResearchPatch> {
        let (Some(submissions), Some(cik10)) = (&snapshot.submissions, snapshot.cik10()) else {
            warn!("No submissions data available");
            return Ok(ResearchPatch::default());
        };

        let cutoff = one_year_ago().format("%Y-%m-%d").to_string();
        let materials = recent_filings(submissions, cik10, &cutoff);
        info!("Found {} investor materials", materials.len());
        Ok(ResearchPatch {
            investor_materials: materials,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::stages::testing::{Doubles, reply};
    use research_core::{CompanyMatch, SearchSource};
    use serde_json::json;

    fn result(title: &str, url: &str) -> SearchResult {
        SearchResult::new(title, url, SearchSource::Tavily)
    }

    fn apple_state() -> Arc<ResearchState> {
        Arc::new(
            ResearchState::with_selected_company(CompanyMatch::new("Apple Inc.", "AAPL", "320193"))
                .unwrap(),
        )
    }

    #[test]
    fn test_pick_profile_url_prefers_official_pages() {
        let results = vec![
            result("Apple – Wikipédia", "https://fr.wikipedia.org/wiki/Apple/company"),
            result("About Apple", "https://www.apple.com/about/"),
            result("Apple - Wikipedia", "https://en.wikipedia.org/wiki/Apple_Inc."),
        ];
        assert_eq!(
            pick_profile_url("Apple Inc.", &results).as_deref(),
            Some("https://www.apple.com/about/")
        );
    }

    #[test]
    fn test_pick_profile_url_fallbacks() {
        let results = vec![
            result("News", "https://news.example.com/story"),
            result("Wiki", "https://en.wikipedia.org/wiki/Apple_Inc."),
        ];
        // "appleinc" appears in the wikipedia URL once underscores are dropped
        assert_eq!(
            pick_profile_url("Apple Inc.", &results).as_deref(),
            Some("https://en.wikipedia.org/wiki/Apple_Inc.")
        );

        let results = vec![result("News", "https://news.example.com/story")];
        assert_eq!(
            pick_profile_url("Apple Inc.", &results).as_deref(),
            Some("https://news.example.com/story")
        );
        assert!(pick_profile_url("Apple Inc.", &[]).is_none());
    }

    #[test]
    fn test_patterns_compile() {
        assert!(NON_LATIN_RUN.is_some());
        assert_eq!(FOUNDED_PATTERNS.len(), 3);
        assert_eq!(HEADQUARTERS_PATTERNS.len(), 2);
    }

    #[test]
    fn test_fallback_paragraphs() {
        let long = "Apple Inc. is an American multinational technology company headquartered in Cupertino.";
        let raw = format!("Jump to content\n\nshort\n\n{long}\n\nContents 1 History 2 Products and more filler text here");
        assert_eq!(fallback_paragraphs(&raw), long);

        assert_eq!(
            fallback_paragraphs("tiny"),
            "No relevant company information could be extracted."
        );
    }

    #[test]
    fn test_regex_profile_facts() {
        let (founded, hq) = regex_profile_facts(
            "Apple was founded in 1976. It is headquartered in Cupertino, California.",
        );
        assert_eq!(founded.as_deref(), Some("1976"));
        assert_eq!(hq.as_deref(), Some("Cupertino, California"));

        assert_eq!(regex_profile_facts("Nothing here"), (None, None));
    }

    #[test]
    fn test_loose_values() {
        assert_eq!(loose_string(Some(json!(1976))).as_deref(), Some("1976"));
        assert_eq!(loose_string(Some(json!(" 1976 "))).as_deref(), Some("1976"));
        assert_eq!(loose_string(Some(Value::Null)), None);
        assert_eq!(loose_count(Some(json!("164,000"))), Some(164_000));
        assert_eq!(loose_count(Some(json!(161_000))), Some(161_000));
        assert_eq!(loose_count(Some(json!("many"))), None);
    }

    #[test]
    fn test_investor_links() {
        let results = vec![
            result("Annual report", "https://investor.apple.com/sec-filings/"),
            result("10-K pdf", "https://s2.q4cdn.com/aapl-10-k.pdf"),
            result("Blog", "https://blog.example.com/post"),
        ];
        let docs = investor_links(&results);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "Annual report");
    }

    #[test]
    fn test_parse_published_date() {
        assert!(parse_published_date("2025-03-01T10:00:00Z").is_some());
        assert!(parse_published_date("Sat, 01 Mar 2025 10:00:00 GMT").is_some());
        assert!(parse_published_date("2025-03-01").is_some());
        assert!(parse_published_date("last tuesday").is_none());
    }

    #[test]
    fn test_filter_recent() {
        let cutoff = Utc::now() - Duration::days(365);
        let old = result("Old", "https://a.com/old").with_published_date("2001-01-01");
        let fresh = result("Fresh", "https://a.com/fresh")
            .with_published_date(Utc::now().format("%Y-%m-%d").to_string());
        let undated = result("Undated", "https://a.com/undated");
        let dup = result("Fresh again", "https://a.com/fresh");

        let kept = filter_recent(vec![old.clone(), fresh, undated, dup], cutoff);
        let titles: Vec<&str> = kept.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Fresh", "Undated"]);

        // nothing recent keeps everything
        let kept = filter_recent(vec![old], cutoff);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_filter_competitors() {
        let entries = vec![
            CompetitorEntry {
                name: "Samsung Electronics".to_string(),
                description: "Smartphones".to_string(),
            },
            CompetitorEntry {
                name: "Top 10 Apple competitors".to_string(),
                description: String::new(),
            },
            CompetitorEntry {
                name: "HP".to_string(),
                description: String::new(),
            },
            CompetitorEntry {
                name: "Microsoft".to_string(),
                description: String::new(),
            },
        ];
        let competitors = filter_competitors(entries, "Apple Inc.", 10);
        let names: Vec<&str> = competitors.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Samsung Electronics", "Microsoft"]);
        assert_eq!(competitors[1].description, "Competitor of Apple Inc.");
    }

    #[test]
    fn test_recent_filings() {
        let submissions = json!({
            "filings": {"recent": {
                "form": ["4", "10-Q", "8-K", "10-K"],
                "accessionNumber": ["a", "0000320193-25-000073", "0000320193-25-000071", "0000320193-20-000096"],
                "filingDate": ["2025-08-05", "2025-08-01", "2025-07-31", "2020-10-30"],
                "primaryDocument": ["x.xml", "aapl-20250628.htm", "aapl-8k.htm", "aapl-20200926.htm"]
            }}
        });
        let docs = recent_filings(&submissions, "0000320193", "2024-10-15");

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "10-Q Filing - 2025-08-01");
        assert_eq!(docs[0].form_type.as_deref(), Some("10-Q"));
        assert_eq!(
            docs[0].url,
            "https://www.sec.gov/Archives/edgar/data/0000320193/000032019325000073/aapl-20250628.htm"
        );
        assert!(recent_filings(&json!({}), "0000320193", "2024-10-15").is_empty());
    }

    #[tokio::test]
    async fn test_profile_branch() {
        let mut doubles = Doubles::default();
        doubles.search.expect_search().returning(|query, _| {
            if query.contains("about us") {
                Ok(vec![SearchResult::new(
                    "About Apple",
                    "https://www.apple.com/about/",
                    SearchSource::Tavily,
                )])
            } else {
                Ok(vec![SearchResult::new(
                    "Investor Relations",
                    "https://investor.apple.com/",
                    SearchSource::Tavily,
                )])
            }
        });
        doubles
            .pages
            .expect_fetch_text()
            .returning(|_| Ok("Apple designs the iPhone.".to_string()));
        let mut seq = mockall::Sequence::new();
        doubles
            .llm
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| reply("Apple Inc. designs consumer electronics."));
        doubles
            .llm
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                reply(r#"{"industry": "Consumer Electronics", "founded": 1976, "employees": "164,000",
                          "management_team": [{"name": "Tim Cook", "title": "CEO"}]}"#)
            });
        let branch = FetchCompanyProfile::new(doubles.into_services());

        let patch = branch.run(apple_state()).await.unwrap();
        let profile = patch.company_profile.unwrap();

        assert_eq!(profile.description, "Apple Inc. designs consumer electronics.");
        assert_eq!(profile.profile_url.as_deref(), Some("https://www.apple.com/about/"));
        assert_eq!(profile.industry.as_deref(), Some("Consumer Electronics"));
        assert_eq!(profile.founded.as_deref(), Some("1976"));
        assert_eq!(profile.employees, Some(164_000));
        assert_eq!(profile.management_team[0].name, "Tim Cook");
        assert_eq!(profile.investor_docs.len(), 1);
    }

    #[tokio::test]
    async fn test_profile_branch_page_failure_uses_snippet() {
        let mut doubles = Doubles::default();
        doubles.search.expect_search().returning(|query, _| {
            if query.contains("about us") {
                Ok(vec![
                    SearchResult::new("About", "https://www.apple.com/about/", SearchSource::Tavily)
                        .with_snippet("Apple was founded in 1976."),
                ])
            } else {
                Ok(Vec::new())
            }
        });
        doubles.pages.expect_fetch_text().returning(|url| {
            Err(SourceError::UnexpectedResponse {
                service: "page fetch".to_string(),
                message: url.to_string(),
            })
        });
        doubles
            .llm
            .expect_complete()
            .returning(|_| Err(research_llm::LLMError::AuthenticationFailed));
        let branch = FetchCompanyProfile::new(doubles.into_services());

        let profile = branch.run(apple_state()).await.unwrap().company_profile.unwrap();
        assert_eq!(profile.description, "Apple was founded in 1976.");
        assert_eq!(profile.founded.as_deref(), Some("1976"));
    }

    #[tokio::test]
    async fn test_branches_skip_unresolved_company() {
        let services = Doubles::default().into_services();
        let unresolved = Arc::new(ResearchState::new("Apple"));

        let patch = FetchNewsTimeline::new(Arc::clone(&services))
            .run(Arc::clone(&unresolved))
            .await
            .unwrap();
        assert!(patch.news_timeline.is_empty());

        let patch = IdentifyCompetitors::new(services)
            .run(Arc::clone(&unresolved))
            .await
            .unwrap();
        assert!(patch.competitors.is_empty());

        let patch = ExtractInvestorMaterials.run(unresolved).await.unwrap();
        assert!(patch.investor_materials.is_empty());
    }

    #[tokio::test]
    async fn test_competitors_branch() {
        let mut doubles = Doubles::default();
        doubles.search.expect_search().times(2).returning(|_, _| {
            Ok(vec![
                SearchResult::new("Apple vs Samsung", "https://a.com/1", SearchSource::Tavily)
                    .with_snippet("Samsung is Apple's main rival in smartphones."),
            ])
        });
        doubles.llm.expect_complete().times(1).returning(|req| {
            let prompt = &req.messages[0].content;
            assert_eq!(prompt.matches("Source: Apple vs Samsung").count(), 1);
            reply(r#"{"competitors": [{"name": "Samsung Electronics", "description": "Android phones"}]}"#)
        });
        let branch = IdentifyCompetitors::new(doubles.into_services());

        let patch = branch.run(apple_state()).await.unwrap();
        assert_eq!(patch.competitors.len(), 1);
        assert_eq!(patch.competitors[0].source, "AI-extracted from market research");
    }
}
