//! User message templates for the research stages

use super::render;
use crate::stages::synthesis::SynthesisContext;
use minijinja::context;
use research_core::{CompanyMatch, Result};

// ============================================================================
// Identity Resolution
// ============================================================================

const SUGGESTIONS_TEMPLATE: &str = "\
You are a financial data specialist. A user searched for \"{{ user_input }}\" but no exact \
match was found in the SEC EDGAR database.

Suggest 5-8 alternative company names that might be what they meant. Consider:
1. Official legal names (e.g., \"Apple\" -> \"Apple Inc.\")
2. Parent companies (e.g., \"Google\" -> \"Alphabet Inc.\")
3. Common abbreviations (e.g., \"IBM\" -> \"International Business Machines Corp\")
4. Recent name changes (e.g., \"Facebook\" -> \"Meta Platforms Inc.\")
5. Different formats (e.g., \"Tesla\" -> \"Tesla, Inc.\" or \"Tesla Inc\")

Examples:
- Google -> Alphabet Inc., Alphabet Inc. Class A, Alphabet Inc. Class C
- Facebook -> Meta Platforms Inc., Meta Platforms, Inc.
- Amazon -> Amazon.com Inc., Amazon.com, Inc.

Respond ONLY with a comma-separated list of company names, nothing else.";

/// Ask for alternate registrant names when fuzzy matching found nothing
pub fn suggestions_prompt(user_input: &str) -> Result<String> {
    render(
        "suggestions",
        SUGGESTIONS_TEMPLATE,
        context! { user_input => user_input },
    )
}

const VALIDATION_TEMPLATE: &str = "\
Validate if the company match is correct for the user's intent.

User Input: \"{{ user_input }}\"

Matched Company:
- Name: {{ company.title }}
- Ticker: {{ company.ticker }}
- CIK: {{ company.cik_str }}

Consider:
1. Is this the company the user most likely meant?
2. Could the user have meant a different company with a similar name?
3. Are there common alternative names or parent/subsidiary relationships?

Examples:
- \"Apple\" -> \"Apple Inc.\" (AAPL) = HIGH confidence, YES
- \"Google\" -> \"Alphabet Inc.\" (GOOGL) = HIGH confidence, YES (parent company)
- \"Ford\" -> \"Ford Motor Co\" (F) = HIGH confidence, YES
- \"Meta\" -> \"Meta Materials Inc.\" = LOW confidence, NO (user likely meant Meta Platforms)

Respond with a JSON object:
{
  \"confidence\": \"HIGH\" | \"MEDIUM\" | \"LOW\",
  \"match\": \"YES\" | \"NO\",
  \"reasoning\": \"brief explanation\"
}";

/// Ask whether the top candidate is the company the user meant
pub fn validation_prompt(user_input: &str, company: &CompanyMatch) -> Result<String> {
    render(
        "validation",
        VALIDATION_TEMPLATE,
        context! {
            user_input => user_input,
            company => company,
        },
    )
}

// ============================================================================
// Company Profile
// ============================================================================

const CLEANING_TEMPLATE: &str = "\
Extract the main business description of {{ company }} from this web page content. Remove \
navigation menus, cookie notices, footers, links, image captions and any other UI text.

Write 2-4 well-formed paragraphs in English describing what the company does, its products \
and services, and its market position.

Content:
{{ text }}";

/// Clean a fetched profile page down to a business description
pub fn cleaning_prompt(company: &str, text: &str) -> Result<String> {
    render(
        "profile_cleaning",
        CLEANING_TEMPLATE,
        context! {
            company => company,
            text => truncate_chars(text, 10_000),
        },
    )
}

const EXTRACTION_TEMPLATE: &str = "\
Extract structured information about {{ company }} from the text below.

Text:
{{ text }}

Respond with a JSON object using null for anything not stated:
{
  \"industry\": \"string or null\",
  \"sector\": \"string or null\",
  \"founded\": \"year as string or null\",
  \"headquarters\": \"city, state/country or null\",
  \"employees\": integer or null,
  \"key_products\": [\"product or service\"],
  \"geographic_presence\": [\"region or country\"],
  \"management_team\": [{\"name\": \"string\", \"title\": \"string\", \"background\": \"string or null\"}]
}";

/// Pull structured profile fields out of a description
pub fn extraction_prompt(company: &str, text: &str) -> Result<String> {
    render(
        "profile_extraction",
        EXTRACTION_TEMPLATE,
        context! {
            company => company,
            text => truncate_chars(text, 4_000),
        },
    )
}

// ============================================================================
// Competitors
// ============================================================================

const COMPETITORS_TEMPLATE: &str = "\
Based on the search results below, identify the top 5-8 direct competitors of {{ company }}.

Only list real companies that compete in the same markets. Do not list industry terms, \
market segments, products, analysts or news outlets.

Search results:
{{ context }}

Respond with a JSON object:
{
  \"competitors\": [
    {\"name\": \"Company name\", \"description\": \"one sentence on how it competes\"}
  ]
}";

/// Extract competitors from deduplicated search context
pub fn competitors_prompt(company: &str, context: &str) -> Result<String> {
    render(
        "competitors",
        COMPETITORS_TEMPLATE,
        context! {
            company => company,
            context => context,
        },
    )
}

// ============================================================================
// Social Sentiment
// ============================================================================

const SENTIMENT_TEMPLATE: &str = "\
Analyze the sentiment of these social media posts about {{ company }} stock.

{% for snippet in snippets %}
{{ loop.index }}. {{ snippet }}

{% endfor %}
For each post classify the sentiment as:
- BULLISH: positive outlook, expects the price to rise, recommends buying
- BEARISH: negative outlook, expects the price to fall, recommends selling
- NEUTRAL: factual, no clear direction
- MIXED: both positive and negative points

Give a confidence between 0.0 and 1.0 and up to 3 short themes (e.g. \"earnings\", \
\"valuation\", \"AI\").

Respond with a JSON object:
{
  \"results\": [
    {\"post_num\": 1, \"sentiment\": \"BULLISH\", \"confidence\": 0.8, \"themes\": [\"earnings\"]}
  ]
}";

/// Classify one batch of social snippets
pub fn sentiment_prompt(company: &str, snippets: &[String]) -> Result<String> {
    let snippets: Vec<String> = snippets.iter().map(|s| truncate_chars(s, 500)).collect();
    render(
        "sentiment",
        SENTIMENT_TEMPLATE,
        context! {
            company => company,
            snippets => snippets,
        },
    )
}

// ============================================================================
// Synthesis
// ============================================================================

const SYNTHESIS_TEMPLATE: &str = "\
You are a senior equity research analyst. Write a comprehensive investment research report \
on {{ ctx.company_name }}{% if ctx.ticker %} ({{ ctx.ticker }}){% endif %}.

All data covers the LAST 1 YEAR ({{ ctx.period_start }} to {{ ctx.period_end }}). Do not \
discuss older events as if they were recent.

## COMPANY PROFILE
- Industry: {{ ctx.industry }}
- Sector: {{ ctx.sector }}
- Founded: {{ ctx.founded }}
- Headquarters: {{ ctx.headquarters }}
- Employees: {{ ctx.employees }}
{% if ctx.key_products %}
- Key products: {{ ctx.key_products | join(\", \") }}
{% endif %}

Business description:
{{ ctx.description }}

## FINANCIAL DATA (SEC filings)
{% for line in ctx.financials %}
- {{ line }}
{% else %}
No financial data available.
{% endfor %}

## RECENT NEWS
{% for item in ctx.news %}
{{ loop.index }}. [{{ item.date }}] {{ item.title }}
   {{ item.snippet }}...
{% else %}
No recent news available.
{% endfor %}

## SOCIAL SENTIMENT
{% if ctx.sentiment %}
- Posts analyzed: {{ ctx.sentiment.total }}
- Bullish: {{ ctx.sentiment.bullish_pct }}%
- Bearish: {{ ctx.sentiment.bearish_pct }}%
- Neutral: {{ ctx.sentiment.neutral_pct }}%
- Net sentiment: {{ ctx.sentiment.net }} ({{ ctx.sentiment.label }})
{% if ctx.sentiment.themes %}
- Top themes: {{ ctx.sentiment.themes | join(\", \") }}
{% endif %}
{% else %}
No sentiment data available.
{% endif %}

## COMPETITORS
{% for c in ctx.competitors %}
- {{ c }}
{% else %}
No competitor data available.
{% endfor %}

Write the report with these sections:

## Executive Summary
3-4 sentences with the investment thesis.

## Business Overview
What the company does, its segments and competitive position.

## Financial Analysis
Revenue, profitability, balance sheet strength and cash generation, citing the figures above.

## Recent Developments
The most significant news of the last year and why it matters.

## Market Sentiment
What investors are saying and how it compares with the fundamentals.

## Competitive Landscape
How the company stands against its main competitors.

## Risks
The key risks to the thesis.

## Outlook
Catalysts and what to watch over the next 12 months.

## Analyst Notes
Data gaps or caveats in this analysis.

Use Markdown with clear spacing. Start directly with \"## Executive Summary\".";

/// Render the synthesis report request
pub fn synthesis_prompt(ctx: &SynthesisContext) -> Result<String> {
    render("synthesis", SYNTHESIS_TEMPLATE, context! { ctx => ctx })
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_prompt_lists_candidate() {
        let company = CompanyMatch::new("Apple Inc.", "AAPL", "320193");
        let prompt = validation_prompt("apple", &company).unwrap();

        assert!(prompt.contains("User Input: \"apple\""));
        assert!(prompt.contains("- Name: Apple Inc."));
        assert!(prompt.contains("- Ticker: AAPL"));
        assert!(prompt.contains("- CIK: 320193"));
    }

    #[test]
    fn test_sentiment_prompt_numbers_snippets() {
        let snippets = vec!["first post".to_string(), "x".repeat(600)];
        let prompt = sentiment_prompt("Apple", &snippets).unwrap();

        assert!(prompt.contains("1. first post\n"));
        assert!(prompt.contains(&format!("2. {}\n", "x".repeat(500))));
        assert!(!prompt.contains(&"x".repeat(501)));
    }

    #[test]
    fn test_cleaning_prompt_truncates_input() {
        let text = "a".repeat(12_000);
        let prompt = cleaning_prompt("Apple", &text).unwrap();
        assert!(prompt.contains(&"a".repeat(10_000)));
        assert!(!prompt.contains(&"a".repeat(10_001)));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }
}
