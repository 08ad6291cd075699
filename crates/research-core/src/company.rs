//! Company identity types
//!
//! `TickerRecord` is the raw identity-reference row published by the SEC,
//! `CompanyMatch` is a candidate produced by matching, and `ValidationResult`
//! records the automatic acceptance check run against the top candidate.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One row of the SEC `company_tickers.json` reference set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRecord {
    /// Central Index Key as published (numeric in the SEC feed)
    #[serde(deserialize_with = "cik_as_string")]
    pub cik_str: String,
    /// Exchange ticker
    pub ticker: String,
    /// Registrant name
    pub title: String,
}

impl TickerRecord {
    /// Create a reference record
    pub fn new(
        cik_str: impl Into<String>,
        ticker: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            cik_str: cik_str.into(),
            ticker: ticker.into(),
            title: title.into(),
        }
    }

    /// Convert into a match candidate
    pub fn to_match(&self) -> CompanyMatch {
        CompanyMatch::new(&self.title, &self.ticker, &self.cik_str)
    }
}

fn cik_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

/// A candidate company identity
///
/// `cik10` is always derived from `cik_str` on construction and on
/// deserialization, so a numeric `cik_str` always carries its zero-padded
/// ten digit form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CompanyMatchFields")]
pub struct CompanyMatch {
    /// Registrant name
    pub title: String,
    /// Exchange ticker
    pub ticker: String,
    /// CIK as published
    pub cik_str: String,
    cik10: Option<String>,
}

#[derive(Deserialize)]
struct CompanyMatchFields {
    title: String,
    ticker: String,
    cik_str: String,
}

impl From<CompanyMatchFields> for CompanyMatch {
    fn from(fields: CompanyMatchFields) -> Self {
        CompanyMatch::new(fields.title, fields.ticker, fields.cik_str)
    }
}

impl CompanyMatch {
    /// Create a candidate, deriving the padded CIK
    pub fn new(
        title: impl Into<String>,
        ticker: impl Into<String>,
        cik_str: impl Into<String>,
    ) -> Self {
        let cik_str = cik_str.into();
        let cik10 = pad_cik(&cik_str);
        Self {
            title: title.into(),
            ticker: ticker.into(),
            cik_str,
            cik10,
        }
    }

    /// Ten digit zero-padded CIK, `None` when `cik_str` is not numeric
    pub fn cik10(&self) -> Option<&str> {
        self.cik10.as_deref()
    }
}

impl fmt::Display for CompanyMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.ticker)
    }
}

/// Zero-pad a numeric CIK to ten digits
pub fn pad_cik(cik: &str) -> Option<String> {
    cik.trim().parse::<u64>().ok().map(|n| format!("{n:010}"))
}

/// Outcome of the automatic match check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `HIGH`, `MEDIUM` or `LOW`
    pub confidence: String,
    /// Whether the candidate matches the user's intent
    pub is_match: bool,
    /// Short explanation from the validator
    pub reasoning: String,
    /// Candidate the check was run against
    pub validated_company: CompanyMatch,
}

impl ValidationResult {
    /// Only a high-confidence positive verdict may bypass human review
    pub fn accepts(&self) -> bool {
        self.is_match && self.confidence.eq_ignore_ascii_case("HIGH")
    }
}
