//! SEC filing payloads and financial statement extraction

use super::{EXTRACT_FINANCIALS, FETCH_FILINGS};
use crate::patch::ResearchPatch;
use crate::services::Services;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use research_core::{Error, FinancialMetric, FinancialStatements, ResearchState, Result, Stage};
use research_workflow::Branch;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Statement line items, each with the us-gaap elements tried in order
const INCOME_STATEMENT: &[(&str, &[&str])] = &[
    (
        "revenues",
        &[
            "Revenues",
            "SalesRevenueNet",
            "RevenueFromContractWithCustomerExcludingAssessedTax",
        ],
    ),
    ("operating_income", &["OperatingIncomeLoss"]),
    ("net_income", &["NetIncomeLoss", "ProfitLoss"]),
];

const BALANCE_SHEET: &[(&str, &[&str])] = &[
    ("assets", &["Assets"]),
    ("liabilities", &["Liabilities"]),
    (
        "equity",
        &[
            "StockholdersEquity",
            "StockholdersEquityIncludingPortionAttributableToNoncontrollingInterest",
        ],
    ),
];

const CASHFLOW: &[(&str, &[&str])] = &[
    (
        "operating_cashflow",
        &["NetCashProvidedByUsedInOperatingActivities"],
    ),
    (
        "investing_cashflow",
        &["NetCashProvidedByUsedInInvestingActivities"],
    ),
    (
        "financing_cashflow",
        &["NetCashProvidedByUsedInFinancingActivities"],
    ),
];

/// Fetches companyfacts and submissions for the resolved CIK
pub struct FetchFilings {
    services: Arc<Services>,
}

impl FetchFilings {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Branch<ResearchState, ResearchPatch> for FetchFilings {
    fn name(&self) -> &str {
        FETCH_FILINGS
    }

    async fn run(&self, snapshot: Arc<ResearchState>) -> Result<ResearchPatch> {
        let cik10 = snapshot.cik10().ok_or_else(|| {
            Error::Precondition("CIK not set - company must be resolved first".to_string())
        })?;
        info!("Fetching SEC data for CIK {}", cik10);

        let filings = &self.services.filings;
        let (companyfacts, submissions) =
            tokio::try_join!(filings.company_facts(cik10), filings.submissions(cik10))?;
        info!("Fetched companyfacts and submissions");

        Ok(ResearchPatch {
            companyfacts: Some(companyfacts),
            submissions: Some(submissions),
            ..Default::default()
        })
    }
}

/// Latest value of the first element that has data on or after `cutoff`
///
/// USD units are preferred; otherwise the first unit listed is used. A
/// data point is dated by its period end, or its filing date without one.
pub fn latest_metric(
    us_gaap: &Map<String, Value>,
    element_names: &[&str],
    cutoff: &str,
) -> Option<FinancialMetric> {
    for name in element_names {
        let Some(units) = us_gaap
            .get(*name)
            .and_then(|e| e.get("units"))
            .and_then(Value::as_object)
        else {
            continue;
        };

        let Some((unit, Value::Array(points))) = units
            .get_key_value("USD")
            .or_else(|| units.iter().next())
        else {
            continue;
        };

        let date_of = |point: &Value| {
            point
                .get("end")
                .or_else(|| point.get("filed"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let latest = points
            .iter()
            .filter_map(|p| date_of(p).map(|d| (d, p)))
            .filter(|(date, _)| date.as_str() >= cutoff)
            .max_by(|a, b| a.0.cmp(&b.0));

        if let Some((date, point)) = latest {
            return Some(FinancialMetric {
                element: (*name).to_string(),
                value: point.get("val").and_then(Value::as_f64),
                date: Some(date),
                unit: unit.clone(),
                form_type: point.get("form").and_then(Value::as_str).map(str::to_string),
            });
        }
    }
    None
}

fn statement(
    us_gaap: &Map<String, Value>,
    items: &[(&str, &[&str])],
    cutoff: &str,
) -> BTreeMap<String, Option<FinancialMetric>> {
    items
        .iter()
        .map(|(key, names)| ((*key).to_string(), latest_metric(us_gaap, names, cutoff)))
        .collect()
}

/// Build one-year financial statements from a companyfacts payload
///
/// Returns `None` when the payload carries no us-gaap facts.
pub fn extract_statements(companyfacts: &Value, cutoff: &str) -> Option<FinancialStatements> {
    let us_gaap = companyfacts
        .get("facts")
        .and_then(|f| f.get("us-gaap"))
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty())?;

    Some(FinancialStatements {
        income_statement: statement(us_gaap, INCOME_STATEMENT, cutoff),
        balance_sheet: statement(us_gaap, BALANCE_SHEET, cutoff),
        cashflow: statement(us_gaap, CASHFLOW, cutoff),
        extraction_date: Utc::now(),
    })
}

/// Extracts the last year of financial statements from companyfacts
#[derive(Default)]
pub struct ExtractFinancials;

#[async_trait]
impl Stage<ResearchState> for ExtractFinancials {
    fn name(&self) -> &str {
        EXTRACT_FINANCIALS
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        let Some(companyfacts) = &state.companyfacts else {
            warn!("No companyfacts data available");
            return Ok(());
        };

        let cutoff = (Utc::now() - Duration::days(365))
            .format("%Y-%m-%d")
            .to_string();
        info!("Filtering financial data to last 1 year (from {})", cutoff);

        match extract_statements(companyfacts, &cutoff) {
            Some(statements) => {
                info!("Extracted {} financial metrics", statements.metric_count());
                state.financials_1yr = Some(statements);
            }
            None => warn!("No US-GAAP data found in companyfacts"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::Doubles;
    use research_core::CompanyMatch;
    use serde_json::json;

    fn companyfacts() -> Value {
        json!({
            "cik": 320193,
            "facts": {
                "us-gaap": {
                    "Revenues": {"units": {"USD": [
                        {"end": "2022-09-24", "val": 394_328_000_000_i64, "form": "10-K"}
                    ]}},
                    "RevenueFromContractWithCustomerExcludingAssessedTax": {"units": {"USD": [
                        {"end": "2025-03-29", "val": 95_359_000_000_i64, "form": "10-Q"},
                        {"end": "2025-06-28", "val": 94_036_000_000_i64, "form": "10-Q"},
                        {"filed": "2025-01-31", "val": 124_300_000_000_i64, "form": "10-Q"}
                    ]}},
                    "Assets": {"units": {"USD": [
                        {"end": "2025-06-28", "val": 331_495_000_000_i64, "form": "10-Q"}
                    ]}},
                    "EntityCommonStockSharesOutstanding": {"units": {"shares": [
                        {"end": "2025-07-18", "val": 14_840_390_000_i64, "form": "10-Q"}
                    ]}}
                }
            }
        })
    }

    #[test]
    fn test_latest_metric_tries_alternates_in_order() {
        let facts = companyfacts();
        let us_gaap = facts["facts"]["us-gaap"].as_object().unwrap();

        // "Revenues" only has data before the cutoff
        let metric = latest_metric(
            us_gaap,
            &["Revenues", "RevenueFromContractWithCustomerExcludingAssessedTax"],
            "2024-10-01",
        )
        .unwrap();
        assert_eq!(
            metric.element,
            "RevenueFromContractWithCustomerExcludingAssessedTax"
        );
        assert_eq!(metric.date.as_deref(), Some("2025-06-28"));
        assert_eq!(metric.value, Some(94_036_000_000.0));
        assert_eq!(metric.unit, "USD");
        assert_eq!(metric.form_type.as_deref(), Some("10-Q"));
    }

    #[test]
    fn test_latest_metric_non_usd_unit() {
        let facts = companyfacts();
        let us_gaap = facts["facts"]["us-gaap"].as_object().unwrap();
        let metric =
            latest_metric(us_gaap, &["EntityCommonStockSharesOutstanding"], "2024-10-01").unwrap();
        assert_eq!(metric.unit, "shares");

        assert!(latest_metric(us_gaap, &["Liabilities"], "2024-10-01").is_none());
    }

    #[test]
    fn test_extract_statements() {
        let statements = extract_statements(&companyfacts(), "2024-10-01").unwrap();

        assert_eq!(statements.income_statement.len(), 3);
        assert!(statements.income_statement["revenues"].is_some());
        assert!(statements.income_statement["net_income"].is_none());
        assert!(statements.balance_sheet["assets"].is_some());
        assert!(statements.is_complete());
        assert_eq!(statements.metric_count(), 2);

        assert!(extract_statements(&json!({"facts": {}}), "2024-10-01").is_none());
    }

    #[tokio::test]
    async fn test_fetch_filings_requires_cik() {
        let branch = FetchFilings::new(Doubles::default().into_services());
        let err = branch
            .run(Arc::new(ResearchState::new("Apple")))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Precondition failed: CIK not set - company must be resolved first"
        );
    }

    #[tokio::test]
    async fn test_fetch_filings() {
        let mut doubles = Doubles::default();
        doubles
            .filings
            .expect_company_facts()
            .withf(|cik| cik.to_string() == "0000320193")
            .returning(|_| Ok(json!({"facts": {}})));
        doubles
            .filings
            .expect_submissions()
            .returning(|_| Ok(json!({"name": "Apple Inc."})));
        let branch = FetchFilings::new(doubles.into_services());

        let state =
            ResearchState::with_selected_company(CompanyMatch::new("Apple Inc.", "AAPL", "320193"))
                .unwrap();
        let patch = branch.run(Arc::new(state)).await.unwrap();
        assert_eq!(patch.submissions.unwrap()["name"], "Apple Inc.");
        assert!(patch.companyfacts.is_some());
    }

    #[tokio::test]
    async fn test_extract_financials_without_payload() {
        let mut state = ResearchState::new("Apple");
        ExtractFinancials.run(&mut state).await.unwrap();
        assert!(state.financials_1yr.is_none());
    }
}
