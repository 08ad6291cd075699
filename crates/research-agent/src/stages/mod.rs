//! Research pipeline stages and fan-out branches
//!
//! Each stage holds an `Arc<Services>` and implements
//! [`Stage<ResearchState>`](research_core::Stage). Branches of the two
//! fan-out groups implement [`Branch`](research_workflow::Branch) and return
//! a [`ResearchPatch`](crate::patch::ResearchPatch).

pub mod identity;
pub mod report;
pub mod sec_data;
pub mod sentiment;
pub mod status;
pub mod synthesis;
pub mod web_research;

pub use identity::{
    LoadReferenceData, MatchCandidates, ResolveSelection, SuggestAndSearch, ValidateMatch,
};
pub use report::GenerateReport;
pub use sec_data::{ExtractFinancials, FetchFilings};
pub use sentiment::AnalyzeSocialSentiment;
pub use status::{MarkComplete, MarkInProgress};
pub use synthesis::Synthesize;
pub use web_research::{
    ExtractInvestorMaterials, FetchCompanyProfile, FetchNewsTimeline, IdentifyCompetitors,
};

use crate::config::ResearchConfig;
use crate::services::Services;
use research_llm::{CompletionRequest, LLMError, complete_json};
use research_resilience::{RetryPolicy, Retryable};
use serde::de::DeserializeOwned;
use std::future::Future;
use tracing::warn;

// Stage names
pub const LOAD_REFERENCE_DATA: &str = "load_reference_data";
pub const MATCH_CANDIDATES: &str = "match_candidates";
pub const SUGGEST_AND_SEARCH: &str = "suggest_and_search";
pub const VALIDATE_MATCH: &str = "validate_match";
pub const RESOLVE_SELECTION: &str = "resolve_selection";
pub const MARK_IN_PROGRESS: &str = "mark_in_progress";
pub const INITIAL_DATA_FANOUT: &str = "initial_data_fanout";
pub const EXTRACT_FINANCIALS: &str = "extract_financials";
pub const DEEP_RESEARCH_FANOUT: &str = "deep_research_fanout";
pub const SYNTHESIZE: &str = "synthesize";
pub const GENERATE_REPORT: &str = "generate_report";
pub const MARK_COMPLETE: &str = "mark_complete";

// Branch names
pub const FETCH_FILINGS: &str = "fetch_filings";
pub const FETCH_COMPANY_PROFILE: &str = "fetch_company_profile";
pub const FETCH_NEWS_TIMELINE: &str = "fetch_news_timeline";
pub const IDENTIFY_COMPETITORS: &str = "identify_competitors";
pub const EXTRACT_INVESTOR_MATERIALS: &str = "extract_investor_materials";
pub const ANALYZE_SOCIAL_SENTIMENT: &str = "analyze_social_sentiment";

/// Retry policy for stage-level calls, falling back to a single attempt
pub(crate) fn retry_policy(config: &ResearchConfig) -> RetryPolicy {
    config.retry_policy().unwrap_or_else(|e| {
        warn!("Invalid retry configuration ({}), retries disabled", e);
        RetryPolicy::no_retry()
    })
}

/// Build a completion request from its parts
pub(crate) fn llm_request(
    model: &str,
    system: &str,
    user: String,
    temperature: f32,
    max_tokens: usize,
) -> CompletionRequest {
    CompletionRequest::new(model)
        .system(system)
        .user(user)
        .temperature(temperature)
        .max_tokens(max_tokens)
}

/// Outcome of an LLM call made under the retry policy
pub(crate) struct LlmCall<T> {
    pub result: Result<T, LLMError>,
    /// Retries performed before the final attempt
    pub retries: u32,
}

async fn with_retry<T, F, Fut>(services: &Services, operation: &str, mut call: F) -> LlmCall<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LLMError>>,
{
    let mut retries = 0;
    let result = retry_policy(&services.config)
        .execute_observed(
            operation,
            LLMError::is_retryable,
            |_, _| retries += 1,
            &mut call,
        )
        .await;
    LlmCall { result, retries }
}

/// Plain text completion with retries
pub(crate) async fn complete_text(
    services: &Services,
    operation: &str,
    request: CompletionRequest,
) -> LlmCall<String> {
    let llm = &services.llm;
    with_retry(services, operation, || {
        let request = request.clone();
        async move {
            let response = llm.complete(request).await?;
            if response.is_truncated() {
                warn!("Completion for {} hit the token limit", operation);
            }
            Ok::<_, LLMError>(response.text)
        }
    })
    .await
}

/// Structured completion with retries on transient provider errors
pub(crate) async fn complete_structured<T: DeserializeOwned>(
    services: &Services,
    operation: &str,
    request: CompletionRequest,
) -> LlmCall<T> {
    let request = request.json();
    let llm = &services.llm;
    with_retry(services, operation, || {
        let request = request.clone();
        async move { complete_json::<T>(llm.as_ref(), request).await }
    })
    .await
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by the stage tests

    use super::*;
    use crate::services::{
        HumanResolver, MockFilingSource, MockPageFetcher, MockReferenceSource, MockWebSearch,
    };
    use async_trait::async_trait;
    use mockall::mock;
    use research_core::CompanyMatch;
    use research_llm::{CompletionResponse, LLMProvider};
    use std::sync::Arc;

    mock! {
        pub Provider {}

        #[async_trait]
        impl LLMProvider for Provider {
            async fn complete(&self, request: CompletionRequest) -> research_llm::Result<CompletionResponse>;
            fn name(&self) -> &str;
        }
    }

    /// Resolver answering with a fixed string
    pub struct FixedResolver(pub Option<String>);

    #[async_trait]
    impl HumanResolver for FixedResolver {
        async fn select(&self, _prompt: &str, _options: &[CompanyMatch]) -> Option<String> {
            self.0.clone()
        }
    }

    /// Collaborators for one test; unset mocks expect no calls
    pub struct Doubles {
        pub config: ResearchConfig,
        pub reference: MockReferenceSource,
        pub filings: MockFilingSource,
        pub search: MockWebSearch,
        pub pages: MockPageFetcher,
        pub llm: MockProvider,
        pub resolver: Option<Arc<dyn HumanResolver>>,
    }

    impl Default for Doubles {
        fn default() -> Self {
            let mut llm = MockProvider::new();
            llm.expect_name().return_const("mock".to_string());
            Self {
                config: ResearchConfig::default(),
                reference: MockReferenceSource::new(),
                filings: MockFilingSource::new(),
                search: MockWebSearch::new(),
                pages: MockPageFetcher::new(),
                llm,
                resolver: None,
            }
        }
    }

    impl Doubles {
        pub fn into_services(self) -> Arc<Services> {
            Arc::new(Services {
                config: Arc::new(self.config),
                reference: Arc::new(self.reference),
                filings: Arc::new(self.filings),
                search: Arc::new(self.search),
                pages: Arc::new(self.pages),
                llm: Arc::new(self.llm),
                resolver: self.resolver,
            })
        }
    }

    pub fn reply(text: &str) -> research_llm::Result<CompletionResponse> {
        Ok(CompletionResponse::from_text(text))
    }
}
