//! Partial state updates produced by fan-out branches

use research_core::{
    CompanyProfile, Competitor, InvestorDoc, ResearchState, SearchResult, SocialSentiment,
};
use research_workflow::Patch;

/// Fields a research branch may produce
///
/// Merging only overwrites a state field when the branch produced a value
/// for it: `Some` for options, non-empty for collections.
#[derive(Debug, Clone, Default)]
pub struct ResearchPatch {
    pub companyfacts: Option<serde_json::Value>,
    pub submissions: Option<serde_json::Value>,
    pub company_profile: Option<CompanyProfile>,
    pub news_timeline: Vec<SearchResult>,
    pub competitors: Vec<Competitor>,
    pub investor_materials: Vec<InvestorDoc>,
    pub social_sentiment: Option<SocialSentiment>,
}

impl Patch<ResearchState> for ResearchPatch {
    fn apply_to(self, state: &mut ResearchState) {
        if self.companyfacts.is_some() {
            state.companyfacts = self.companyfacts;
        }
        if self.submissions.is_some() {
            state.submissions = self.submissions;
        }
        if self.company_profile.is_some() {
            state.company_profile = self.company_profile;
        }
        if !self.news_timeline.is_empty() {
            state.news_timeline = self.news_timeline;
        }
        if !self.competitors.is_empty() {
            state.competitors = self.competitors;
        }
        if !self.investor_materials.is_empty() {
            state.investor_materials = self.investor_materials;
        }
        if self.social_sentiment.is_some() {
            state.social_sentiment = self.social_sentiment;
        }
    }
}
