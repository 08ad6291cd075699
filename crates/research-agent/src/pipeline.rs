//! The research workflow graph
//!
//! ```text
//! load_reference_data ─┬─ skip_match ──────────────────────────────┐
//!                      └─ needs_match → match_candidates            │
//!                           ├─ data_collection ─────────────────────┤
//!                           ├─ suggest → suggest_and_search         │
//!                           │              ├─ end → END             │
//!                           │              └─ validate ─┐           │
//!                           └─ validate ──────→ validate_match      │
//!                                ├─ data_collection ────────────────┤
//!                                └─ resolve → resolve_selection     │
//!                                     ├─ end → END                  │
//!                                     └─ data_collection ───────────┤
//!                                                                   ▼
//! mark_in_progress → initial_data_fanout → extract_financials →
//! deep_research_fanout → synthesize → generate_report → mark_complete → END
//! ```

use crate::patch::ResearchPatch;
use crate::services::Services;
use crate::stages::identity::{
    after_matching, after_resolution, after_suggestions, after_validation, needs_matching,
};
use crate::stages::*;
use research_core::ResearchState;
use research_workflow::{END, FanOut, RunFailure, RunOutcome, Workflow};
use std::sync::Arc;
use tracing::{Instrument, info, info_span};

/// Wire every stage into the research graph
pub fn build_workflow(services: Arc<Services>) -> research_workflow::Result<Workflow<ResearchState>> {
    let initial_data = FanOut::<ResearchState, ResearchPatch>::new(INITIAL_DATA_FANOUT)
        .with_branch(FetchFilings::new(Arc::clone(&services)))
        .with_branch(FetchCompanyProfile::new(Arc::clone(&services)));

    let deep_research = FanOut::<ResearchState, ResearchPatch>::new(DEEP_RESEARCH_FANOUT)
        .with_branch(FetchNewsTimeline::new(Arc::clone(&services)))
        .with_branch(IdentifyCompetitors::new(Arc::clone(&services)))
        .with_branch(ExtractInvestorMaterials)
        .with_branch(AnalyzeSocialSentiment::new(Arc::clone(&services)));

    Workflow::builder("company_research")
        // Identity resolution
        .add_stage(LoadReferenceData::new(Arc::clone(&services)))
        .add_stage(MatchCandidates)
        .add_stage(SuggestAndSearch::new(Arc::clone(&services)))
        .add_stage(ValidateMatch::new(Arc::clone(&services)))
        .add_stage(ResolveSelection::new(Arc::clone(&services)))
        // Research
        .add_stage(MarkInProgress)
        .add_stage(initial_data)
        .add_stage(ExtractFinancials)
        .add_stage(deep_research)
        .add_stage(Synthesize::new(Arc::clone(&services)))
        .add_stage(GenerateReport::new(services))
        .add_stage(MarkComplete)
        .set_entry_point(LOAD_REFERENCE_DATA)
        .add_conditional_edges(
            LOAD_REFERENCE_DATA,
            needs_matching,
            [("needs_match", MATCH_CANDIDATES), ("skip_match", MARK_IN_PROGRESS)],
        )
        .add_conditional_edges(
            MATCH_CANDIDATES,
            after_matching,
            [
                ("data_collection", MARK_IN_PROGRESS),
                ("suggest", SUGGEST_AND_SEARCH),
                ("validate", VALIDATE_MATCH),
            ],
        )
        .add_conditional_edges(
            SUGGEST_AND_SEARCH,
            after_suggestions,
            [("validate", VALIDATE_MATCH), ("end", END)],
        )
        .add_conditional_edges(
            VALIDATE_MATCH,
            after_validation,
            [("data_collection", MARK_IN_PROGRESS), ("resolve", RESOLVE_SELECTION)],
        )
        .add_conditional_edges(
            RESOLVE_SELECTION,
            after_resolution,
            [("data_collection", MARK_IN_PROGRESS), ("end", END)],
        )
        .add_edge(MARK_IN_PROGRESS, INITIAL_DATA_FANOUT)
        .add_edge(INITIAL_DATA_FANOUT, EXTRACT_FINANCIALS)
        .add_edge(EXTRACT_FINANCIALS, DEEP_RESEARCH_FANOUT)
        .add_edge(DEEP_RESEARCH_FANOUT, SYNTHESIZE)
        .add_edge(SYNTHESIZE, GENERATE_REPORT)
        .add_edge(GENERATE_REPORT, MARK_COMPLETE)
        .add_edge(MARK_COMPLETE, END)
        .build()
}

/// A built research workflow ready to run
pub struct ResearchPipeline {
    workflow: Workflow<ResearchState>,
}

impl ResearchPipeline {
    pub fn new(services: Arc<Services>) -> research_workflow::Result<Self> {
        Ok(Self {
            workflow: build_workflow(services)?,
        })
    }

    pub fn workflow(&self) -> &Workflow<ResearchState> {
        &self.workflow
    }

    /// Run the graph for one company
    ///
    /// A failed run still returns the state as it was when the failing stage
    /// aborted, with `status` set to `Failed`.
    pub async fn run(
        &self,
        state: ResearchState,
    ) -> Result<RunOutcome<ResearchState>, RunFailure<ResearchState>> {
        let span = info_span!(
            "research_run",
            run_id = %state.run_id,
            company = %state.company_name
        );

        async move {
            info!("Starting research");
            let result = self.workflow.run(state).await;
            match &result {
                Ok(outcome) => info!(
                    "Research finished with status {} after {} stages",
                    outcome.state.status,
                    outcome.visited.len()
                ),
                Err(failure) => info!("Research aborted: {}", failure),
            }
            result
        }
        .instrument(span)
        .await
    }
}
