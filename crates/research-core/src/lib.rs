//! Core types for the company research pipeline
//!
//! This crate defines the research state threaded through every pipeline
//! stage, the canonical domain entities produced by the stages, and the
//! error type shared across the workspace.

pub mod company;
pub mod error;
pub mod models;
pub mod stage;
pub mod state;

pub use company::{CompanyMatch, TickerRecord, ValidationResult};
pub use error::{Error, Result};
pub use models::{
    CompanyProfile, Competitor, FinancialMetric, FinancialStatements, InvestorDoc,
    ManagementMember, SearchResult, SearchSource, SentimentAggregate, SentimentSample,
    SocialSentiment,
};
pub use stage::{Stage, WorkflowState};
pub use state::{PipelineStatus, ResearchState, StateCheck};
