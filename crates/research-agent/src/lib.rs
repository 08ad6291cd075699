//! Company research pipeline
//!
//! Given a company name, the pipeline resolves it to an SEC registrant,
//! gathers filings, web and social data concurrently, and writes an
//! LLM-synthesized investment report. It includes:
//!
//! - Identity resolution against the SEC ticker list (fuzzy matching, LLM
//!   suggestions and validation, human selection)
//! - SEC EDGAR companyfacts and submissions, with one-year statement extraction
//! - Company profile, news, competitors and investor filings from web search
//! - Social sentiment classification in batches
//! - Report synthesis with a primary and a fallback model
//! - Markdown and JSON report output
//!
//! # Architecture
//!
//! Every external system sits behind a trait in [`services`]; the stages in
//! [`stages`] only see a shared [`Services`] bundle. [`pipeline`] wires the
//! stages into a [`Workflow`](research_workflow::Workflow) with routers for
//! identity resolution and two fan-out groups for data collection.
//!
//! # Example
//!
//! ```rust,ignore
//! use research_agent::{ResearchConfig, ResearchPipeline, Services};
//! use research_core::ResearchState;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let services = Services::live(ResearchConfig::from_env()?)?;
//!     let pipeline = ResearchPipeline::new(Arc::new(services))?;
//!
//!     let state = ResearchState::new("Apple").with_human_response("1");
//!     let outcome = pipeline.run(state).await?;
//!     println!("{}", outcome.state.progress_summary());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod prompts;
pub mod services;
pub mod stages;

pub use config::ResearchConfig;
pub use error::SourceError;
pub use patch::ResearchPatch;
pub use pipeline::{ResearchPipeline, build_workflow};
pub use services::{
    FilingSource, HumanResolver, PageFetcher, ReferenceSource, Services, WebSearch,
};
