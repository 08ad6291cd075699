//! Workflow orchestration for the company research pipeline
//!
//! A [`Workflow`] is a directed graph of named [`Stage`]s connected by
//! unconditional edges or by routers that map the current state to a label.
//! A [`FanOut`] runs a fixed group of branches concurrently over a snapshot
//! of the state and merges their patches back in declaration order.
//!
//! [`Stage`]: research_core::Stage

pub mod error;
pub mod fanout;
pub mod graph;

// Re-export for convenience
pub use error::{Result, WorkflowError};
pub use fanout::{Branch, BranchOutcome, BranchReport, FanOut, FanOutReport, Patch};
pub use graph::{END, Router, RunFailure, RunOutcome, Workflow, WorkflowBuilder};
