//! Error types for workflow execution

use thiserror::Error;

/// Result type for workflow construction
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised while building or running a workflow
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// The graph is malformed
    #[error("Workflow configuration error: {0}")]
    Config(String),

    /// A router returned a label with no registered target
    #[error("Router for '{node}' returned unknown label '{label}'")]
    UnknownRoute { node: String, label: String },

    /// The run visited more nodes than allowed
    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),

    /// A stage returned an error
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: research_core::Error,
    },
}

impl WorkflowError {
    /// The stage error, if a stage caused the failure
    pub fn stage_error(&self) -> Option<&research_core::Error> {
        match self {
            WorkflowError::Stage { source, .. } => Some(source),
            _ => None,
        }
    }
}
