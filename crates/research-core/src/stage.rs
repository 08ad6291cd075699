//! Core Stage trait definition

use crate::Result;
use async_trait::async_trait;

/// A node in the research workflow graph
///
/// Stages mutate the state they are handed and may only touch the fields
/// they own. Conditions a stage can recover from are recorded on the state
/// rather than returned as errors.
#[async_trait]
pub trait Stage<S>: Send + Sync {
    /// Stable name used as the node identifier
    fn name(&self) -> &str;

    /// Run the stage against the shared state
    async fn run(&self, state: &mut S) -> Result<()>;
}

/// Lifecycle hooks the workflow engine drives on its state
pub trait WorkflowState: Clone + Send + Sync + 'static {
    /// Called before a stage runs
    fn on_enter(&mut self, node: &str);

    /// Called when a stage error aborts the run
    fn on_failure(&mut self, error: &crate::Error);

    /// Once true, no further stage may run
    fn is_finished(&self) -> bool;
}
