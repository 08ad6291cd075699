//! Parallel fan-out / fan-in over a state snapshot
//!
//! Every branch receives the same immutable snapshot and returns an owned
//! patch. Branches run as separate tokio tasks; once all of them have
//! finished, the successful patches are applied to the live state in the
//! order the branches were declared, regardless of completion order. A
//! branch that errors or panics is logged and contributes nothing.

use async_trait::async_trait;
use futures::future::join_all;
use research_core::{Result, Stage, WorkflowState};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// One unit of work inside a fan-out group
#[async_trait]
pub trait Branch<S, P>: Send + Sync {
    fn name(&self) -> &str;

    /// Compute a patch from the snapshot
    async fn run(&self, snapshot: Arc<S>) -> Result<P>;
}

/// A partial update produced by a branch
pub trait Patch<S> {
    /// Write the patch's present fields into the state
    fn apply_to(self, state: &mut S);
}

/// What happened to one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    Applied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReport {
    pub name: String,
    pub outcome: BranchOutcome,
}

/// Per-branch outcomes, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub branches: Vec<BranchReport>,
}

impl FanOutReport {
    pub fn succeeded(&self) -> usize {
        self.branches
            .iter()
            .filter(|b| b.outcome == BranchOutcome::Applied)
            .count()
    }

    /// Names and messages of the failed branches
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.branches.iter().filter_map(|b| match &b.outcome {
            BranchOutcome::Failed(msg) => Some((b.name.as_str(), msg.as_str())),
            BranchOutcome::Applied => None,
        })
    }
}

impl fmt::Display for FanOutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} branches succeeded", self.succeeded(), self.branches.len())
    }
}

/// A static, ordered group of branches
pub struct FanOut<S, P> {
    name: String,
    branches: Vec<Arc<dyn Branch<S, P>>>,
}

impl<S, P> FanOut<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Patch<S> + Send + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branches: Vec::new(),
        }
    }

    pub fn with_branch<B: Branch<S, P> + 'static>(mut self, branch: B) -> Self {
        self.branches.push(Arc::new(branch));
        self
    }

    pub fn branch_names(&self) -> Vec<&str> {
        self.branches.iter().map(|b| b.name()).collect()
    }

    /// Run all branches concurrently, then merge in declaration order
    pub async fn execute(&self, state: &mut S) -> FanOutReport {
        let snapshot = Arc::new(state.clone());
        info!(
            "Fan-out '{}' starting {} branches",
            self.name,
            self.branches.len()
        );

        let handles = self.branches.iter().map(|branch| {
            let branch = Arc::clone(branch);
            let snapshot = Arc::clone(&snapshot);
            tokio::spawn(async move { branch.run(snapshot).await })
        });
        let results = join_all(handles).await;

        let mut report = FanOutReport::default();
        for (branch, result) in self.branches.iter().zip(results) {
            let outcome = match result {
                Ok(Ok(patch)) => {
                    patch.apply_to(state);
                    BranchOutcome::Applied
                }
                Ok(Err(e)) => {
                    error!("Branch '{}' in '{}' failed: {}", branch.name(), self.name, e);
                    BranchOutcome::Failed(e.to_string())
                }
                Err(join_err) => {
                    error!(
                        "Branch '{}' in '{}' did not complete: {}",
                        branch.name(),
                        self.name,
                        join_err
                    );
                    BranchOutcome::Failed(join_err.to_string())
                }
            };
            report.branches.push(BranchReport {
                name: branch.name().to_string(),
                outcome,
            });
        }

        info!("Fan-out '{}' complete: {}", self.name, report);
        report
    }
}

#[async_trait]
impl<S, P> Stage<S> for FanOut<S, P>
where
    S: WorkflowState,
    P: Patch<S> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, state: &mut S) -> Result<()> {
        self.execute(state).await;
        Ok(())
    }
}
