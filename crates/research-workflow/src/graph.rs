//! Graph definition and execution

use crate::error::{Result, WorkflowError};
use research_core::{Stage, WorkflowState};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Terminal node name
pub const END: &str = "__end__";

/// Pure routing function returning a label registered for its node
pub type Router<S> = Arc<dyn Fn(&S) -> &'static str + Send + Sync>;

enum Transition<S> {
    Direct(String),
    Conditional {
        router: Router<S>,
        routes: HashMap<String, String>,
    },
}

impl<S> Transition<S> {
    fn targets(&self) -> Vec<&str> {
        match self {
            Transition::Direct(to) => vec![to.as_str()],
            Transition::Conditional { routes, .. } => routes.values().map(String::as_str).collect(),
        }
    }
}

/// Result of a run that reached the end of the graph
#[derive(Debug)]
pub struct RunOutcome<S> {
    pub state: S,
    /// Stages entered, in order
    pub visited: Vec<String>,
}

/// A failed run; the state is preserved as it was when the run aborted
#[derive(Debug)]
pub struct RunFailure<S> {
    pub state: S,
    pub error: WorkflowError,
    pub visited: Vec<String>,
}

impl<S> fmt::Display for RunFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workflow failed after {} stage(s): {}", self.visited.len(), self.error)
    }
}

impl<S: fmt::Debug> std::error::Error for RunFailure<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A validated workflow graph
///
/// # Example
///
/// ```ignore
/// let workflow = Workflow::builder("research")
///     .add_stage(LoadReferenceData::new(services.clone()))
///     .add_stage(MatchCandidates::new(services.clone()))
///     .add_conditional_edges(
///         "load_reference_data",
///         |s: &ResearchState| if s.found().is_some() { "skip_match" } else { "needs_match" },
///         [("needs_match", "match_candidates"), ("skip_match", END)],
///     )
///     .add_edge("match_candidates", END)
///     .set_entry_point("load_reference_data")
///     .build()?;
///
/// let outcome = workflow.run(ResearchState::new("Apple")).await?;
/// ```
pub struct Workflow<S> {
    name: String,
    stages: HashMap<String, Arc<dyn Stage<S>>>,
    transitions: HashMap<String, Transition<S>>,
    entry: String,
    max_steps: usize,
}

impl<S: WorkflowState> Workflow<S> {
    /// Create a new workflow builder
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder<S> {
        WorkflowBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_point(&self) -> &str {
        &self.entry
    }

    /// Registered stage names, sorted
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Labels a router on `node` may return, sorted
    pub fn route_labels(&self, node: &str) -> Vec<&str> {
        match self.transitions.get(node) {
            Some(Transition::Conditional { routes, .. }) => {
                let mut labels: Vec<&str> = routes.keys().map(String::as_str).collect();
                labels.sort_unstable();
                labels
            }
            _ => Vec::new(),
        }
    }

    /// Drive the graph from the entry point until `END`
    ///
    /// The run stops early, successfully, if the state reports itself
    /// finished. A stage error or a routing error aborts the run; the state
    /// is then passed through [`WorkflowState::on_failure`] and returned in
    /// the [`RunFailure`].
    pub async fn run(&self, mut state: S) -> std::result::Result<RunOutcome<S>, RunFailure<S>> {
        let mut visited = Vec::new();
        let mut current = self.entry.clone();

        info!("Starting workflow '{}' at '{}'", self.name, current);

        loop {
            if current == END {
                info!(
                    "Workflow '{}' reached end after {} stage(s)",
                    self.name,
                    visited.len()
                );
                return Ok(RunOutcome { state, visited });
            }

            if state.is_finished() {
                debug!("State finished; not entering '{}'", current);
                return Ok(RunOutcome { state, visited });
            }

            if visited.len() >= self.max_steps {
                warn!("Max steps ({}) reached, stopping", self.max_steps);
                return Err(Self::fail(
                    state,
                    WorkflowError::StepLimitExceeded(self.max_steps),
                    visited,
                ));
            }

            let Some(stage) = self.stages.get(&current) else {
                let err = WorkflowError::Config(format!("unknown stage '{current}'"));
                return Err(Self::fail(state, err, visited));
            };

            state.on_enter(&current);
            visited.push(current.clone());
            debug!("Entering stage: {}", current);

            if let Err(source) = stage.run(&mut state).await {
                error!("Stage '{}' failed: {}", current, source);
                let err = WorkflowError::Stage {
                    stage: current,
                    source,
                };
                return Err(Self::fail(state, err, visited));
            }

            match self.next_node(&current, &state) {
                Ok(next) => {
                    debug!("Transition: {} -> {}", current, next);
                    current = next;
                }
                Err(err) => {
                    error!("Routing from '{}' failed: {}", current, err);
                    return Err(Self::fail(state, err, visited));
                }
            }
        }
    }

    fn next_node(&self, node: &str, state: &S) -> Result<String> {
        match self.transitions.get(node) {
            Some(Transition::Direct(to)) => Ok(to.clone()),
            Some(Transition::Conditional { router, routes }) => {
                let label = router(state);
                routes
                    .get(label)
                    .cloned()
                    .ok_or_else(|| WorkflowError::UnknownRoute {
                        node: node.to_string(),
                        label: label.to_string(),
                    })
            }
            None => Err(WorkflowError::Config(format!(
                "stage '{node}' has no outgoing transition"
            ))),
        }
    }

    fn fail(mut state: S, error: WorkflowError, visited: Vec<String>) -> RunFailure<S> {
        match error.stage_error() {
            Some(source) => state.on_failure(source),
            None => state.on_failure(&research_core::Error::Other(error.to_string())),
        }
        RunFailure {
            state,
            error,
            visited,
        }
    }
}

/// Builder for constructing workflows
pub struct WorkflowBuilder<S> {
    name: String,
    stages: Vec<Arc<dyn Stage<S>>>,
    transitions: Vec<(String, Transition<S>)>,
    entry: Option<String>,
    max_steps: usize,
}

impl<S: WorkflowState> WorkflowBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            transitions: Vec::new(),
            entry: None,
            max_steps: 50,
        }
    }

    /// Register a stage under its own name
    pub fn add_stage<T: Stage<S> + 'static>(self, stage: T) -> Self {
        self.add_shared_stage(Arc::new(stage))
    }

    /// Register an already shared stage
    pub fn add_shared_stage(mut self, stage: Arc<dyn Stage<S>>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Unconditional edge
    pub fn add_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions
            .push((from.into(), Transition::Direct(to.into())));
        self
    }

    /// Router edge; the router's label selects the target
    pub fn add_conditional_edges<F, I, L, T>(
        mut self,
        from: impl Into<String>,
        router: F,
        routes: I,
    ) -> Self
    where
        F: Fn(&S) -> &'static str + Send + Sync + 'static,
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        let routes = routes
            .into_iter()
            .map(|(label, to)| (label.into(), to.into()))
            .collect();
        self.transitions.push((
            from.into(),
            Transition::Conditional {
                router: Arc::new(router),
                routes,
            },
        ));
        self
    }

    pub fn set_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Maximum number of stages one run may enter (default 50)
    pub fn max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    /// Validate and build the workflow
    pub fn build(self) -> Result<Workflow<S>> {
        let mut stages = HashMap::new();
        for stage in self.stages {
            let name = stage.name().to_string();
            if name == END {
                return Err(WorkflowError::Config(format!("'{END}' is reserved")));
            }
            if stages.insert(name.clone(), stage).is_some() {
                return Err(WorkflowError::Config(format!("duplicate stage '{name}'")));
            }
        }

        let entry = self
            .entry
            .ok_or_else(|| WorkflowError::Config("no entry point set".to_string()))?;
        if !stages.contains_key(&entry) {
            return Err(WorkflowError::Config(format!(
                "entry point '{entry}' is not a registered stage"
            )));
        }

        let mut transitions = HashMap::new();
        for (from, transition) in self.transitions {
            if !stages.contains_key(&from) {
                return Err(WorkflowError::Config(format!(
                    "edge source '{from}' is not a registered stage"
                )));
            }
            if transition.targets().is_empty() {
                return Err(WorkflowError::Config(format!(
                    "router on '{from}' has no routes"
                )));
            }
            if let Some(target) = transition
                .targets()
                .into_iter()
                .find(|t| *t != END && !stages.contains_key(*t))
            {
                return Err(WorkflowError::Config(format!(
                    "edge target '{target}' from '{from}' is not a registered stage"
                )));
            }
            if transitions.insert(from.clone(), transition).is_some() {
                return Err(WorkflowError::Config(format!(
                    "stage '{from}' has more than one outgoing transition"
                )));
            }
        }

        let targeted: HashSet<&str> = transitions
            .values()
            .flat_map(|t| t.targets())
            .collect();
        let mut names: Vec<&String> = stages.keys().collect();
        names.sort_unstable();
        for name in names {
            if !transitions.contains_key(name) {
                return Err(WorkflowError::Config(format!(
                    "stage '{name}' has no outgoing transition"
                )));
            }
            if *name != entry && !targeted.contains(name.as_str()) {
                warn!("Stage '{}' is unreachable", name);
            }
        }

        debug!(
            "Built workflow '{}' with {} stage(s)",
            self.name,
            stages.len()
        );

        Ok(Workflow {
            name: self.name,
            stages,
            transitions,
            entry,
            max_steps: self.max_steps,
        })
    }
}
