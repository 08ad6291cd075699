//! Status transitions around the research phase

use super::{MARK_COMPLETE, MARK_IN_PROGRESS};
use async_trait::async_trait;
use chrono::Utc;
use research_core::{PipelineStatus, ResearchState, Result, Stage};
use tracing::info;

/// Entered once the identity is resolved
#[derive(Default)]
pub struct MarkInProgress;

#[async_trait]
impl Stage<ResearchState> for MarkInProgress {
    fn name(&self) -> &str {
        MARK_IN_PROGRESS
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        state.status = PipelineStatus::ResearchInProgress;
        if let Some(found) = state.found() {
            info!("Researching {} ({})", found.title, found.ticker);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MarkComplete;

#[async_trait]
impl Stage<ResearchState> for MarkComplete {
    fn name(&self) -> &str {
        MARK_COMPLETE
    }

    async fn run(&self, state: &mut ResearchState) -> Result<()> {
        state.status = PipelineStatus::Completed;
        state.execution_end = Some(Utc::now());
        info!(
            "Research complete in {:.1}s: {}",
            state.duration().unwrap_or_default(),
            state.progress_summary()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transitions() {
        let mut state = ResearchState::new("Apple");

        MarkInProgress.run(&mut state).await.unwrap();
        assert_eq!(state.status, PipelineStatus::ResearchInProgress);
        assert!(state.execution_end.is_none());

        MarkComplete.run(&mut state).await.unwrap();
        assert_eq!(state.status, PipelineStatus::Completed);
        assert!(state.duration().is_some());
    }
}
