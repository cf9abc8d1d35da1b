//! The engine: one [`StateManager`] wired behind one [`ChangeProcessor`].

use std::sync::Arc;

use syncd_core::{EngineConfig, ProjectState};
use syncd_state::StateManager;

use crate::error::ProcessorError;
use crate::processor::ChangeProcessor;

pub struct SyncEngine {
    state: Arc<StateManager>,
    processor: ChangeProcessor,
}

impl SyncEngine {
    /// Load persisted state (when enabled) and build a stopped engine.
    pub fn open(config: EngineConfig) -> Result<Self, ProcessorError> {
        let state = Arc::new(StateManager::open(config.state)?);
        let processor = ChangeProcessor::new(config.processor, state.clone())?;
        Ok(Self { state, processor })
    }

    pub async fn start(&self) -> Result<(), ProcessorError> {
        self.processor.start().await
    }

    /// Drain the processor, then persist the final state.
    pub async fn stop(&self) -> Result<(), ProcessorError> {
        self.processor.stop().await?;
        self.state.shutdown().await?;
        Ok(())
    }

    pub fn processor(&self) -> &ChangeProcessor {
        &self.processor
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    pub fn current_state(&self) -> Arc<ProjectState> {
        self.state.get_state()
    }
}
