use std::collections::HashMap;

use tokio::sync::RwLock;

use railsql_core::domain::conversation::ConversationState;

use super::{CheckpointRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryCheckpointRepository {
    checkpoints: RwLock<HashMap<String, ConversationState>>,
}

#[async_trait::async_trait]
impl CheckpointRepository for InMemoryCheckpointRepository {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let checkpoints = self.checkpoints.read().await;
        Ok(checkpoints.get(thread_id).cloned())
    }

    async fn save(
        &self,
        thread_id: &str,
        state: &ConversationState,
    ) -> Result<(), RepositoryError> {
        let mut checkpoints = self.checkpoints.write().await;
        checkpoints.insert(thread_id.to_string(), state.clone());
        Ok(())
    }
}
