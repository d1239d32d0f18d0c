use async_trait::async_trait;
use thiserror::Error;

use railsql_core::domain::conversation::ConversationState;

pub mod checkpoint;
pub mod memory;

pub use checkpoint::SqlCheckpointRepository;
pub use memory::InMemoryCheckpointRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Conversation state persisted between turns, keyed by thread.
#[async_trait]
pub trait CheckpointRepository: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, RepositoryError>;
    async fn save(&self, thread_id: &str, state: &ConversationState)
        -> Result<(), RepositoryError>;
}
