use chrono::Utc;
use sqlx::Row;

use railsql_core::domain::conversation::ConversationState;

use super::{CheckpointRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCheckpointRepository {
    pool: DbPool,
}

impl SqlCheckpointRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Number of times the thread's checkpoint has been written.
    pub async fn version(&self, thread_id: &str) -> Result<Option<i64>, RepositoryError> {
        let row = sqlx::query("SELECT version FROM conversation_checkpoint WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get::<i64, _>("version")))
    }
}

#[async_trait::async_trait]
impl CheckpointRepository for SqlCheckpointRepository {
    async fn load(&self, thread_id: &str) -> Result<Option<ConversationState>, RepositoryError> {
        let row = sqlx::query("SELECT state_json FROM conversation_checkpoint WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let raw: String = row.try_get("state_json")?;
            serde_json::from_str::<ConversationState>(&raw).map_err(|error| {
                RepositoryError::Decode(format!("checkpoint for thread `{thread_id}`: {error}"))
            })
        })
        .transpose()
    }

    async fn save(
        &self,
        thread_id: &str,
        state: &ConversationState,
    ) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(state)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO conversation_checkpoint (thread_id, state_json, version, created_at, updated_at)
             VALUES (?, ?, 1, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET
                state_json = excluded.state_json,
                version = conversation_checkpoint.version + 1,
                updated_at = excluded.updated_at",
        )
        .bind(thread_id)
        .bind(state_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
