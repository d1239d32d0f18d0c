//! Thread-scoped turns: restore the checkpoint, run the turn, persist the result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use railsql_core::audit::AuditContext;
use railsql_core::domain::backend::ModelSelection;
use railsql_core::domain::conversation::ConversationState;
use railsql_core::errors::ApplicationError;
use railsql_db::repositories::{CheckpointRepository, RepositoryError};
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::runtime::{Orchestrator, TurnReport};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TurnRequest {
    pub question: String,
    #[serde(default)]
    pub model_query: Option<String>,
    #[serde(default)]
    pub model_interpret: Option<String>,
}

impl TurnRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), ..Self::default() }
    }
}

/// One lock per thread id with a turn in flight.
#[derive(Default)]
struct ThreadLocks {
    held: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThreadLocks {
    async fn acquire(&self, thread_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            held.entry(thread_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the entry once no other turn holds or waits for it.
    fn release(&self, thread_id: &str, guard: OwnedMutexGuard<()>) {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(guard);
        if held.get(thread_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            held.remove(thread_id);
        }
    }

    fn len(&self) -> usize {
        self.held.lock().map(|held| held.len()).unwrap_or_default()
    }
}

/// Runs turns against stored threads. Turns on the same thread run one at a
/// time so each restores the checkpoint its predecessor saved.
#[derive(Clone)]
pub struct ThreadService {
    orchestrator: Orchestrator,
    checkpoints: Arc<dyn CheckpointRepository>,
    defaults: ModelSelection,
    locks: Arc<ThreadLocks>,
}

impl ThreadService {
    pub fn new(
        orchestrator: Orchestrator,
        checkpoints: Arc<dyn CheckpointRepository>,
        defaults: ModelSelection,
    ) -> Self {
        Self { orchestrator, checkpoints, defaults, locks: Arc::new(ThreadLocks::default()) }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn defaults(&self) -> &ModelSelection {
        &self.defaults
    }

    pub async fn snapshot(
        &self,
        thread_id: &str,
    ) -> Result<Option<ConversationState>, ApplicationError> {
        self.checkpoints.load(thread_id).await.map_err(persistence)
    }

    /// Runs one turn. With a thread the previous checkpoint is restored first
    /// and the final state is written back; without one the turn starts fresh
    /// and nothing is stored.
    pub async fn ask(
        &self,
        thread_id: Option<&str>,
        request: TurnRequest,
        audit: &AuditContext,
    ) -> Result<TurnReport, ApplicationError> {
        let Some(thread_id) = thread_id else {
            return self.run(None, request, audit).await;
        };

        let guard = self.locks.acquire(thread_id).await;
        let result = self.run(Some(thread_id), request, audit).await;
        self.locks.release(thread_id, guard);
        result
    }

    /// Number of threads with a turn in flight or waiting.
    pub fn busy_threads(&self) -> usize {
        self.locks.len()
    }

    async fn run(
        &self,
        thread_id: Option<&str>,
        request: TurnRequest,
        audit: &AuditContext,
    ) -> Result<TurnReport, ApplicationError> {
        let restored = match thread_id {
            Some(thread_id) => self.snapshot(thread_id).await?,
            None => None,
        };
        let resumed = restored.is_some();

        let mut state = match restored {
            Some(mut state) => {
                state.begin_turn(request.question);
                state
            }
            None => ConversationState::new(request.question, self.defaults.clone()),
        };
        if let Some(model_query) = request.model_query {
            state.config.model_query = model_query;
        }
        if let Some(model_interpret) = request.model_interpret {
            state.config.model_interpret = model_interpret;
        }

        debug!(
            event_name = "session.turn.prepared",
            correlation_id = %audit.correlation_id,
            thread_id = thread_id.unwrap_or("unknown"),
            resumed,
            "turn state prepared"
        );

        let report = self.orchestrator.run_turn(state, audit).await?;

        if let Some(thread_id) = thread_id {
            self.checkpoints.save(thread_id, &report.state).await.map_err(persistence)?;
        }
        Ok(report)
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use railsql_core::audit::AuditContext;
    use railsql_core::domain::backend::ModelSelection;
    use railsql_core::domain::conversation::RowRecord;
    use railsql_core::errors::{ApplicationError, ConfigurationError};
    use railsql_core::warehouse::{ExecutionError, QueryExecutor, SchemaCatalog};
    use railsql_db::repositories::memory::InMemoryCheckpointRepository;
    use railsql_db::repositories::CheckpointRepository;
    use serde_json::json;

    use super::{ThreadService, TurnRequest};
    use crate::gateway::ModelGateway;
    use crate::providers::{DRY_RUN_ANSWER, DRY_RUN_QUERY};
    use crate::runtime::Orchestrator;

    struct OneRowExecutor;

    #[async_trait]
    impl QueryExecutor for OneRowExecutor {
        async fn execute(&self, _sql_text: &str) -> Result<Vec<RowRecord>, ExecutionError> {
            let mut row = RowRecord::new();
            row.insert("arrivalminutes".to_string(), json!(3));
            Ok(vec![row])
        }
    }

    /// Sleeps inside every execution and remembers how many overlapped.
    #[derive(Default)]
    struct SlowExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryExecutor for SlowExecutor {
        async fn execute(&self, sql_text: &str) -> Result<Vec<RowRecord>, ExecutionError> {
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            OneRowExecutor.execute(sql_text).await
        }
    }

    fn service(checkpoints: Arc<InMemoryCheckpointRepository>) -> ThreadService {
        service_with(checkpoints, Arc::new(OneRowExecutor))
    }

    fn service_with(
        checkpoints: Arc<InMemoryCheckpointRepository>,
        executor: Arc<dyn QueryExecutor>,
    ) -> ThreadService {
        let orchestrator = Orchestrator::new(
            ModelGateway::default(),
            executor,
            Arc::new(SchemaCatalog::new("oebb", Vec::new())),
        );
        ThreadService::new(orchestrator, checkpoints, ModelSelection::dry_run())
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_thread_run_one_after_the_other() {
        let checkpoints = Arc::new(InMemoryCheckpointRepository::default());
        let executor = Arc::new(SlowExecutor::default());
        let service = service_with(checkpoints.clone(), executor.clone());
        let audit = AuditContext::new(Some("t-busy".to_string()), "req-1", "test");

        let (first, second) = tokio::join!(
            service.ask(Some("t-busy"), TurnRequest::new("Wie viele Ankünfte?"), &audit),
            service.ask(Some("t-busy"), TurnRequest::new("Und Abfahrten?"), &audit),
        );
        first.expect("first turn");
        let second = second.expect("second turn");

        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
        assert_eq!(executor.peak.load(Ordering::SeqCst), 1);
        let stored = checkpoints.load("t-busy").await.expect("load").expect("saved");
        assert_eq!(stored, second.state);
        assert_eq!(service.busy_threads(), 0);
    }

    #[tokio::test]
    async fn turns_on_different_threads_still_overlap() {
        let checkpoints = Arc::new(InMemoryCheckpointRepository::default());
        let executor = Arc::new(SlowExecutor::default());
        let service = service_with(checkpoints, executor.clone());
        let audit = AuditContext::detached("test");

        let (first, second) = tokio::join!(
            service.ask(Some("t-a"), TurnRequest::new("Wie viele Ankünfte?"), &audit),
            service.ask(Some("t-b"), TurnRequest::new("Wie viele Ankünfte?"), &audit),
        );
        first.expect("first turn");
        second.expect("second turn");

        assert_eq!(executor.peak.load(Ordering::SeqCst), 2);
        assert_eq!(service.busy_threads(), 0);
    }

    #[tokio::test]
    async fn threaded_turns_are_checkpointed_and_resumed() {
        let checkpoints = Arc::new(InMemoryCheckpointRepository::default());
        let service = service(checkpoints.clone());
        let audit = AuditContext::new(Some("t-1".to_string()), "req-1", "test");

        let first = service
            .ask(Some("t-1"), TurnRequest::new("Wie viele Ankünfte?"), &audit)
            .await
            .expect("first turn");
        assert_eq!(first.state.answer.as_deref(), Some(DRY_RUN_ANSWER));

        let stored = checkpoints.load("t-1").await.expect("load").expect("checkpoint saved");
        assert_eq!(stored, first.state);

        let second = service
            .ask(Some("t-1"), TurnRequest::new("Und gestern?"), &audit)
            .await
            .expect("second turn");
        assert_eq!(second.state.question, "Und gestern?");
        assert_eq!(second.state.query.as_deref(), Some(DRY_RUN_QUERY));
        assert_eq!(second.steps.len(), first.steps.len());
    }

    #[tokio::test]
    async fn detached_turns_store_nothing() {
        let checkpoints = Arc::new(InMemoryCheckpointRepository::default());
        let service = service(checkpoints.clone());

        service
            .ask(None, TurnRequest::new("Wie viele Ankünfte?"), &AuditContext::detached("test"))
            .await
            .expect("turn");

        assert_eq!(checkpoints.load("unknown").await.expect("load"), None);
    }

    #[tokio::test]
    async fn request_model_names_override_the_session_defaults() {
        let checkpoints = Arc::new(InMemoryCheckpointRepository::default());
        let service = service(checkpoints.clone());
        let request = TurnRequest {
            model_query: Some("claude".to_string()),
            ..TurnRequest::new("Wie viele Ankünfte?")
        };

        let error = service
            .ask(Some("t-2"), request, &AuditContext::detached("test"))
            .await
            .expect_err("unknown backend");

        assert_eq!(
            error,
            ApplicationError::Configuration(ConfigurationError::UnknownBackend {
                name: "claude".to_string()
            })
        );
        assert_eq!(checkpoints.load("t-2").await.expect("load"), None);
    }
}
