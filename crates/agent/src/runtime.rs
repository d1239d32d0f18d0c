use std::sync::Arc;

use railsql_core::audit::{AuditContext, AuditSink, NoopAuditSink};
use railsql_core::domain::conversation::ConversationState;
use railsql_core::errors::{ApplicationError, DomainError};
use railsql_core::flows::{ExecutionOutcome, Transition, TurnEngine, TurnNode, TurnPolicy};
use railsql_core::warehouse::{QueryExecutor, SchemaCatalog};
use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::ModelGateway;
use crate::parsing::{extract_fenced, parse_routing_reply};
use crate::prompts::{interpretation_prompt, query_prompt, supervisor_prompt};

pub const DEFAULT_MAX_STEPS: u32 = 32;

/// Outcome of one completed turn.
#[derive(Clone, Debug, Serialize)]
pub struct TurnReport {
    pub state: ConversationState,
    pub steps: Vec<Transition>,
}

impl TurnReport {
    /// Nodes visited, starting with the initial supervisor and ending at the
    /// terminal node.
    pub fn path(&self) -> Vec<TurnNode> {
        let mut path = Vec::with_capacity(self.steps.len() + 1);
        path.push(self.steps.first().map_or(TurnNode::Terminal, |step| step.from));
        path.extend(self.steps.iter().map(|step| step.to));
        path
    }
}

/// Drives one conversation turn: each node asks the model gateway for text,
/// the query node runs the generated SQL, and the pure turn engine decides
/// where to go next.
#[derive(Clone)]
pub struct Orchestrator {
    gateway: ModelGateway,
    executor: Arc<dyn QueryExecutor>,
    catalog: Arc<SchemaCatalog>,
    engine: TurnEngine,
    audit: Arc<dyn AuditSink>,
    max_steps: u32,
}

impl Orchestrator {
    pub fn new(
        gateway: ModelGateway,
        executor: Arc<dyn QueryExecutor>,
        catalog: Arc<SchemaCatalog>,
    ) -> Self {
        Self {
            gateway,
            executor,
            catalog,
            engine: TurnEngine::default(),
            audit: Arc::new(NoopAuditSink),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_policy(mut self, policy: TurnPolicy) -> Self {
        self.engine = TurnEngine::new(policy);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// Runs a single node against `state` and returns the next node with the
    /// field updates to apply. `state` itself is not modified.
    pub async fn step(
        &self,
        node: TurnNode,
        state: &ConversationState,
    ) -> Result<Transition, ApplicationError> {
        match node {
            TurnNode::Supervisor => {
                let prompt = supervisor_prompt(state);
                let reply = self.gateway.generate(&state.config.model_query, &prompt).await?;
                match parse_routing_reply(&reply) {
                    Ok(intent) => Ok(self.engine.route(state, intent)),
                    Err(error) => {
                        warn!(
                            event_name = "turn.routing.unparseable",
                            error = %error,
                            routing_failures = state.routing_failures + 1,
                            "routing reply could not be parsed"
                        );
                        Ok(self.engine.routing_failed(state))
                    }
                }
            }
            TurnNode::Query => {
                let prompt = query_prompt(state, &self.catalog);
                let reply = self.gateway.generate(&state.config.model_query, &prompt).await?;
                let sql = extract_fenced(&reply);
                let outcome = ExecutionOutcome::from_result(self.executor.execute(&sql).await);
                if let ExecutionOutcome::Failed(error) = &outcome {
                    warn!(
                        event_name = "turn.query.failed",
                        error = %error,
                        error_count = state.error_count + 1,
                        "generated query failed"
                    );
                }
                Ok(self.engine.after_execution(state, sql, outcome))
            }
            TurnNode::Interpretation => {
                let prompt = interpretation_prompt(state);
                let answer = self.gateway.generate(&state.config.model_interpret, &prompt).await?;
                Ok(self.engine.after_interpretation(answer))
            }
            TurnNode::Terminal => Err(DomainError::InvariantViolation(
                "terminal node has no successor".to_string(),
            )
            .into()),
        }
    }

    /// Steps from the supervisor until the terminal node, applying every
    /// update to `state`. Fails if the turn needs more than the step budget.
    pub async fn run_turn(
        &self,
        mut state: ConversationState,
        audit: &AuditContext,
    ) -> Result<TurnReport, ApplicationError> {
        let mut node = self.engine.initial_node();
        let mut steps = Vec::new();

        info!(
            event_name = "turn.start",
            correlation_id = %audit.correlation_id,
            thread_id = audit.thread_id.as_deref().unwrap_or_default(),
            model_query = %state.config.model_query,
            model_interpret = %state.config.model_interpret,
            "turn started"
        );

        while !node.is_terminal() {
            if steps.len() >= self.max_steps as usize {
                warn!(
                    event_name = "turn.step_limit",
                    correlation_id = %audit.correlation_id,
                    steps = self.max_steps,
                    "turn exceeded its step budget"
                );
                return Err(DomainError::StepLimitExceeded { steps: self.max_steps }.into());
            }

            let transition = self.step(node, &state).await?;
            self.engine
                .validate(transition.from, transition.to)
                .map_err(|error| DomainError::InvariantViolation(error.to_string()))?;
            transition.update.clone().apply(&mut state);
            self.engine.record(&transition, &state, self.audit.as_ref(), audit);

            info!(
                event_name = "turn.transition",
                correlation_id = %audit.correlation_id,
                from = transition.from.as_str(),
                to = transition.to.as_str(),
                error_count = state.error_count,
                "transition applied"
            );

            node = transition.to;
            steps.push(transition);
        }

        info!(
            event_name = "turn.completed",
            correlation_id = %audit.correlation_id,
            steps = steps.len(),
            rows = state.rows().len(),
            "turn completed"
        );

        Ok(TurnReport { state, steps })
    }
}
