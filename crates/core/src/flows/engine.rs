use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::conversation::{
    ConversationState, EXECUTION_GIVE_UP_ANSWER, NO_ROWS_SENTINEL, ROUTING_GIVE_UP_ANSWER,
};
use crate::flows::states::{ExecutionOutcome, RoutingIntent, StateUpdate, Transition, TurnNode};

/// Retry budgets for one turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TurnPolicy {
    /// Consecutive failed or empty query attempts tolerated before giving up.
    pub max_error_count: u32,
    /// Consecutive unparseable routing replies tolerated before giving up.
    pub max_routing_failures: u32,
}

impl Default for TurnPolicy {
    fn default() -> Self {
        Self { max_error_count: 3, max_routing_failures: 3 }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnTransitionError {
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TurnNode, to: TurnNode },
}

/// Pure transition rules of the supervisor/query/interpretation loop. All IO
/// happens in the caller; this only decides the next node and field updates.
#[derive(Clone, Debug, Default)]
pub struct TurnEngine {
    policy: TurnPolicy,
}

impl TurnEngine {
    pub fn new(policy: TurnPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TurnPolicy {
        self.policy
    }

    pub fn initial_node(&self) -> TurnNode {
        TurnNode::Supervisor
    }

    pub fn route(&self, state: &ConversationState, intent: RoutingIntent) -> Transition {
        let to = match intent {
            RoutingIntent::Query => TurnNode::Query,
            RoutingIntent::Interpret => TurnNode::Interpretation,
            RoutingIntent::Stop => TurnNode::Terminal,
        };
        let update = StateUpdate {
            routing_failures: (state.routing_failures > 0).then_some(0),
            ..StateUpdate::default()
        };
        Transition::new(TurnNode::Supervisor, to, update)
    }

    /// Malformed routing reply: retry the supervisor until the budget runs out,
    /// then end the turn, keeping any answer already produced.
    pub fn routing_failed(&self, state: &ConversationState) -> Transition {
        let routing_failures = state.routing_failures + 1;
        if routing_failures > self.policy.max_routing_failures {
            let answer = (!state.has_answer()).then(|| ROUTING_GIVE_UP_ANSWER.to_string());
            return Transition::new(
                TurnNode::Supervisor,
                TurnNode::Terminal,
                StateUpdate {
                    routing_failures: Some(routing_failures),
                    answer,
                    ..StateUpdate::default()
                },
            );
        }

        Transition::new(
            TurnNode::Supervisor,
            TurnNode::Supervisor,
            StateUpdate { routing_failures: Some(routing_failures), ..StateUpdate::default() },
        )
    }

    /// Applies the query retry policy to one execution of `query`.
    ///
    /// Failures and empty results share the error budget but exhaust it
    /// differently: failures end the turn with an apology, empty results hand
    /// the (empty) data to interpretation.
    pub fn after_execution(
        &self,
        state: &ConversationState,
        query: String,
        outcome: ExecutionOutcome,
    ) -> Transition {
        match outcome {
            ExecutionOutcome::Rows(rows) => Transition::new(
                TurnNode::Query,
                TurnNode::Supervisor,
                StateUpdate {
                    query: Some(query),
                    data: Some(rows),
                    error: Some(None),
                    error_count: Some(0),
                    ..StateUpdate::default()
                },
            ),
            ExecutionOutcome::Failed(error) => {
                let error_count = state.error_count + 1;
                let exhausted = error_count > self.policy.max_error_count;
                Transition::new(
                    TurnNode::Query,
                    if exhausted { TurnNode::Terminal } else { TurnNode::Query },
                    StateUpdate {
                        query: Some(query),
                        data: Some(Vec::new()),
                        error: Some(Some(error.message)),
                        error_count: Some(error_count),
                        answer: exhausted.then(|| EXECUTION_GIVE_UP_ANSWER.to_string()),
                        ..StateUpdate::default()
                    },
                )
            }
            ExecutionOutcome::NoRows => {
                let error_count = state.error_count + 1;
                let exhausted = error_count > self.policy.max_error_count;
                Transition::new(
                    TurnNode::Query,
                    if exhausted { TurnNode::Interpretation } else { TurnNode::Query },
                    StateUpdate {
                        query: Some(query),
                        data: Some(Vec::new()),
                        error: Some(Some(NO_ROWS_SENTINEL.to_string())),
                        error_count: Some(error_count),
                        ..StateUpdate::default()
                    },
                )
            }
        }
    }

    pub fn after_interpretation(&self, answer: String) -> Transition {
        Transition::new(
            TurnNode::Interpretation,
            TurnNode::Supervisor,
            StateUpdate { answer: Some(answer), ..StateUpdate::default() },
        )
    }

    /// Checks an edge against the transition table.
    pub fn validate(&self, from: TurnNode, to: TurnNode) -> Result<(), TurnTransitionError> {
        use TurnNode::{Interpretation, Query, Supervisor, Terminal};

        let allowed = matches!(
            (from, to),
            (Supervisor, Query | Interpretation | Terminal | Supervisor)
                | (Query, Query | Terminal | Interpretation | Supervisor)
                | (Interpretation, Supervisor)
        );
        if allowed {
            Ok(())
        } else {
            Err(TurnTransitionError::InvalidTransition { from, to })
        }
    }

    pub fn record<S>(
        &self,
        transition: &Transition,
        state: &ConversationState,
        sink: &S,
        audit: &AuditContext,
    ) where
        S: AuditSink + ?Sized,
    {
        let category = match transition.from {
            TurnNode::Supervisor | TurnNode::Terminal => AuditCategory::Routing,
            TurnNode::Query => AuditCategory::Query,
            TurnNode::Interpretation => AuditCategory::Interpretation,
        };
        let outcome = if transition.from == transition.to {
            AuditOutcome::Retried
        } else if transition.to.is_terminal() && transition.from != TurnNode::Supervisor {
            AuditOutcome::Failed
        } else {
            AuditOutcome::Success
        };
        sink.emit(
            AuditEvent::new(audit, "turn.transition_applied", category, outcome)
                .with_metadata("from", transition.from.as_str())
                .with_metadata("to", transition.to.as_str())
                .with_metadata("error_count", state.error_count.to_string())
                .with_metadata("rows", state.rows().len().to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::domain::backend::ModelSelection;
    use crate::domain::conversation::{
        ConversationState, RowRecord, EXECUTION_GIVE_UP_ANSWER, NO_ROWS_SENTINEL,
        ROUTING_GIVE_UP_ANSWER,
    };
    use crate::flows::engine::{TurnEngine, TurnPolicy, TurnTransitionError};
    use crate::flows::states::{ExecutionOutcome, RoutingIntent, TurnNode};
    use crate::warehouse::ExecutionError;

    fn state() -> ConversationState {
        ConversationState::new(
            "How many arrivals were delayed yesterday?",
            ModelSelection::dry_run(),
        )
    }

    fn rows(count: usize) -> Vec<RowRecord> {
        (0..count)
            .map(|index| {
                let mut row = RowRecord::new();
                row.insert("id".to_string(), json!(index));
                row
            })
            .collect()
    }

    fn failure() -> ExecutionOutcome {
        ExecutionOutcome::Failed(ExecutionError::new("relation \"oebb.arrival\" does not exist"))
    }

    #[test]
    fn routing_intents_map_to_nodes() {
        let engine = TurnEngine::default();
        let state = state();

        assert_eq!(engine.route(&state, RoutingIntent::Query).to, TurnNode::Query);
        assert_eq!(engine.route(&state, RoutingIntent::Interpret).to, TurnNode::Interpretation);
        assert_eq!(engine.route(&state, RoutingIntent::Stop).to, TurnNode::Terminal);
        assert!(engine.route(&state, RoutingIntent::Query).update.is_empty());
    }

    #[test]
    fn malformed_routing_retries_supervisor_then_gives_up() {
        let engine = TurnEngine::default();
        let mut state = state();

        for expected in 1..=3 {
            let transition = engine.routing_failed(&state);
            assert_eq!(transition.to, TurnNode::Supervisor);
            assert_eq!(transition.update.routing_failures, Some(expected));
            transition.update.apply(&mut state);
        }

        let transition = engine.routing_failed(&state);
        assert_eq!(transition.to, TurnNode::Terminal);
        assert_eq!(transition.update.answer.as_deref(), Some(ROUTING_GIVE_UP_ANSWER));
    }

    #[test]
    fn routing_give_up_keeps_existing_answer() {
        let engine =
            TurnEngine::new(TurnPolicy { max_routing_failures: 0, ..TurnPolicy::default() });
        let mut state = state();
        state.answer = Some("42 trains".to_string());

        let transition = engine.routing_failed(&state);
        assert_eq!(transition.to, TurnNode::Terminal);
        assert_eq!(transition.update.answer, None);
    }

    #[test]
    fn successful_route_resets_routing_failures() {
        let engine = TurnEngine::default();
        let mut state = state();
        state.routing_failures = 2;

        let transition = engine.route(&state, RoutingIntent::Query);
        assert_eq!(transition.update.routing_failures, Some(0));
    }

    #[test]
    fn rows_reset_error_state_and_return_to_supervisor() {
        let engine = TurnEngine::default();
        let mut state = state();
        state.error = Some("syntax error".to_string());
        state.error_count = 2;

        let transition = engine.after_execution(
            &state,
            "SELECT * FROM oebb.arrivals".to_string(),
            ExecutionOutcome::Rows(rows(3)),
        );
        assert_eq!(transition.to, TurnNode::Supervisor);
        transition.update.apply(&mut state);

        assert_eq!(state.error, None);
        assert_eq!(state.error_count, 0);
        assert_eq!(state.rows().len(), 3);
        assert_eq!(state.query.as_deref(), Some("SELECT * FROM oebb.arrivals"));
    }

    #[test]
    fn execution_failures_count_up_then_terminate_with_apology() {
        let engine = TurnEngine::default();
        let mut state = state();
        let mut targets = Vec::new();

        for _ in 0..4 {
            let transition = engine.after_execution(&state, "SELECT nope".to_string(), failure());
            targets.push(transition.to);
            transition.update.apply(&mut state);
        }

        assert_eq!(
            targets,
            vec![TurnNode::Query, TurnNode::Query, TurnNode::Query, TurnNode::Terminal]
        );
        assert_eq!(state.error_count, 4);
        assert_eq!(state.answer.as_deref(), Some(EXECUTION_GIVE_UP_ANSWER));
        assert_eq!(state.data, Some(Vec::new()));
        assert_eq!(state.query.as_deref(), Some("SELECT nope"));
    }

    #[test]
    fn empty_results_count_up_then_hand_over_to_interpretation() {
        let engine = TurnEngine::default();
        let mut state = state();
        let mut targets = Vec::new();

        for _ in 0..4 {
            let transition = engine.after_execution(
                &state,
                "SELECT * FROM oebb.holidays WHERE false".to_string(),
                ExecutionOutcome::NoRows,
            );
            targets.push(transition.to);
            transition.update.apply(&mut state);
        }

        assert_eq!(
            targets,
            vec![TurnNode::Query, TurnNode::Query, TurnNode::Query, TurnNode::Interpretation]
        );
        assert_eq!(state.error_count, 4);
        assert_eq!(state.error.as_deref(), Some(NO_ROWS_SENTINEL));
        assert_eq!(state.data, Some(Vec::new()));
        assert_eq!(state.answer, None);
    }

    #[test]
    fn error_count_increases_strictly_across_mixed_failures() {
        let engine = TurnEngine::default();
        let mut state = state();
        let mut counts = Vec::new();

        for outcome in [failure(), ExecutionOutcome::NoRows, failure()] {
            let transition = engine.after_execution(&state, "SELECT 1".to_string(), outcome);
            transition.update.apply(&mut state);
            counts.push(state.error_count);
        }

        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[test]
    fn interpretation_always_returns_to_supervisor() {
        let engine = TurnEngine::default();
        let transition = engine.after_interpretation(String::new());

        assert_eq!(transition.from, TurnNode::Interpretation);
        assert_eq!(transition.to, TurnNode::Supervisor);
        assert_eq!(transition.update.answer.as_deref(), Some(""));
    }

    #[test]
    fn transition_table_rejects_edges_out_of_interpretation_and_terminal() {
        let engine = TurnEngine::default();

        assert!(engine.validate(TurnNode::Query, TurnNode::Interpretation).is_ok());
        assert_eq!(
            engine.validate(TurnNode::Interpretation, TurnNode::Query),
            Err(TurnTransitionError::InvalidTransition {
                from: TurnNode::Interpretation,
                to: TurnNode::Query
            })
        );
        assert!(engine.validate(TurnNode::Terminal, TurnNode::Supervisor).is_err());
    }

    #[test]
    fn recorded_transition_carries_correlation_and_outcome() {
        let engine = TurnEngine::default();
        let sink = InMemoryAuditSink::default();
        let mut state = state();
        state.error_count = 3;

        let transition = engine.after_execution(&state, "SELECT nope".to_string(), failure());
        transition.clone().update.apply(&mut state);
        engine.record(
            &transition,
            &state,
            &sink,
            &AuditContext::new(Some("thread-1".to_string()), "req-9", "orchestrator"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "turn.transition_applied");
        assert_eq!(events[0].outcome, AuditOutcome::Failed);
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("terminal"));
        assert_eq!(events[0].metadata.get("error_count").map(String::as_str), Some("4"));
    }
}
