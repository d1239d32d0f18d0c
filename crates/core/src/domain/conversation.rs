use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::backend::ModelSelection;

/// One result row, keyed by column name in select order.
pub type RowRecord = Map<String, Value>;

/// Recorded in `error` when a query succeeds but matches nothing.
pub const NO_ROWS_SENTINEL: &str = "no rows";

/// Answer set when query execution keeps failing.
pub const EXECUTION_GIVE_UP_ANSWER: &str =
    "I encountered too many errors while trying to execute the query. Please try again later.";

/// Answer set when the routing model keeps replying with something unparseable.
pub const ROUTING_GIVE_UP_ANSWER: &str =
    "I could not work out how to answer this question. Please rephrase it and try again.";

/// Mutable record threaded through one turn of the orchestrator.
///
/// Every field other than `question` is optional on the wire so that partially
/// written checkpoints restore with the documented defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub question: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<RowRecord>>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub routing_failures: u32,
    #[serde(default)]
    pub config: ModelSelection,
}

impl ConversationState {
    pub fn new(question: impl Into<String>, config: ModelSelection) -> Self {
        Self {
            question: question.into(),
            query: None,
            data: None,
            error: None,
            error_count: 0,
            answer: None,
            routing_failures: 0,
            config,
        }
    }

    /// Starts a new user turn on a fresh or restored state. The previous query
    /// is kept as repair context; everything describing the old turn's outcome
    /// is cleared.
    pub fn begin_turn(&mut self, question: impl Into<String>) {
        self.question = question.into();
        self.data = None;
        self.error = None;
        self.error_count = 0;
        self.answer = None;
        self.routing_failures = 0;
    }

    pub fn has_data(&self) -> bool {
        self.data.as_ref().is_some_and(|rows| !rows.is_empty())
    }

    pub fn has_answer(&self) -> bool {
        self.answer.as_ref().is_some_and(|answer| !answer.trim().is_empty())
    }

    pub fn rows(&self) -> &[RowRecord] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Data as rendered into prompts: `{}` when nothing was ever fetched,
    /// otherwise the JSON array of rows.
    pub fn data_for_prompt(&self) -> String {
        match &self.data {
            None => "{}".to_string(),
            Some(rows) => {
                Value::Array(rows.iter().cloned().map(Value::Object).collect()).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{ConversationState, RowRecord};
    use crate::domain::backend::ModelSelection;

    fn row(value: Value) -> RowRecord {
        match value {
            Value::Object(map) => map,
            _ => RowRecord::new(),
        }
    }

    #[test]
    fn fresh_state_has_documented_defaults() {
        let state = ConversationState::new("How late was the 8:15?", ModelSelection::dry_run());

        assert_eq!(state.query, None);
        assert_eq!(state.error_count, 0);
        assert!(!state.has_data());
        assert!(!state.has_answer());
        assert_eq!(state.data_for_prompt(), "{}");
    }

    #[test]
    fn empty_result_is_distinct_from_absent_data() {
        let mut state = ConversationState::new("q", ModelSelection::dry_run());
        state.data = Some(Vec::new());

        assert!(!state.has_data());
        assert_eq!(state.data_for_prompt(), "[]");
    }

    #[test]
    fn begin_turn_keeps_query_and_config_only() {
        let mut state = ConversationState::new("first", ModelSelection::new("openai", "google"));
        state.query = Some("SELECT 1".to_string());
        state.data = Some(vec![row(json!({"n": 1}))]);
        state.error = Some("boom".to_string());
        state.error_count = 2;
        state.answer = Some("one".to_string());
        state.routing_failures = 1;

        state.begin_turn("second");

        assert_eq!(state.question, "second");
        assert_eq!(state.query.as_deref(), Some("SELECT 1"));
        assert_eq!(state.config, ModelSelection::new("openai", "google"));
        assert_eq!(state.data, None);
        assert_eq!(state.error, None);
        assert_eq!(state.error_count, 0);
        assert_eq!(state.answer, None);
        assert_eq!(state.routing_failures, 0);
    }

    #[test]
    fn checkpoint_json_round_trips_every_field() {
        let mut state = ConversationState::new("q", ModelSelection::new("mistral", "dryrun"));
        state.query = Some("SELECT * FROM oebb.station".to_string());
        state.data = Some(vec![row(json!({"station": "Wien Hbf", "delay": 4.5}))]);
        state.error = Some("no rows".to_string());
        state.error_count = 3;
        state.answer = Some("Four and a half minutes.".to_string());
        state.routing_failures = 2;

        let encoded = serde_json::to_string(&state).expect("serialize");
        let decoded: ConversationState = serde_json::from_str(&encoded).expect("deserialize");

        assert_eq!(decoded, state);
    }

    #[test]
    fn sparse_checkpoint_restores_with_defaults() {
        let decoded: ConversationState =
            serde_json::from_str(r#"{"question":"only the question"}"#).expect("deserialize");

        assert_eq!(decoded.question, "only the question");
        assert_eq!(decoded.error_count, 0);
        assert_eq!(decoded.config, ModelSelection::dry_run());
    }
}
