use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationState, RowRecord};
use crate::warehouse::ExecutionError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnNode {
    Supervisor,
    Query,
    Interpretation,
    Terminal,
}

impl TurnNode {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::Query => "query",
            Self::Interpretation => "interpretation",
            Self::Terminal => "terminal",
        }
    }
}

/// The supervisor's three-way decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingIntent {
    Query,
    Interpret,
    Stop,
}

impl RoutingIntent {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Interpret => "interpret",
            Self::Stop => "stop",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "query" => Some(Self::Query),
            "interpret" => Some(Self::Interpret),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionOutcome {
    Rows(Vec<RowRecord>),
    NoRows,
    Failed(ExecutionError),
}

impl ExecutionOutcome {
    pub fn from_result(result: Result<Vec<RowRecord>, ExecutionError>) -> Self {
        match result {
            Ok(rows) if rows.is_empty() => Self::NoRows,
            Ok(rows) => Self::Rows(rows),
            Err(error) => Self::Failed(error),
        }
    }
}

/// Field updates emitted alongside the next node. `None` leaves a field
/// untouched; for `error`, `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<RowRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_failures: Option<u32>,
}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(self, state: &mut ConversationState) {
        if let Some(query) = self.query {
            state.query = Some(query);
        }
        if let Some(data) = self.data {
            state.data = Some(data);
        }
        if let Some(error) = self.error {
            state.error = error;
        }
        if let Some(error_count) = self.error_count {
            state.error_count = error_count;
        }
        if let Some(answer) = self.answer {
            state.answer = Some(answer);
        }
        if let Some(routing_failures) = self.routing_failures {
            state.routing_failures = routing_failures;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: TurnNode,
    pub to: TurnNode,
    pub update: StateUpdate,
}

impl Transition {
    pub fn new(from: TurnNode, to: TurnNode, update: StateUpdate) -> Self {
        Self { from, to, update }
    }
}
