use railsql_agent::{assemble, TurnReport, TurnRequest};
use railsql_core::audit::AuditContext;
use railsql_core::domain::conversation::RowRecord;
use serde::Serialize;
use uuid::Uuid;

use crate::commands::{prepare, turn_error_class, CommandResult};
use crate::AskArgs;

#[derive(Debug, Serialize)]
pub(crate) struct TurnSummary {
    pub question: String,
    pub answer: Option<String>,
    pub query: Option<String>,
    pub rows: Vec<RowRecord>,
    pub error: Option<String>,
    pub error_count: u32,
    pub path: Vec<&'static str>,
}

impl From<TurnReport> for TurnSummary {
    fn from(report: TurnReport) -> Self {
        let path = report.path().into_iter().map(|node| node.as_str()).collect();
        let state = report.state;
        Self {
            question: state.question,
            answer: state.answer,
            query: state.query,
            rows: state.data.unwrap_or_default(),
            error: state.error,
            error_count: state.error_count,
            path,
        }
    }
}

#[derive(Debug, Serialize)]
struct AskReport {
    command: &'static str,
    status: &'static str,
    correlation_id: String,
    thread_id: Option<String>,
    model_query: String,
    model_interpret: String,
    #[serde(flatten)]
    turn: TurnSummary,
}

pub fn run(args: AskArgs) -> CommandResult {
    let (config, runtime) = match prepare("ask", args.models.overrides()) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let correlation_id = Uuid::new_v4().to_string();
    let audit = AuditContext::new(args.thread.clone(), correlation_id.clone(), "cli");

    let result = runtime.block_on(async {
        let stack = assemble(&config)
            .await
            .map_err(|error| (error.class(), error.to_string(), 4u8))?;
        let turn = stack
            .service
            .ask(args.thread.as_deref(), TurnRequest::new(args.question), &audit)
            .await
            .map_err(|error| (turn_error_class(&error), error.to_string(), 7u8));
        stack.close().await;
        turn
    });

    match result {
        Ok(report) => {
            let selection = report.state.config.clone();
            CommandResult::report(
                "ask",
                0,
                &AskReport {
                    command: "ask",
                    status: "ok",
                    correlation_id,
                    thread_id: args.thread,
                    model_query: selection.model_query,
                    model_interpret: selection.model_interpret,
                    turn: TurnSummary::from(report),
                },
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}
