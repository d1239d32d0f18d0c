use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use railsql_agent::{assemble, TurnRequest};
use railsql_core::audit::AuditContext;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::commands::ask::TurnSummary;
use crate::commands::{prepare, turn_error_class, CommandResult};
use crate::BatchArgs;

#[derive(Debug, Serialize)]
struct BatchItem {
    index: usize,
    status: &'static str,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(flatten)]
    turn: Option<TurnSummary>,
}

#[derive(Debug, Serialize)]
struct BatchReport {
    command: &'static str,
    status: &'static str,
    summary: String,
    model_query: String,
    model_interpret: String,
    total_elapsed_ms: u64,
    items: Vec<BatchItem>,
}

/// Non-empty lines, trimmed; lines starting with `#` are comments.
pub fn read_questions(path: &Path) -> Result<Vec<String>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read question file `{}`", path.display()))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

pub fn run(args: BatchArgs) -> CommandResult {
    let questions = match read_questions(&args.file) {
        Ok(questions) if questions.is_empty() => {
            return CommandResult::failure("batch", "input", "question file is empty", 2);
        }
        Ok(questions) => questions,
        Err(error) => return CommandResult::failure("batch", "input", format!("{error:#}"), 2),
    };

    let (config, runtime) = match prepare("batch", args.models.overrides()) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let selection = config.orchestrator.default_selection();

    let started = Instant::now();
    let result = runtime.block_on(async {
        let stack = assemble(&config).await.map_err(|error| (error.class(), error.to_string()))?;

        let mut items = Vec::with_capacity(questions.len());
        for (index, question) in questions.into_iter().enumerate() {
            // Every question is an independent, unthreaded turn.
            let audit = AuditContext::new(None, Uuid::new_v4().to_string(), "batch");
            let item_started = Instant::now();
            let request = TurnRequest::new(question.clone());
            let outcome = stack.service.ask(None, request, &audit).await;
            let elapsed_ms = item_started.elapsed().as_millis() as u64;

            items.push(match outcome {
                Ok(report) => BatchItem {
                    index,
                    status: "ok",
                    elapsed_ms,
                    error_class: None,
                    message: None,
                    turn: Some(TurnSummary::from(report)),
                },
                Err(error) => {
                    warn!(
                        event_name = "cli.batch.turn_failed",
                        correlation_id = %audit.correlation_id,
                        index,
                        error = %error,
                        "batch question failed"
                    );
                    BatchItem {
                        index,
                        status: "error",
                        elapsed_ms,
                        error_class: Some(turn_error_class(&error)),
                        message: Some(format!("{question}: {error}")),
                        turn: None,
                    }
                }
            });
        }

        stack.close().await;
        Ok::<_, (&'static str, String)>(items)
    });

    let items = match result {
        Ok(items) => items,
        Err((error_class, message)) => {
            return CommandResult::failure("batch", error_class, message, 4);
        }
    };

    let total_elapsed_ms = started.elapsed().as_millis() as u64;
    let answered = items.iter().filter(|item| item.status == "ok").count();
    let failed = answered < items.len();
    let report = BatchReport {
        command: "batch",
        status: if failed { "partial" } else { "ok" },
        summary: format!(
            "batch: {answered}/{} questions answered in {total_elapsed_ms}ms",
            items.len()
        ),
        model_query: selection.model_query,
        model_interpret: selection.model_interpret,
        total_elapsed_ms,
        items,
    };

    CommandResult::report("batch", if failed { 7 } else { 0 }, &report)
}
