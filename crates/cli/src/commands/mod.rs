pub mod ask;
pub mod batch;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod smoke;

use railsql_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use railsql_core::errors::ApplicationError;
use serde::Serialize;
use tokio::runtime::Runtime;

use crate::ModelArgs;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    /// Pretty JSON for commands whose output is a structured report.
    pub fn report<T: Serialize>(command: &str, exit_code: u8, report: &T) -> Self {
        match serde_json::to_string_pretty(report) {
            Ok(output) => Self { exit_code, output },
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

impl ModelArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            model_query: self.model_query.clone(),
            model_interpret: self.model_interpret.clone(),
            ..ConfigOverrides::default()
        }
    }
}

/// Loads configuration and builds the current-thread runtime the command runs on.
fn prepare(
    command: &str,
    overrides: ConfigOverrides,
) -> Result<(AppConfig, Runtime), CommandResult> {
    let config = AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() }).map_err(
        |error| {
            CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        },
    )?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    Ok((config, runtime))
}

fn turn_error_class(error: &ApplicationError) -> &'static str {
    if error.is_configuration() {
        return "model_configuration";
    }
    match error {
        ApplicationError::Integration(_) => "model_integration",
        ApplicationError::Persistence(_) => "persistence",
        _ => "turn",
    }
}
