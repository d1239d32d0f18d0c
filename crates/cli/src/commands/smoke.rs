use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use railsql_agent::{ModelGateway, Orchestrator};
use railsql_core::audit::AuditContext;
use railsql_core::config::{AppConfig, LoadOptions};
use railsql_core::domain::backend::ModelSelection;
use railsql_core::domain::conversation::ConversationState;
use railsql_db::{connect_from_config, connect_warehouse, migrations};
use serde::Serialize;

use crate::commands::CommandResult;

const SMOKE_QUESTION: &str = "Wie viele Züge sind zuletzt angekommen?";

const CHECKS: [&str; 6] = [
    "config_validation",
    "db_connectivity",
    "migration_visibility",
    "warehouse_connectivity",
    "schema_introspection",
    "dry_run_turn",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            let message = "configuration loaded and validated";
            checks.push(passed("config_validation", elapsed_ms, message));
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(failed("config_validation", elapsed_ms, error.to_string()));
            return finalize_report(checks, started);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(failed(
                "db_connectivity",
                0,
                format!("failed to initialize async runtime: {error}"),
            ));
            return finalize_report(checks, started);
        }
    };

    runtime.block_on(run_async_checks(&config, &mut checks));
    finalize_report(checks, started)
}

async fn run_async_checks(config: &AppConfig, checks: &mut Vec<SmokeCheck>) {
    let pool = match timed_async(connect_from_config(&config.database)).await {
        (elapsed_ms, Ok(pool)) => {
            let message = format!("connected using `{}`", config.database.url);
            checks.push(passed("db_connectivity", elapsed_ms, message));
            pool
        }
        (elapsed_ms, Err(error)) => {
            let message = format!("failed to connect: {error}");
            checks.push(failed("db_connectivity", elapsed_ms, message));
            return;
        }
    };

    let (elapsed_ms, migration) = timed_async(migrations::run_pending(&pool)).await;
    pool.close().await;
    match migration {
        Ok(()) => checks.push(passed(
            "migration_visibility",
            elapsed_ms,
            "migrations are visible and executable",
        )),
        Err(error) => {
            let message = format!("migration execution failed: {error}");
            checks.push(failed("migration_visibility", elapsed_ms, message));
            return;
        }
    }

    let warehouse_started = Instant::now();
    let warehouse = match connect_warehouse(&config.warehouse).await {
        Ok(warehouse) => warehouse,
        Err(error) => {
            let message = format!("failed to connect: {error}");
            checks.push(failed("warehouse_connectivity", elapsed(warehouse_started), message));
            return;
        }
    };
    let seeded = if config.warehouse.seed_demo {
        match warehouse.seed_demo().await {
            Ok(summary) => Some(summary.total()),
            Err(error) => {
                let message = format!("demo seeding failed: {error}");
                checks.push(failed("warehouse_connectivity", elapsed(warehouse_started), message));
                return;
            }
        }
    } else {
        None
    };
    let message = match seeded {
        Some(rows) => {
            format!("{} warehouse ready, {rows} demo rows seeded", warehouse.kind_name())
        }
        None => format!("{} warehouse ready", warehouse.kind_name()),
    };
    checks.push(passed("warehouse_connectivity", elapsed(warehouse_started), message));

    let catalog = match timed_async(warehouse.introspect()).await {
        (elapsed_ms, Ok(catalog)) if catalog.missing_tables().is_empty() => {
            let message =
                format!("{} tables in schema `{}`", catalog.tables.len(), catalog.schema);
            checks.push(passed("schema_introspection", elapsed_ms, message));
            catalog
        }
        (elapsed_ms, Ok(catalog)) => {
            let message = format!("missing tables: {}", catalog.missing_tables().join(", "));
            checks.push(failed("schema_introspection", elapsed_ms, message));
            warehouse.close().await;
            return;
        }
        (elapsed_ms, Err(error)) => {
            checks.push(failed("schema_introspection", elapsed_ms, error.to_string()));
            warehouse.close().await;
            return;
        }
    };

    let orchestrator = Orchestrator::new(
        ModelGateway::dry_run_only(),
        Arc::new(warehouse.clone()),
        Arc::new(catalog),
    )
    .with_policy(config.orchestrator.turn_policy())
    .with_max_steps(config.orchestrator.max_steps);
    let state = ConversationState::new(SMOKE_QUESTION, ModelSelection::dry_run());
    let audit = AuditContext::detached("smoke");

    let (elapsed_ms, turn) = timed_async(orchestrator.run_turn(state, &audit)).await;
    warehouse.close().await;
    match turn {
        Ok(report) if report.state.has_answer() => {
            let path: Vec<&str> = report.path().iter().map(|node| node.as_str()).collect();
            let message =
                format!("{} rows, path {}", report.state.rows().len(), path.join(" -> "));
            checks.push(passed("dry_run_turn", elapsed_ms, message));
        }
        Ok(report) => {
            let message = format!("turn ended without an answer: {:?}", report.state.error);
            checks.push(failed("dry_run_turn", elapsed_ms, message));
        }
        Err(error) => checks.push(failed("dry_run_turn", elapsed_ms, error.to_string())),
    }
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((elapsed(started), value)),
        Err(error) => Err((elapsed(started), error)),
    }
}

async fn timed_async<T>(future: impl Future<Output = T>) -> (u64, T) {
    let started = Instant::now();
    let value = future.await;
    (elapsed(started), value)
}

fn elapsed(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn passed(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Pass, elapsed_ms, message: message.into() }
}

fn failed(name: &'static str, elapsed_ms: u64, message: impl Into<String>) -> SmokeCheck {
    SmokeCheck { name, status: SmokeStatus::Fail, elapsed_ms, message: message.into() }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(mut checks: Vec<SmokeCheck>, started: Instant) -> CommandResult {
    let remaining: Vec<&'static str> = CHECKS
        .into_iter()
        .filter(|name| !checks.iter().any(|check| check.name == *name))
        .collect();
    checks.extend(remaining.into_iter().map(skipped));

    let total_elapsed_ms = elapsed(started);
    let pass_count = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let any_failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if any_failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {pass_count}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    let exit_code = if any_failed { 6 } else { 0 };
    CommandResult { exit_code, output: format!("{human}\n{machine}") }
}
