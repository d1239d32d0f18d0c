use railsql_agent::ModelGateway;
use railsql_core::config::{AppConfig, LoadOptions};
use railsql_core::domain::backend::Backend;
use railsql_db::{connect_from_config, connect_warehouse};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 3] = ["model_backends", "database_connectivity", "warehouse"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_model_backends(&config));
            checks.extend(check_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

/// The session default backends must be usable; others are informational.
fn check_model_backends(config: &AppConfig) -> DoctorCheck {
    let gateway = match ModelGateway::from_config(&config.llm) {
        Ok(gateway) => gateway,
        Err(error) => {
            return DoctorCheck {
                name: "model_backends",
                status: CheckStatus::Fail,
                details: format!("gateway setup failed: {error:#}"),
            };
        }
    };

    let registered = gateway.registered();
    let names: Vec<&str> = registered.iter().map(Backend::as_str).collect();
    let defaults = [&config.orchestrator.model_query, &config.orchestrator.model_interpret];
    let unusable: Vec<&str> = defaults
        .iter()
        .filter(|name| gateway.resolve(name).is_err())
        .map(|name| name.as_str())
        .collect();

    if unusable.is_empty() {
        DoctorCheck {
            name: "model_backends",
            status: CheckStatus::Pass,
            details: format!("registered: {}", names.join(", ")),
        }
    } else {
        DoctorCheck {
            name: "model_backends",
            status: CheckStatus::Fail,
            details: format!(
                "default backends without api key: {} (registered: {})",
                unusable.join(", "),
                names.join(", ")
            ),
        }
    }
}

fn check_connectivity(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let details = format!("failed to initialize async runtime: {error}");
            return vec![
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Fail,
                    details: details.clone(),
                },
                DoctorCheck { name: "warehouse", status: CheckStatus::Fail, details },
            ];
        }
    };

    runtime.block_on(async {
        let database = match connect_from_config(&config.database).await {
            Ok(pool) => {
                pool.close().await;
                DoctorCheck {
                    name: "database_connectivity",
                    status: CheckStatus::Pass,
                    details: format!("connected using `{}`", config.database.url),
                }
            }
            Err(error) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to connect to application store: {error}"),
            },
        };

        let warehouse = match connect_warehouse(&config.warehouse).await {
            Ok(warehouse) => {
                let ping = warehouse.ping().await;
                warehouse.close().await;
                match ping {
                    Ok(()) => DoctorCheck {
                        name: "warehouse",
                        status: CheckStatus::Pass,
                        details: format!(
                            "{} warehouse reachable (schema `{}`)",
                            warehouse.kind_name(),
                            warehouse.schema()
                        ),
                    },
                    Err(error) => DoctorCheck {
                        name: "warehouse",
                        status: CheckStatus::Fail,
                        details: format!("warehouse ping failed: {error}"),
                    },
                }
            }
            Err(error) => DoctorCheck {
                name: "warehouse",
                status: CheckStatus::Fail,
                details: format!("failed to connect to warehouse: {error}"),
            },
        };

        vec![database, warehouse]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
