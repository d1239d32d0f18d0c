use std::sync::Arc;

use railsql_core::audit::TracingAuditSink;
use railsql_core::config::AppConfig;
use railsql_core::warehouse::SchemaCatalog;
use railsql_db::repositories::SqlCheckpointRepository;
use railsql_db::{connect_from_config, connect_warehouse, migrations, DbPool, Warehouse};
use railsql_db::{DemoSeedSummary, WarehouseError};
use thiserror::Error;
use tracing::{info, warn};

use crate::gateway::ModelGateway;
use crate::runtime::Orchestrator;
use crate::session::ThreadService;

/// Everything a surface needs to answer questions.
pub struct ChatStack {
    pub db_pool: DbPool,
    pub warehouse: Warehouse,
    pub catalog: Arc<SchemaCatalog>,
    pub seeded: Option<DemoSeedSummary>,
    pub service: ThreadService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("warehouse unavailable: {0}")]
    Warehouse(#[source] WarehouseError),
    #[error("model gateway setup failed: {0:#}")]
    Gateway(anyhow::Error),
}

impl BootstrapError {
    /// Short machine-readable class for CLI and health reports.
    pub fn class(&self) -> &'static str {
        match self {
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::Warehouse(_) => "warehouse",
            Self::Gateway(_) => "gateway",
        }
    }
}

/// Connects both stores, applies migrations, optionally seeds the demo
/// warehouse, introspects the schema and wires the orchestrator.
pub async fn assemble(config: &AppConfig) -> Result<ChatStack, BootstrapError> {
    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.store_ready",
        correlation_id = "bootstrap",
        "application store connected and migrated"
    );

    let warehouse =
        connect_warehouse(&config.warehouse).await.map_err(BootstrapError::Warehouse)?;
    let seeded = if config.warehouse.seed_demo {
        let summary = warehouse.seed_demo().await.map_err(BootstrapError::Warehouse)?;
        info!(
            event_name = "system.bootstrap.demo_seeded",
            correlation_id = "bootstrap",
            rows = summary.total(),
            "demo warehouse seeded"
        );
        Some(summary)
    } else {
        None
    };

    let catalog = Arc::new(warehouse.introspect().await.map_err(BootstrapError::Warehouse)?);
    let missing = catalog.missing_tables();
    if !missing.is_empty() {
        warn!(
            event_name = "system.bootstrap.schema_incomplete",
            correlation_id = "bootstrap",
            missing = ?missing,
            "warehouse is missing tracked tables"
        );
    }

    let gateway = ModelGateway::from_config(&config.llm).map_err(BootstrapError::Gateway)?;
    let orchestrator = Orchestrator::new(gateway, Arc::new(warehouse.clone()), catalog.clone())
        .with_policy(config.orchestrator.turn_policy())
        .with_max_steps(config.orchestrator.max_steps)
        .with_audit_sink(Arc::new(TracingAuditSink));
    let service = ThreadService::new(
        orchestrator,
        Arc::new(SqlCheckpointRepository::new(db_pool.clone())),
        config.orchestrator.default_selection(),
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        warehouse = warehouse.kind_name(),
        schema = warehouse.schema(),
        tables = catalog.tables.len(),
        "chat stack assembled"
    );

    Ok(ChatStack { db_pool, warehouse, catalog, seeded, service })
}

impl ChatStack {
    pub async fn close(&self) {
        self.warehouse.close().await;
        self.db_pool.close().await;
    }
}
