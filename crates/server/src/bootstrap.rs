use railsql_agent::ChatStack;
use railsql_core::config::{AppConfig, ConfigError, LoadOptions};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub stack: ChatStack,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stack(#[from] railsql_agent::BootstrapError),
}

#[allow(dead_code)]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let stack = railsql_agent::assemble(&config).await?;
    info!(
        event_name = "system.bootstrap.completed",
        correlation_id = "bootstrap",
        thread_id = "unknown",
        warehouse = stack.warehouse.kind_name(),
        model_query = %config.orchestrator.model_query,
        model_interpret = %config.orchestrator.model_interpret,
        "application bootstrap completed"
    );

    Ok(Application { config, stack })
}
