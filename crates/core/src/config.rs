use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::backend::{Backend, ModelSelection};
use crate::flows::TurnPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub warehouse: WarehouseConfig,
    pub llm: LlmConfig,
    pub orchestrator: OrchestratorConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Application store holding conversation checkpoints.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Relational store the generated SQL runs against.
#[derive(Clone, Debug)]
pub struct WarehouseConfig {
    pub url: String,
    pub schema: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub statement_timeout_ms: u64,
    pub seed_demo: bool,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub mistral: ProviderConfig,
    pub openai: ProviderConfig,
    pub google: ProviderConfig,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub model_query: String,
    pub model_interpret: String,
    pub max_error_count: u32,
    pub max_routing_failures: u32,
    pub max_steps: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarehouseKind {
    Postgres,
    Sqlite,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub warehouse_url: Option<String>,
    pub warehouse_seed_demo: Option<bool>,
    pub log_level: Option<String>,
    pub model_query: Option<String>,
    pub model_interpret: Option<String>,
    pub mistral_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://railsql.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            warehouse: WarehouseConfig {
                url: "sqlite::memory:".to_string(),
                schema: "oebb".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                statement_timeout_ms: 450_000,
                seed_demo: true,
            },
            llm: LlmConfig {
                temperature: 0.15,
                timeout_secs: 120,
                max_retries: 2,
                mistral: ProviderConfig {
                    api_key: None,
                    base_url: "https://api.mistral.ai/v1".to_string(),
                    model: "mistral-small-latest".to_string(),
                },
                openai: ProviderConfig {
                    api_key: None,
                    base_url: "https://api.openai.com/v1".to_string(),
                    model: "gpt-4.1-mini-2025-04-14".to_string(),
                },
                google: ProviderConfig {
                    api_key: None,
                    base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                    model: "gemma-3-27b-it".to_string(),
                },
            },
            orchestrator: OrchestratorConfig {
                model_query: "dryrun".to_string(),
                model_interpret: "dryrun".to_string(),
                max_error_count: 3,
                max_routing_failures: 3,
                max_steps: 32,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WarehouseConfig {
    pub fn kind(&self) -> Option<WarehouseKind> {
        let url = self.url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(WarehouseKind::Postgres)
        } else if url.starts_with("sqlite:") {
            Some(WarehouseKind::Sqlite)
        } else {
            None
        }
    }
}

impl LlmConfig {
    /// Provider block for a network backend; `None` for the dry run.
    pub fn provider(&self, backend: Backend) -> Option<&ProviderConfig> {
        match backend {
            Backend::Mistral => Some(&self.mistral),
            Backend::OpenAi => Some(&self.openai),
            Backend::Google => Some(&self.google),
            Backend::DryRun => None,
        }
    }
}

impl ProviderConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

impl OrchestratorConfig {
    pub fn default_selection(&self) -> ModelSelection {
        ModelSelection::new(self.model_query.clone(), self.model_interpret.clone())
    }

    pub fn turn_policy(&self) -> TurnPolicy {
        TurnPolicy {
            max_error_count: self.max_error_count,
            max_routing_failures: self.max_routing_failures,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("railsql.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(warehouse) = patch.warehouse {
            if let Some(url) = warehouse.url {
                self.warehouse.url = url;
            }
            if let Some(schema) = warehouse.schema {
                self.warehouse.schema = schema;
            }
            if let Some(max_connections) = warehouse.max_connections {
                self.warehouse.max_connections = max_connections;
            }
            if let Some(timeout_secs) = warehouse.timeout_secs {
                self.warehouse.timeout_secs = timeout_secs;
            }
            if let Some(statement_timeout_ms) = warehouse.statement_timeout_ms {
                self.warehouse.statement_timeout_ms = statement_timeout_ms;
            }
            if let Some(seed_demo) = warehouse.seed_demo {
                self.warehouse.seed_demo = seed_demo;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            apply_provider_patch(&mut self.llm.mistral, llm.mistral);
            apply_provider_patch(&mut self.llm.openai, llm.openai);
            apply_provider_patch(&mut self.llm.google, llm.google);
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(model_query) = orchestrator.model_query {
                self.orchestrator.model_query = model_query;
            }
            if let Some(model_interpret) = orchestrator.model_interpret {
                self.orchestrator.model_interpret = model_interpret;
            }
            if let Some(max_error_count) = orchestrator.max_error_count {
                self.orchestrator.max_error_count = max_error_count;
            }
            if let Some(max_routing_failures) = orchestrator.max_routing_failures {
                self.orchestrator.max_routing_failures = max_routing_failures;
            }
            if let Some(max_steps) = orchestrator.max_steps {
                self.orchestrator.max_steps = max_steps;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("RAILSQL_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("RAILSQL_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("RAILSQL_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("RAILSQL_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RAILSQL_WAREHOUSE_URL") {
            self.warehouse.url = value;
        }
        if let Some(value) = read_env("RAILSQL_WAREHOUSE_SCHEMA") {
            self.warehouse.schema = value;
        }
        if let Some(value) = read_env("RAILSQL_WAREHOUSE_MAX_CONNECTIONS") {
            self.warehouse.max_connections =
                parse_u32("RAILSQL_WAREHOUSE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_WAREHOUSE_TIMEOUT_SECS") {
            self.warehouse.timeout_secs = parse_u64("RAILSQL_WAREHOUSE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_WAREHOUSE_STATEMENT_TIMEOUT_MS") {
            self.warehouse.statement_timeout_ms =
                parse_u64("RAILSQL_WAREHOUSE_STATEMENT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_WAREHOUSE_SEED_DEMO") {
            self.warehouse.seed_demo = parse_bool("RAILSQL_WAREHOUSE_SEED_DEMO", &value)?;
        }

        if let Some(value) = read_env("RAILSQL_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("RAILSQL_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("RAILSQL_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("RAILSQL_LLM_MAX_RETRIES", &value)?;
        }
        apply_provider_env(&mut self.llm.mistral, "MISTRAL");
        apply_provider_env(&mut self.llm.openai, "OPENAI");
        apply_provider_env(&mut self.llm.google, "GOOGLE");

        if let Some(value) = read_env("RAILSQL_MODEL_QUERY") {
            self.orchestrator.model_query = value;
        }
        if let Some(value) = read_env("RAILSQL_MODEL_INTERPRET") {
            self.orchestrator.model_interpret = value;
        }
        if let Some(value) = read_env("RAILSQL_ORCHESTRATOR_MAX_ERROR_COUNT") {
            self.orchestrator.max_error_count =
                parse_u32("RAILSQL_ORCHESTRATOR_MAX_ERROR_COUNT", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_ORCHESTRATOR_MAX_ROUTING_FAILURES") {
            self.orchestrator.max_routing_failures =
                parse_u32("RAILSQL_ORCHESTRATOR_MAX_ROUTING_FAILURES", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_ORCHESTRATOR_MAX_STEPS") {
            self.orchestrator.max_steps = parse_u32("RAILSQL_ORCHESTRATOR_MAX_STEPS", &value)?;
        }

        if let Some(value) = read_env("RAILSQL_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RAILSQL_SERVER_PORT") {
            self.server.port = parse_u16("RAILSQL_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("RAILSQL_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RAILSQL_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("RAILSQL_LOGGING_LEVEL").or_else(|| read_env("RAILSQL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RAILSQL_LOGGING_FORMAT").or_else(|| read_env("RAILSQL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(warehouse_url) = overrides.warehouse_url {
            self.warehouse.url = warehouse_url;
        }
        if let Some(seed_demo) = overrides.warehouse_seed_demo {
            self.warehouse.seed_demo = seed_demo;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(model_query) = overrides.model_query {
            self.orchestrator.model_query = model_query;
        }
        if let Some(model_interpret) = overrides.model_interpret {
            self.orchestrator.model_interpret = model_interpret;
        }
        if let Some(api_key) = overrides.mistral_api_key {
            self.llm.mistral.api_key = Some(secret_value(api_key));
        }
        if let Some(api_key) = overrides.openai_api_key {
            self.llm.openai.api_key = Some(secret_value(api_key));
        }
        if let Some(api_key) = overrides.google_api_key {
            self.llm.google.api_key = Some(secret_value(api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_warehouse(&self.warehouse)?;
        validate_llm(&self.llm)?;
        validate_orchestrator(&self.orchestrator)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn apply_provider_patch(provider: &mut ProviderConfig, patch: Option<ProviderPatch>) {
    let Some(patch) = patch else {
        return;
    };
    if let Some(api_key) = patch.api_key {
        provider.api_key = Some(secret_value(api_key));
    }
    if let Some(base_url) = patch.base_url {
        provider.base_url = base_url;
    }
    if let Some(model) = patch.model {
        provider.model = model;
    }
}

fn apply_provider_env(provider: &mut ProviderConfig, name: &str) {
    if let Some(value) = read_env(&format!("RAILSQL_LLM_{name}_API_KEY")) {
        provider.api_key = Some(secret_value(value));
    }
    if let Some(value) = read_env(&format!("RAILSQL_LLM_{name}_BASE_URL")) {
        provider.base_url = value;
    }
    if let Some(value) = read_env(&format!("RAILSQL_LLM_{name}_MODEL")) {
        provider.model = value;
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("railsql.toml"), PathBuf::from("config/railsql.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_warehouse(warehouse: &WarehouseConfig) -> Result<(), ConfigError> {
    let Some(kind) = warehouse.kind() else {
        return Err(ConfigError::Validation(
            "warehouse.url must be a postgres URL (`postgres://...`) or a sqlite URL (`sqlite:...`)"
                .to_string(),
        ));
    };

    let schema = warehouse.schema.trim();
    let valid_schema = !schema.is_empty()
        && schema.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        && !schema.starts_with(|ch: char| ch.is_ascii_digit());
    if !valid_schema {
        return Err(ConfigError::Validation(
            "warehouse.schema must be a plain identifier (letters, digits, underscore)".to_string(),
        ));
    }

    if warehouse.max_connections == 0 {
        return Err(ConfigError::Validation(
            "warehouse.max_connections must be greater than zero".to_string(),
        ));
    }

    if warehouse.timeout_secs == 0 || warehouse.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "warehouse.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if warehouse.statement_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "warehouse.statement_timeout_ms must be greater than zero".to_string(),
        ));
    }

    if warehouse.seed_demo && kind != WarehouseKind::Sqlite {
        return Err(ConfigError::Validation(
            "warehouse.seed_demo is only supported for sqlite warehouses".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    let providers = [("mistral", &llm.mistral), ("openai", &llm.openai), ("google", &llm.google)];
    for (name, provider) in providers {
        let base_url = provider.base_url.trim();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "llm.{name}.base_url must start with http:// or https://"
            )));
        }
        if provider.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!("llm.{name}.model must not be empty")));
        }
    }

    Ok(())
}

fn validate_orchestrator(orchestrator: &OrchestratorConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("orchestrator.model_query", &orchestrator.model_query),
        ("orchestrator.model_interpret", &orchestrator.model_interpret),
    ] {
        if value.parse::<Backend>().is_err() {
            return Err(ConfigError::Validation(format!(
                "{key} must be one of mistral|openai|google|dryrun (got `{value}`)"
            )));
        }
    }

    if orchestrator.max_steps == 0 {
        return Err(ConfigError::Validation(
            "orchestrator.max_steps must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    warehouse: Option<WarehousePatch>,
    llm: Option<LlmPatch>,
    orchestrator: Option<OrchestratorPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WarehousePatch {
    url: Option<String>,
    schema: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    statement_timeout_ms: Option<u64>,
    seed_demo: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    mistral: Option<ProviderPatch>,
    openai: Option<ProviderPatch>,
    google: Option<ProviderPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    model_query: Option<String>,
    model_interpret: Option<String>,
    max_error_count: Option<u32>,
    max_routing_failures: Option<u32>,
    max_steps: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
