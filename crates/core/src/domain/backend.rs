use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

/// Text-generation backends the gateway can dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Mistral,
    OpenAi,
    Google,
    DryRun,
}

impl Backend {
    pub const ALL: [Backend; 4] = [Self::Mistral, Self::OpenAi, Self::Google, Self::DryRun];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mistral => "mistral",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::DryRun => "dryrun",
        }
    }

    pub fn is_network(&self) -> bool {
        !matches!(self, Self::DryRun)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mistral" => Ok(Self::Mistral),
            "openai" => Ok(Self::OpenAi),
            "google" => Ok(Self::Google),
            "dryrun" => Ok(Self::DryRun),
            _ => Err(ConfigurationError::UnknownBackend { name: value.to_string() }),
        }
    }
}

/// Per-session backend selection. Names stay raw strings because they arrive
/// from outside (settings payloads, checkpoints) and are resolved on every use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub model_query: String,
    pub model_interpret: String,
}

impl ModelSelection {
    pub fn new(model_query: impl Into<String>, model_interpret: impl Into<String>) -> Self {
        Self { model_query: model_query.into(), model_interpret: model_interpret.into() }
    }

    pub fn dry_run() -> Self {
        Self::new(Backend::DryRun.as_str(), Backend::DryRun.as_str())
    }

    pub fn query_backend(&self) -> Result<Backend, ConfigurationError> {
        self.model_query.parse()
    }

    pub fn interpret_backend(&self) -> Result<Backend, ConfigurationError> {
        self.model_interpret.parse()
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::dry_run()
    }
}
