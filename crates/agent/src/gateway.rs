use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use railsql_core::config::LlmConfig;
use railsql_core::domain::backend::Backend;
use railsql_core::errors::{ApplicationError, ConfigurationError};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::llm::{LlmClient, Prompt};
use crate::providers::{ChatCompletionsClient, DryRunClient, GeminiClient, HttpSettings};

/// Lookup table from backend to client. The dry run is always present; network
/// backends are registered only when an API key is configured.
#[derive(Clone)]
pub struct ModelGateway {
    clients: HashMap<Backend, Arc<dyn LlmClient>>,
}

impl Default for ModelGateway {
    fn default() -> Self {
        Self::dry_run_only()
    }
}

impl ModelGateway {
    pub fn dry_run_only() -> Self {
        let mut clients: HashMap<Backend, Arc<dyn LlmClient>> = HashMap::new();
        clients.insert(Backend::DryRun, Arc::new(DryRunClient));
        Self { clients }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let settings = HttpSettings {
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        };
        let mut gateway = Self::dry_run_only();

        if let Some(api_key) = configured_key(&config.mistral.api_key) {
            let client = ChatCompletionsClient::new(
                "mistral",
                &config.mistral.base_url,
                api_key,
                config.mistral.model.clone(),
                settings.clone(),
            )?;
            gateway = gateway.with_client(Backend::Mistral, Arc::new(client));
        }
        if let Some(api_key) = configured_key(&config.openai.api_key) {
            let client = ChatCompletionsClient::new(
                "openai",
                &config.openai.base_url,
                api_key,
                config.openai.model.clone(),
                settings.clone(),
            )?;
            gateway = gateway.with_client(Backend::OpenAi, Arc::new(client));
        }
        if let Some(api_key) = configured_key(&config.google.api_key) {
            let client = GeminiClient::new(
                &config.google.base_url,
                api_key,
                &config.google.model,
                settings,
            )?;
            gateway = gateway.with_client(Backend::Google, Arc::new(client));
        }

        debug!(
            event_name = "llm.gateway.ready",
            backends = ?gateway.registered(),
            "model gateway initialised"
        );
        Ok(gateway)
    }

    pub fn with_client(mut self, backend: Backend, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(backend, client);
        self
    }

    pub fn registered(&self) -> Vec<Backend> {
        let mut backends: Vec<Backend> = self.clients.keys().copied().collect();
        backends.sort();
        backends
    }

    /// Resolves a backend name without calling it. Unknown names and known
    /// but unregistered backends are both configuration errors.
    pub fn resolve(&self, name: &str) -> Result<(Backend, Arc<dyn LlmClient>), ApplicationError> {
        let backend: Backend = name.parse()?;
        let client = self.clients.get(&backend).cloned().ok_or_else(|| {
            ConfigurationError::BackendNotConfigured { backend: backend.to_string() }
        })?;
        Ok((backend, client))
    }

    pub async fn generate(&self, name: &str, prompt: &Prompt) -> Result<String, ApplicationError> {
        let (backend, client) = self.resolve(name)?;
        client.complete(prompt).await.map_err(|error| {
            ApplicationError::Integration(format!("{backend} request failed: {error:#}"))
        })
    }
}

fn configured_key(key: &Option<SecretString>) -> Option<SecretString> {
    key.as_ref().filter(|key| !key.expose_secret().trim().is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use railsql_core::config::AppConfig;
    use railsql_core::domain::backend::Backend;
    use railsql_core::errors::{ApplicationError, ConfigurationError};

    use super::ModelGateway;
    use crate::llm::{LlmClient, Prompt, PromptTask};

    struct FailingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn complete(&self, _prompt: &Prompt) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("502 bad gateway"))
        }
    }

    fn prompt() -> Prompt {
        Prompt::new(PromptTask::Interpret, "data")
    }

    #[test]
    fn config_without_keys_registers_only_the_dry_run() {
        let mut config = AppConfig::default();
        config.llm.google.api_key = Some("   ".to_string().into());

        let gateway = ModelGateway::from_config(&config.llm).expect("gateway builds");

        assert_eq!(gateway.registered(), vec![Backend::DryRun]);
    }

    #[test]
    fn configured_keys_register_network_backends() {
        let mut config = AppConfig::default();
        config.llm.mistral.api_key = Some("mistral-key".to_string().into());
        config.llm.google.api_key = Some("google-key".to_string().into());

        let gateway = ModelGateway::from_config(&config.llm).expect("gateway builds");

        assert_eq!(gateway.registered(), vec![Backend::Mistral, Backend::Google, Backend::DryRun]);
    }

    #[tokio::test]
    async fn unknown_backend_is_a_configuration_error() {
        let gateway = ModelGateway::default();

        let error = gateway.generate("llama", &prompt()).await.expect_err("unknown backend");

        assert_eq!(
            error,
            ApplicationError::Configuration(ConfigurationError::UnknownBackend {
                name: "llama".to_string()
            })
        );
    }

    #[tokio::test]
    async fn unregistered_backend_is_a_configuration_error() {
        let gateway = ModelGateway::default();

        let error = gateway.generate("openai", &prompt()).await.expect_err("no key");

        assert_eq!(
            error,
            ApplicationError::Configuration(ConfigurationError::BackendNotConfigured {
                backend: "openai".to_string()
            })
        );
    }

    #[tokio::test]
    async fn client_failures_surface_as_integration_errors() {
        let client = Arc::new(FailingClient { calls: AtomicUsize::new(0) });
        let gateway = ModelGateway::default().with_client(Backend::Mistral, client.clone());

        let error = gateway.generate("Mistral", &prompt()).await.expect_err("client fails");

        assert!(matches!(
            error,
            ApplicationError::Integration(ref message) if message.contains("502")
        ));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dry_run_is_always_available() {
        let gateway = ModelGateway::default();

        let answer = gateway.generate("dryrun", &prompt()).await.expect("dry run answers");

        assert!(answer.starts_with("This is a dry run."));
    }
}
