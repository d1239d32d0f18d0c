use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

use crate::llm::{LlmClient, Prompt, PromptTask};

pub const DRY_RUN_QUERY: &str = "SELECT * FROM oebb.arrivals LIMIT 10";

pub const DRY_RUN_ANSWER: &str =
    "This is a dry run. The answer is static and no language model was used.";

const DRY_RUN_ROUTE_QUERY: &str = "{'next_step': 'query'}";
const DRY_RUN_ROUTE_INTERPRET: &str = "{'next_step': 'interpret'}";
const DRY_RUN_ROUTE_STOP: &str = "{'next_step': 'stop'}";

/// Deterministic stand-in for a language model. Never touches the network and
/// ignores the prompt text.
#[derive(Clone, Copy, Debug, Default)]
pub struct DryRunClient;

#[async_trait]
impl LlmClient for DryRunClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        let reply = match prompt.task {
            PromptTask::Route { has_answer: true, .. } => DRY_RUN_ROUTE_STOP,
            PromptTask::Route { has_data: true, .. } => DRY_RUN_ROUTE_INTERPRET,
            PromptTask::Route { .. } => DRY_RUN_ROUTE_QUERY,
            PromptTask::GenerateQuery => DRY_RUN_QUERY,
            PromptTask::Interpret => DRY_RUN_ANSWER,
        };
        Ok(reply.to_string())
    }
}

/// Settings shared by every HTTP backend.
#[derive(Clone, Debug)]
pub struct HttpSettings {
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: u32,
}

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder().timeout(timeout).build().context("failed to build http client")
}

/// Mistral and OpenAI both speak the chat-completions wire format.
pub struct ChatCompletionsClient {
    provider: &'static str,
    client: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    settings: HttpSettings,
}

impl ChatCompletionsClient {
    pub fn new(
        provider: &'static str,
        base_url: &str,
        api_key: SecretString,
        model: impl Into<String>,
        settings: HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            client: http_client(settings.timeout)?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            settings,
        })
    }

    async fn send(&self, text: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": self.settings.temperature,
            "messages": [{ "role": "user", "content": text }],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} API error {}: {}", self.provider, status, error_text));
        }

        let raw = response.json::<Value>().await?;
        chat_completion_text(&raw)
            .ok_or_else(|| anyhow!("no message content in {} response", self.provider))
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        with_retries(self.provider, self.settings.max_retries, || self.send(&prompt.text)).await
    }
}

/// Google's `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    settings: HttpSettings,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        model: &str,
        settings: HttpSettings,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(settings.timeout)?,
            endpoint: format!(
                "{}/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            api_key,
            settings,
        })
    }

    async fn send(&self, text: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": text }] }],
            "generationConfig": { "temperature": self.settings.temperature },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("google API error {}: {}", status, error_text));
        }

        let raw = response.json::<Value>().await?;
        generate_content_text(&raw).ok_or_else(|| anyhow!("no candidate text in google response"))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        with_retries("google", self.settings.max_retries, || self.send(&prompt.text)).await
    }
}

async fn with_retries<F, Fut>(provider: &str, max_retries: u32, mut call: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(text) => return Ok(text),
            Err(error) if attempt < max_retries => {
                attempt += 1;
                warn!(
                    event_name = "llm.request.retry",
                    provider,
                    attempt,
                    error = %error,
                    "language model request failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
            }
            Err(error) => return Err(error),
        }
    }
}

fn chat_completion_text(raw: &Value) -> Option<String> {
    raw["choices"][0]["message"]["content"].as_str().map(str::to_string)
}

fn generate_content_text(raw: &Value) -> Option<String> {
    let parts = raw["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|part| part["text"].as_str()).collect();
    Some(text)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::anyhow;
    use serde_json::json;

    use super::{
        chat_completion_text, generate_content_text, with_retries, DryRunClient, DRY_RUN_ANSWER,
        DRY_RUN_QUERY,
    };
    use crate::llm::{LlmClient, Prompt, PromptTask};

    #[tokio::test]
    async fn dry_run_ignores_prompt_text() {
        let client = DryRunClient;
        let first = client
            .complete(&Prompt::new(PromptTask::GenerateQuery, "question one"))
            .await
            .expect("dry run query");
        let second = client
            .complete(&Prompt::new(PromptTask::GenerateQuery, "something else entirely"))
            .await
            .expect("dry run query");

        assert_eq!(first, DRY_RUN_QUERY);
        assert_eq!(first, second);
        assert_eq!(
            client.complete(&Prompt::new(PromptTask::Interpret, "")).await.expect("interpret"),
            DRY_RUN_ANSWER
        );
    }

    #[tokio::test]
    async fn dry_run_routing_follows_task_flags() {
        let client = DryRunClient;
        let route = |has_data, has_answer| {
            Prompt::new(PromptTask::Route { has_data, has_answer }, "route me")
        };

        assert_eq!(
            client.complete(&route(false, false)).await.expect("route"),
            "{'next_step': 'query'}"
        );
        assert_eq!(
            client.complete(&route(true, false)).await.expect("route"),
            "{'next_step': 'interpret'}"
        );
        assert_eq!(
            client.complete(&route(true, true)).await.expect("route"),
            "{'next_step': 'stop'}"
        );
    }

    #[test]
    fn reads_chat_completion_content() {
        let raw = json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "SELECT 1" } }]
        });

        assert_eq!(chat_completion_text(&raw).as_deref(), Some("SELECT 1"));
        assert_eq!(chat_completion_text(&json!({ "choices": [] })), None);
    }

    #[test]
    fn joins_generate_content_parts() {
        let raw = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Im Schnitt " }, { "text": "4 Minuten." }] } }]
        });

        assert_eq!(generate_content_text(&raw).as_deref(), Some("Im Schnitt 4 Minuten."));
        assert_eq!(generate_content_text(&json!({})), None);
    }

    #[tokio::test]
    async fn retries_until_budget_is_spent() {
        let calls = AtomicU32::new(0);

        let result = with_retries("test", 2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<String, _>(anyhow!("connection reset")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let calls = AtomicU32::new(0);

        let result = with_retries("test", 5, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(anyhow!("503"))
                } else {
                    Ok("done".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.expect("second attempt succeeds"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
