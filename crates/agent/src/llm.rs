use anyhow::Result;
use async_trait::async_trait;

/// What a prompt is for. Network backends only see `Prompt::text`; the
/// dry-run client answers from the task alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptTask {
    Route { has_data: bool, has_answer: bool },
    GenerateQuery,
    Interpret,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    pub task: PromptTask,
    pub text: String,
}

impl Prompt {
    pub fn new(task: PromptTask, text: impl Into<String>) -> Self {
        Self { task, text: text.into() }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String>;
}
