//! OpenAI-compatible text completion

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use sqlsight_pipeline::{CompletionError, TextCompleter};
use std::time::Duration;

use crate::config::LlmConfig;

pub struct OpenAiCompleter {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiCompleter {
    pub fn new(api_key: String, config: &LlmConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(api_base) = &config.api_base {
            openai_config = openai_config.with_api_base(api_base);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl TextCompleter for OpenAiCompleter {
    async fn complete(&self, system_prompt: &str, context: &str) -> Result<String, CompletionError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(system_prompt)
                    .build()
                    .map_err(request_error)?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(context)
                    .build()
                    .map_err(request_error)?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(request_error)?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| CompletionError::Request(format!("no response within {:?}", self.timeout)))?
            .map_err(request_error)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        tracing::debug!(model = %self.model, chars = content.len(), "Completion received");
        Ok(content.to_string())
    }
}

fn request_error(e: impl std::fmt::Display) -> CompletionError {
    CompletionError::Request(e.to_string())
}
