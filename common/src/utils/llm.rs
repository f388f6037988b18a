use std::sync::Arc;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::debug;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for ChatCompletionRequestMessage {
    fn from(message: &ChatMessage) -> Self {
        match message.role {
            ChatRole::System => {
                ChatCompletionRequestSystemMessage::from(message.content.clone()).into()
            }
            ChatRole::User => ChatCompletionRequestUserMessage::from(message.content.clone()).into(),
        }
    }
}

/// A chat-completion service: a list of messages in, the assistant's text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, AppError>;
}

pub struct OpenAiChatModel {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiChatModel {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(temperature)
            .messages(
                messages
                    .iter()
                    .map(ChatCompletionRequestMessage::from)
                    .collect::<Vec<_>>(),
            )
            .build()?;

        let response = self.client.chat().create(request).await?;
        debug!(
            model = %self.model,
            choices = response.choices.len(),
            "Chat completion received"
        );

        response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| AppError::LLMParsing("No content found in LLM response".into()))
    }
}
