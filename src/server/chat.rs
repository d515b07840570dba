//! # Chat Service
//!
//! In-memory conversations backed by an OpenAI-compatible chat completion
//! endpoint. Conversations live only as long as the process.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::common::config::ChatConfig;

pub const DEFAULT_CONVERSATION_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
}

impl ChatMessage {
    fn new(role: ChatRole, content: String, conversation_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: Utc::now(),
            conversation_id: conversation_id.to_string(),
        }
    }
}

// ============================================================================
// COMPLETION BACKEND
// ============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<CompletionMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: ChatRole,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Deserialize)]
struct CompletionContent {
    content: Option<String>,
}

/// Client for `POST {base}/chat/completions`.
pub struct CompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(config: &ChatConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
        })
    }

    /// Build a client from the API key named in the config, if it is set.
    pub fn from_env(config: &ChatConfig) -> Result<Option<Self>> {
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(Self::new(config, key)?)),
            _ => {
                warn!(
                    "⚠️  {} is not set; chat and ASCII art are disabled",
                    config.api_key_env
                );
                Ok(None)
            }
        }
    }

    /// Generate the next assistant turn for `history`.
    pub async fn complete(
        &self,
        history: &[(ChatRole, String)],
        max_tokens: Option<u32>,
    ) -> Result<Option<String>> {
        let request = CompletionRequest {
            model: &self.model,
            messages: history
                .iter()
                .map(|(role, content)| CompletionMessage {
                    role: *role,
                    content,
                })
                .collect(),
            max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chat completion returned {}: {}", status, body);
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("invalid chat completion response")?;
        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

// ============================================================================
// CONVERSATION STORE
// ============================================================================

/// Conversation history plus an optional completion backend.
pub struct ChatService {
    conversations: RwLock<HashMap<String, Vec<ChatMessage>>>,
    backend: Option<CompletionClient>,
}

impl ChatService {
    pub fn new(backend: Option<CompletionClient>) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            backend,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&CompletionClient> {
        self.backend.as_ref().ok_or_else(|| {
            anyhow!("chat API key is not configured; set it in the environment and restart")
        })
    }

    /// All messages of a conversation, oldest first.
    pub async fn messages(&self, conversation_id: Option<&str>) -> Vec<ChatMessage> {
        let id = conversation_id.unwrap_or(DEFAULT_CONVERSATION_ID);
        self.conversations
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Append a user message and return the assistant's reply.
    ///
    /// The user message is stored even if the backend then fails.
    pub async fn send_message(
        &self,
        content: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatMessage> {
        let id = conversation_id.unwrap_or(DEFAULT_CONVERSATION_ID);

        let history: Vec<(ChatRole, String)> = {
            let mut conversations = self.conversations.write().await;
            let messages = conversations.entry(id.to_string()).or_default();
            messages.push(ChatMessage::new(ChatRole::User, content.to_string(), id));
            messages
                .iter()
                .map(|m| (m.role, m.content.clone()))
                .collect()
        };

        let reply = self
            .backend()?
            .complete(&history, None)
            .await?
            .unwrap_or_else(|| "No response generated".to_string());

        let assistant = ChatMessage::new(ChatRole::Assistant, reply, id);
        self.conversations
            .write()
            .await
            .entry(id.to_string())
            .or_default()
            .push(assistant.clone());

        info!("💬 Conversation '{}' answered ({} chars)", id, assistant.content.len());
        Ok(assistant)
    }

    /// One-shot generation outside any conversation.
    pub async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Option<String>> {
        self.backend()?
            .complete(&[(ChatRole::User, prompt.to_string())], Some(max_tokens))
            .await
    }
}
