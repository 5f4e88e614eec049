use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::ChatError;

/// Chat-completion vendor a message can be routed to.
///
/// Serialized with the gateway's enum names (`OPENAI`, `DEEPSEEK`); the lowercase
/// forms used in config files are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "OPENAI", alias = "openai")]
    OpenAi,
    #[serde(rename = "DEEPSEEK", alias = "deepseek")]
    DeepSeek,
}

impl Provider {
    /// Both supported providers, in toggle order.
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::DeepSeek];

    /// Model used when the caller configured none.
    pub fn default_model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-3.5-turbo",
            Provider::DeepSeek => "deepseek-chat",
        }
    }

    /// Base URL of the vendor's OpenAI-compatible REST API.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com",
            Provider::DeepSeek => "https://api.deepseek.com",
        }
    }

    /// Models offered when no gateway is asked.
    pub fn builtin_models(self) -> &'static [&'static str] {
        match self {
            Provider::OpenAi => &["gpt-3.5-turbo", "gpt-4", "gpt-4o", "gpt-4o-mini"],
            Provider::DeepSeek => &["deepseek-chat", "deepseek-reasoner"],
        }
    }

    /// The provider `switch_provider` moves to.
    pub fn other(self) -> Provider {
        match self {
            Provider::OpenAi => Provider::DeepSeek,
            Provider::DeepSeek => Provider::OpenAi,
        }
    }

    /// Lowercase key used in config files and credential storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
        }
    }

    /// Name shown to end users.
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::DeepSeek => "DeepSeek",
        }
    }

    /// Parses the lowercase or gateway spelling, ignoring case.
    pub fn parse(value: &str) -> Option<Provider> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "deepseek" => Some(Provider::DeepSeek),
            _ => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for one send: who to call, with which key and model.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    pub provider: Provider,
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatConfig {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Explicit model, or the provider default when unset or blank.
    pub fn resolved_model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Fails with [`ChatError::Config`] when the key is blank.
    pub fn ensure_api_key(&self) -> Result<(), ChatError> {
        if self.api_key.trim().is_empty() {
            Err(ChatError::missing_api_key(self.provider))
        } else {
            Ok(())
        }
    }
}

// The key must never reach a log line.
impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry of the visible session conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Set on assistant entries that render a failed send.
    #[serde(default)]
    pub is_error: bool,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            id: Ulid::new().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_error,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, false)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, false)
    }

    /// Assistant entry describing a failed send.
    pub fn error(error: &ChatError) -> Self {
        Self::new(
            Role::Assistant,
            format!("Error: {}", error.display_message()),
            true,
        )
    }

    pub fn to_turn(&self) -> HistoryTurn {
        HistoryTurn {
            role: self.role.as_str().to_string(),
            content: self.content.clone(),
        }
    }
}

/// Prior turn as carried in `conversationHistory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }
}

/// Gateway `ChatRequest` input object.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub provider: Provider,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub api_key: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryTurn>,
}

impl ChatRequest {
    pub fn new(message: &str, config: &ChatConfig, history: &[HistoryTurn]) -> Self {
        Self {
            message: message.to_string(),
            provider: config.provider,
            model: Some(config.resolved_model().to_string()),
            api_key: config.api_key.clone(),
            conversation_history: history.to_vec(),
        }
    }
}

impl fmt::Debug for ChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatRequest")
            .field("message", &self.message)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("conversation_history", &self.conversation_history)
            .finish()
    }
}

/// Successful reply to a send.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    /// Model the gateway reports having used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Gateway-assigned response id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ChatReply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: None,
            id: None,
        }
    }
}

/// Outcome of one send: reply content or a tagged failure.
pub type ChatResult = Result<ChatReply, ChatError>;

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "<empty>" } else { "<redacted>" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_model_falls_back_to_provider_default() {
        let config = ChatConfig::new(Provider::OpenAi, "sk-test");
        assert_eq!(config.resolved_model(), "gpt-3.5-turbo");

        let config = ChatConfig::new(Provider::DeepSeek, "sk-test").with_model("  ");
        assert_eq!(config.resolved_model(), "deepseek-chat");

        let config = ChatConfig::new(Provider::DeepSeek, "sk-test").with_model("model-x");
        assert_eq!(config.resolved_model(), "model-x");
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = ChatConfig::new(Provider::OpenAi, "sk-very-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-very-secret"));
        assert!(rendered.contains("<redacted>"));

        let request = ChatRequest::new("hi", &config, &[]);
        assert!(!format!("{request:?}").contains("sk-very-secret"));
    }

    #[test]
    fn provider_accepts_both_spellings() {
        let gateway: Provider = serde_json::from_str("\"DEEPSEEK\"").expect("gateway form");
        let config: Provider = serde_json::from_str("\"openai\"").expect("config form");
        assert_eq!(gateway, Provider::DeepSeek);
        assert_eq!(config, Provider::OpenAi);
        assert_eq!(
            serde_json::to_string(&Provider::OpenAi).expect("serialize"),
            "\"OPENAI\""
        );
        assert_eq!(Provider::parse("DeepSeek"), Some(Provider::DeepSeek));
        assert_eq!(Provider::parse("claude"), None);
    }

    #[test]
    fn other_is_an_involution() {
        for provider in Provider::ALL {
            assert_ne!(provider.other(), provider);
            assert_eq!(provider.other().other(), provider);
        }
    }

    #[test]
    fn chat_request_round_trip_keeps_empty_history() {
        let config = ChatConfig::new(Provider::OpenAi, "sk-test").with_model("model-x");
        let request = ChatRequest::new("hello", &config, &[]);

        let encoded = serde_json::to_value(&request).expect("serialize");
        assert_eq!(encoded["apiKey"], "sk-test");
        assert_eq!(encoded["provider"], "OPENAI");
        assert_eq!(encoded["conversationHistory"], serde_json::json!([]));

        let decoded: ChatRequest = serde_json::from_value(encoded).expect("deserialize");
        assert_eq!(decoded, request);
        assert!(decoded.conversation_history.is_empty());
    }

    #[test]
    fn chat_request_without_history_field_decodes_as_empty() {
        let decoded: ChatRequest = serde_json::from_value(serde_json::json!({
            "message": "hi",
            "provider": "DEEPSEEK",
            "apiKey": "k"
        }))
        .expect("deserialize");
        assert!(decoded.conversation_history.is_empty());
        assert_eq!(decoded.model, None);
    }

    #[test]
    fn error_messages_are_flagged() {
        let entry = ChatMessage::error(&ChatError::transport("connection refused"));
        assert!(entry.is_error);
        assert_eq!(entry.role, Role::Assistant);
        assert_eq!(entry.content, "Error: connection refused");

        let first = ChatMessage::user("a");
        let second = ChatMessage::user("a");
        assert_ne!(first.id, second.id);
    }
}
