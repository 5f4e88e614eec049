use std::collections::HashMap;

use tracing::{debug, warn};

use crate::credentials::DynCredentialStore;
use crate::error::ChatError;
use crate::provider::{ChatStream, DynAdapter};
use crate::types::{ChatConfig, ChatMessage, ChatResult, HistoryTurn, Provider};

/// 对外入口 负责选择当前 Provider 并维护会话消息
///
/// `send_message` takes `&mut self`, so a session has at most one request in
/// flight. Each send performs one adapter call, or none when the active provider
/// has no API key.
pub struct Dispatcher {
    adapter: DynAdapter,
    credentials: DynCredentialStore,
    active: Provider,
    models: HashMap<Provider, String>,
    messages: Vec<ChatMessage>,
}

impl Dispatcher {
    /// 创建 Builder 默认激活 DeepSeek
    pub fn builder(adapter: DynAdapter, credentials: DynCredentialStore) -> DispatcherBuilder {
        DispatcherBuilder {
            adapter,
            credentials,
            active: Provider::DeepSeek,
            models: HashMap::new(),
        }
    }

    /// Sends `text` to the active provider and records the exchange.
    ///
    /// Without a stored key the call fails with [`ChatError::Config`] before any I/O
    /// and the session is left untouched. Otherwise the user message is recorded,
    /// the adapter is called once, and its reply (or an error entry) is appended.
    /// The adapter's result is returned unchanged.
    pub async fn send_message(&mut self, text: &str) -> ChatResult {
        let config = self.current_config()?;
        let history = self.history();
        self.messages.push(ChatMessage::user(text));

        debug!(
            provider = %config.provider,
            model = config.resolved_model(),
            adapter = self.adapter.name(),
            history = history.len(),
            "dispatching chat message"
        );
        let result = self.adapter.send_chat(text, &config, &history).await;

        match &result {
            Ok(reply) => self.messages.push(ChatMessage::assistant(reply.content.clone())),
            Err(err) => {
                warn!(provider = %config.provider, error = %err, "chat message failed");
                self.messages.push(ChatMessage::error(err));
            }
        }
        result
    }

    /// 流式发送 不写入会话消息
    pub async fn stream_message(&self, text: &str) -> Result<ChatStream, ChatError> {
        let config = self.current_config()?;
        let history = self.history();
        debug!(
            provider = %config.provider,
            model = config.resolved_model(),
            adapter = self.adapter.name(),
            "streaming chat message"
        );
        self.adapter.stream_chat(text, &config, &history).await
    }

    /// Toggles between the two providers; no I/O.
    pub fn switch_provider(&mut self) {
        self.active = self.active.other();
        debug!(provider = %self.active, "switched active provider");
    }

    /// Empties the session conversation; stored keys are untouched.
    pub fn clear_history(&mut self) {
        self.messages.clear();
    }

    pub fn active_provider(&self) -> Provider {
        self.active
    }

    /// 会话中的全部消息 含错误条目
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Model used for `provider`: the override, or the provider default.
    pub fn model_for(&self, provider: Provider) -> &str {
        self.models
            .get(&provider)
            .map(String::as_str)
            .unwrap_or_else(|| provider.default_model())
    }

    pub fn set_model(&mut self, provider: Provider, model: impl Into<String>) {
        self.models.insert(provider, model.into());
    }

    pub fn set_api_key(&self, provider: Provider, key: &str) {
        self.credentials.set(provider, key);
    }

    pub fn has_api_key(&self, provider: Provider) -> bool {
        self.credentials.get(provider).is_some()
    }

    /// 当前 Provider 可选模型
    pub async fn supported_models(&self) -> Result<Vec<String>, ChatError> {
        self.adapter.supported_models(self.active).await
    }

    pub async fn health(&self) -> Result<String, ChatError> {
        self.adapter.health().await
    }

    fn current_config(&self) -> Result<ChatConfig, ChatError> {
        let provider = self.active;
        let api_key = self
            .credentials
            .get(provider)
            .ok_or_else(|| ChatError::missing_api_key(provider))?;
        let mut config = ChatConfig::new(provider, api_key);
        config.model = self.models.get(&provider).cloned();
        Ok(config)
    }

    // Failed exchanges stay visible but are not replayed upstream.
    fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .filter(|message| !message.is_error)
            .map(ChatMessage::to_turn)
            .collect()
    }
}

/// 负责组装 Dispatcher 的 Builder
pub struct DispatcherBuilder {
    adapter: DynAdapter,
    credentials: DynCredentialStore,
    active: Provider,
    models: HashMap<Provider, String>,
}

impl DispatcherBuilder {
    /// 初始激活的 Provider
    pub fn active_provider(mut self, provider: Provider) -> Self {
        self.active = provider;
        self
    }

    /// 覆盖某个 Provider 的模型
    pub fn model<S: Into<String>>(mut self, provider: Provider, model: S) -> Self {
        self.models.insert(provider, model.into());
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            adapter: self.adapter,
            credentials: self.credentials,
            active: self.active,
            models: self.models,
            messages: Vec::new(),
        }
    }
}
