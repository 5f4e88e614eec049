use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::error::ChatError;
use crate::http::{DynHttpTransport, post_json_stream_with_headers, post_json_with_headers};
use crate::normalize::{rest_error, rest_reply, rest_stream_delta};
use crate::provider::{ChatAdapter, ChatStream};
use crate::stream::{collect_body_text, sse_data};
use crate::types::{ChatConfig, ChatResult, HistoryTurn, Provider};

use super::request::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, build_completion_body};

const ADAPTER_NAME: &str = "rest";

/// 直接调用厂商 Chat Completions 接口的 Adapter
pub struct RestAdapter {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_urls: HashMap<Provider, String>,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f64,
    pub(crate) timeout: Option<Duration>,
}

impl RestAdapter {
    /// 使用各厂商默认 base_url 创建
    pub fn new(transport: DynHttpTransport) -> Self {
        Self {
            transport,
            base_urls: HashMap::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout: None,
        }
    }

    /// 覆盖某个厂商的 base_url
    pub fn with_base_url(mut self, provider: Provider, base_url: impl Into<String>) -> Self {
        self.base_urls.insert(provider, base_url.into());
        self
    }

    /// 单次请求超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub(crate) fn endpoint(&self, provider: Provider) -> String {
        let base = self
            .base_urls
            .get(&provider)
            .map(String::as_str)
            .unwrap_or_else(|| provider.default_base_url())
            .trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }

    fn build_headers(&self, config: &ChatConfig) -> HashMap<String, String> {
        HashMap::from([
            (
                "Authorization".to_string(),
                format!("Bearer {}", config.api_key),
            ),
            ("Accept".to_string(), "application/json".to_string()),
        ])
    }
}

#[async_trait]
impl ChatAdapter for RestAdapter {
    async fn send_chat(
        &self,
        message: &str,
        config: &ChatConfig,
        _history: &[HistoryTurn],
    ) -> ChatResult {
        config.ensure_api_key()?;
        let endpoint = self.endpoint(config.provider);
        let body = build_completion_body(message, config, self.max_tokens, self.temperature, false);
        debug!(
            provider = %config.provider,
            model = body.model,
            endpoint = %endpoint,
            "sending chat completion"
        );

        let response = post_json_with_headers(
            self.transport.as_ref(),
            endpoint,
            self.build_headers(config),
            &body,
            self.timeout,
        )
        .await?;
        debug!(status = response.status, "chat completion answered");
        rest_reply(response, ADAPTER_NAME)
    }

    async fn stream_chat(
        &self,
        message: &str,
        config: &ChatConfig,
        _history: &[HistoryTurn],
    ) -> Result<ChatStream, ChatError> {
        config.ensure_api_key()?;
        let endpoint = self.endpoint(config.provider);
        let body = build_completion_body(message, config, self.max_tokens, self.temperature, true);
        debug!(
            provider = %config.provider,
            model = body.model,
            endpoint = %endpoint,
            "opening chat completion stream"
        );

        let response = post_json_stream_with_headers(
            self.transport.as_ref(),
            endpoint,
            self.build_headers(config),
            &body,
            self.timeout,
        )
        .await?;
        if !(200..300).contains(&response.status) {
            let text = collect_body_text(response.body, ADAPTER_NAME).await?;
            return Err(rest_error(response.status, &text, ADAPTER_NAME));
        }

        let deltas = sse_data(response.body, ADAPTER_NAME).filter_map(|payload| async move {
            payload
                .and_then(|data| rest_stream_delta(&data, ADAPTER_NAME))
                .transpose()
        });
        Ok(Box::pin(deltas))
    }

    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::http::testing::ScriptedTransport;
    use crate::types::ChatReply;

    fn adapter(transport: Arc<ScriptedTransport>) -> RestAdapter {
        RestAdapter::new(transport)
    }

    #[test]
    fn endpoint_uses_provider_defaults_and_overrides() {
        let transport = Arc::new(ScriptedTransport::new());
        let rest =
            adapter(transport).with_base_url(Provider::DeepSeek, "http://localhost:9000/v1/");
        assert_eq!(
            rest.endpoint(Provider::OpenAi),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            rest.endpoint(Provider::DeepSeek),
            "http://localhost:9000/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn send_chat_posts_bearer_request_and_extracts_content() {
        let transport = Arc::new(ScriptedTransport::new().reply_json(
            200,
            json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]}),
        ));
        let rest = adapter(transport.clone());
        let config = ChatConfig::new(Provider::OpenAi, "sk-test").with_model("model-x");

        let result = rest.send_chat("hi", &config, &[]).await;
        assert_eq!(result, Ok(ChatReply::new("hello")));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].url,
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            requests[0].headers.get("Authorization"),
            Some(&"Bearer sk-test".to_string())
        );
        assert_eq!(
            requests[0].headers.get("Content-Type"),
            Some(&"application/json".to_string())
        );
        assert_eq!(
            transport.json_body(0),
            json!({
                "model": "model-x",
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 1000,
                "temperature": 0.7
            })
        );
    }

    #[tokio::test]
    async fn send_chat_ignores_history_on_rest_path() {
        let transport = Arc::new(ScriptedTransport::new().reply_json(
            200,
            json!({"choices": [{"message": {"content": "ok"}}]}),
        ));
        let rest = adapter(transport.clone());
        let config = ChatConfig::new(Provider::DeepSeek, "sk-test");
        let history = vec![HistoryTurn::new(crate::types::Role::User, "earlier")];

        rest.send_chat("now", &config, &history).await.expect("reply");
        let body = transport.json_body(0);
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["model"], "deepseek-chat");
    }

    #[tokio::test]
    async fn send_chat_wraps_transport_failures() {
        let transport = Arc::new(
            ScriptedTransport::new().reply(Err(ChatError::transport("connection refused"))),
        );
        let rest = adapter(transport);
        let config = ChatConfig::new(Provider::OpenAi, "sk-test");

        let err = rest.send_chat("hi", &config, &[]).await.unwrap_err();
        assert_eq!(err, ChatError::transport("connection refused"));
    }

    #[tokio::test]
    async fn send_chat_maps_vendor_error_body() {
        let transport = Arc::new(ScriptedTransport::new().reply_json(
            401,
            json!({"error": {"message": "Incorrect API key provided"}}),
        ));
        let rest = adapter(transport);
        let config = ChatConfig::new(Provider::OpenAi, "sk-wrong");

        let err = rest.send_chat("hi", &config, &[]).await.unwrap_err();
        assert_eq!(
            err,
            ChatError::provider("rest", "Incorrect API key provided")
        );
    }

    #[tokio::test]
    async fn send_chat_without_key_makes_no_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let rest = adapter(transport.clone());
        let config = ChatConfig::new(Provider::DeepSeek, "");

        let err = rest.send_chat("hi", &config, &[]).await.unwrap_err();
        assert!(err.is_config());
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn stream_chat_yields_text_deltas() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let transport = Arc::new(ScriptedTransport::new().reply_raw(200, sse));
        let rest = adapter(transport.clone());
        let config = ChatConfig::new(Provider::OpenAi, "sk-test");

        let chunks: Vec<_> = rest
            .stream_chat("hi", &config, &[])
            .await
            .expect("stream")
            .collect()
            .await;
        assert_eq!(chunks, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);
        assert_eq!(transport.json_body(0)["stream"], true);
    }

    #[tokio::test]
    async fn stream_chat_maps_error_status() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply_json(429, json!({"error": {"message": "slow down"}})),
        );
        let rest = adapter(transport);
        let config = ChatConfig::new(Provider::OpenAi, "sk-test");

        let err = match rest.stream_chat("hi", &config, &[]).await {
            Ok(_) => panic!("expected error status to fail"),
            Err(err) => err,
        };
        assert_eq!(err, ChatError::provider("rest", "slow down"));
    }
}
