use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ChatError;
use crate::http::{DynHttpTransport, post_json_with_headers};
use crate::normalize::{GatewayReply, gateway_reply, graphql_data};
use crate::provider::ChatAdapter;
use crate::types::{ChatConfig, ChatRequest, ChatResult, HistoryTurn, Provider};

use super::queries::{HEALTH_QUERY, SEND_MESSAGE_MUTATION, SUPPORTED_MODELS_QUERY};

const ADAPTER_NAME: &str = "graphql";

/// 经由 GraphQL 网关转发的 Adapter 网关负责真正调用厂商接口
pub struct GraphqlAdapter {
    pub(crate) transport: DynHttpTransport,
    pub(crate) endpoint: String,
    pub(crate) timeout: Option<Duration>,
}

#[derive(Serialize)]
struct GraphqlPayload<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Serialize)]
struct SendMessageVariables<'a> {
    input: &'a ChatRequest,
}

#[derive(Serialize)]
struct SupportedModelsVariables {
    provider: Provider,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageData {
    send_message: Option<GatewayReply>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupportedModelsData {
    #[serde(default)]
    supported_models: Vec<String>,
}

#[derive(Deserialize)]
struct HealthData {
    health: String,
}

impl GraphqlAdapter {
    pub fn new(transport: DynHttpTransport, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_headers(&self) -> HashMap<String, String> {
        HashMap::from([("apollo-require-preflight".to_string(), "true".to_string())])
    }

    async fn execute<V, T>(
        &self,
        operation: &'static str,
        query: &str,
        variables: V,
    ) -> Result<T, ChatError>
    where
        V: Serialize + Send + Sync,
        T: DeserializeOwned,
    {
        debug!(operation, endpoint = %self.endpoint, "executing gateway operation");
        let response = post_json_with_headers(
            self.transport.as_ref(),
            self.endpoint.as_str(),
            self.build_headers(),
            &GraphqlPayload { query, variables },
            self.timeout,
        )
        .await?;
        debug!(operation, status = response.status, "gateway answered");
        graphql_data(response, ADAPTER_NAME)
    }
}

#[async_trait]
impl ChatAdapter for GraphqlAdapter {
    async fn send_chat(
        &self,
        message: &str,
        config: &ChatConfig,
        history: &[HistoryTurn],
    ) -> ChatResult {
        config.ensure_api_key()?;
        let input = ChatRequest::new(message, config, history);
        debug!(
            provider = %config.provider,
            model = ?input.model,
            history = history.len(),
            "forwarding message to gateway"
        );
        let data: SendMessageData = self
            .execute(
                "sendMessage",
                SEND_MESSAGE_MUTATION,
                SendMessageVariables { input: &input },
            )
            .await?;
        let reply = data.send_message.ok_or_else(|| {
            ChatError::provider(ADAPTER_NAME, "gateway returned no sendMessage result")
        })?;
        gateway_reply(reply, ADAPTER_NAME)
    }

    async fn supported_models(&self, provider: Provider) -> Result<Vec<String>, ChatError> {
        let data: SupportedModelsData = self
            .execute(
                "supportedModels",
                SUPPORTED_MODELS_QUERY,
                SupportedModelsVariables { provider },
            )
            .await?;
        Ok(data.supported_models)
    }

    async fn health(&self) -> Result<String, ChatError> {
        let data: HealthData = self
            .execute("health", HEALTH_QUERY, Map::<String, Value>::new())
            .await?;
        Ok(data.health)
    }

    fn name(&self) -> &'static str {
        ADAPTER_NAME
    }
}
