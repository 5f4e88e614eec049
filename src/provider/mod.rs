use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::stream;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::types::{ChatConfig, ChatResult, HistoryTurn, Provider};

pub mod graphql;
pub mod rest;

/// 流式文本增量
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// 统一的 Adapter Trait 两条调用路径都实现该接口
///
/// Each `send_chat` performs exactly one network round trip and never retries.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// 提交消息并等待完整回复
    async fn send_chat(
        &self,
        message: &str,
        config: &ChatConfig,
        history: &[HistoryTurn],
    ) -> ChatResult;

    /// 以流式方式返回文本增量 默认退化为单块回复
    async fn stream_chat(
        &self,
        message: &str,
        config: &ChatConfig,
        history: &[HistoryTurn],
    ) -> Result<ChatStream, ChatError> {
        let reply = self.send_chat(message, config, history).await?;
        Ok(Box::pin(stream::once(async move { Ok(reply.content) })))
    }

    /// 可选模型列表
    async fn supported_models(&self, provider: Provider) -> Result<Vec<String>, ChatError> {
        Ok(provider
            .builtin_models()
            .iter()
            .map(|model| model.to_string())
            .collect())
    }

    /// 健康检查
    async fn health(&self) -> Result<String, ChatError> {
        Ok("ok".to_string())
    }

    /// Adapter 名称
    fn name(&self) -> &'static str;
}

/// 线程安全 Adapter
pub type DynAdapter = Arc<dyn ChatAdapter>;

/// 调用路径类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterKind {
    /// 直接调用厂商 REST 接口
    #[default]
    Rest,
    /// 经由 GraphQL 网关转发
    Graphql,
}
