use serde::Serialize;

use crate::types::{ChatConfig, Role};

pub(crate) const DEFAULT_MAX_TOKENS: u32 = 1000;
pub(crate) const DEFAULT_TEMPERATURE: f64 = 0.7;

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) messages: Vec<CompletionMessage<'a>>,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub(crate) stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CompletionMessage<'a> {
    pub(crate) role: &'static str,
    pub(crate) content: &'a str,
}

/// Single-turn completion body; earlier turns are not replayed on this path.
pub(crate) fn build_completion_body<'a>(
    message: &'a str,
    config: &'a ChatConfig,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
) -> CompletionRequest<'a> {
    CompletionRequest {
        model: config.resolved_model(),
        messages: vec![CompletionMessage {
            role: Role::User.as_str(),
            content: message,
        }],
        max_tokens,
        temperature,
        stream,
    }
}
