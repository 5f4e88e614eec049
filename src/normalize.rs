//! Collapses the REST and GraphQL reply shapes into one [`ChatResult`].
//!
//! REST reports failures through the HTTP status and an optional
//! `{"error":{"message"}}` body. The gateway puts failures in a top-level
//! `errors` array (on 200 or 4xx) or in the `error` field of the mutation result. Both
//! end up as [`ChatError::Transport`] or [`ChatError::Provider`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChatError;
use crate::http::HttpResponse;
use crate::types::{ChatReply, ChatResult};

const MAX_BODY_SNIPPET: usize = 512;

/// UI-facing rendering of a [`ChatResult`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ChatResult> for ReplyPayload {
    fn from(result: &ChatResult) -> Self {
        match result {
            Ok(reply) => ReplyPayload {
                content: reply.content.clone(),
                error: None,
            },
            Err(err) => ReplyPayload {
                content: String::new(),
                error: Some(err.display_message()),
            },
        }
    }
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<CompletionMessage>,
    #[serde(default)]
    delta: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Maps a chat-completions HTTP response to a reply.
pub(crate) fn rest_reply(response: HttpResponse, adapter: &'static str) -> ChatResult {
    let status = response.status;
    let success = response.is_success();
    let text = response.into_string()?;
    if !success {
        return Err(rest_error(status, &text, adapter));
    }

    let body: CompletionBody = serde_json::from_str(&text).map_err(|err| {
        ChatError::provider(adapter, format!("failed to parse completion response: {err}"))
    })?;
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .map(|message| ChatReply::new(message.content.unwrap_or_default()))
        .ok_or_else(|| ChatError::provider(adapter, "response contained no choices"))
}

/// Text carried by one streamed completion chunk, if any.
pub(crate) fn rest_stream_delta(
    data: &str,
    adapter: &'static str,
) -> Result<Option<String>, ChatError> {
    let chunk: CompletionBody = serde_json::from_str(data).map_err(|err| {
        ChatError::provider(adapter, format!("failed to parse stream chunk: {err}"))
    })?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|text| !text.is_empty()))
}

/// Maps a non-2xx completions body.
///
/// A vendor error object becomes [`ChatError::Provider`]; anything else is a
/// transport-level HTTP failure.
pub(crate) fn rest_error(status: u16, body: &str, adapter: &'static str) -> ChatError {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<InnerError>,
    }
    #[derive(Deserialize)]
    struct InnerError {
        message: Option<String>,
        code: Option<Value>,
    }

    if let Ok(ErrorBody { error: Some(error) }) = serde_json::from_str::<ErrorBody>(body) {
        let mut message = error
            .message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| format!("request failed with status {status}"));
        if let Some(code) = error.code.filter(|code| !code.is_null()) {
            message = format!("{message} ({code})");
        }
        return ChatError::provider(adapter, message);
    }
    ChatError::transport(format!("status {status}: {}", snippet(body)))
}

/// Standard GraphQL response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct GraphqlEnvelope<T> {
    pub(crate) data: Option<T>,
    #[serde(default)]
    pub(crate) errors: Vec<GraphqlErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphqlErrorEntry {
    #[serde(default)]
    pub(crate) message: String,
}

/// Result object of the `sendMessage` mutation.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GatewayReply {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

/// Unwraps the `data` member of a gateway response.
///
/// Apollo-style gateways answer validation failures with a 4xx status and an
/// `errors` array; those still surface as [`ChatError::Provider`].
pub(crate) fn graphql_data<T: DeserializeOwned>(
    response: HttpResponse,
    adapter: &'static str,
) -> Result<T, ChatError> {
    let status = response.status;
    let success = response.is_success();
    let text = response.into_string()?;
    if !success {
        return Err(match serde_json::from_str::<GraphqlEnvelope<Value>>(&text) {
            Ok(envelope) if !envelope.errors.is_empty() => {
                graphql_errors(&envelope.errors, adapter)
            }
            _ => ChatError::transport(format!("status {status}: {}", snippet(&text))),
        });
    }

    let envelope: GraphqlEnvelope<T> = serde_json::from_str(&text).map_err(|err| {
        ChatError::provider(adapter, format!("failed to parse gateway response: {err}"))
    })?;
    if !envelope.errors.is_empty() {
        return Err(graphql_errors(&envelope.errors, adapter));
    }
    envelope
        .data
        .ok_or_else(|| ChatError::provider(adapter, "gateway response contained no data"))
}

fn graphql_errors(errors: &[GraphqlErrorEntry], adapter: &'static str) -> ChatError {
    let message = errors
        .iter()
        .map(|entry| entry.message.as_str())
        .filter(|message| !message.is_empty())
        .collect::<Vec<_>>()
        .join("; ");
    if message.is_empty() {
        ChatError::provider(adapter, "gateway reported an error")
    } else {
        ChatError::provider(adapter, message)
    }
}

/// Maps the mutation result, honouring its `error` field.
pub(crate) fn gateway_reply(reply: GatewayReply, adapter: &'static str) -> ChatResult {
    if let Some(error) = reply.error.filter(|error| !error.is_empty()) {
        return Err(ChatError::provider(adapter, error));
    }
    Ok(ChatReply {
        content: reply.content.unwrap_or_default(),
        model: reply.model,
        id: reply.id,
    })
}

fn snippet(body: &str) -> &str {
    if body.len() <= MAX_BODY_SNIPPET {
        return body;
    }
    let mut end = MAX_BODY_SNIPPET;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
