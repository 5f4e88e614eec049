use thiserror::Error;

use crate::types::Provider;

/// Every failure a send can end in.
///
/// The three variants are the whole taxonomy exposed to callers: a missing local
/// setting that blocks the call before any I/O, a transport-level failure, or an
/// error message reported by the vendor (or the gateway in front of it). None of
/// them are retried by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// No credential (or another required local setting) for the provider.
    #[error("configuration error for {provider}: {message}")]
    Config {
        /// Provider the call was addressed to.
        provider: Provider,
        /// User-correctable explanation.
        message: String,
    },
    /// DNS, connection, timeout, or non-2xx failures.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Error message reported by the upstream provider or gateway.
    #[error("upstream error via {adapter}: {message}")]
    Provider {
        /// Name of the adapter that surfaced the error, such as `rest`.
        adapter: &'static str,
        /// Human-readable message returned upstream.
        message: String,
    },
}

impl ChatError {
    /// Creates a [`ChatError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::error::ChatError;
    ///
    /// let err = ChatError::transport("dns lookup failed");
    /// assert!(matches!(err, ChatError::Transport { .. }));
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a [`ChatError::Provider`] with the adapter name and upstream message.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::error::ChatError;
    ///
    /// let err = ChatError::provider("graphql", "rate limited");
    /// assert!(matches!(err, ChatError::Provider { adapter: "graphql", .. }));
    /// ```
    pub fn provider<T: Into<String>>(adapter: &'static str, message: T) -> Self {
        Self::Provider {
            adapter,
            message: message.into(),
        }
    }

    /// Creates a [`ChatError::Config`] for the given provider.
    pub fn config<T: Into<String>>(provider: Provider, message: T) -> Self {
        Self::Config {
            provider,
            message: message.into(),
        }
    }

    /// Reports a provider whose API key has not been configured.
    pub fn missing_api_key(provider: Provider) -> Self {
        Self::config(
            provider,
            format!(
                "no API key configured for {}; set one before sending",
                provider.display_name()
            ),
        )
    }

    /// Message suitable for rendering as a conversation entry.
    pub fn display_message(&self) -> String {
        match self {
            ChatError::Config { message, .. }
            | ChatError::Transport { message }
            | ChatError::Provider { message, .. } => message.clone(),
        }
    }

    /// `true` for failures detected locally, before any network I/O.
    pub fn is_config(&self) -> bool {
        matches!(self, ChatError::Config { .. })
    }
}
