//! 聊天客户端的 Provider 调度层 统一 REST 与 GraphQL 网关两条调用路径

pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod normalize;
pub mod provider;
pub mod stream;
pub mod types;

pub use config::{ClientConfig, ConfigError, GatewayEnvironment};
pub use credentials::{
    CredentialStore, FallbackCredentialStore, FileCredentialStore, MemoryCredentialStore,
};
pub use dispatcher::Dispatcher;
pub use error::ChatError;
pub use normalize::ReplyPayload;
pub use provider::{AdapterKind, ChatAdapter, ChatStream};
pub use types::*;
