use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::{DynCredentialStore, FallbackCredentialStore, FileCredentialStore};
use crate::dispatcher::Dispatcher;
use crate::http::DynHttpTransport;
use crate::http::reqwest::default_dyn_transport;
use crate::provider::graphql::GraphqlAdapter;
use crate::provider::rest::RestAdapter;
use crate::provider::{AdapterKind, DynAdapter};
use crate::types::Provider;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEVELOPMENT_GATEWAY: &str = "http://localhost:8787/graphql";

/// 配置加载或校验失败
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// GraphQL 网关所在环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayEnvironment {
    /// 本地开发网关 `http://localhost:8787/graphql`
    #[default]
    Development,
    /// 生产网关 需显式配置 `graphql_endpoint`
    Production,
}

/// 客户端配置 描述调用路径 端点与默认模型
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub adapter: AdapterKind,
    pub active_provider: Provider,
    pub environment: GatewayEnvironment,
    /// 覆盖网关地址 生产环境必填
    pub graphql_endpoint: Option<String>,
    /// 各厂商 REST base_url 覆盖
    pub base_urls: HashMap<Provider, String>,
    /// 各厂商模型覆盖
    pub models: HashMap<Provider, String>,
    pub timeout_secs: u64,
    /// 凭证文件路径 留空时使用平台数据目录
    pub credentials_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterKind::Rest,
            active_provider: Provider::DeepSeek,
            environment: GatewayEnvironment::Development,
            graphql_endpoint: None,
            base_urls: HashMap::new(),
            models: HashMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            credentials_path: None,
        }
    }
}

impl ClientConfig {
    /// 从 JSON 文件读取配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 从 `CHATRELAY_*` 环境变量读取配置
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 以任意查找函数读取配置 未设置的项保持默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = read("CHATRELAY_ADAPTER") {
            config.adapter = match value.trim().to_ascii_lowercase().as_str() {
                "rest" => AdapterKind::Rest,
                "graphql" => AdapterKind::Graphql,
                other => {
                    return Err(ConfigError::invalid(
                        "CHATRELAY_ADAPTER",
                        format!("unknown adapter `{other}`"),
                    ));
                }
            };
        }
        if let Some(value) = read("CHATRELAY_PROVIDER") {
            config.active_provider = Provider::parse(&value).ok_or_else(|| {
                ConfigError::invalid("CHATRELAY_PROVIDER", format!("unknown provider `{value}`"))
            })?;
        }
        if let Some(value) = read("CHATRELAY_ENV") {
            config.environment = match value.trim().to_ascii_lowercase().as_str() {
                "development" | "dev" => GatewayEnvironment::Development,
                "production" | "prod" => GatewayEnvironment::Production,
                other => {
                    return Err(ConfigError::invalid(
                        "CHATRELAY_ENV",
                        format!("unknown environment `{other}`"),
                    ));
                }
            };
        }
        config.graphql_endpoint = read("CHATRELAY_GRAPHQL_ENDPOINT");
        if let Some(value) = read("CHATRELAY_TIMEOUT_SECS") {
            config.timeout_secs = value.trim().parse().map_err(|err| {
                ConfigError::invalid("CHATRELAY_TIMEOUT_SECS", format!("{err}"))
            })?;
        }
        for provider in Provider::ALL {
            let prefix = provider.as_str().to_ascii_uppercase();
            if let Some(model) = read(&format!("CHATRELAY_{prefix}_MODEL")) {
                config.models.insert(provider, model);
            }
            if let Some(base_url) = read(&format!("CHATRELAY_{prefix}_BASE_URL")) {
                config.base_urls.insert(provider, base_url);
            }
        }
        config.credentials_path = read("CHATRELAY_CREDENTIALS_PATH").map(PathBuf::from);

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 解析网关地址 显式配置优先
    pub fn resolve_graphql_endpoint(&self) -> Result<String, ConfigError> {
        if let Some(endpoint) = self
            .graphql_endpoint
            .as_deref()
            .filter(|endpoint| !endpoint.trim().is_empty())
        {
            return Ok(endpoint.to_string());
        }
        match self.environment {
            GatewayEnvironment::Development => Ok(DEVELOPMENT_GATEWAY.to_string()),
            GatewayEnvironment::Production => Err(ConfigError::invalid(
                "graphql_endpoint",
                "required when environment is production",
            )),
        }
    }
}

/// 根据配置构建 Adapter
pub fn build_adapter(
    config: &ClientConfig,
    transport: DynHttpTransport,
) -> Result<DynAdapter, ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::invalid("timeout_secs", "must be greater than zero"));
    }

    let adapter: DynAdapter = match config.adapter {
        AdapterKind::Rest => {
            let mut adapter = RestAdapter::new(transport).with_timeout(config.timeout());
            for (provider, base_url) in &config.base_urls {
                adapter = adapter.with_base_url(*provider, base_url.clone());
            }
            Arc::new(adapter)
        }
        AdapterKind::Graphql => {
            let endpoint = config.resolve_graphql_endpoint()?;
            Arc::new(GraphqlAdapter::new(transport, endpoint).with_timeout(config.timeout()))
        }
    };

    Ok(adapter)
}

/// 根据配置 Transport 与凭证仓库构建 Dispatcher
pub fn build_dispatcher(
    config: &ClientConfig,
    transport: DynHttpTransport,
    credentials: DynCredentialStore,
) -> Result<Dispatcher, ConfigError> {
    let adapter = build_adapter(config, transport)?;
    let mut builder =
        Dispatcher::builder(adapter, credentials).active_provider(config.active_provider);
    for (provider, model) in &config.models {
        builder = builder.model(*provider, model.clone());
    }
    Ok(builder.build())
}

/// 使用 reqwest Transport 与文件凭证仓库构建 Dispatcher
///
/// Keys missing from the credential file are read from `OPENAI_API_KEY` and
/// `DEEPSEEK_API_KEY` at startup; those are kept in memory only.
pub fn build_default_dispatcher(config: &ClientConfig) -> Result<Dispatcher, ConfigError> {
    let path = config
        .credentials_path
        .clone()
        .or_else(FileCredentialStore::default_path)
        .ok_or_else(|| ConfigError::invalid("credentials_path", "no data directory available"))?;
    let store = FallbackCredentialStore::with_env(Arc::new(FileCredentialStore::open(path)));

    let transport = default_dyn_transport(config.timeout())
        .map_err(|err| ConfigError::invalid("transport", err.to_string()))?;
    build_dispatcher(config, transport, Arc::new(store))
}
