use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::types::Provider;

const KEY_NAMESPACE: &str = "chatrelay.api_key";

/// Per-provider API key storage.
///
/// Writes are best-effort: a failed write is logged and otherwise ignored, and a
/// missing key is an ordinary state rather than an error.
pub trait CredentialStore: Send + Sync {
    /// Stored key for the provider; blank values read as `None`.
    fn get(&self, provider: Provider) -> Option<String>;

    /// Stores the key, replacing any previous value.
    fn set(&self, provider: Provider, key: &str);
}

/// 线程安全 CredentialStore
pub type DynCredentialStore = Arc<dyn CredentialStore>;

/// Namespaced storage key for a provider, e.g. `chatrelay.api_key.openai`.
pub fn storage_key(provider: Provider) -> String {
    format!("{KEY_NAMESPACE}.{}", provider.as_str())
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.filter(|key| !key.trim().is_empty()).cloned()
}

/// Keys held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<Provider, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with the given keys.
    pub fn with_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = (Provider, K)>,
        K: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(|(provider, key)| (provider, key.into()))
            .collect();
        Self {
            keys: RwLock::new(keys),
        }
    }

    /// Captures every provider's key that `lookup` yields for [`env_key_name`].
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::with_keys(Provider::ALL.into_iter().filter_map(|provider| {
            lookup(env_key_name(provider))
                .filter(|key| !key.trim().is_empty())
                .map(|key| (provider, key))
        }))
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, provider: Provider) -> Option<String> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        non_blank(keys.get(&provider))
    }

    fn set(&self, provider: Provider, key: &str) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        keys.insert(provider, key.to_string());
    }
}

/// Keys persisted as a flat JSON object of namespaced entries.
///
/// The file is read once when the store is opened and rewritten in full on every
/// `set`, so the last write wins.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    /// Opens the store at `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// `<data_dir>/chatrelay/credentials.json`, when the platform has a data dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("chatrelay").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "credential file not readable");
                return BTreeMap::new();
            }
        };
        serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "ignoring corrupt credential file");
            BTreeMap::new()
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, payload)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, provider: Provider) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        non_blank(entries.get(&storage_key(provider)))
    }

    fn set(&self, provider: Provider, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(storage_key(provider), key.to_string());
        if let Err(err) = self.persist(&entries) {
            warn!(
                path = %self.path.display(),
                provider = %provider,
                error = %err,
                "failed to persist API key"
            );
        }
    }
}

/// Environment variable holding a provider's key.
pub fn env_key_name(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "OPENAI_API_KEY",
        Provider::DeepSeek => "DEEPSEEK_API_KEY",
    }
}

/// Reads `primary` first and falls back to in-memory keys, usually captured
/// from the environment.
///
/// Writes only reach `primary`, so fallback keys are never persisted.
pub struct FallbackCredentialStore {
    primary: DynCredentialStore,
    fallback: MemoryCredentialStore,
}

impl FallbackCredentialStore {
    pub fn new(primary: DynCredentialStore, fallback: MemoryCredentialStore) -> Self {
        Self { primary, fallback }
    }

    /// Falls back to `OPENAI_API_KEY` / `DEEPSEEK_API_KEY` from the process environment.
    pub fn with_env(primary: DynCredentialStore) -> Self {
        Self::new(
            primary,
            MemoryCredentialStore::from_lookup(|name| std::env::var(name).ok()),
        )
    }
}

impl CredentialStore for FallbackCredentialStore {
    fn get(&self, provider: Provider) -> Option<String> {
        self.primary
            .get(provider)
            .or_else(|| self.fallback.get(provider))
    }

    fn set(&self, provider: Provider, key: &str) {
        self.primary.set(provider, key);
    }
}
