//! Configuration loading for bencao.
//! Reads bencao.toml from the current directory or the path in BENCAO_CONFIG.
//! Storage credentials come from the environment only.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use bencao_common::EntityKind;
use bencao_db::RestConfig;
use bencao_ingestion::{BatchOptions, RetryPolicy, DEFAULT_REPORT_FILE};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

pub const CONFIG_ENV: &str = "BENCAO_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "bencao.toml";

pub const URL_ENV: &str = "SUPABASE_URL";
/// Checked in order; the service-role key wins when both are set.
pub const KEY_ENVS: [&str; 2] = ["SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_ANON_KEY"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Project URL. `SUPABASE_URL` takes precedence.
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { url: None, timeout_secs: default_timeout_secs() }
    }
}

fn default_timeout_secs() -> u64 { 30 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/import_report.txt`.
    pub report_path: Option<PathBuf>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default)]
    pub batches: BTreeMap<EntityKind, BatchConfig>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            report_path: None,
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            batches: BTreeMap::new(),
        }
    }
}

fn default_data_dir()            -> PathBuf { PathBuf::from("data") }
fn default_retry_attempts()      -> u32 { 3 }
fn default_retry_base_delay_ms() -> u64 { 200 }

/// Per-kind override; unset fields keep the kind's defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_size: Option<usize>,
    pub delay_ms: Option<u64>,
}

/// Resolved backend endpoint and key.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub url: Url,
    pub api_key: SecretString,
}

impl Config {
    /// Load configuration.
    /// Checks BENCAO_CONFIG first (the file must then exist), then
    /// ./bencao.toml, and falls back to defaults when neither is present.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Backend credentials from the process environment.
    pub fn credentials(&self) -> anyhow::Result<Credentials> {
        self.credentials_from(|name| std::env::var(name).ok())
    }

    /// Backend credentials using `env` for variable lookup. No built-in
    /// endpoint or key exists: both must be supplied.
    pub fn credentials_from(&self, env: impl Fn(&str) -> Option<String>) -> anyhow::Result<Credentials> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let raw_url = non_empty(env(URL_ENV))
            .or_else(|| non_empty(self.storage.url.clone()))
            .with_context(|| format!("storage URL not configured: set {URL_ENV} or [storage] url"))?;
        let url = Url::parse(&raw_url).with_context(|| format!("invalid storage URL {raw_url:?}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("storage URL must use http or https, got {:?}", url.scheme());
        }

        let key = KEY_ENVS
            .iter()
            .find_map(|name| non_empty(env(name)))
            .with_context(|| format!("storage key not configured: set {} or {}", KEY_ENVS[0], KEY_ENVS[1]))?;

        Ok(Credentials { url, api_key: SecretString::from(key) })
    }

    pub fn rest_config(&self) -> anyhow::Result<RestConfig> {
        let creds = self.credentials()?;
        Ok(RestConfig::new(creds.url, creds.api_key)
            .with_timeout(Duration::from_secs(self.storage.timeout_secs)))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.import.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.import.retry_base_delay_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn batch_options(&self, kind: EntityKind) -> BatchOptions {
        let mut opts = BatchOptions::for_kind(kind);
        if let Some(over) = self.import.batches.get(&kind) {
            if let Some(size) = over.batch_size {
                opts.batch_size = size.max(1);
            }
            if let Some(ms) = over.delay_ms {
                opts.delay = Duration::from_millis(ms);
            }
        }
        opts
    }

    pub fn report_path(&self) -> PathBuf {
        self.import
            .report_path
            .clone()
            .unwrap_or_else(|| self.import.data_dir.join(DEFAULT_REPORT_FILE))
    }
}

#[cfg(test)]
mod tests;
