use crate::error::{HealthchatError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthchatConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Where the proxy forwards requests to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_host")]
    pub host: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: default_web_port(),
            host: default_web_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the local proxy route. All API calls go through it.
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Re-issue invalidated queries right after a successful mutation.
    #[serde(default = "default_true")]
    pub refetch_on_invalidate: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            default_model: default_model(),
            refetch_on_invalidate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Custom path for the persisted session file. Defaults to `~/.config/healthchat/session.json`.
    #[serde(default)]
    pub path: Option<String>,
}

/// Chat models offered by the upstream service.
pub const VALID_MODELS: &[&str] = &["Chartwright", "TranscriptX", "Redactify", "Validify"];

// -- Defaults --

fn default_upstream_base_url() -> String {
    "https://lbserver.clintechso.com/api/".to_string()
}
fn default_web_port() -> u16 {
    3000
}
fn default_web_host() -> String {
    "127.0.0.1".to_string()
}
fn default_proxy_url() -> String {
    "http://127.0.0.1:3000/api/proxy/".to_string()
}
fn default_model() -> String {
    "Chartwright".to_string()
}
fn default_true() -> bool {
    true
}

impl HealthchatConfig {
    /// Load configuration with three-layer TOML merge plus environment overrides:
    /// 1. ~/.config/healthchat/config.toml (global)
    /// 2. .healthchat/config.toml (project)
    /// 3. .healthchat/config.local.toml (local, gitignored)
    /// 4. `HEALTHCHAT__SECTION__KEY` environment variables
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Layer 1: Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                builder = builder.add_source(File::from(global_path).required(false));
            }
        }

        // Layer 2: Project config
        if let Some(dir) = project_dir {
            let project_config = dir.join(".healthchat").join("config.toml");
            if project_config.exists() {
                builder = builder.add_source(File::from(project_config).required(false));
            }

            // Layer 3: Local config (gitignored)
            let local_config = dir.join(".healthchat").join("config.local.toml");
            if local_config.exists() {
                builder = builder.add_source(File::from(local_config).required(false));
            }
        }

        // Layer 4: Environment
        builder = builder.add_source(
            Environment::with_prefix("HEALTHCHAT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| HealthchatError::Config(e.to_string()))?;

        let mut cfg: Self = config
            .try_deserialize()
            .map_err(|e| HealthchatError::Config(e.to_string()))?;

        cfg.validate();
        Ok(cfg)
    }

    /// Load with defaults only (no files).
    pub fn default_config() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            web: WebConfig::default(),
            client: ClientConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Validate config values, repairing bad ones and logging warnings.
    /// Lenient: the config is fixed up rather than rejected.
    pub fn validate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();

        let url_checks: Vec<(&str, &mut String, fn() -> String)> = vec![
            (
                "upstream.base_url",
                &mut self.upstream.base_url,
                default_upstream_base_url,
            ),
            ("client.proxy_url", &mut self.client.proxy_url, default_proxy_url),
        ];
        for (name, val, fallback) in url_checks {
            match reqwest::Url::parse(val) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
                    // Paths are joined onto the base, so it must end in a slash.
                    if !val.ends_with('/') {
                        warnings.push(format!("{name} = {val} has no trailing '/', appending"));
                        val.push('/');
                    }
                }
                _ => {
                    let fallback = fallback();
                    warnings.push(format!(
                        "{name} = '{val}' is not a valid http(s) URL, using {fallback}"
                    ));
                    *val = fallback;
                }
            }
        }

        if !VALID_MODELS.contains(&self.client.default_model.as_str()) {
            warnings.push(format!(
                "unknown chat model '{}', valid: {}; using {}",
                self.client.default_model,
                VALID_MODELS.join(", "),
                default_model()
            ));
            self.client.default_model = default_model();
        }

        if self.web.port == 0 {
            warnings.push(format!("web.port = 0, setting to {}", default_web_port()));
            self.web.port = default_web_port();
        }

        for w in &warnings {
            tracing::warn!("config: {}", w);
        }

        warnings
    }

    /// Resolve the session file path: `storage.path` or `~/.config/healthchat/session.json`.
    pub fn session_path(&self) -> Option<PathBuf> {
        match self.storage.path {
            Some(ref p) if !p.is_empty() => Some(PathBuf::from(p)),
            _ => dirs::config_dir().map(|p| p.join("healthchat").join("session.json")),
        }
    }

    /// Write this config as `.healthchat/config.toml` under `dir`.
    pub fn write_project_config(&self, dir: &Path) -> Result<PathBuf> {
        let config_dir = dir.join(".healthchat");
        std::fs::create_dir_all(&config_dir)
            .map_err(|e| HealthchatError::Config(format!("failed to create config dir: {e}")))?;
        let path = config_dir.join("config.toml");
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| HealthchatError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(&path, toml_str)
            .map_err(|e| HealthchatError::Config(format!("failed to write config: {e}")))?;
        Ok(path)
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("healthchat").join("config.toml"))
}
