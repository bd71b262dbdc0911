//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.nlsql-bot/config.json`) and then
//! overridden from the environment, using the variable names the bot has always read
//! (`BOT_PORT`, `NLAPIURL`, `DEBUG`, `MicrosoftAppId`, ...).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::analysis::DEFAULT_ANALYSIS_URL;
use crate::channels::{AppCredentials, DEFAULT_TRUSTED_SERVICE_HOSTS};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Analysis service endpoint.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Bot Framework app registration. Leave empty for the emulator.
    #[serde(default)]
    pub bot_framework: BotFrameworkConfig,

    /// Verbose tracing of intermediate values (answers, rendered messages).
    #[serde(default)]
    pub debug: bool,
}

/// Server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the messaging endpoint (default 3978).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_port() -> u16 {
    3978
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Full URL of the analyzer endpoint. Overridden by NLAPIURL / nlapiurl env.
    pub url: Option<String>,
}

/// Bot Framework app credentials. Each credential field is overridden by the matching Microsoft* env var.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotFrameworkConfig {
    pub app_id: Option<String>,
    pub app_password: Option<String>,
    /// "MultiTenant", "SingleTenant" or "UserAssignedMSI". Informational; single tenant needs tenantId.
    pub app_type: Option<String>,
    pub tenant_id: Option<String>,
    /// Service URL hosts (and subdomains) allowed to receive replies when credentials are set.
    #[serde(default = "default_trusted_service_hosts")]
    pub trusted_service_hosts: Vec<String>,
}

fn default_trusted_service_hosts() -> Vec<String> {
    DEFAULT_TRUSTED_SERVICE_HOSTS
        .iter()
        .map(|h| h.to_string())
        .collect()
}

impl Default for BotFrameworkConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_password: None,
            app_type: None,
            tenant_id: None,
            trusted_service_hosts: default_trusted_service_hosts(),
        }
    }
}

impl BotFrameworkConfig {
    /// Credentials for connector tokens; None unless both app id and password are set.
    pub fn credentials(&self) -> Option<AppCredentials> {
        let app_id = non_empty(self.app_id.as_deref())?;
        let app_password = non_empty(self.app_password.as_deref())?;
        Some(AppCredentials {
            app_id,
            app_password,
            tenant_id: non_empty(self.tenant_id.as_deref()),
        })
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(String::from)
}

/// First non-empty value among `names`, looked up with `lookup`.
fn first_env(lookup: &dyn Fn(&str) -> Option<String>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| non_empty(lookup(n).as_deref()))
}

/// Apply environment overrides using a custom lookup (tests pass a map).
pub fn apply_env_with(config: &mut Config, lookup: &dyn Fn(&str) -> Option<String>) {
    if let Some(port) = first_env(lookup, &["BOT_PORT", "bot_port"]) {
        match port.parse() {
            Ok(p) => config.server.port = p,
            Err(_) => log::warn!("ignoring invalid BOT_PORT: {}", port),
        }
    }
    if let Some(url) = first_env(lookup, &["NLAPIURL", "nlapiurl"]) {
        config.analysis.url = Some(url);
    }
    if let Some(debug) = first_env(lookup, &["DEBUG"]) {
        config.debug = debug.eq_ignore_ascii_case("true");
    }
    let bf = &mut config.bot_framework;
    for (name, slot) in [
        ("MicrosoftAppId", &mut bf.app_id),
        ("MicrosoftAppPassword", &mut bf.app_password),
        ("MicrosoftAppType", &mut bf.app_type),
        ("MicrosoftAppTenantId", &mut bf.tenant_id),
    ] {
        if let Some(v) = first_env(lookup, &[name]) {
            *slot = Some(v);
        }
    }
}

/// Apply overrides from the process environment.
pub fn apply_env(config: &mut Config) {
    apply_env_with(config, &|name| std::env::var(name).ok());
}

/// Analyzer URL from config, or the local default.
pub fn resolve_analysis_url(config: &Config) -> String {
    non_empty(config.analysis.url.as_deref()).unwrap_or_else(|| DEFAULT_ANALYSIS_URL.to_string())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("NLSQL_BOT_CONFIG").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".nlsql-bot").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or the default), then apply env overrides. Missing file => defaults.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env(&mut config);
    Ok((config, path))
}
