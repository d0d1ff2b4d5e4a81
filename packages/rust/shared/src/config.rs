//! Application configuration for Briefdesk.
//!
//! User config lives at `~/.briefdesk/briefdesk.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file — only the names of the environment
//! variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BriefdeskError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "briefdesk.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".briefdesk";

// ---------------------------------------------------------------------------
// Config structs (matching briefdesk.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Retrieval provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Generative provider settings.
    #[serde(default)]
    pub generative: GenerativeConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding the edition database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Actor recorded in the audit log for system-initiated writes.
    #[serde(default = "default_actor")]
    pub system_actor: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            system_actor: default_actor(),
        }
    }
}

fn default_data_dir() -> String {
    "~/briefdesk-data".into()
}
fn default_actor() -> String {
    "system".into()
}

/// `[providers]` section — env var *names* for retrieval credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Env var holding the newswire research API key.
    #[serde(default = "default_newswire_env")]
    pub newswire_api_key_env: String,

    /// Env var holding the news search API key.
    #[serde(default = "default_search_env")]
    pub search_api_key_env: String,

    /// Env var holding the economic data API key.
    #[serde(default = "default_econdata_env")]
    pub econdata_api_key_env: String,

    /// User-Agent contact string sent to the filings search endpoint.
    #[serde(default = "default_filings_contact")]
    pub filings_contact: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            newswire_api_key_env: default_newswire_env(),
            search_api_key_env: default_search_env(),
            econdata_api_key_env: default_econdata_env(),
            filings_contact: default_filings_contact(),
        }
    }
}

fn default_newswire_env() -> String {
    "BRIEFDESK_NEWSWIRE_API_KEY".into()
}
fn default_search_env() -> String {
    "BRIEFDESK_SEARCH_API_KEY".into()
}
fn default_econdata_env() -> String {
    "BRIEFDESK_ECONDATA_API_KEY".into()
}
fn default_filings_contact() -> String {
    "Briefdesk/0.1 (ops@briefdesk.example)".into()
}

/// `[generative]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerativeConfig {
    /// Env var holding the generative provider API key.
    #[serde(default = "default_generative_env")]
    pub api_key_env: String,

    /// Base URL of the generative API.
    #[serde(default = "default_generative_base")]
    pub api_base_url: String,

    /// Model identifier used for drafting and compliance review.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for section drafting.
    #[serde(default = "default_drafting_temperature")]
    pub drafting_temperature: f32,

    /// Sampling temperature for the holistic compliance pass (kept low).
    #[serde(default = "default_compliance_temperature")]
    pub compliance_temperature: f32,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_generative_env(),
            api_base_url: default_generative_base(),
            model: default_model(),
            drafting_temperature: default_drafting_temperature(),
            compliance_temperature: default_compliance_temperature(),
        }
    }
}

fn default_generative_env() -> String {
    "BRIEFDESK_GENERATIVE_API_KEY".into()
}
fn default_generative_base() -> String {
    "https://api.generative.example".into()
}
fn default_model() -> String {
    "sonnet-mini-4".into()
}
fn default_drafting_temperature() -> f32 {
    0.7
}
fn default_compliance_temperature() -> f32 {
    0.3
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.briefdesk/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BriefdeskError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.briefdesk/briefdesk.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BriefdeskError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BriefdeskError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BriefdeskError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BriefdeskError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BriefdeskError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

impl AppConfig {
    /// Read a credential from the environment by its configured variable name.
    /// Returns `None` when unset or empty — callers decide whether that means
    /// "skip this provider" or a hard error.
    pub fn credential(&self, var_name: &str) -> Option<String> {
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Some(val),
            _ => None,
        }
    }

    /// Resolve the database path under the configured data directory,
    /// expanding a leading `~`.
    pub fn db_path(&self) -> Result<PathBuf> {
        let raw = &self.defaults.data_dir;
        let dir = if let Some(rest) = raw.strip_prefix("~/") {
            dirs::home_dir()
                .ok_or_else(|| BriefdeskError::config("could not determine home directory"))?
                .join(rest)
        } else {
            PathBuf::from(raw)
        };
        Ok(dir.join("briefdesk.db"))
    }
}
