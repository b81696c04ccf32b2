//! Application configuration for lazylist.
//!
//! User config lives at `~/.lazylist/lazylist.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LazyListError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lazylist.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lazylist";

/// Upper bound for scroll checks and for `take`.
pub const MAX_SCROLLS_LIMIT: u32 = 200;

/// Consecutive unchanged item counts required before a page counts as loaded.
pub const DEFAULT_STABLE_CHECKS: u32 = 2;

/// Bound on any single browser call after navigation (count, scroll, capture).
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 30;

/// Floor for the initial page-load bound.
const MIN_NAVIGATION_TIMEOUT_SECS: u64 = 5;

// ---------------------------------------------------------------------------
// Config structs (matching lazylist.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Extraction engine settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Listing site settings.
    #[serde(default)]
    pub listing: ListingConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// How many extracted items to keep.
    #[serde(default = "default_take")]
    pub take: u32,

    /// Run the browser with a visible window.
    #[serde(default)]
    pub visible: bool,

    /// Maximum scroll checks per page load.
    #[serde(default = "default_max_scrolls")]
    pub max_scrolls: u32,

    /// Pause after each scroll, in ms.
    #[serde(default = "default_scroll_pause")]
    pub scroll_pause_ms: u64,

    /// Extra wait for network-triggered renders after each scroll, in ms.
    #[serde(default = "default_network_idle")]
    pub network_idle_ms: u64,

    /// Hard bound on the initial page load, in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            take: default_take(),
            visible: false,
            max_scrolls: default_max_scrolls(),
            scroll_pause_ms: default_scroll_pause(),
            network_idle_ms: default_network_idle(),
            navigation_timeout_secs: default_navigation_timeout(),
        }
    }
}

fn default_take() -> u32 {
    20
}
fn default_max_scrolls() -> u32 {
    20
}
fn default_scroll_pause() -> u64 {
    900
}
fn default_network_idle() -> u64 {
    1200
}
fn default_navigation_timeout() -> u64 {
    120
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for extraction.
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_engine_base_url")]
    pub base_url: String,

    /// Timeout for one engine request, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_engine_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_engine_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_request_timeout() -> u64 {
    120
}

/// `[listing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Search listing root; the query slug is appended as a path segment.
    #[serde(default = "default_listing_base_url")]
    pub base_url: String,

    /// CSS selector matching one rendered listing card.
    #[serde(default = "default_item_selector")]
    pub item_selector: String,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            base_url: default_listing_base_url(),
            item_selector: default_item_selector(),
        }
    }
}

fn default_listing_base_url() -> String {
    "https://listado.mercadolibre.com.ar".into()
}
fn default_item_selector() -> String {
    "li.ui-search-layout__item".into()
}

// ---------------------------------------------------------------------------
// Scroll config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime materialization options, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ScrollConfig {
    /// Run the browser with a visible window.
    pub visible: bool,
    /// Maximum number of count-check iterations, in `[1, 200]`.
    pub max_scrolls: u32,
    /// Pause after each scroll, in ms.
    pub scroll_pause_ms: u64,
    /// Extra wait after the scroll pause, in ms.
    pub network_idle_ms: u64,
    /// Hard bound on the initial page load, in seconds.
    pub navigation_timeout_secs: u64,
    /// Bound on each later browser call, in seconds.
    pub step_timeout_secs: u64,
    /// Selector for listing cards.
    pub item_selector: String,
    /// Unchanged checks needed to declare convergence (at least 1).
    pub stable_checks: u32,
}

impl ScrollConfig {
    /// Return a copy with every bounded field pulled into range.
    pub fn clamped(mut self) -> Self {
        self.max_scrolls = self.max_scrolls.clamp(1, MAX_SCROLLS_LIMIT);
        self.stable_checks = self.stable_checks.max(1);
        self.navigation_timeout_secs = self
            .navigation_timeout_secs
            .max(MIN_NAVIGATION_TIMEOUT_SECS);
        self
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ScrollConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            visible: config.defaults.visible,
            max_scrolls: config.defaults.max_scrolls,
            scroll_pause_ms: config.defaults.scroll_pause_ms,
            network_idle_ms: config.defaults.network_idle_ms,
            navigation_timeout_secs: config.defaults.navigation_timeout_secs,
            step_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            item_selector: config.listing.item_selector.clone(),
            stable_checks: DEFAULT_STABLE_CHECKS,
        }
        .clamped()
    }
}

// ---------------------------------------------------------------------------
// Engine config (validated at construction)
// ---------------------------------------------------------------------------

/// Everything needed to call the extraction engine.
///
/// Construction fails with [`LazyListError::Config`] when a required field is
/// missing, so a value of this type always carries a model and a credential.
#[derive(Debug)]
pub struct EngineConfig {
    model: String,
    api_key: SecretString,
    base_url: Url,
    request_timeout: Duration,
}

impl EngineConfig {
    /// Build a config from explicit values.
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: &str,
    ) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(LazyListError::config("engine model id must not be empty"));
        }

        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LazyListError::config("engine API key must not be empty"));
        }

        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            LazyListError::config(format!("invalid engine base URL '{base_url}': {e}"))
        })?;

        Ok(Self {
            model,
            api_key: SecretString::from(api_key),
            base_url,
            request_timeout: Duration::from_secs(default_request_timeout()),
        })
    }

    /// Build a config from the `[engine]` section, reading the key from its env var.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        let var_name = &config.engine.api_key_env;
        let api_key = match std::env::var(var_name) {
            Ok(val) if !val.trim().is_empty() => val,
            _ => {
                return Err(LazyListError::config(format!(
                    "engine API key not found. Set the {var_name} environment variable."
                )));
            }
        };

        Ok(Self::new(&config.engine.model, api_key, &config.engine.base_url)?
            .with_request_timeout(Duration::from_secs(config.engine.request_timeout_secs)))
    }

    /// Override the model id (e.g. from a CLI flag).
    pub fn with_model(mut self, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(LazyListError::config("engine model id must not be empty"));
        }
        self.model = model;
        Ok(self)
    }

    /// Override the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lazylist/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LazyListError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lazylist/lazylist.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| LazyListError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        LazyListError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LazyListError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LazyListError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LazyListError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_scrolls"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("li.ui-search-layout__item"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
max_scrolls = 10
visible = true

[engine]
model = "gpt-4o"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.max_scrolls, 10);
        assert!(config.defaults.visible);
        assert_eq!(config.defaults.scroll_pause_ms, 900);
        assert_eq!(config.engine.model, "gpt-4o");
        assert_eq!(config.engine.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.listing.base_url, "https://listado.mercadolibre.com.ar");
    }

    #[test]
    fn scroll_config_clamps_max_scrolls() {
        let mut app = AppConfig::default();
        app.defaults.max_scrolls = 0;
        assert_eq!(ScrollConfig::from(&app).max_scrolls, 1);

        app.defaults.max_scrolls = 5_000;
        assert_eq!(ScrollConfig::from(&app).max_scrolls, MAX_SCROLLS_LIMIT);
    }

    #[test]
    fn scroll_config_floors_navigation_timeout() {
        let mut app = AppConfig::default();
        app.defaults.navigation_timeout_secs = 1;
        assert_eq!(ScrollConfig::from(&app).navigation_timeout_secs, 5);
    }

    #[test]
    fn scroll_config_defaults() {
        let scroll = ScrollConfig::default();
        assert_eq!(scroll.max_scrolls, 20);
        assert_eq!(scroll.stable_checks, 2);
        assert_eq!(scroll.scroll_pause(), Duration::from_millis(900));
        assert_eq!(scroll.network_idle(), Duration::from_millis(1200));
        assert_eq!(scroll.navigation_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn engine_config_rejects_missing_fields() {
        let err = EngineConfig::new("", "sk-test", "https://api.openai.com/v1").unwrap_err();
        assert!(matches!(err, LazyListError::Config { .. }));

        let err = EngineConfig::new("gpt-4o-mini", "  ", "https://api.openai.com/v1").unwrap_err();
        assert!(err.to_string().contains("API key"));

        let err = EngineConfig::new("gpt-4o-mini", "sk-test", "not a url").unwrap_err();
        assert!(err.to_string().contains("base URL"));
    }

    #[test]
    fn engine_config_keeps_values() {
        let config = EngineConfig::new("gpt-4o-mini", "sk-test", "https://api.openai.com/v1/")
            .unwrap()
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.api_key().expose_secret(), "sk-test");
        assert_eq!(config.base_url().as_str(), "https://api.openai.com/v1");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert!(!format!("{config:?}").contains("sk-test"));
    }

    #[test]
    fn engine_config_requires_env_key() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.engine.api_key_env = "LAZYLIST_TEST_NONEXISTENT_KEY_12345".into();
        let result = EngineConfig::from_app_config(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
