//! Application configuration for ToolHarvest.
//!
//! User config lives at `~/.toolharvest/toolharvest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolHarvestError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "toolharvest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".toolharvest";

// ---------------------------------------------------------------------------
// Config structs (matching toolharvest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Language-model service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Headless browser settings.
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Favicon resolution settings.
    #[serde(default)]
    pub favicon: FaviconSettings,

    /// Categorizer retry settings.
    #[serde(default)]
    pub categorizer: CategorizerSettings,

    /// Batch loop settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Listing page crawled when `run` is given no URL.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Database file used when `--db` is not given.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            database_path: default_database_path(),
        }
    }
}

fn default_listing_url() -> String {
    "https://theresanaiforthat.com/".into()
}
fn default_database_path() -> String {
    "~/.toolharvest/tools.db".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Output token ceiling for summaries.
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    /// Output token ceiling for categorization.
    #[serde(default = "default_categorize_max_tokens")]
    pub categorize_max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after a failed request before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Wait after an HTTP 429.
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,

    /// Wait after any other failure.
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// USD per 1000 tokens, for the logged cost estimate.
    #[serde(default = "default_cost_per_1k_tokens")]
    pub cost_per_1k_tokens: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            summary_max_tokens: default_summary_max_tokens(),
            categorize_max_tokens: default_categorize_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            cost_per_1k_tokens: default_cost_per_1k_tokens(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_summary_max_tokens() -> u32 {
    2048
}
fn default_categorize_max_tokens() -> u32 {
    3000
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    10
}
fn default_rate_limit_backoff_secs() -> u64 {
    60
}
fn default_error_backoff_secs() -> u64 {
    10
}
fn default_cost_per_1k_tokens() -> f64 {
    0.002
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Chrome/Chromium executable. Auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    /// Run without a visible window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Viewport and screenshot clip width.
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    /// Viewport and screenshot clip height.
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Navigation timeout in seconds.
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Settle wait after navigation, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// JPEG quality for screenshots (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// User agent sent by browser pages and favicon fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_ms: default_settle_ms(),
            jpeg_quality: default_jpeg_quality(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_viewport_width() -> u32 {
    915
}
fn default_viewport_height() -> u32 {
    750
}
fn default_navigation_timeout_secs() -> u64 {
    30
}
fn default_settle_ms() -> u64 {
    3000
}
fn default_jpeg_quality() -> u8 {
    70
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/113.0.0.0 Safari/537.36"
        .into()
}

/// `[favicon]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaviconSettings {
    /// Per-fetch timeout in seconds.
    #[serde(default = "default_favicon_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum redirects followed per fetch.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Domain-specific icon selectors, tried before `/favicon.ico`.
    #[serde(default = "default_site_rules")]
    pub site_rules: Vec<FaviconSiteRule>,
}

impl Default for FaviconSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_favicon_timeout_secs(),
            max_redirects: default_max_redirects(),
            site_rules: default_site_rules(),
        }
    }
}

/// `[[favicon.site_rules]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaviconSiteRule {
    /// URL prefix the rule applies to (e.g. `https://apps.apple.com/`).
    pub url_prefix: String,
    /// CSS selector of the icon `<img>` (or `<source>`) element.
    pub selector: String,
}

fn default_favicon_timeout_secs() -> u64 {
    10
}
fn default_max_redirects() -> usize {
    5
}
fn default_site_rules() -> Vec<FaviconSiteRule> {
    vec![
        FaviconSiteRule {
            url_prefix: "https://apps.apple.com/".into(),
            selector: "picture.we-artwork source".into(),
        },
        FaviconSiteRule {
            url_prefix: "https://play.google.com/".into(),
            selector: r#"img[itemprop="image"]"#.into(),
        },
        FaviconSiteRule {
            url_prefix: "https://chromewebstore.google.com/".into(),
            selector: r#"img[alt="Item logo image"]"#.into(),
        },
    ]
}

/// `[categorizer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizerSettings {
    /// Attempts before giving up on an item.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Starting temperature.
    #[serde(default = "default_initial_temperature")]
    pub initial_temperature: f32,
}

impl Default for CategorizerSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            initial_temperature: default_initial_temperature(),
        }
    }
}

fn default_max_attempts() -> u32 {
    20
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_initial_temperature() -> f32 {
    0.4
}

/// How the duplicate check treats a store error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Treat the item as new and keep going.
    #[default]
    FailOpen,
    /// Skip the item.
    FailClosed,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = ToolHarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fail-open" => Ok(Self::FailOpen),
            "fail-closed" => Ok(Self::FailClosed),
            other => Err(ToolHarvestError::config(format!(
                "unknown duplicate policy '{other}', expected fail-open or fail-closed"
            ))),
        }
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Lower bound of the randomized inter-item delay.
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the randomized inter-item delay.
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,

    /// Duplicate-check behaviour on store errors.
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Characters of captured text sent to the summarizer.
    #[serde(default = "default_summary_input_chars")]
    pub summary_input_chars: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            duplicate_policy: DuplicatePolicy::default(),
            summary_input_chars: default_summary_input_chars(),
        }
    }
}

fn default_delay_min_ms() -> u64 {
    1000
}
fn default_delay_max_ms() -> u64 {
    2000
}
fn default_summary_input_chars() -> usize {
    1000
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime browser configuration.
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout: Duration,
    pub settle: Duration,
    pub jpeg_quality: u8,
    pub user_agent: String,
}

impl From<&AppConfig> for BrowserConfig {
    fn from(config: &AppConfig) -> Self {
        let b = &config.browser;
        Self {
            executable: b.executable.as_ref().map(PathBuf::from),
            headless: b.headless,
            viewport_width: b.viewport_width,
            viewport_height: b.viewport_height,
            navigation_timeout: Duration::from_secs(b.navigation_timeout_secs),
            settle: Duration::from_millis(b.settle_ms),
            jpeg_quality: b.jpeg_quality.clamp(1, 100),
            user_agent: b.user_agent.clone(),
        }
    }
}

/// Runtime favicon resolver configuration.
#[derive(Debug, Clone)]
pub struct FaviconConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    pub site_rules: Vec<FaviconSiteRule>,
}

impl From<&AppConfig> for FaviconConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.favicon.timeout_secs),
            max_redirects: config.favicon.max_redirects,
            user_agent: config.browser.user_agent.clone(),
            site_rules: config.favicon.site_rules.clone(),
        }
    }
}

/// Runtime language-model client configuration. The API key is resolved
/// separately from the environment.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub rate_limit_backoff: Duration,
    pub error_backoff: Duration,
    pub cost_per_1k_tokens: f64,
}

impl From<&AppConfig> for LlmClientConfig {
    fn from(config: &AppConfig) -> Self {
        let l = &config.llm;
        Self {
            base_url: l.base_url.trim_end_matches('/').to_string(),
            model: l.model.clone(),
            request_timeout: Duration::from_secs(l.request_timeout_secs),
            max_retries: l.max_retries,
            rate_limit_backoff: Duration::from_secs(l.rate_limit_backoff_secs),
            error_backoff: Duration::from_secs(l.error_backoff_secs),
            cost_per_1k_tokens: l.cost_per_1k_tokens,
        }
    }
}

/// Runtime enrichment configuration for one batch.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub duplicate_policy: DuplicatePolicy,
    pub summary_input_chars: usize,
    pub summary_max_tokens: u32,
    pub categorize_max_tokens: u32,
    pub categorizer_max_attempts: u32,
    pub categorizer_retry_delay: Duration,
    pub categorizer_initial_temperature: f32,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        let (min, max) = if p.delay_min_ms <= p.delay_max_ms {
            (p.delay_min_ms, p.delay_max_ms)
        } else {
            (p.delay_max_ms, p.delay_min_ms)
        };
        Self {
            delay_min: Duration::from_millis(min),
            delay_max: Duration::from_millis(max),
            duplicate_policy: p.duplicate_policy,
            summary_input_chars: p.summary_input_chars,
            summary_max_tokens: config.llm.summary_max_tokens,
            categorize_max_tokens: config.llm.categorize_max_tokens,
            categorizer_max_attempts: config.categorizer.max_attempts.max(1),
            categorizer_retry_delay: Duration::from_millis(config.categorizer.retry_delay_ms),
            categorizer_initial_temperature: config.categorizer.initial_temperature,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.toolharvest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ToolHarvestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.toolharvest/toolharvest.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ToolHarvestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ToolHarvestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ToolHarvestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = to_toml(&AppConfig::default())?;

    std::fs::write(&path, content).map_err(|e| ToolHarvestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Render a config as pretty TOML.
pub fn to_toml(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| ToolHarvestError::config(e.to_string()))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Read the LLM API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().to_string()),
        _ => Err(ToolHarvestError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable \
             (a .env.local file in the working directory is also read)."
        ))),
    }
}
