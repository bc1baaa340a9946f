//! Pipeline configuration.
//!
//! [`Config`] mirrors the plugin settings of the chat host: network knobs for
//! the downloader, delivery thresholds, per-site switches and the renderer
//! layout. Every field has a default, so a partial TOML file (or none at all)
//! is valid.
//!
//! # Example
//!
//! ```rust
//! use threadcard_core::Config;
//!
//! let config = Config::builder().forward_threshold(3).download_retry_times(1).build();
//! assert_eq!(config.forward_threshold, 3);
//! assert!(config.site("keylol").enable);
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Result, ThreadcardError};

/// Per-site extractor switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Whether the extractor is registered at all (default: true).
    pub enable: bool,
    /// Route page and media requests through [`Config::proxy`] (default: false).
    pub use_proxy: bool,
    /// Raw `Cookie` header sent with page requests.
    pub cookies: Option<String>,
    /// Override for the site origin, e.g. a mirror.
    pub base_url: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { enable: true, use_proxy: false, cookies: None, base_url: None }
    }
}

/// Card layout settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Canvas width in pixels (default: 800).
    pub width: u32,
    /// Left/right margin and bottom padding in pixels (default: 20).
    pub padding: u32,
    /// Body lines drawn before the ellipsis line (default: 10).
    pub max_text_lines: usize,
    /// Font files tried in order; the first that exists and parses wins.
    pub font_candidates: Vec<PathBuf>,
    /// Offset used to print timestamps (default: 8, the forum's clock).
    pub utc_offset_hours: i8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            padding: 20,
            max_text_lines: 10,
            font_candidates: vec![
                PathBuf::from("data/resources/fonts/HYSongYunLangHeiW-1.ttf"),
                PathBuf::from("C:\\Windows\\Fonts\\simhei.ttf"),
                PathBuf::from("C:\\Windows\\Fonts\\simsun.ttc"),
                PathBuf::from("/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc"),
                PathBuf::from("/usr/share/fonts/truetype/wqy/wqy-microhei.ttc"),
                PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
                PathBuf::from("/usr/share/fonts/truetype/arphic/ukai.ttc"),
                PathBuf::from("/usr/share/fonts/truetype/arphic/uming.ttc"),
                PathBuf::from("/System/Library/Fonts/PingFang.ttc"),
            ],
            utc_offset_hours: 8,
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-request timeout in seconds (default: 30).
    pub common_timeout: u64,
    /// Extra attempts after the first failed download (default: 3).
    pub download_retry_times: u32,
    /// Backoff unit between download attempts in milliseconds (default: 1000).
    pub retry_backoff_ms: u64,
    /// Outbound proxy, used by sites with `use_proxy`.
    pub proxy: Option<String>,
    /// Content count above which delivery always uses a forwarded node list (default: 5).
    pub forward_threshold: usize,
    /// Replace media that failed to download with a text tip (default: true).
    pub show_download_fail_tip: bool,
    /// Directory for downloaded media and rendered cards (default: `data/cache`).
    pub cache_dir: PathBuf,
    /// Emoji asset CDN base URL, passed through to hosts.
    pub emoji_cdn: String,
    /// Emoji style tag, passed through to hosts.
    pub emoji_style: String,
    /// Maximum characters kept from a post body (default: 1000).
    pub text_max_chars: usize,
    /// Sender label of forwarded nodes.
    pub forward_name: String,
    /// Sender id of forwarded nodes.
    pub forward_id: String,
    /// Per-site settings keyed by extractor name.
    pub parser: HashMap<String, SiteConfig>,
    /// Chat sessions where the pipeline is active; empty means all.
    pub enabled_sessions: Vec<String>,
    /// Card layout.
    pub render: RenderConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            common_timeout: 30,
            download_retry_times: 3,
            retry_backoff_ms: 1000,
            proxy: None,
            forward_threshold: 5,
            show_download_fail_tip: true,
            cache_dir: PathBuf::from("data/cache"),
            emoji_cdn: "https://cdn.jsdelivr.net/npm/twemoji@latest/assets/72x72/".to_string(),
            emoji_style: "twitter".to_string(),
            text_max_chars: 1000,
            forward_name: "threadcard".to_string(),
            forward_id: "10000".to_string(),
            parser: HashMap::from([("keylol".to_string(), SiteConfig::default())]),
            enabled_sessions: Vec::new(),
            render: RenderConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new builder for Config.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Parses a configuration from TOML text. Missing fields use defaults.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Loads configuration from a specific file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| ThreadcardError::ConfigIo { path: path.to_path_buf(), source: e })?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| ThreadcardError::ConfigParse { path: path.to_path_buf(), source: e })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `<config dir>/threadcard/config.toml`, falling back to defaults when it does not exist.
    pub fn load_default() -> Result<Self> {
        match Self::default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Default config file path: `<config dir>/threadcard/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("threadcard").join("config.toml"))
    }

    /// Rejects values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.common_timeout == 0 {
            return Err(ThreadcardError::Config("common_timeout must be greater than 0".into()));
        }
        if self.render.width <= self.render.padding.saturating_mul(2) {
            return Err(ThreadcardError::Config(format!(
                "render.width ({}) must exceed twice the padding ({})",
                self.render.width, self.render.padding
            )));
        }
        if self.text_max_chars < 4 {
            return Err(ThreadcardError::Config("text_max_chars must be at least 4".into()));
        }
        Ok(())
    }

    /// Settings for one site; sites missing from the table use defaults.
    pub fn site(&self, name: &str) -> SiteConfig {
        self.parser.get(name).cloned().unwrap_or_default()
    }

    /// Proxy to use for a site, if it opted in and one is configured.
    pub fn proxy_for(&self, site: &str) -> Option<String> {
        if self.site(site).use_proxy { self.proxy.clone() } else { None }
    }

    /// Per-request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.common_timeout)
    }

    /// Download backoff unit as a Duration.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Whether the pipeline should answer in the given chat session.
    pub fn is_session_enabled(&self, session: &str) -> bool {
        self.enabled_sessions.is_empty() || self.enabled_sessions.iter().any(|s| s == session)
    }
}

/// Builder for Config.
///
/// Provides a fluent API over the defaults, used by hosts to apply
/// command-line overrides.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self { config: Config::default() }
    }

    /// Starts from an existing configuration.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    pub fn common_timeout(mut self, secs: u64) -> Self {
        self.config.common_timeout = secs;
        self
    }

    pub fn download_retry_times(mut self, retries: u32) -> Self {
        self.config.download_retry_times = retries;
        self
    }

    pub fn retry_backoff_ms(mut self, millis: u64) -> Self {
        self.config.retry_backoff_ms = millis;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    pub fn forward_threshold(mut self, threshold: usize) -> Self {
        self.config.forward_threshold = threshold;
        self
    }

    pub fn show_download_fail_tip(mut self, show: bool) -> Self {
        self.config.show_download_fail_tip = show;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn text_max_chars(mut self, max: usize) -> Self {
        self.config.text_max_chars = max;
        self
    }

    /// Replaces the settings of one site.
    pub fn site(mut self, name: impl Into<String>, site: SiteConfig) -> Self {
        self.config.parser.insert(name.into(), site);
        self
    }

    pub fn enabled_sessions(mut self, sessions: Vec<String>) -> Self {
        self.config.enabled_sessions = sessions;
        self
    }

    pub fn font_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.config.render.font_candidates = candidates;
        self
    }

    /// Builds the Config.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
