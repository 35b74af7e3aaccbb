use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Browser launch options.  The required values normally come from `.env`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Browser executable (`BROWSER_PATH`).
    #[serde(default)]
    pub browser_path: Option<PathBuf>,
    /// Persistent browser profile root (`DATA_FOLDER`).
    #[serde(default)]
    pub data_folder: Option<PathBuf>,
    /// Profile directory inside the data folder (`PROFILE_FOLDER`).
    #[serde(default)]
    pub profile_folder: Option<String>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDriverConfig {
    #[serde(default = "default_webdriver_url")]
    pub url: String,
    /// Start chromedriver ourselves instead of expecting one to be running.
    #[serde(default = "default_spawn_webdriver")]
    pub spawn: bool,
    #[serde(default)]
    pub chromedriver_path: Option<PathBuf>,
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Channel URL (`CHANNEL_PAGE`).
    #[serde(default)]
    pub channel_page: Option<String>,
    /// Reload a live stream that shows no rewards (`REFRESH_NO_REWARDS`).
    #[serde(default)]
    pub refresh_no_rewards: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,
    #[serde(default = "default_login_poll_secs")]
    pub login_poll_secs: u64,
    #[serde(default = "default_max_navigation_retries")]
    pub max_navigation_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            spawn: default_spawn_webdriver(),
            chromedriver_path: None,
            page_load_timeout_secs: default_page_load_timeout_secs(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            channel_page: None,
            refresh_no_rewards: false,
            poll_interval_secs: default_poll_interval_secs(),
            retry_wait_secs: default_retry_wait_secs(),
            login_poll_secs: default_login_poll_secs(),
            max_navigation_retries: default_max_navigation_retries(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_spawn_webdriver() -> bool {
    true
}

fn default_page_load_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_retry_wait_secs() -> u64 {
    30
}

fn default_login_poll_secs() -> u64 {
    5
}

fn default_max_navigation_retries() -> u32 {
    3
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8977
}

/// Everything the browser driver needs to open a session.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub browser_path: PathBuf,
    pub data_folder: PathBuf,
    pub profile_folder: Option<String>,
    pub headless: bool,
    pub extra_args: Vec<String>,
    pub webdriver_url: String,
    pub spawn_webdriver: bool,
    pub chromedriver_path: Option<PathBuf>,
    pub page_load_timeout: Duration,
}

/// Timings and targets for the navigation controller.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub channel_page: String,
    pub refresh_no_rewards: bool,
    pub poll_interval: Duration,
    pub retry_wait: Duration,
    pub login_poll_interval: Duration,
    pub max_navigation_retries: u32,
}

impl WatchSettings {
    /// Settings with the stock timings for the given channel.
    pub fn new(channel_page: impl Into<String>) -> Self {
        Self {
            channel_page: channel_page.into(),
            refresh_no_rewards: false,
            poll_interval: Duration::from_secs(default_poll_interval_secs()),
            retry_wait: Duration::from_secs(default_retry_wait_secs()),
            login_poll_interval: Duration::from_secs(default_login_poll_secs()),
            max_navigation_retries: default_max_navigation_retries(),
        }
    }

    /// The channel's stream listing, e.g. `https://www.youtube.com/@chan/streams`.
    pub fn streams_page(&self) -> String {
        let channel = self.channel_page.trim_end_matches('/');
        if channel.ends_with("/streams") {
            channel.to_string()
        } else {
            format!("{}/streams", channel)
        }
    }
}

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub launch: LaunchSettings,
    pub watch: WatchSettings,
    pub http: HttpConfig,
}

/// Environment variable names understood by `Config::apply_env`.
pub mod env_keys {
    pub const BROWSER_PATH: &str = "BROWSER_PATH";
    pub const CHANNEL_PAGE: &str = "CHANNEL_PAGE";
    pub const DATA_FOLDER: &str = "DATA_FOLDER";
    pub const PROFILE_FOLDER: &str = "PROFILE_FOLDER";
    pub const REFRESH_NO_REWARDS: &str = "REFRESH_NO_REWARDS";
    pub const WEBDRIVER_URL: &str = "WEBDRIVER_URL";
}

/// Opt-in flags are on when set to anything but an explicit "off" value.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
}

impl Config {
    /// Load the config file, writing the defaults on first run.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            if let Err(e) = config.save() {
                warn!("Could not write default config to {:?}: {:#}", config_path, e);
            }
            return Ok(config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Overlay environment-style values.  Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(env_keys::BROWSER_PATH) {
            self.browser.browser_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get(env_keys::DATA_FOLDER) {
            self.browser.data_folder = Some(PathBuf::from(v));
        }
        if let Some(v) = get(env_keys::PROFILE_FOLDER) {
            self.browser.profile_folder = Some(v);
        }
        if let Some(v) = get(env_keys::CHANNEL_PAGE) {
            self.watch.channel_page = Some(v.trim().to_string());
        }
        if let Some(v) = lookup(env_keys::REFRESH_NO_REWARDS) {
            self.watch.refresh_no_rewards = parse_flag(&v);
        }
        if let Some(v) = get(env_keys::WEBDRIVER_URL) {
            self.webdriver.url = v;
        }
    }

    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Check required values and convert to runtime settings.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let browser_path = self
            .browser
            .browser_path
            .clone()
            .ok_or(ConfigError::Missing(env_keys::BROWSER_PATH))?;
        let channel_page = self
            .watch
            .channel_page
            .clone()
            .ok_or(ConfigError::Missing(env_keys::CHANNEL_PAGE))?;
        let data_folder = self
            .browser
            .data_folder
            .clone()
            .ok_or(ConfigError::Missing(env_keys::DATA_FOLDER))?;

        if let Err(e) = url::Url::parse(&channel_page) {
            return Err(ConfigError::Invalid {
                key: env_keys::CHANNEL_PAGE,
                reason: format!("{} is not an absolute URL ({})", channel_page, e),
            });
        }
        if self.watch.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "watch.poll_interval_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }

        let launch = LaunchSettings {
            browser_path,
            data_folder,
            profile_folder: self.browser.profile_folder.clone(),
            headless: self.browser.headless,
            extra_args: self.browser.extra_args.clone(),
            webdriver_url: self.webdriver.url.clone(),
            spawn_webdriver: self.webdriver.spawn,
            chromedriver_path: self.webdriver.chromedriver_path.clone(),
            page_load_timeout: Duration::from_secs(self.webdriver.page_load_timeout_secs),
        };

        let watch = WatchSettings {
            channel_page,
            refresh_no_rewards: self.watch.refresh_no_rewards,
            poll_interval: Duration::from_secs(self.watch.poll_interval_secs),
            retry_wait: Duration::from_secs(self.watch.retry_wait_secs),
            login_poll_interval: Duration::from_secs(self.watch.login_poll_secs.max(1)),
            max_navigation_retries: self.watch.max_navigation_retries,
        };

        Ok(Settings {
            launch,
            watch,
            http: self.http.clone(),
        })
    }
}
