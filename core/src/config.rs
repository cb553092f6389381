//! Configuration management

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Bot configuration, loaded once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channels joined after every successful registration
    pub channels: Vec<String>,
    /// IRC server to connect to
    pub server: ServerConfig,
    /// How the bot presents itself on the network
    pub identity: IdentityConfig,
    /// Reconnect backoff settings
    pub reconnect: ReconnectConfig,
    /// Link liveness settings
    pub keepalive: KeepaliveConfig,
    /// Per-user admission quotas
    pub rate_limit: RateLimitConfig,
    /// Upstream search API settings
    pub search: SearchConfig,
    /// Outbound message shaping
    pub output: OutputConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,
    /// Server port
    pub port: u16,
    /// Whether to use TLS
    pub tls: bool,
    /// Whether to verify the server certificate
    pub tls_verify: bool,
    /// Optional server password sent as PASS
    pub password: Option<String>,
    /// TCP and TLS connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Time allowed between NICK/USER and the welcome numeric
    pub registration_timeout_secs: u64,
}

/// Bot identity on the network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub nickname: String,
    pub username: String,
    pub realname: String,
}

/// Reconnect backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// First delay after a lost connection
    pub initial_delay_secs: u64,
    /// Upper bound for the exponential delay
    pub max_delay_secs: u64,
}

/// Keep-alive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveConfig {
    /// Silence on the link before the bot probes the server with its own PING.
    /// A second silent interval drops the connection.
    pub idle_timeout_secs: u64,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
}

/// Search API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search endpoint URL
    pub endpoint: String,
    /// Per-attempt request timeout in seconds
    pub timeout_secs: u64,
    /// Additional attempts after the first failed one
    pub max_retries: u32,
    /// Base delay between attempts, multiplied by the attempt number
    pub retry_backoff_ms: u64,
    /// Maximum entries passed on to the requester
    pub max_results: usize,
    /// User-Agent header
    pub user_agent: String,
    /// Origin header, if the endpoint expects one
    pub origin: Option<String>,
    /// Referer header, if the endpoint expects one
    pub referer: Option<String>,
    /// Backend engines and their scoring weights
    pub engines: Vec<EngineConfig>,
}

/// A single upstream search engine selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub required_by_origin: bool,
    #[serde(default)]
    pub preferred: bool,
    #[serde(default)]
    pub preferred_by_origin: bool,
    /// Score multiplier applied by the ranking stage
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Score offset applied by the ranking stage
    #[serde(default)]
    pub offset: f64,
}

/// Outbound message configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Delay between consecutive outbound lines (flood protection)
    pub message_delay_ms: u64,
    /// Maximum PRIVMSG text length before splitting
    pub max_message_length: usize,
    /// Longer queries are cut to this many characters
    pub max_query_length: usize,
    /// Name shown in the attribution footer
    pub attribution_name: String,
    /// Link shown in the attribution footer
    pub attribution_url: String,
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: vec!["#test_room".to_string()],
            server: ServerConfig::default(),
            identity: IdentityConfig::default(),
            reconnect: ReconnectConfig::default(),
            keepalive: KeepaliveConfig::default(),
            rate_limit: RateLimitConfig::default(),
            search: SearchConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "irc.example.com".to_string(),
            port: 6697,
            tls: true,
            tls_verify: true,
            password: None,
            connect_timeout_secs: 30,
            registration_timeout_secs: 60,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nickname: "SearchBot".to_string(),
            username: "SearchBot".to_string(),
            realname: "MansionNet Search Bot".to_string(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            max_delay_secs: 300,
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 240,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 5,
            requests_per_day: 500,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.hearch.co/search/web".to_string(),
            timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_results: 5,
            user_agent: format!("searchbot/{}", env!("CARGO_PKG_VERSION")),
            origin: Some("https://hearch.co".to_string()),
            referer: Some("https://hearch.co/".to_string()),
            engines: EngineConfig::defaults(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: 500,
            max_message_length: 400,
            max_query_length: 400,
            attribution_name: "Hearch".to_string(),
            attribution_url: "https://hearch.co/".to_string(),
        }
    }
}

impl EngineConfig {
    fn new(name: &str, weight: f64, preferred: bool, required_by_origin: bool) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            required: false,
            required_by_origin,
            preferred,
            preferred_by_origin: false,
            weight,
            offset: 0.0,
        }
    }

    /// The engine mix the public Hearch frontend uses
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("bing", 1.5, false, true),
            Self::new("brave", 1.0, true, false),
            Self::new("duckduckgo", 1.25, false, false),
            Self::new("etools", 1.0, false, false),
            Self::new("google", 1.5, false, true),
            Self::new("mojeek", 1.0, true, false),
            Self::new("presearch", 1.1, false, false),
            Self::new("qwant", 1.1, false, false),
            Self::new("startpage", 1.25, false, false),
            Self::new("swisscows", 1.0, false, false),
            Self::new("yahoo", 1.1, false, false),
        ]
    }
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(Error::Config("Server host cannot be empty".to_string()));
        }

        if self.server.port == 0 {
            return Err(Error::Config("Server port cannot be 0".to_string()));
        }

        if !crate::utils::string::is_valid_nickname(&self.identity.nickname) {
            return Err(Error::Config(format!("Invalid nickname: {}", self.identity.nickname)));
        }

        if self.identity.username.is_empty() || self.identity.username.contains(' ') {
            return Err(Error::Config(format!("Invalid username: {:?}", self.identity.username)));
        }

        for channel in &self.channels {
            if !crate::utils::string::is_valid_channel_name(channel) {
                return Err(Error::Config(format!("Invalid channel name: {}", channel)));
            }
        }

        if self.reconnect.initial_delay_secs == 0 {
            return Err(Error::Config("Reconnect initial delay must be greater than 0".to_string()));
        }

        if self.reconnect.max_delay_secs < self.reconnect.initial_delay_secs {
            return Err(Error::Config("Reconnect max delay must not be below the initial delay".to_string()));
        }

        if self.keepalive.idle_timeout_secs == 0 {
            return Err(Error::Config("Keep-alive idle timeout must be greater than 0".to_string()));
        }

        if self.rate_limit.requests_per_minute == 0 || self.rate_limit.requests_per_day == 0 {
            return Err(Error::Config("Rate limits must be greater than 0".to_string()));
        }

        if self.rate_limit.requests_per_minute > self.rate_limit.requests_per_day {
            return Err(Error::Config("Per-minute limit cannot exceed the per-day limit".to_string()));
        }

        self.validate_search()?;

        if self.output.max_message_length < 50 || self.output.max_message_length > 450 {
            return Err(Error::Config("Max message length must be between 50 and 450".to_string()));
        }

        if self.output.max_query_length == 0 {
            return Err(Error::Config("Max query length must be greater than 0".to_string()));
        }

        Ok(())
    }

    fn validate_search(&self) -> Result<()> {
        let search = &self.search;

        if !(search.endpoint.starts_with("https://") || search.endpoint.starts_with("http://")) {
            return Err(Error::Config(format!("Search endpoint must be an http(s) URL: {}", search.endpoint)));
        }

        if search.timeout_secs == 0 {
            return Err(Error::Config("Search timeout must be greater than 0".to_string()));
        }

        if search.max_results == 0 {
            return Err(Error::Config("Max results must be greater than 0".to_string()));
        }

        if !search.engines.iter().any(|engine| engine.enabled) {
            return Err(Error::Config("At least one search engine must be enabled".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for engine in &search.engines {
            if !seen.insert(engine.name.as_str()) {
                return Err(Error::Config(format!("Duplicate search engine: {}", engine.name)));
            }
        }

        Ok(())
    }
}
