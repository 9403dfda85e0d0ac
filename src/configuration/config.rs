use super::types::*;
use crate::classification::types::Category;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One year
pub const MAX_CACHE_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;
/// Ten years
pub const MAX_LEDGER_RETENTION_HOURS: u64 = 10 * 365 * 24;

pub const DEFAULT_TERMINATION_REASON: &str =
    "Streaming from a VPN or blocked connection, please disconnect from your VPN and try again.";

/// Command-line arguments.
///
/// Everything here overrides the matching key of the configuration file.
/// Credentials are usually supplied through the environment
/// (`PLEX_API_TOKEN`, `VPN_API_KEY`) rather than the file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "plex-vpn-blocker")]
#[command(version)]
#[command(about = "Terminates Plex sessions streamed through a VPN or proxy")]
pub struct Args {
    /// Optional TOML configuration file
    pub config_file: Option<PathBuf>,

    /// Base URL of the Plex media server
    ///
    /// # Command Line
    /// Use `--plex-url <URL>` or the `PLEX_SERVER_URL` environment variable
    #[arg(long, env = "PLEX_SERVER_URL")]
    pub plex_url: Option<String>,

    /// Plex authentication token
    #[arg(long, env = "PLEX_API_TOKEN", hide_env_values = true)]
    pub plex_token: Option<String>,

    /// vpnapi.io API key
    #[arg(long, env = "VPN_API_KEY", hide_env_values = true)]
    pub vpn_api_key: Option<String>,

    /// Address always classified as a VPN, for end-to-end testing
    #[arg(long, env = "TEST_BLOCKED_IP")]
    pub test_blocked_ip: Option<String>,

    /// Seconds between two poll cycles
    #[arg(long)]
    pub poll_interval_seconds: Option<u64>,

    /// Port of the health and webhook listener
    #[arg(long)]
    pub port: Option<u16>,

    /// Log intended terminations without performing them
    ///
    /// This is a boolean flag that doesn't take a value - its presence enables the feature
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub dry_run: bool,
}

/// Application configuration structure that defines all runtime parameters.
///
/// Loaded from an optional TOML file where every key except the credentials
/// has a default, then overridden by [`Args`].
///
/// # Fields Overview
///
/// - `plex_url` / `plex_token`: media server control plane and its credential
/// - `vpn_api_url` / `vpn_api_key`: origin provider and its credential
/// - `test_blocked_ip`: address that is always treated as a VPN exit
/// - `poll_interval_seconds`: cycle cadence
/// - `classification_cache_ttl_seconds`: lifetime of a cached classification
/// - `flagged_categories`: categories that trigger enforcement
/// - `dry_run`: log intended enforcement without calling the media server
/// - `bind_address` / `port`: health and webhook listener
/// - `request_timeout_seconds`: bound on every outgoing call
/// - `max_concurrency`: sessions evaluated in parallel within one cycle
/// - `max_backoff_seconds`: cap of the retry delay after fetch failures
/// - `shutdown_grace_seconds`: time the in-flight cycle gets on shutdown
/// - `trusted_ranges`: addresses never sent to the provider
/// - `ledger` / `ledger_retention_hours`: decision ledger backend and retention
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub plex_url: String,
    pub plex_token: String,
    pub vpn_api_url: String,
    pub vpn_api_key: String,
    pub test_blocked_ip: Option<IpAddr>,
    pub poll_interval_seconds: u64,
    pub classification_cache_ttl_seconds: u64,
    pub flagged_categories: Vec<Category>,
    pub dry_run: bool,
    pub bind_address: IpAddr,
    pub port: u16,
    pub webhook_enabled: bool,
    pub request_timeout_seconds: u64,
    pub max_concurrency: usize,
    pub max_backoff_seconds: u64,
    pub shutdown_grace_seconds: u64,
    pub termination_reason: String,
    pub trusted_ranges: Vec<IpRange>,
    pub ledger: LedgerConfig,
    pub ledger_retention_hours: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plex_url: "http://127.0.0.1:32400".to_string(),
            plex_token: String::new(),
            vpn_api_url: "https://vpnapi.io/api".to_string(),
            vpn_api_key: String::new(),
            test_blocked_ip: None,
            poll_interval_seconds: 30,
            classification_cache_ttl_seconds: 86_400,
            flagged_categories: vec![Category::Vpn, Category::Proxy],
            dry_run: false,
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 10201,
            webhook_enabled: true,
            request_timeout_seconds: 5,
            max_concurrency: 4,
            max_backoff_seconds: 300,
            shutdown_grace_seconds: 10,
            termination_reason: DEFAULT_TERMINATION_REASON.to_string(),
            trusted_ranges: Vec::new(),
            ledger: LedgerConfig::default(),
            ledger_retention_hours: 168,
        }
    }
}

// Credentials stay out of any log line that formats the configuration.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("plex_url", &self.plex_url)
            .field("plex_token", &"<redacted>")
            .field("vpn_api_url", &self.vpn_api_url)
            .field("vpn_api_key", &"<redacted>")
            .field("test_blocked_ip", &self.test_blocked_ip)
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .field(
                "classification_cache_ttl_seconds",
                &self.classification_cache_ttl_seconds,
            )
            .field("flagged_categories", &self.flagged_categories)
            .field("dry_run", &self.dry_run)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("webhook_enabled", &self.webhook_enabled)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("max_concurrency", &self.max_concurrency)
            .field("max_backoff_seconds", &self.max_backoff_seconds)
            .field("shutdown_grace_seconds", &self.shutdown_grace_seconds)
            .field("trusted_ranges", &self.trusted_ranges)
            .field("ledger", &self.ledger)
            .field("ledger_retention_hours", &self.ledger_retention_hours)
            .finish()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    /// Reads and parses a TOML configuration file. Missing keys take their
    /// defaults; the result is not validated yet.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Builds the effective configuration: file (or defaults), then command
    /// line and environment overrides, then validation.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Empty environment values are treated as unset.
    pub fn apply_args(&mut self, args: &Args) -> Result<(), ConfigError> {
        if let Some(url) = non_empty(&args.plex_url) {
            self.plex_url = url.to_string();
        }
        if let Some(token) = non_empty(&args.plex_token) {
            self.plex_token = token.to_string();
        }
        if let Some(key) = non_empty(&args.vpn_api_key) {
            self.vpn_api_key = key.to_string();
        }
        if let Some(ip) = non_empty(&args.test_blocked_ip) {
            let ip = ip.parse::<IpAddr>().map_err(|e| {
                ConfigError::BadIPFormatting(format!("test_blocked_ip '{}': {}", ip, e))
            })?;
            self.test_blocked_ip = Some(ip);
        }
        if let Some(interval) = args.poll_interval_seconds {
            self.poll_interval_seconds = interval;
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if args.dry_run {
            self.dry_run = true;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.plex_token.trim().is_empty() {
            return Err(ConfigError::MissingCredential(
                "plex_token (PLEX_API_TOKEN) is required".to_string(),
            ));
        }
        if self.vpn_api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(
                "vpn_api_key (VPN_API_KEY) is required".to_string(),
            ));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::NotInRange(
                "poll_interval_seconds must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::NotInRange(
                "request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::NotInRange(
                "max_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.max_backoff_seconds < self.poll_interval_seconds {
            return Err(ConfigError::NotInRange(format!(
                "max_backoff_seconds ({}) must not be below poll_interval_seconds ({})",
                self.max_backoff_seconds, self.poll_interval_seconds
            )));
        }
        if self.classification_cache_ttl_seconds > MAX_CACHE_TTL_SECONDS {
            return Err(ConfigError::NotInRange(format!(
                "classification_cache_ttl_seconds must not exceed {}",
                MAX_CACHE_TTL_SECONDS
            )));
        }
        if self.ledger_retention_hours == 0 || self.ledger_retention_hours > MAX_LEDGER_RETENTION_HOURS {
            return Err(ConfigError::NotInRange(format!(
                "ledger_retention_hours must be between 1 and {}",
                MAX_LEDGER_RETENTION_HOURS
            )));
        }
        if self.flagged_categories.is_empty() {
            return Err(ConfigError::BadCategory(
                "flagged_categories must not be empty".to_string(),
            ));
        }
        if self.flagged_categories.contains(&Category::Unknown) {
            return Err(ConfigError::BadCategory(
                "'unknown' cannot be flagged, unclassified sessions are always allowed".to_string(),
            ));
        }
        if let Some(range) = self.trusted_ranges.iter().find(|r| !r.is_well_formed()) {
            return Err(ConfigError::BadIPFormatting(format!(
                "trusted range {} - {} is not a valid range",
                range.start, range.end
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.classification_cache_ttl_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Saturates instead of overflowing for unvalidated values.
    pub fn ledger_retention(&self) -> chrono::Duration {
        i64::try_from(self.ledger_retention_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX)
    }
}
