/// Configuration management for Discussion Service
///
/// Loads configuration from environment variables.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::services::ranking::PopularityPeriod;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Feed pagination defaults
    pub feed: FeedConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port for health checks
    pub http_port: u16,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Feed pagination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Page size for recent, popular and group feeds when the caller gives none
    pub default_page_size: u32,
    /// Page size for the friends feed when the caller gives none
    pub friends_page_size: u32,
    /// Upper bound on any caller-supplied page size
    pub max_page_size: u32,
    /// Period of the popular feed when the caller gives none
    pub default_period: PopularityPeriod,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            friends_page_size: 10,
            max_page_size: 100,
            default_period: PopularityPeriod::Week,
        }
    }
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env_parse("PORT").unwrap_or(8090),
            json_logs: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL environment variable not set")?,
            max_connections: env_parse("DB_MAX_CONNECTIONS")
                .unwrap_or_else(default_max_connections),
            min_connections: env_parse("DB_MIN_CONNECTIONS")
                .unwrap_or_else(default_min_connections),
        };

        let defaults = FeedConfig::default();
        let default_period = match std::env::var("FEED_DEFAULT_PERIOD") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("FEED_DEFAULT_PERIOD: {}", e))?,
            Err(_) => defaults.default_period,
        };
        let feed = FeedConfig {
            default_page_size: env_parse("FEED_DEFAULT_PAGE_SIZE")
                .unwrap_or(defaults.default_page_size),
            friends_page_size: env_parse("FEED_FRIENDS_PAGE_SIZE")
                .unwrap_or(defaults.friends_page_size),
            max_page_size: env_parse("FEED_MAX_PAGE_SIZE").unwrap_or(defaults.max_page_size),
            default_period,
        };

        if feed.max_page_size == 0 {
            anyhow::bail!("FEED_MAX_PAGE_SIZE must be greater than zero");
        }

        Ok(Config {
            app,
            database,
            feed,
        })
    }
}
