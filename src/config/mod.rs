//! Configuration module for handling environment variables and .env files

use crate::client::{RedditClient, RedditClientError};
use dotenv::dotenv;
use log::{info, warn};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration derived from environment variables and .env file
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Reddit API settings
    pub user_agent: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,

    // Bearer token obtained elsewhere (optional)
    pub access_token: Option<String>,

    // Listing behaviour
    pub page_limit: Option<i32>,
    pub dedup_capacity: Option<usize>,
    pub rate_limit: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: "".to_string(),
            base_url: None,
            timeout: Some(Duration::from_secs(30)),
            access_token: None,
            page_limit: None,
            dedup_capacity: None,
            rate_limit: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn load() -> Self {
        // Try to load .env file, but continue even if it doesn't exist
        match dotenv() {
            Ok(_) => info!("Loaded environment from .env file"),
            Err(_) => info!("No .env file found, using system environment variables only"),
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup. Unparseable values are
    /// logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(user_agent) = lookup("REDDIT_USER_AGENT") {
            config.user_agent = user_agent;
        }

        config.base_url = lookup("REDDIT_BASE_URL").filter(|s| !s.is_empty());
        config.access_token = lookup("REDDIT_ACCESS_TOKEN").filter(|s| !s.is_empty());

        if let Some(secs) = parse_var::<u64, _>(&lookup, "REDDIT_TIMEOUT_SECS") {
            config.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(limit) = parse_var::<i32, _>(&lookup, "REDDIT_PAGE_LIMIT") {
            config.page_limit = Some(limit);
        }

        if let Some(capacity) = parse_var::<usize, _>(&lookup, "REDDIT_DEDUP_CAPACITY") {
            config.dedup_capacity = (capacity > 0).then_some(capacity);
        }

        if let Some(enabled) = parse_var::<bool, _>(&lookup, "REDDIT_RATE_LIMIT") {
            config.rate_limit = enabled;
        }

        config
    }

    /// Create a RedditClient from this configuration
    pub fn create_client(&self) -> Result<RedditClient, RedditClientError> {
        RedditClient::from_config(self)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert!(config.rate_limit);
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert!(config.access_token.is_none());
        assert!(config.page_limit.is_none());
    }

    #[test]
    fn reads_all_settings() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REDDIT_USER_AGENT", "test-agent/1.0"),
            ("REDDIT_ACCESS_TOKEN", "abc"),
            ("REDDIT_BASE_URL", "http://localhost:8080"),
            ("REDDIT_TIMEOUT_SECS", "5"),
            ("REDDIT_PAGE_LIMIT", "100"),
            ("REDDIT_DEDUP_CAPACITY", "5000"),
            ("REDDIT_RATE_LIMIT", "false"),
        ]));

        assert_eq!(config.user_agent, "test-agent/1.0");
        assert_eq!(config.access_token.as_deref(), Some("abc"));
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.page_limit, Some(100));
        assert_eq!(config.dedup_capacity, Some(5000));
        assert!(!config.rate_limit);
    }

    #[test]
    fn invalid_values_are_ignored() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REDDIT_PAGE_LIMIT", "lots"),
            ("REDDIT_RATE_LIMIT", "maybe"),
            ("REDDIT_DEDUP_CAPACITY", "0"),
        ]));

        assert!(config.page_limit.is_none());
        assert!(config.rate_limit);
        assert!(config.dedup_capacity.is_none());
    }

    #[test]
    fn create_client_applies_listing_defaults() {
        let config = AppConfig::from_lookup(lookup(&[
            ("REDDIT_PAGE_LIMIT", "50"),
            ("REDDIT_DEDUP_CAPACITY", "10"),
            ("REDDIT_RATE_LIMIT", "false"),
        ]));
        let client = config.create_client().unwrap();

        assert_eq!(client.listing_defaults().per_request_limit, 50);
        assert_eq!(client.listing_defaults().dedup_capacity, Some(10));
        assert!(!client.rate_limiter().is_enabled());
    }

    #[test]
    fn create_client_rejects_bad_base_url() {
        let config = AppConfig::from_lookup(lookup(&[("REDDIT_BASE_URL", "not a url")]));
        assert!(matches!(
            config.create_client(),
            Err(RedditClientError::ConfigError(_))
        ));
    }
}
