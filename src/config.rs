use serde::Deserialize;
use std::time::Duration;

use crate::error::DashboardResult;
use crate::models::ClusterSelection;

/// Origin of the backend when running against a local development server
pub const DEV_BACKEND_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Talk to the local development backend instead of the same-origin one
    #[serde(default)]
    pub development: bool,

    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    #[serde(default = "default_dev_backend_url")]
    pub dev_backend_url: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    #[serde(default)]
    pub current_cluster: Option<String>,
}

fn default_backend_url() -> String {
    String::new()
}

fn default_dev_backend_url() -> String {
    DEV_BACKEND_URL.to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    100
}

impl Config {
    pub fn load() -> DashboardResult<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_env(config::Environment::with_prefix("DASHBOARD"))
    }

    /// Unset keys take their defaults; a value that does not parse is an error
    fn from_env(env: config::Environment) -> DashboardResult<Self> {
        let config = config::Config::builder().add_source(env).build()?;

        Ok(config.try_deserialize()?)
    }

    /// Prefix prepended to every backend path
    pub fn url_prefix(&self) -> &str {
        let prefix = if self.development {
            &self.dev_backend_url
        } else {
            &self.backend_url
        };
        prefix.trim_end_matches('/')
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_selection(&self) -> ClusterSelection {
        ClusterSelection::from_param(self.current_cluster.as_deref())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            development: false,
            backend_url: default_backend_url(),
            dev_backend_url: default_dev_backend_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            channel_capacity: default_channel_capacity(),
            current_cluster: None,
        }
    }
}
