//! Client configuration

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::gateway::{Gateway, MemoryGateway, RestGateway};
use crate::{ClientError, ClientResult};

/// Backend gateway implementation selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayKind {
    /// In-process fake, optionally seeded with the demo catalog
    #[default]
    Memory,
    /// PostgREST-style HTTP backend
    Rest,
}

impl FromStr for GatewayKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mock" => Ok(GatewayKind::Memory),
            "rest" | "http" => Ok(GatewayKind::Rest),
            other => Err(ClientError::Config(format!("unknown gateway '{}'", other))),
        }
    }
}

/// Till client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Which gateway to build
    pub gateway: GatewayKind,

    /// Backend base URL (e.g., "http://localhost:54321")
    pub base_url: String,

    /// Backend anon/service key
    pub api_key: Option<String>,

    /// Signed-in user token, falls back to the api key
    pub access_token: Option<String>,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Change feed poll interval in milliseconds (REST gateway)
    pub realtime_poll_ms: u64,

    /// Seed the in-memory gateway with the demo catalog
    pub seed_demo_data: bool,

    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
}

impl ClientConfig {
    /// Create a configuration for the given backend URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            gateway: GatewayKind::Memory,
            base_url: base_url.into(),
            api_key: None,
            access_token: None,
            timeout: 15,
            realtime_poll_ms: 2000,
            seed_demo_data: true,
            log_level: "info".to_string(),
            log_json: false,
            log_dir: None,
        }
    }

    /// Load from `.env` and the process environment
    ///
    /// | Env var | Default |
    /// |---------|---------|
    /// | TILL_GATEWAY | memory |
    /// | TILL_BACKEND_URL | http://localhost:54321 |
    /// | TILL_BACKEND_KEY | - |
    /// | TILL_ACCESS_TOKEN | - |
    /// | TILL_REQUEST_TIMEOUT | 15 |
    /// | TILL_REALTIME_POLL_MS | 2000 |
    /// | TILL_SEED_DEMO | true |
    /// | TILL_LOG_LEVEL | info |
    /// | TILL_LOG_JSON | false |
    /// | TILL_LOG_DIR | - |
    pub fn from_env() -> ClientResult<Self> {
        dotenv::dotenv().ok();

        let gateway = match std::env::var("TILL_GATEWAY") {
            Ok(value) => value.parse()?,
            Err(_) => GatewayKind::Memory,
        };

        Ok(Self {
            gateway,
            base_url: std::env::var("TILL_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:54321".into()),
            api_key: std::env::var("TILL_BACKEND_KEY").ok().filter(|v| !v.is_empty()),
            access_token: std::env::var("TILL_ACCESS_TOKEN")
                .ok()
                .filter(|v| !v.is_empty()),
            timeout: std::env::var("TILL_REQUEST_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            realtime_poll_ms: std::env::var("TILL_REALTIME_POLL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2000),
            seed_demo_data: std::env::var("TILL_SEED_DEMO")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            log_level: std::env::var("TILL_LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: std::env::var("TILL_LOG_JSON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_dir: std::env::var("TILL_LOG_DIR").ok().filter(|v| !v.is_empty()),
        })
    }

    /// Use the in-memory gateway
    pub fn memory() -> Self {
        Self::new("memory://").with_gateway(GatewayKind::Memory)
    }

    /// Use the REST gateway
    pub fn rest(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new(base_url)
            .with_gateway(GatewayKind::Rest)
            .with_api_key(api_key)
    }

    pub fn with_gateway(mut self, gateway: GatewayKind) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the signed-in user token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_realtime_poll_ms(mut self, millis: u64) -> Self {
        self.realtime_poll_ms = millis;
        self
    }

    pub fn with_seed_demo_data(mut self, seed: bool) -> Self {
        self.seed_demo_data = seed;
        self
    }

    pub fn with_logging(mut self, level: impl Into<String>, json: bool) -> Self {
        self.log_level = level.into();
        self.log_json = json;
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<String>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn realtime_poll_interval(&self) -> Duration {
        Duration::from_millis(self.realtime_poll_ms.max(100))
    }

    /// Bearer token sent with every REST call
    pub fn bearer_token(&self) -> Option<&str> {
        self.access_token.as_deref().or(self.api_key.as_deref())
    }

    /// Build the configured gateway
    ///
    /// The REST gateway starts its change-feed poller, so this must run
    /// inside a tokio runtime.
    pub fn build_gateway(&self) -> ClientResult<Arc<dyn Gateway>> {
        match self.gateway {
            GatewayKind::Memory => {
                let gateway = if self.seed_demo_data {
                    MemoryGateway::seeded()
                } else {
                    MemoryGateway::new()
                };
                tracing::info!(seeded = self.seed_demo_data, "Using in-memory gateway");
                Ok(Arc::new(gateway))
            }
            GatewayKind::Rest => {
                if self.api_key.is_none() {
                    return Err(ClientError::Config(
                        "TILL_BACKEND_KEY is required for the rest gateway".to_string(),
                    ));
                }
                tracing::info!(base_url = %self.base_url, "Using REST gateway");
                Ok(Arc::new(RestGateway::connect(self)?))
            }
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_kind_parse() {
        assert_eq!("memory".parse::<GatewayKind>().unwrap(), GatewayKind::Memory);
        assert_eq!(" REST ".parse::<GatewayKind>().unwrap(), GatewayKind::Rest);
        assert!(matches!(
            "sqlite".parse::<GatewayKind>(),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_bearer_prefers_access_token() {
        let config = ClientConfig::rest("http://localhost:54321", "anon");
        assert_eq!(config.bearer_token(), Some("anon"));
        let config = config.with_access_token("user-jwt");
        assert_eq!(config.bearer_token(), Some("user-jwt"));
    }

    #[test]
    fn test_rest_without_key_is_config_error() {
        let config = ClientConfig::new("http://localhost:54321").with_gateway(GatewayKind::Rest);
        assert!(matches!(config.build_gateway(), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::memory();
        assert_eq!(config.timeout, 15);
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
        assert!(config.seed_demo_data);
        assert_eq!(config.log_level, "info");
    }
}
