use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::polling::PollingSearchService;
use crate::service::SearchService;
use crate::streaming::StreamingSearchService;

/// Search client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Backend `host[:port]`, no scheme.
    pub host: String,
    /// Use the WebSocket transport instead of HTTP polling.
    pub streaming: bool,
    /// Request/idle timeout in seconds.
    pub timeout_secs: u64,
}

impl SearchConfig {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            host: required_env("PACKDEX_HOST"),
            streaming: env::var("PACKDEX_STREAMING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            timeout_secs: env::var("PACKDEX_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("PACKDEX_TIMEOUT_SECS must be a number"),
        }
    }

    /// Build the configured transport strategy.
    pub fn service(&self) -> Arc<dyn SearchService> {
        let timeout = Duration::from_secs(self.timeout_secs);
        if self.streaming {
            tracing::info!(host = %self.host, "Using streaming package search");
            Arc::new(StreamingSearchService::with_timeout(&self.host, timeout))
        } else {
            Arc::new(PollingSearchService::with_timeout(&self.host, timeout))
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
