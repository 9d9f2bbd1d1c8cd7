//! Configuration management for the Zync client.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::cart::{approval_probability, DEFAULT_APPROVAL_RATE};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct ZyncConfig {
    /// Zync backend
    pub api: ApiConfig,
    /// Music catalog
    pub catalog: CatalogConfig,
    /// Simulated payment gateway
    pub checkout: CheckoutConfig,
    /// Token persistence
    pub storage: StorageConfig,
    /// Log filter (`RUST_LOG` syntax)
    pub log_level: String,
}

/// Backend API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.zync.example`
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Music catalog configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Client-credentials id
    pub client_id: Option<String>,
    /// Client-credentials secret
    pub client_secret: Option<String>,
    /// Token endpoint
    pub token_url: String,
    /// API root; searches go to `{api_url}/search`
    pub api_url: String,
    /// Results per search
    pub search_limit: u8,
    /// Tokens are treated as expired this long before the declared expiry
    pub expiry_margin: Duration,
    /// Per-request timeout for token exchanges and searches
    pub timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: "https://accounts.spotify.com/api/token".to_string(),
            api_url: "https://api.spotify.com/v1".to_string(),
            search_limit: 10,
            expiry_margin: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
        }
    }
}

impl CatalogConfig {
    /// Set client credentials
    #[must_use]
    pub fn with_credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Point both endpoints at another host (used against local mocks)
    #[must_use]
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_url = api_url.into();
        self
    }

    /// Override the per-request timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` when both credentials are present
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// Simulated payment gateway configuration
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Simulated processing time
    pub latency: Duration,
    /// Probability in `[0, 1]` that a charge is approved
    pub approval_rate: f64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(2000),
            approval_rate: DEFAULT_APPROVAL_RATE,
        }
    }
}

impl CheckoutConfig {
    /// Override the simulated latency
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Override the approval probability (clamped to `[0, 1]`, default when not finite)
    #[must_use]
    pub fn with_approval_rate(mut self, approval_rate: f64) -> Self {
        self.approval_rate = approval_probability(approval_rate);
        self
    }
}

/// Token persistence configuration
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    /// Directory for the file-backed token store; in-memory when unset
    pub token_dir: Option<PathBuf>,
}

impl ZyncConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let catalog_defaults = CatalogConfig::default();
        let checkout_defaults = CheckoutConfig::default();

        Self {
            api: ApiConfig {
                base_url: env::var("ZYNC_API_URL")
                    .unwrap_or_else(|_| ApiConfig::default().base_url),
                timeout_secs: env::var("ZYNC_API_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            },
            catalog: CatalogConfig {
                client_id: env::var("ZYNC_CATALOG_CLIENT_ID").ok(),
                client_secret: env::var("ZYNC_CATALOG_CLIENT_SECRET").ok(),
                token_url: env::var("ZYNC_CATALOG_TOKEN_URL")
                    .unwrap_or(catalog_defaults.token_url),
                api_url: env::var("ZYNC_CATALOG_API_URL")
                    .unwrap_or(catalog_defaults.api_url),
                timeout: env::var("ZYNC_CATALOG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map_or(catalog_defaults.timeout, Duration::from_secs),
                ..catalog_defaults
            },
            checkout: CheckoutConfig {
                latency: env::var("ZYNC_CHECKOUT_LATENCY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .map_or(checkout_defaults.latency, Duration::from_millis),
                approval_rate: env::var("ZYNC_CHECKOUT_APPROVAL_RATE")
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .map_or(checkout_defaults.approval_rate, approval_probability),
            },
            storage: StorageConfig {
                token_dir: env::var("ZYNC_TOKEN_DIR").ok().map(PathBuf::from),
            },
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }

    /// Replace the backend section
    #[must_use]
    pub fn with_api(mut self, api: ApiConfig) -> Self {
        self.api = api;
        self
    }

    /// Replace the catalog section
    #[must_use]
    pub fn with_catalog(mut self, catalog: CatalogConfig) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the checkout section
    #[must_use]
    pub fn with_checkout(mut self, checkout: CheckoutConfig) -> Self {
        self.checkout = checkout;
        self
    }

    /// Persist the token as a file under `dir`
    #[must_use]
    pub fn with_token_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.token_dir = Some(dir.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_production_catalog() {
        let config = CatalogConfig::default();
        assert_eq!(config.token_url, "https://accounts.spotify.com/api/token");
        assert_eq!(config.search_limit, 10);
        assert_eq!(config.expiry_margin, Duration::from_secs(60));
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(!config.has_credentials());
    }

    #[test]
    fn approval_rate_is_clamped() {
        let config = CheckoutConfig::default().with_approval_rate(3.0);
        assert!((config.approval_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_finite_approval_rate_uses_the_default() {
        let config = CheckoutConfig::default().with_approval_rate(f64::NAN);
        assert!((config.approval_rate - DEFAULT_APPROVAL_RATE).abs() < f64::EPSILON);

        let parsed: f64 = "NaN".parse().unwrap();
        assert!((approval_probability(parsed) - DEFAULT_APPROVAL_RATE).abs() < f64::EPSILON);
    }

    #[test]
    fn builders_compose() {
        let config = ZyncConfig::default()
            .with_checkout(CheckoutConfig::default().with_latency(Duration::from_millis(5)))
            .with_token_dir("/tmp/zync");

        assert_eq!(config.checkout.latency, Duration::from_millis(5));
        assert_eq!(config.storage.token_dir, Some(PathBuf::from("/tmp/zync")));
    }
}
