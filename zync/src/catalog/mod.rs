//! Music catalog client: track search behind a cached client-credentials token.
//!
//! The token is cached until `expires_in − margin` and refreshed on demand.
//! Refreshes are single-flight: the cache sits behind an async mutex that is
//! held across the exchange, so concurrent searches wait for one exchange
//! instead of starting their own.

mod debounce;

pub use debounce::Debouncer;

use crate::config::CatalogConfig;
use crate::types::{AlbumImage, Track, TrackId};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use zync_core::environment::Clock;

/// Queries shorter than this are answered with [`SearchOutcome::Empty`]
pub const MIN_QUERY_CHARS: usize = 2;

/// Catalog errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// No client id / secret configured
    #[error("Catalog credentials are not configured")]
    MissingCredentials,

    /// Request never produced a response
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Non-success status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Body did not match the documented shape
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),
}

/// Result of a track search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// At least one match
    Found(Vec<Track>),
    /// Query too short, or nothing matched
    Empty,
    /// The search could not be performed
    Failed(CatalogError),
}

impl SearchOutcome {
    /// Matched tracks; empty for `Empty` and `Failed`
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        match self {
            Self::Found(tracks) => tracks,
            Self::Empty | Self::Failed(_) => &[],
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Paging,
}

#[derive(Deserialize)]
struct Paging {
    #[serde(default)]
    items: Vec<TrackObject>,
}

#[derive(Deserialize)]
struct TrackObject {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistObject>,
    album: AlbumObject,
    uri: String,
}

#[derive(Deserialize)]
struct ArtistObject {
    name: String,
}

#[derive(Deserialize)]
struct AlbumObject {
    name: String,
    #[serde(default)]
    images: Vec<AlbumImage>,
}

impl From<TrackObject> for Track {
    fn from(track: TrackObject) -> Self {
        Self {
            id: TrackId::new(track.id),
            name: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            album_name: track.album.name,
            album_images: track.album.images,
            uri: track.uri,
        }
    }
}

/// Catalog search client
pub struct CatalogClient {
    http: Client,
    config: CatalogConfig,
    clock: Arc<dyn Clock>,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("token_url", &self.config.token_url)
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}

impl CatalogClient {
    /// Create a client
    ///
    /// Missing credentials are not an error here; searches then fail with
    /// [`CatalogError::MissingCredentials`].
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::RequestFailed`] if the HTTP client cannot be built.
    pub fn new(config: CatalogConfig, clock: Arc<dyn Clock>) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CatalogError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http,
            config,
            clock,
            token: Mutex::new(None),
        })
    }

    /// A valid access token, exchanging credentials if the cached one expired
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the exchange fails.
    pub async fn access_token(&self) -> Result<String, CatalogError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if self.clock.now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange().await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Search tracks by free text
    #[tracing::instrument(skip(self, query), fields(query_len = query.chars().count()))]
    pub async fn search_tracks(&self, query: &str) -> SearchOutcome {
        if query.chars().count() < MIN_QUERY_CHARS {
            return SearchOutcome::Empty;
        }

        match self.search(query).await {
            Ok(tracks) if tracks.is_empty() => SearchOutcome::Empty,
            Ok(tracks) => {
                tracing::debug!(results = tracks.len(), "Track search finished");
                SearchOutcome::Found(tracks)
            },
            Err(e) => {
                tracing::warn!(error = %e, "Track search failed");
                SearchOutcome::Failed(e)
            },
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<Track>, CatalogError> {
        let token = self.access_token().await?;
        let limit = self.config.search_limit.to_string();

        let response = self
            .http
            .get(format!("{}/search", self.config.api_url.trim_end_matches('/')))
            .bearer_auth(&token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| CatalogError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.forget_token(&token).await;
            }
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::ResponseParseFailed(e.to_string()))?;
        Ok(body.tracks.items.into_iter().map(Track::from).collect())
    }

    /// Drop the cached token if it is still the one the catalog refused
    ///
    /// A concurrent caller may already have replaced it with a fresh one.
    async fn forget_token(&self, refused: &str) {
        let mut cached = self.token.lock().await;
        if cached.as_ref().is_some_and(|t| t.value == refused) {
            *cached = None;
        }
    }

    async fn exchange(&self) -> Result<CachedToken, CatalogError> {
        let (Some(client_id), Some(client_secret)) = (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(CatalogError::MissingCredentials);
        };

        metrics::counter!("zync.catalog.token_exchanges").increment(1);
        tracing::debug!("Exchanging catalog client credentials");

        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| CatalogError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::ResponseParseFailed(e.to_string()))?;

        let lifetime = i64::try_from(body.expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(chrono::Duration::zero);
        let margin = chrono::Duration::from_std(self.config.expiry_margin).unwrap_or_else(|_| chrono::Duration::zero());
        let now = self.clock.now();
        Ok(CachedToken {
            value: body.access_token,
            expires_at: now.checked_add_signed(lifetime - margin).unwrap_or(now),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use zync_testing::test_clock;

    #[test]
    fn track_object_maps_to_track() {
        let json = r#"{
            "id": "t1",
            "name": "Blue Monday",
            "artists": [{"name": "New Order"}, {"name": "Guest"}],
            "album": {"name": "Power, Corruption & Lies", "images": [{"url": "https://img/1", "height": 640, "width": 640}]},
            "uri": "spotify:track:t1"
        }"#;
        let track: Track = serde_json::from_str::<TrackObject>(json).unwrap().into();

        assert_eq!(track.id.as_str(), "t1");
        assert_eq!(track.artist_line(), "New Order, Guest");
        assert_eq!(track.album_images[0].height, Some(640));
    }

    #[tokio::test]
    async fn unauthorized_search_keeps_a_newer_token() {
        let client = CatalogClient::new(CatalogConfig::default(), Arc::new(test_clock())).unwrap();
        let fresh = CachedToken {
            value: "fresh".to_string(),
            expires_at: test_clock().now() + chrono::Duration::hours(1),
        };
        *client.token.lock().await = Some(fresh);

        client.forget_token("stale").await;
        assert_eq!(client.access_token().await.unwrap(), "fresh");

        client.forget_token("fresh").await;
        assert!(client.token.lock().await.is_none());
    }

    #[tokio::test]
    async fn short_query_is_empty_without_credentials() {
        let client = CatalogClient::new(CatalogConfig::default(), Arc::new(test_clock())).unwrap();
        assert_eq!(client.search_tracks("a").await, SearchOutcome::Empty);
    }

    #[tokio::test]
    async fn missing_credentials_fail_the_search() {
        let client = CatalogClient::new(CatalogConfig::default(), Arc::new(test_clock())).unwrap();
        assert_eq!(
            client.search_tracks("daft punk").await,
            SearchOutcome::Failed(CatalogError::MissingCredentials)
        );
    }
}
