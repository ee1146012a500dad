//! Spotify track search.
//!
//! Uses the client-credentials flow; the access token is cached until
//! shortly before it expires.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mood_models::RecommendedSong;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// Music search capability: `genre -> optional track`.
#[async_trait]
pub trait MusicSearch: Send + Sync {
    /// First track found for `genre`, `None` when the search is empty.
    async fn search_track(&self, genre: &str) -> WorkerResult<Option<RecommendedSong>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// Spotify credentials and endpoints.
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Token endpoint base, `https://accounts.spotify.com`
    pub accounts_url: String,
    /// Web API base, `https://api.spotify.com`
    pub api_url: String,
    pub timeout: Duration,
}

impl SpotifyConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            accounts_url: "https://accounts.spotify.com".to_string(),
            api_url: "https://api.spotify.com".to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    /// Read `SPOTIFY_CLIENT_ID`/`SPOTIFY_CLIENT_SECRET`.
    ///
    /// Returns `None` unless both are set and non-empty.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("SPOTIFY_CLIENT_ID").ok().filter(|s| !s.is_empty())?;
        let client_secret = std::env::var("SPOTIFY_CLIENT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())?;
        Some(Self::new(client_id, client_secret))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    name: Option<String>,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

impl From<Track> for RecommendedSong {
    fn from(track: Track) -> Self {
        let fallback = RecommendedSong::unknown();
        Self {
            track_name: track.name.unwrap_or(fallback.track_name),
            artist: track
                .artists
                .into_iter()
                .next()
                .and_then(|a| a.name)
                .unwrap_or(fallback.artist),
            url: track.external_urls.spotify.unwrap_or(fallback.url),
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client.
pub struct SpotifyClient {
    config: SpotifyConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig) -> WorkerResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> WorkerResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/api/token", self.config.accounts_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| WorkerError::music_search(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::music_search(format!(
                "Token endpoint returned {}: {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            WorkerError::music_search(format!("Failed to parse token response: {}", e))
        })?;

        // Refresh a minute early
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        debug!(expires_in = token.expires_in, "Fetched Spotify access token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl MusicSearch for SpotifyClient {
    async fn search_track(&self, genre: &str) -> WorkerResult<Option<RecommendedSong>> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/search", self.config.api_url);
        let query = format!("genre:{} track", genre);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| WorkerError::music_search(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::music_search(format!(
                "Search returned {}: {}",
                status, error_text
            )));
        }

        let search: SearchResponse = response.json().await.map_err(|e| {
            WorkerError::music_search(format!("Failed to parse search response: {}", e))
        })?;

        Ok(search
            .tracks
            .and_then(|page| page.items.into_iter().next())
            .map(RecommendedSong::from))
    }

    fn name(&self) -> &'static str {
        "spotify"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> SpotifyClient {
        let mut config = SpotifyConfig::new("id", "secret");
        config.accounts_url = server.uri();
        config.api_url = server.uri();
        SpotifyClient::new(config).unwrap()
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_search_track() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("q", "genre:acoustic track"))
            .and(query_param("type", "track"))
            .and(query_param("limit", "1"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tracks": {"items": [{
                    "name": "Skinny Love",
                    "artists": [{"name": "Bon Iver"}],
                    "external_urls": {"spotify": "https://open.spotify.com/track/1"}
                }]}
            })))
            .mount(&server)
            .await;

        let song = client_for(&server).search_track("acoustic").await.unwrap();
        assert_eq!(
            song,
            Some(RecommendedSong {
                track_name: "Skinny Love".to_string(),
                artist: "Bon Iver".to_string(),
                url: "https://open.spotify.com/track/1".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_empty_search_is_none() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"tracks": {"items": []}})),
            )
            .mount(&server)
            .await;

        assert_eq!(client_for(&server).search_track("metal").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_is_cached() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"tracks": {"items": []}})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.search_track("pop").await.unwrap();
        client.search_track("rock").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let err = client_for(&server).search_track("pop").await.unwrap_err();
        assert!(matches!(err, WorkerError::MusicSearch(_)));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_track_missing_fields_use_sentinels() {
        let track: Track = serde_json::from_str(r#"{"name": "Intro", "artists": []}"#).unwrap();
        let song = RecommendedSong::from(track);
        assert_eq!(song.track_name, "Intro");
        assert_eq!(song.artist, "Unknown");
        assert_eq!(song.url, "#");
    }
}
