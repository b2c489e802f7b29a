//! Spotify Web API track search.
//!
//! Authenticates with the client-credentials flow. The access token is cached
//! and refreshed a minute before it expires.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{check_status, REQUEST_TIMEOUT, USER_AGENT};
use crate::error::ProviderError;
use crate::matcher::MetadataProvider;
use crate::models::TrackCandidate;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_API_BASE: &str = "https://api.spotify.com/v1";
const SEARCH_LIMIT: &str = "5";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: Option<TrackPage>,
}

#[derive(Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
    #[serde(default)]
    popularity: i32,
    duration_ms: i64,
}

#[derive(Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize)]
struct SpotifyAlbum {
    name: String,
}

impl From<SpotifyTrack> for TrackCandidate {
    fn from(t: SpotifyTrack) -> Self {
        Self {
            external_id: t.id,
            name: t.name,
            artists: t.artists.into_iter().map(|a| a.name).collect(),
            album: t.album.map(|a| a.name).unwrap_or_default(),
            popularity: t.popularity,
            duration_ms: t.duration_ms,
        }
    }
}

fn parse_search(body: &str) -> Result<Vec<TrackCandidate>, ProviderError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    Ok(response
        .tracks
        .map(|page| page.items.into_iter().map(TrackCandidate::from).collect())
        .unwrap_or_default())
}

pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: &str, client_secret: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(None),
        })
    }

    fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()?;
        let response = check_status(response)?.ok_or_else(|| ProviderError::Api {
            status: StatusCode::NOT_FOUND.as_u16(),
            message: "token endpoint not found".to_string(),
        })?;
        let body: TokenResponse = response.json()?;

        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("Fetched Spotify access token (valid {:?})", lifetime);
        *cached = Some(CachedToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(body.access_token)
    }

    fn invalidate_token(&self) {
        *self
            .token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

impl MetadataProvider for SpotifyClient {
    fn name(&self) -> &str {
        "spotify"
    }

    fn search(&self, query: &str) -> Result<Vec<TrackCandidate>, ProviderError> {
        let token = self.access_token()?;
        let response = self
            .client
            .get(format!("{}/search", SPOTIFY_API_BASE))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", SEARCH_LIMIT)])
            .send()?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token();
        }

        match check_status(response)? {
            Some(response) => parse_search(&response.text()?),
            None => Ok(Vec::new()),
        }
    }
}
