//! LRCLIB lyrics lookup (`GET /api/get`). No authentication.

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{check_status, REQUEST_TIMEOUT, USER_AGENT};
use crate::error::ProviderError;
use crate::lyrics::LyricsProvider;

const LRCLIB_API_BASE: &str = "https://lrclib.net/api";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibTrack {
    plain_lyrics: Option<String>,
    #[serde(default)]
    instrumental: bool,
}

/// Plain lyric text, None for instrumentals and empty bodies.
fn parse_lyrics(body: &str) -> Result<Option<String>, ProviderError> {
    let track: LrclibTrack =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    if track.instrumental {
        return Ok(None);
    }
    Ok(track.plain_lyrics.filter(|l| !l.trim().is_empty()))
}

pub struct LrclibClient {
    client: Client,
}

impl LrclibClient {
    pub fn new() -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl LyricsProvider for LrclibClient {
    fn name(&self) -> &str {
        "lrclib"
    }

    fn lyrics(&self, title: &str, artist: &str) -> Result<Option<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/get", LRCLIB_API_BASE))
            .query(&[("track_name", title), ("artist_name", artist)])
            .send()?;

        match check_status(response)? {
            Some(response) => parse_lyrics(&response.text()?),
            None => Ok(None),
        }
    }
}
