//! Spotify Web API catalog client.
//!
//! Only track metadata is read; Spotify never supplies the stream.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{CatalogProvider, CatalogTrack};
use crate::error::ResolutionError;

const PROVIDER: &str = "spotify";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Margen para renovar el token antes de que expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    duration_ms: u64,
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

impl SpotifyClient {
    pub fn new(http: reqwest::Client, client_id: String, client_secret: String) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Devuelve un token válido, pidiendo uno nuevo si hace falta
    async fn access_token(&self) -> Result<String, ResolutionError> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
            .map(|token| token.value.clone());
        if let Some(value) = cached {
            return Ok(value);
        }

        debug!("🔑 Solicitando token de Spotify");
        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));

        let response = self
            .http
            .post(TOKEN_URL)
            .header(header::AUTHORIZATION, format!("Basic {}", credentials))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(ResolutionError::unavailable(
                PROVIDER,
                format!("autenticación rechazada ({})", response.status()),
            ));
        }

        let body: TokenResponse = response.json().await.map_err(unavailable)?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);

        *self.token.lock() = Some(AccessToken {
            value: body.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        info!("✅ Token de Spotify renovado (válido {}s)", lifetime.as_secs());
        Ok(body.access_token)
    }
}

#[async_trait]
impl CatalogProvider for SpotifyClient {
    async fn track(&self, id: &str) -> Result<CatalogTrack, ResolutionError> {
        let token = self.access_token().await?;
        let url = format!("{}/tracks/{}", API_BASE, urlencoding::encode(id));

        debug!("🎧 Consultando catálogo de Spotify: {}", id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(unavailable)?;

        match response.status() {
            status if status.is_success() => {
                let track: SpotifyTrack = response.json().await.map_err(unavailable)?;
                to_catalog_track(track)
            }
            StatusCode::NOT_FOUND => Err(ResolutionError::NotFound(id.to_string())),
            StatusCode::BAD_REQUEST => Err(ResolutionError::InvalidReference(id.to_string())),
            StatusCode::UNAUTHORIZED => {
                // Token revocado: la próxima llamada pide otro
                self.token.lock().take();
                Err(ResolutionError::unavailable(PROVIDER, "token rechazado"))
            }
            status => Err(ResolutionError::unavailable(
                PROVIDER,
                format!("respuesta inesperada ({})", status),
            )),
        }
    }
}

fn unavailable(err: reqwest::Error) -> ResolutionError {
    ResolutionError::unavailable(PROVIDER, err.to_string())
}

fn to_catalog_track(track: SpotifyTrack) -> Result<CatalogTrack, ResolutionError> {
    let artist = track
        .artists
        .into_iter()
        .next()
        .map(|a| a.name)
        .ok_or_else(|| ResolutionError::NotFound(format!("{} (sin artista)", track.id)))?;

    // Spotify ordena las imágenes de mayor a menor
    let thumbnail = track
        .album
        .and_then(|album| album.images.into_iter().next())
        .map(|image| image.url);

    Ok(CatalogTrack {
        id: track.id,
        title: track.name,
        artist,
        duration_secs: track.duration_ms / 1000,
        thumbnail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn maps_track_payload() {
        let payload = r#"{
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "name": "Never Gonna Give You Up",
            "duration_ms": 213573,
            "artists": [{"name": "Rick Astley"}, {"name": "Someone Else"}],
            "album": {"images": [{"url": "https://i.scdn.co/640"}, {"url": "https://i.scdn.co/64"}]}
        }"#;
        let track: SpotifyTrack = serde_json::from_str(payload).unwrap();

        assert_eq!(
            to_catalog_track(track).unwrap(),
            CatalogTrack {
                id: "4uLU6hMCjMI75M1A2tKUQC".to_string(),
                title: "Never Gonna Give You Up".to_string(),
                artist: "Rick Astley".to_string(),
                duration_secs: 213,
                thumbnail: Some("https://i.scdn.co/640".to_string()),
            }
        );
    }

    #[test]
    fn track_without_artists_is_not_found() {
        let payload = r#"{"id":"x","name":"Orphan","duration_ms":1000,"artists":[],"album":null}"#;
        let track: SpotifyTrack = serde_json::from_str(payload).unwrap();

        assert!(matches!(
            to_catalog_track(track),
            Err(ResolutionError::NotFound(_))
        ));
    }
}
