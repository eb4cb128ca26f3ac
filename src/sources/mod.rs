//! # Sources Module
//!
//! Track model and the providers that feed it.
//!
//! - [`youtube`] - primary search/stream provider backed by yt-dlp
//! - [`spotify`] - optional catalog provider (metadata only, never a stream)
//! - [`classify`] - decides what kind of reference a query is
//! - [`resolver`] - runs the resolution strategies for a query

pub mod classify;
pub mod resolver;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::UserId;
use std::time::Duration;

use crate::error::ResolutionError;

pub use resolver::TrackResolver;
pub use spotify::SpotifyClient;
pub use youtube::YtDlpClient;

/// Usuario que pidió la canción
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: UserId,
    pub username: String,
    pub avatar: Option<String>,
}

impl Requester {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            avatar: None,
        }
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// Tipos de fuentes de música
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    YouTube,
    Spotify,
    Direct,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "youtube",
            SourceType::Spotify => "spotify",
            SourceType::Direct => "direct",
        }
    }
}

/// Track resuelto y reproducible (inmutable)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    id: String,
    title: String,
    artist: Option<String>,
    #[serde(rename = "duration")]
    duration_secs: u64,
    thumbnail: Option<String>,
    url: String,
    requester: Requester,
    source: SourceType,
    resolved_at: DateTime<Utc>,
}

impl Track {
    /// Construye el track a partir del candidato del proveedor principal
    pub(crate) fn from_candidate(candidate: Candidate, requester: Requester) -> Self {
        Self {
            id: candidate.id,
            title: candidate.title,
            artist: candidate.artist,
            duration_secs: candidate.duration_secs,
            thumbnail: candidate.thumbnail,
            url: candidate.url,
            requester,
            source: candidate.source,
            resolved_at: Utc::now(),
        }
    }

    /// Metadata del catálogo con el stream encontrado por el proveedor principal
    pub(crate) fn from_catalog(
        meta: CatalogTrack,
        playable: Candidate,
        requester: Requester,
    ) -> Self {
        Self {
            id: playable.id,
            title: meta.title,
            artist: Some(meta.artist),
            duration_secs: meta.duration_secs,
            thumbnail: meta.thumbnail.or(playable.thumbnail),
            url: playable.url,
            requester,
            source: SourceType::Spotify,
            resolved_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
    pub fn thumbnail(&self) -> Option<&str> {
        self.thumbnail.as_deref()
    }
    /// Referencia que recibe la salida de audio
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn requester(&self) -> &Requester {
        &self.requester
    }
    pub fn source(&self) -> SourceType {
        self.source
    }
    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }
}

/// Resultado crudo de un proveedor de búsqueda
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
    pub url: String,
    pub source: SourceType,
}

/// Metadata canónica del catálogo (sin stream reproducible)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration_secs: u64,
    pub thumbnail: Option<String>,
}

impl CatalogTrack {
    /// Texto usado para encontrar el equivalente reproducible
    pub fn search_text(&self) -> String {
        format!("{} {}", self.artist, self.title)
    }
}

/// Proveedor principal; devuelve candidatos en orden de relevancia
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Metadata de una URL directa
    async fn lookup(&self, reference: &str) -> Result<Vec<Candidate>, ResolutionError>;

    /// Búsqueda por texto
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, ResolutionError>;
}

/// Proveedor de catálogo (solo metadata)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn track(&self, id: &str) -> Result<CatalogTrack, ResolutionError>;
}

#[cfg(test)]
pub(crate) fn test_track(id: &str) -> Track {
    Track::from_candidate(
        Candidate {
            id: id.to_string(),
            title: format!("Track {}", id),
            artist: Some("Test Artist".to_string()),
            duration_secs: 180,
            thumbnail: None,
            url: format!("https://www.youtube.com/watch?v={}", id),
            source: SourceType::YouTube,
        },
        Requester::new(UserId::new(42), "tester"),
    )
}
