//! Query classification.
//!
//! Pattern matching against the reference shapes we know about. Anything that
//! is not a URL and not a catalog URI is treated as free text.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::error::ResolutionError;

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^https?://open\.spotify\.com/(?:intl-[a-z]{2}(?:-[A-Za-z]{2})?/)?(track|album|playlist|artist|episode|show)/([A-Za-z0-9]{22})(?:[/?#].*)?$",
    )
    .expect("regex de Spotify inválida")
});

static SPOTIFY_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^spotify:(track|album|playlist|artist|episode|show):([A-Za-z0-9]{22})$")
        .expect("regex de URI de Spotify inválida")
});

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?(.*&)?v=|embed/|v/|shorts/)|youtu\.be/|music\.youtube\.com/watch\?(.*&)?v=)[A-Za-z0-9_-]+",
    )
    .expect("regex de YouTube inválida")
});

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Tipo de referencia de una consulta
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    /// URL reproducible directamente
    Direct(String),
    /// Id de track del catálogo
    Catalog(String),
    /// Texto libre
    Search(String),
}

/// Clasifica una consulta
pub fn classify(query: &str) -> Result<QueryKind, ResolutionError> {
    let query = query.trim();

    if query.is_empty() {
        return Err(ResolutionError::InvalidReference(
            "la búsqueda está vacía".to_string(),
        ));
    }

    if let Some(kind) = classify_catalog(query)? {
        return Ok(kind);
    }

    let lower = query.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return classify_url(query);
    }

    Ok(QueryKind::Search(query.to_string()))
}

fn classify_catalog(query: &str) -> Result<Option<QueryKind>, ResolutionError> {
    let captures = SPOTIFY_URL
        .captures(query)
        .or_else(|| SPOTIFY_URI.captures(query));

    match captures {
        Some(caps) if &caps[1] == "track" => Ok(Some(QueryKind::Catalog(caps[2].to_string()))),
        Some(caps) => Err(ResolutionError::InvalidReference(format!(
            "solo se admiten canciones de Spotify, no '{}'",
            &caps[1]
        ))),
        None if query.contains("open.spotify.com") || query.starts_with("spotify:") => Err(
            ResolutionError::InvalidReference(format!("enlace de Spotify mal formado: {}", query)),
        ),
        None => Ok(None),
    }
}

fn classify_url(query: &str) -> Result<QueryKind, ResolutionError> {
    let parsed = Url::parse(query)
        .map_err(|_| ResolutionError::InvalidReference(format!("URL mal formada: {}", query)))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| ResolutionError::InvalidReference(format!("URL sin host: {}", query)))?;

    if YOUTUBE_HOSTS.contains(&host) && !YOUTUBE_URL.is_match(query) {
        return Err(ResolutionError::InvalidReference(format!(
            "URL de YouTube no reconocida: {}",
            query
        )));
    }

    Ok(QueryKind::Direct(parsed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_url_detection() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://music.youtube.com/watch?v=test",
            "https://www.youtube.com/watch?list=PL1&v=abc",
        ] {
            assert!(
                matches!(classify(url), Ok(QueryKind::Direct(_))),
                "{} debería ser directa",
                url
            );
        }
    }

    #[test]
    fn generic_watch_urls_are_direct() {
        assert_eq!(
            classify("https://provider/watch?id=abc").unwrap(),
            QueryKind::Direct("https://provider/watch?id=abc".to_string())
        );
    }

    #[test]
    fn spotify_tracks_are_catalog_references() {
        assert_eq!(
            classify("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=xyz").unwrap(),
            QueryKind::Catalog("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            classify("https://open.spotify.com/intl-es/track/4uLU6hMCjMI75M1A2tKUQC").unwrap(),
            QueryKind::Catalog("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
        assert_eq!(
            classify("spotify:track:4uLU6hMCjMI75M1A2tKUQC").unwrap(),
            QueryKind::Catalog("4uLU6hMCjMI75M1A2tKUQC".to_string())
        );
    }

    #[test]
    fn non_track_spotify_links_are_rejected() {
        assert!(matches!(
            classify("https://open.spotify.com/album/4uLU6hMCjMI75M1A2tKUQC"),
            Err(ResolutionError::InvalidReference(_))
        ));
        assert!(matches!(
            classify("https://open.spotify.com/track/short"),
            Err(ResolutionError::InvalidReference(_))
        ));
    }

    #[test]
    fn malformed_references_are_rejected() {
        assert!(matches!(
            classify("https://www.youtube.com/feed/trending"),
            Err(ResolutionError::InvalidReference(_))
        ));
        assert!(matches!(
            classify("https://"),
            Err(ResolutionError::InvalidReference(_))
        ));
        assert!(matches!(
            classify("   "),
            Err(ResolutionError::InvalidReference(_))
        ));
    }

    #[test]
    fn everything_else_is_free_text() {
        assert_eq!(
            classify("  daft punk one more time ").unwrap(),
            QueryKind::Search("daft punk one more time".to_string())
        );
    }
}
