use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{Candidate, SearchProvider, SourceType};
use crate::error::ResolutionError;

const PROVIDER: &str = "yt-dlp";

/// Cliente para interactuar con YouTube/yt-dlp
pub struct YtDlpClient {
    binary: String,
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    channel: Option<String>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<Thumbnail>>,
    webpage_url: Option<String>,
    url: Option<String>,
    extractor_key: Option<String>,
    ie_key: Option<String>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Ejecuta yt-dlp y devuelve stdout
    async fn run(&self, args: &[&str]) -> Result<String, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::unavailable(PROVIDER, e.to_string()))?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                warn!("❌ No se pudo ejecutar {}: {}", self.binary, e);
                ResolutionError::unavailable(PROVIDER, format!("no se pudo ejecutar yt-dlp: {}", e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let target = args.last().copied().unwrap_or_default();
            return Err(classify_failure(&stderr, target));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SearchProvider for YtDlpClient {
    async fn lookup(&self, reference: &str) -> Result<Vec<Candidate>, ResolutionError> {
        debug!("📊 Obteniendo info de: {}", reference);

        let stdout = self
            .run(&["--no-playlist", "--dump-json", "--no-warnings", reference])
            .await?;

        Ok(parse_candidates(&stdout))
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Candidate>, ResolutionError> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit.max(1), query);
        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_candidates(&stdout))
    }
}

/// Traduce el stderr de yt-dlp a un error tipado
fn classify_failure(stderr: &str, target: &str) -> ResolutionError {
    let lower = stderr.to_lowercase();

    if lower.contains("unsupported url") {
        ResolutionError::InvalidReference(target.to_string())
    } else if lower.contains("video unavailable")
        || lower.contains("not found")
        || lower.contains("http error 404")
        || lower.contains("private video")
    {
        ResolutionError::NotFound(target.to_string())
    } else {
        let reason = stderr.lines().last().unwrap_or("estado distinto de cero");
        ResolutionError::unavailable(PROVIDER, reason.trim().to_string())
    }
}

/// Convierte la salida JSON (una entrada por línea) en candidatos, en orden
fn parse_candidates(stdout: &str) -> Vec<Candidate> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info),
            Err(e) => {
                debug!("Línea de yt-dlp ignorada: {}", e);
                None
            }
        })
        .filter(|info| !info.is_live.unwrap_or(false))
        .map(info_to_candidate)
        .collect()
}

fn info_to_candidate(info: YtDlpInfo) -> Candidate {
    let extractor = info
        .extractor_key
        .as_deref()
        .or(info.ie_key.as_deref())
        .unwrap_or_default();
    let source = if extractor.eq_ignore_ascii_case("youtube") {
        SourceType::YouTube
    } else {
        SourceType::Direct
    };

    let url = info
        .webpage_url
        .or(info.url)
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", info.id));

    let thumbnail = info.thumbnail.or_else(|| {
        info.thumbnails
            .and_then(|thumbs| thumbs.into_iter().last().map(|t| t.url))
    });

    Candidate {
        title: info.title.unwrap_or_else(|| info.id.clone()),
        id: info.id,
        artist: info.uploader.or(info.channel),
        duration_secs: info.duration.map(|d| d.round() as u64).unwrap_or(0),
        thumbnail,
        url,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_flat_search_entries_in_order() {
        let stdout = concat!(
            r#"{"id":"aaa","title":"First","duration":212.6,"channel":"Chan","url":"https://www.youtube.com/watch?v=aaa","ie_key":"Youtube","thumbnails":[{"url":"https://i.ytimg.com/small.jpg"},{"url":"https://i.ytimg.com/big.jpg"}]}"#,
            "\n",
            "not json\n",
            r#"{"id":"bbb","title":"Second","duration":null,"ie_key":"Youtube"}"#,
            "\n",
        );

        let candidates = parse_candidates(stdout);

        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0],
            Candidate {
                id: "aaa".to_string(),
                title: "First".to_string(),
                artist: Some("Chan".to_string()),
                duration_secs: 213,
                thumbnail: Some("https://i.ytimg.com/big.jpg".to_string()),
                url: "https://www.youtube.com/watch?v=aaa".to_string(),
                source: SourceType::YouTube,
            }
        );
        assert_eq!(candidates[1].url, "https://www.youtube.com/watch?v=bbb");
        assert_eq!(candidates[1].duration_secs, 0);
    }

    #[test]
    fn parses_direct_lookup_from_other_extractors() {
        let stdout = r#"{"id":"abc","title":"Clip","duration":30,"uploader":"someone","webpage_url":"https://provider/watch?id=abc","extractor_key":"Generic","thumbnail":"https://provider/abc.jpg"}"#;

        let candidates = parse_candidates(stdout);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, "abc");
        assert_eq!(candidates[0].source, SourceType::Direct);
        assert_eq!(candidates[0].url, "https://provider/watch?id=abc");
    }

    #[test]
    fn live_streams_are_skipped() {
        let stdout = r#"{"id":"live","title":"24/7 radio","is_live":true,"ie_key":"Youtube"}"#;
        assert!(parse_candidates(stdout).is_empty());
    }

    #[test]
    fn stderr_maps_to_typed_errors() {
        assert!(matches!(
            classify_failure("ERROR: Unsupported URL: https://x", "https://x"),
            ResolutionError::InvalidReference(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Video unavailable", "abc"),
            ResolutionError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: unable to download webpage: timed out", "abc"),
            ResolutionError::ProviderUnavailable { .. }
        ));
    }
}
