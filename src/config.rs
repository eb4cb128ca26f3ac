use anyhow::{Context, Result};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::audio::queue::Volume;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Cola
    pub default_volume: Volume,
    pub max_queue_size: usize,

    // Resolución
    pub search_limit: usize,
    pub ytdlp_path: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Sesiones y eventos
    pub join_timeout_secs: u64,
    pub stats_interval_secs: u64,
    pub event_buffer: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env_with(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración desde cualquier fuente de variables
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let default_volume = match var("DEFAULT_VOLUME") {
            Some(raw) => {
                let value: i64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("DEFAULT_VOLUME no es un número: {:?}", raw))?;
                Volume::try_from(value)?
            }
            None => defaults.default_volume,
        };

        Ok(Self {
            // Discord
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN es obligatorio")?,

            // Cola
            default_volume,
            max_queue_size: parse_or(&var, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            // Resolución
            search_limit: parse_or(&var, "SEARCH_LIMIT", defaults.search_limit)?,
            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),

            // Sesiones y eventos
            join_timeout_secs: parse_or(&var, "JOIN_TIMEOUT_SECS", defaults.join_timeout_secs)?,
            stats_interval_secs: parse_or(
                &var,
                "STATS_INTERVAL_SECS",
                defaults.stats_interval_secs,
            )?,
            event_buffer: parse_or(&var, "EVENT_BUFFER", defaults.event_buffer)?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue size, search limit and event buffer must be > 0
    /// - Join timeout and stats interval must be > 0
    /// - Spotify credentials come in pairs
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN no puede estar vacío");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.search_limit == 0 {
            anyhow::bail!("Search limit must be greater than 0");
        }

        if self.join_timeout_secs == 0 {
            anyhow::bail!("Join timeout must be greater than 0");
        }

        if self.stats_interval_secs == 0 {
            anyhow::bail!("Stats interval must be greater than 0");
        }

        if self.event_buffer == 0 {
            anyhow::bail!("Event buffer must be greater than 0");
        }

        if self.spotify_client_id.is_some() != self.spotify_client_secret.is_some() {
            anyhow::bail!("SPOTIFY_CLIENT_ID y SPOTIFY_CLIENT_SECRET deben configurarse juntos");
        }

        Ok(())
    }

    /// Credenciales de Spotify, si están configuradas
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        self.spotify_client_id
            .clone()
            .zip(self.spotify_client_secret.clone())
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and secrets are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Queue: {}% vol, {} max pending\n  \
            Resolution: {} (search limit {}), Spotify={}\n  \
            Sessions: {}s join timeout, stats every {}s, {} event buffer",
            self.default_volume.percent(),
            self.max_queue_size,
            self.ytdlp_path,
            self.search_limit,
            if self.spotify_credentials().is_some() { "on" } else { "off" },
            self.join_timeout_secs,
            self.stats_interval_secs,
            self.event_buffer
        )
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} inválido ({:?}): {}", key, raw, e)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),

            default_volume: Volume::default(),
            max_queue_size: 1000,

            search_limit: 1,
            ytdlp_path: "yt-dlp".to_string(),
            spotify_client_id: None,
            spotify_client_secret: None,

            join_timeout_secs: 10,
            stats_interval_secs: 30,
            event_buffer: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_env_with(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[("DISCORD_TOKEN", "token")]).unwrap();

        assert_eq!(config.default_volume.percent(), 50);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.search_limit, 1);
        assert_eq!(config.join_timeout(), Duration::from_secs(10));
        assert_eq!(config.stats_interval(), Duration::from_secs(30));
        assert_eq!(config.event_buffer, 256);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert!(config.spotify_credentials().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn values_are_read_from_environment() {
        let config = load(&[
            ("DISCORD_TOKEN", "token"),
            ("DEFAULT_VOLUME", "80"),
            ("MAX_QUEUE_SIZE", "25"),
            ("JOIN_TIMEOUT_SECS", " 3 "),
            ("YTDLP_PATH", "/usr/local/bin/yt-dlp"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ])
        .unwrap();

        assert_eq!(config.default_volume.percent(), 80);
        assert_eq!(config.max_queue_size, 25);
        assert_eq!(config.join_timeout_secs, 3);
        assert_eq!(config.ytdlp_path, "/usr/local/bin/yt-dlp");
        assert_eq!(
            config.spotify_credentials(),
            Some(("id".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn missing_token_is_an_error() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn default_volume_is_strict() {
        let err = load(&[("DISCORD_TOKEN", "token"), ("DEFAULT_VOLUME", "150")]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::VolumeOutOfRange(150))
        );

        assert!(load(&[("DISCORD_TOKEN", "token"), ("DEFAULT_VOLUME", "loud")]).is_err());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(load(&[("DISCORD_TOKEN", "token"), ("MAX_QUEUE_SIZE", "-1")]).is_err());
    }

    #[test]
    fn validation_catches_bad_values() {
        let config = load(&[("DISCORD_TOKEN", "token"), ("MAX_QUEUE_SIZE", "0")]).unwrap();
        assert!(config.validate().is_err());

        let config = load(&[("DISCORD_TOKEN", "token"), ("SPOTIFY_CLIENT_ID", "id")]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_hides_secrets() {
        let config = load(&[
            ("DISCORD_TOKEN", "super-secret-token"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "hidden"),
        ])
        .unwrap();

        let summary = config.summary();

        assert!(summary.contains("Spotify=on"));
        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("hidden"));
    }
}
