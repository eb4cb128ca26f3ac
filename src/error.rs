//! Error types for the queue manager.
//!
//! Each failure family has its own enum so callers can match on exactly the
//! case they care about; [`PlayerError`] wraps them for operations that can
//! fail in more than one way.

use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use thiserror::Error;

/// Errores al resolver una consulta
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// El proveedor no tiene resultados
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),

    /// El proveedor no responde o falló
    #[error("Proveedor {provider} no disponible: {reason}")]
    ProviderUnavailable {
        provider: &'static str,
        reason: String,
    },

    /// Parece una referencia pero no es reproducible
    #[error("Referencia inválida: {0}")]
    InvalidReference(String),
}

impl ResolutionError {
    pub fn unavailable(provider: &'static str, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider,
            reason: reason.into(),
        }
    }
}

/// Errores del ciclo de vida de una sesión
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Ya estoy conectado a otro canal de voz ({current}) en el guild {guild_id}")]
    ChannelConflict {
        guild_id: GuildId,
        current: ChannelId,
        requested: ChannelId,
    },

    #[error("No hay sesión activa para el guild {0}")]
    NoActiveSession(GuildId),

    #[error("Tiempo de espera agotado al conectar al canal de voz ({0:?})")]
    JoinTimeout(Duration),

    #[error("Error de conexión de voz: {0}")]
    Connection(String),
}

/// Argumentos rechazados
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Índice fuera de rango: {index} (la cola tiene {len} canciones)")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Volumen fuera de rango: {0} (permitido 0-100)")]
    VolumeOutOfRange(i64),

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),
}

/// Falló una llamada a la salida de audio
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error del reproductor de audio: {0}")]
pub struct SinkError(pub String);

/// Error de las operaciones de reproducción y del registro
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("No hay ninguna canción reproduciéndose")]
    NothingPlaying,
}

/// Result de las operaciones de reproducción
pub type Result<T> = std::result::Result<T, PlayerError>;
