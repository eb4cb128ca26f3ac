//! The seam between the playback controller and the audio layer.
//!
//! The controller only needs to start a stream for a track, control it, and
//! hear back when it starts, pauses, resumes, ends or fails. Everything else
//! (decoding, encoding, transport) lives behind [`AudioSink`].

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::debug;

use super::player::Command;
use super::queue::Volume;
use crate::error::{SessionError, SinkError};
use crate::sources::Track;

/// Señales que emite el reproductor de audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Started,
    Paused,
    Resumed,
    Completed,
    Errored(String),
}

/// Envía las señales de un stream al controlador, marcadas con su generación
#[derive(Clone)]
pub struct SinkEventSender {
    generation: u64,
    commands: WeakUnboundedSender<Command>,
}

impl SinkEventSender {
    pub(crate) fn new(generation: u64, commands: WeakUnboundedSender<Command>) -> Self {
        Self {
            generation,
            commands,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn send(&self, event: SinkEvent) {
        let delivered = self.commands.upgrade().is_some_and(|tx| {
            tx.send(Command::Sink {
                generation: self.generation,
                event: event.clone(),
            })
            .is_ok()
        });

        if !delivered {
            debug!(
                "Evento {:?} (generación {}) descartado: la sesión ya no existe",
                event, self.generation
            );
        }
    }
}

/// Salida de audio de un guild
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Inicia el stream de `track`; el progreso llega por `events`
    async fn play(&self, track: &Track, volume: Volume, events: SinkEventSender)
        -> Result<(), SinkError>;

    async fn pause(&self) -> Result<(), SinkError>;

    async fn resume(&self) -> Result<(), SinkError>;

    async fn stop(&self) -> Result<(), SinkError>;

    /// Aplica el volumen sin interrumpir el stream
    async fn set_volume(&self, volume: Volume) -> Result<(), SinkError>;
}

/// Conexiones de voz, una por guild
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Conecta al canal y devuelve su salida de audio
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn AudioSink>, SessionError>;

    /// Cierra la conexión de voz del guild
    async fn leave(&self, guild_id: GuildId) -> Result<(), SessionError>;
}
