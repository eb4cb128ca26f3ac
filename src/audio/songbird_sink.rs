//! Songbird-backed voice connections and audio streams.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{Input, YoutubeDl},
    tracks::{PlayMode, Track as SongbirdTrack, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::queue::Volume;
use super::sink::{AudioSink, SinkEvent, SinkEventSender, VoiceGateway};
use crate::error::{SessionError, SinkError};
use crate::sources::Track;

/// Eventos de songbird que se reenvían al controlador
const FORWARDED_EVENTS: [TrackEvent; 5] = [
    TrackEvent::Playable,
    TrackEvent::Pause,
    TrackEvent::Play,
    TrackEvent::End,
    TrackEvent::Error,
];

/// Conexiones de voz a través del manager de songbird
pub struct SongbirdGateway {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdGateway {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl VoiceGateway for SongbirdGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<dyn AudioSink>, SessionError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| {
                error!("Error al conectar al canal de voz en guild {}: {:?}", guild_id, e);
                SessionError::Connection(e.to_string())
            })?;

        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(Arc::new(SongbirdSink::new(call, self.http.clone())))
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), SessionError> {
        match self.manager.remove(guild_id).await {
            // Ya estaba desconectado
            Ok(()) | Err(JoinError::NoCall) => {
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => Err(SessionError::Connection(e.to_string())),
        }
    }
}

/// Llamada de un guild con el handle del último stream
pub struct SongbirdSink {
    call: Arc<tokio::sync::Mutex<Call>>,
    http: reqwest::Client,
    current: Mutex<Option<TrackHandle>>,
}

impl SongbirdSink {
    pub fn new(call: Arc<tokio::sync::Mutex<Call>>, http: reqwest::Client) -> Self {
        Self {
            call,
            http,
            current: Mutex::new(None),
        }
    }

    fn handle(&self) -> Result<TrackHandle, SinkError> {
        self.current
            .lock()
            .clone()
            .ok_or_else(|| SinkError("no hay stream activo".to_string()))
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn play(
        &self,
        track: &Track,
        volume: Volume,
        events: SinkEventSender,
    ) -> Result<(), SinkError> {
        // yt-dlp resuelve el stream en el momento de reproducir
        let input: Input = YoutubeDl::new(self.http.clone(), track.url().to_string()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.stop();
            call.play(SongbirdTrack::from(input).volume(volume.gain()))
        };

        for kind in FORWARDED_EVENTS {
            let forwarder = TrackEventForwarder {
                kind,
                events: events.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(kind), forwarder) {
                let _ = handle.stop();
                return Err(SinkError(format!("no se pudo registrar {:?}: {}", kind, e)));
            }
        }

        debug!(
            "Stream iniciado para '{}' (generación {})",
            track.title(),
            events.generation()
        );
        *self.current.lock() = Some(handle);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        self.handle()?.pause().map_err(control_error)
    }

    async fn resume(&self) -> Result<(), SinkError> {
        self.handle()?.play().map_err(control_error)
    }

    async fn stop(&self) -> Result<(), SinkError> {
        let handle = self.current.lock().take();
        match handle {
            Some(handle) => handle.stop().map_err(control_error),
            None => Ok(()),
        }
    }

    async fn set_volume(&self, volume: Volume) -> Result<(), SinkError> {
        self.handle()?
            .set_volume(volume.gain())
            .map_err(control_error)
    }
}

fn control_error(err: songbird::error::ControlError) -> SinkError {
    SinkError(err.to_string())
}

/// Reenvía un tipo de evento de track al controlador
struct TrackEventForwarder {
    kind: TrackEvent,
    events: SinkEventSender,
}

#[async_trait]
impl VoiceEventHandler for TrackEventForwarder {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let Some(event) = sink_event(self.kind, || play_error(ctx)) {
            self.events.send(event);
        }
        None
    }
}

fn sink_event(kind: TrackEvent, reason: impl FnOnce() -> String) -> Option<SinkEvent> {
    match kind {
        TrackEvent::Playable => Some(SinkEvent::Started),
        TrackEvent::Pause => Some(SinkEvent::Paused),
        TrackEvent::Play => Some(SinkEvent::Resumed),
        TrackEvent::End => Some(SinkEvent::Completed),
        TrackEvent::Error => Some(SinkEvent::Errored(reason())),
        _ => None,
    }
}

fn play_error(ctx: &EventContext<'_>) -> String {
    if let EventContext::Track(tracks) = ctx {
        for (state, _handle) in *tracks {
            if let PlayMode::Errored(e) = &state.playing {
                return format!("{:?}", e);
            }
        }
    }
    "error de reproducción desconocido".to_string()
}
