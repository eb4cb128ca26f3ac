//! # Session Registry
//!
//! Owns one [`Session`] per guild: the voice connection's audio sink, the
//! playback controller driving it and the lock that keeps track additions in
//! call order. Every command addressed to a guild goes through here.
//!
//! The registry is an ordinary value shared behind an `Arc`; there is no
//! global state.

use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::player::PlaybackController;
use crate::audio::queue::{LoopMode, Queue, QueueSnapshot, Volume};
use crate::audio::sink::VoiceGateway;
use crate::broadcast::{EventBroadcaster, StatsSnapshot};
use crate::config::Config;
use crate::error::{Result, SessionError, ValidationError};
use crate::sources::{Requester, TrackResolver};

/// Límites aplicados a cada sesión nueva
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub join_timeout: Duration,
    pub max_queue_size: usize,
    pub default_volume: Volume,
}

impl From<&Config> for RegistrySettings {
    fn from(config: &Config) -> Self {
        Self {
            join_timeout: config.join_timeout(),
            max_queue_size: config.max_queue_size,
            default_volume: config.default_volume,
        }
    }
}

/// Sesión activa de un guild
pub struct Session {
    guild_id: GuildId,
    channel_id: ChannelId,
    notify_channel: Option<ChannelId>,
    controller: PlaybackController,
    /// Serializa las resoluciones para respetar el orden de llamada
    resolve_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn notify_channel(&self) -> Option<ChannelId> {
        self.notify_channel
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }
}

pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<Session>>,
    join_locks: DashMap<GuildId, Arc<tokio::sync::Mutex<()>>>,
    gateway: Arc<dyn VoiceGateway>,
    resolver: Arc<TrackResolver>,
    broadcaster: EventBroadcaster,
    settings: RegistrySettings,
    started_at: Instant,
}

impl SessionRegistry {
    pub fn new(
        gateway: Arc<dyn VoiceGateway>,
        resolver: Arc<TrackResolver>,
        broadcaster: EventBroadcaster,
        settings: RegistrySettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            join_locks: DashMap::new(),
            gateway,
            resolver,
            broadcaster,
            settings,
            started_at: Instant::now(),
        }
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Conecta el bot a un canal de voz y crea la sesión del guild
    pub async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        notify_channel: Option<ChannelId>,
    ) -> Result<Arc<Session>> {
        if let Some(session) = self.existing(guild_id, channel_id)? {
            return Ok(session);
        }

        let lock = self.join_locks.entry(guild_id).or_default().clone();
        let _guard = lock.lock().await;

        // Otro join pudo completarse mientras esperábamos
        if let Some(session) = self.existing(guild_id, channel_id)? {
            return Ok(session);
        }

        let timeout = self.settings.join_timeout;
        let sink = match tokio::time::timeout(timeout, self.gateway.join(guild_id, channel_id)).await {
            Ok(joined) => joined?,
            Err(_) => {
                warn!("⏱️ Tiempo agotado al conectar en guild {} ({:?})", guild_id, timeout);
                if let Err(e) = self.gateway.leave(guild_id).await {
                    debug!("No se pudo limpiar la conexión parcial: {}", e);
                }
                return Err(SessionError::JoinTimeout(timeout).into());
            }
        };

        let queue = Queue::new(self.settings.max_queue_size, self.settings.default_volume);
        let (controller, task) =
            PlaybackController::spawn(guild_id, queue, sink, self.broadcaster.clone());

        let session = Arc::new(Session {
            guild_id,
            channel_id,
            notify_channel,
            controller,
            resolve_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(Some(task)),
        });
        self.sessions.insert(guild_id, session.clone());

        info!("✅ Sesión creada en guild {} (canal {})", guild_id, channel_id);
        Ok(session)
    }

    fn existing(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> std::result::Result<Option<Arc<Session>>, SessionError> {
        match self.sessions.get(&guild_id) {
            Some(session) if session.channel_id == channel_id => Ok(Some(session.clone())),
            Some(session) => Err(SessionError::ChannelConflict {
                guild_id,
                current: session.channel_id,
                requested: channel_id,
            }),
            None => Ok(None),
        }
    }

    pub fn session(&self, guild_id: GuildId) -> std::result::Result<Arc<Session>, SessionError> {
        self.sessions
            .get(&guild_id)
            .map(|session| session.clone())
            .ok_or(SessionError::NoActiveSession(guild_id))
    }

    fn controller(&self, guild_id: GuildId) -> std::result::Result<PlaybackController, SessionError> {
        self.session(guild_id)
            .map(|session| session.controller.clone())
    }

    /// Resuelve `query` fuera del controlador y agrega el track
    pub async fn add_track(
        &self,
        guild_id: GuildId,
        query: &str,
        requester: Requester,
    ) -> Result<QueueSnapshot> {
        let session = self.session(guild_id)?;

        // Evitar resolver si la cola ya está llena
        if session.controller.pending_len() >= self.settings.max_queue_size {
            return Err(ValidationError::QueueFull(self.settings.max_queue_size).into());
        }

        let _turn = session.resolve_lock.lock().await;
        let track = self.resolver.resolve(query, requester).await.map_err(|e| {
            warn!("❌ No se pudo resolver '{}' en guild {}: {}", query, guild_id, e);
            e
        })?;

        session.controller.enqueue(track).await
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<QueueSnapshot> {
        self.controller(guild_id)?.skip().await
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<QueueSnapshot> {
        self.controller(guild_id)?.pause().await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<QueueSnapshot> {
        self.controller(guild_id)?.resume().await
    }

    /// Detiene la reproducción y cierra la sesión del guild
    pub async fn stop(&self, guild_id: GuildId) -> Result<QueueSnapshot> {
        let session = self.session(guild_id)?;
        let stopped = session.controller.stop().await?;

        // Solo cierra si la sesión sigue siendo la misma
        self.close(guild_id, Some(session.channel_id)).await?;
        Ok(stopped)
    }

    pub async fn set_volume(&self, guild_id: GuildId, volume: i64) -> Result<QueueSnapshot> {
        self.controller(guild_id)?.set_volume(volume).await
    }

    pub async fn toggle_shuffle(&self, guild_id: GuildId) -> Result<QueueSnapshot> {
        self.controller(guild_id)?.toggle_shuffle().await
    }

    pub async fn set_loop_mode(&self, guild_id: GuildId, mode: LoopMode) -> Result<QueueSnapshot> {
        self.controller(guild_id)?.set_loop_mode(mode).await
    }

    pub async fn remove_track(&self, guild_id: GuildId, index: i64) -> Result<QueueSnapshot> {
        self.controller(guild_id)?.remove(index).await
    }

    /// Cierra la sesión del guild y sale del canal de voz
    pub async fn disconnect(&self, guild_id: GuildId) -> Result<()> {
        if !self.close(guild_id, None).await? {
            return Err(SessionError::NoActiveSession(guild_id).into());
        }
        Ok(())
    }

    /// Cierra la sesión solo si sigue en `channel_id`; `false` si no había nada que cerrar
    pub async fn disconnect_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<bool> {
        Ok(self.close(guild_id, Some(channel_id)).await?)
    }

    /// Desconecta un guild o todos; devuelve cuántas sesiones cerró
    pub async fn cleanup(&self, guild_id: Option<GuildId>) -> usize {
        let guilds: Vec<GuildId> = match guild_id {
            Some(guild_id) => vec![guild_id],
            None => self.sessions.iter().map(|entry| *entry.key()).collect(),
        };

        let results = join_all(guilds.into_iter().map(|guild_id| self.close(guild_id, None))).await;
        let mut count = 0;
        for result in results {
            match result {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => {
                    // La sesión ya salió del registro aunque falle el leave
                    warn!("Error durante la limpieza de sesiones: {}", e);
                    count += 1;
                }
            }
        }

        if count > 0 {
            info!("🧹 {} sesiones cerradas", count);
        }
        count
    }

    /// Quita y desmonta la sesión con el lock de join tomado
    async fn close(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> std::result::Result<bool, SessionError> {
        let lock = self.join_locks.entry(guild_id).or_default().clone();
        let _guard = lock.lock().await;

        let removed = self.sessions.remove_if(&guild_id, |_, session| {
            channel_id.map_or(true, |channel_id| session.channel_id == channel_id)
        });
        let closed = match removed {
            Some((_, session)) => self.teardown(session).await.map(|()| true),
            None => Ok(false),
        };

        // El mapa y este clon: nadie más espera el lock
        self.join_locks
            .remove_if(&guild_id, |_, entry| Arc::strong_count(entry) <= 2);
        closed
    }

    async fn teardown(&self, session: Arc<Session>) -> std::result::Result<(), SessionError> {
        let guild_id = session.guild_id;

        if let Err(e) = session.controller.shutdown().await {
            debug!("El controlador del guild {} ya había terminado: {}", guild_id, e);
        }
        let task = session.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("El controlador del guild {} terminó con error: {:?}", guild_id, e);
            }
        }

        self.gateway.leave(guild_id).await?;
        info!("👋 Sesión cerrada en guild {}", guild_id);
        Ok(())
    }

    /// Último snapshot publicado; no espera al controlador
    pub fn get_queue(&self, guild_id: GuildId) -> Result<QueueSnapshot> {
        Ok(self.session(guild_id)?.controller.snapshot())
    }

    pub fn get_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn get_total_pending_tracks(&self) -> usize {
        self.sessions
            .iter()
            .map(|entry| entry.controller.pending_len())
            .sum()
    }

    pub fn notification_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.sessions
            .get(&guild_id)
            .and_then(|session| session.notify_channel)
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            session_count: self.get_session_count(),
            total_pending_tracks: self.get_total_pending_tracks(),
        }
    }

    /// Publica estadísticas cada `interval` hasta cancelar `token`
    pub fn spawn_stats_reporter(
        self: &Arc<Self>,
        interval: Duration,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // El primer tick es inmediato
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("📊 Reporte de estadísticas detenido");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = registry.stats();
                        debug!(
                            "📊 {} sesiones, {} canciones en cola",
                            stats.session_count, stats.total_pending_tracks
                        );
                        registry.broadcaster.stats(stats);
                    }
                }
            }
        })
    }
}
