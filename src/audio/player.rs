use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::queue::{LoopMode, PlaybackState, Queue, QueueSnapshot, Volume};
use super::sink::{AudioSink, SinkEvent, SinkEventSender};
use crate::broadcast::EventBroadcaster;
use crate::error::{PlayerError, Result, SessionError};
use crate::sources::Track;

type Reply = oneshot::Sender<Result<QueueSnapshot>>;

/// Comandos del actor de reproducción, procesados en orden de llegada
pub(crate) enum Command {
    Enqueue { track: Track, reply: Reply },
    Skip { reply: Reply },
    Pause { reply: Reply },
    Resume { reply: Reply },
    Stop { reply: Reply },
    Remove { index: i64, reply: Reply },
    SetVolume { volume: i64, reply: Reply },
    ToggleShuffle { reply: Reply },
    SetLoopMode { mode: LoopMode, reply: Reply },
    Query { reply: Reply },
    Sink { generation: u64, event: SinkEvent },
    Shutdown { reply: oneshot::Sender<QueueSnapshot> },
}

/// Handle al actor de reproducción de un guild
#[derive(Clone)]
pub struct PlaybackController {
    guild_id: GuildId,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<QueueSnapshot>,
}

impl PlaybackController {
    /// Arranca el actor de reproducción para un guild
    pub fn spawn(
        guild_id: GuildId,
        queue: Queue,
        sink: Arc<dyn AudioSink>,
        broadcaster: EventBroadcaster,
    ) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(queue.snapshot());

        let actor = PlayerActor {
            guild_id,
            queue,
            sink,
            generation: 0,
            commands: commands.downgrade(),
            snapshot_tx,
            broadcaster,
        };
        let task = tokio::spawn(actor.run(receiver));

        let controller = Self {
            guild_id,
            commands,
            snapshot,
        };
        (controller, task)
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Agrega un track; si no había nada sonando empieza a reproducir
    pub async fn enqueue(&self, track: Track) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Enqueue { track, reply }).await
    }

    pub async fn skip(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Skip { reply }).await
    }

    pub async fn pause(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Detiene la reproducción y vacía la cola
    pub async fn stop(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn remove(&self, index: i64) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Remove { index, reply }).await
    }

    pub async fn set_volume(&self, volume: i64) -> Result<QueueSnapshot> {
        self.request(|reply| Command::SetVolume { volume, reply })
            .await
    }

    pub async fn toggle_shuffle(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::ToggleShuffle { reply }).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<QueueSnapshot> {
        self.request(|reply| Command::SetLoopMode { mode, reply })
            .await
    }

    /// Estado tras aplicar todos los comandos anteriores
    pub async fn queue(&self) -> Result<QueueSnapshot> {
        self.request(|reply| Command::Query { reply }).await
    }

    /// Último snapshot publicado, sin esperar al actor
    pub fn snapshot(&self) -> QueueSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn pending_len(&self) -> usize {
        self.snapshot.borrow().pending.len()
    }

    /// Detiene el stream, vacía la cola y termina el actor
    pub async fn shutdown(&self) -> Result<QueueSnapshot> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .map_err(|_| SessionError::NoActiveSession(self.guild_id))?;
        response
            .await
            .map_err(|_| SessionError::NoActiveSession(self.guild_id).into())
    }

    async fn request<F>(&self, build: F) -> Result<QueueSnapshot>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| SessionError::NoActiveSession(self.guild_id))?;
        response
            .await
            .map_err(|_| SessionError::NoActiveSession(self.guild_id))?
    }
}

/// Dueño de la cola; corre hasta el shutdown o hasta que no queden handles
struct PlayerActor {
    guild_id: GuildId,
    queue: Queue,
    sink: Arc<dyn AudioSink>,
    /// Se incrementa en cada avance y stop
    generation: u64,
    commands: mpsc::WeakUnboundedSender<Command>,
    snapshot_tx: watch::Sender<QueueSnapshot>,
    broadcaster: EventBroadcaster,
}

impl PlayerActor {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("🎛️ Controlador de reproducción iniciado para guild {}", self.guild_id);

        while let Some(command) = commands.recv().await {
            if !self.handle(command).await {
                return;
            }
        }

        // Todos los handles se soltaron sin shutdown explícito
        warn!("⚠️ Controlador del guild {} abandonado, liberando audio", self.guild_id);
        self.shutdown().await;
    }

    /// Aplica un comando; `false` cuando el actor debe terminar
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Enqueue { track, reply } => {
                let _ = reply.send(self.enqueue(track).await);
            }
            Command::Skip { reply } => {
                let _ = reply.send(self.skip().await);
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            Command::Remove { index, reply } => {
                let _ = reply.send(self.remove(index));
            }
            Command::SetVolume { volume, reply } => {
                let _ = reply.send(self.set_volume(volume).await);
            }
            Command::ToggleShuffle { reply } => {
                self.queue.toggle_shuffle();
                let _ = reply.send(Ok(self.publish()));
            }
            Command::SetLoopMode { mode, reply } => {
                self.queue.set_loop_mode(mode);
                let _ = reply.send(Ok(self.publish()));
            }
            Command::Query { reply } => {
                let _ = reply.send(Ok(self.queue.snapshot()));
            }
            Command::Sink { generation, event } => self.on_sink_event(generation, event).await,
            Command::Shutdown { reply } => {
                let _ = reply.send(self.shutdown().await);
                return false;
            }
        }
        true
    }

    async fn enqueue(&mut self, track: Track) -> Result<QueueSnapshot> {
        self.queue.push(track)?;

        if self.queue.state() == PlaybackState::Idle {
            self.start_next().await;
        }

        Ok(self.publish())
    }

    /// Misma transición que un fin de track natural
    async fn skip(&mut self) -> Result<QueueSnapshot> {
        let Some(current) = self.queue.current() else {
            return Err(PlayerError::NothingPlaying);
        };
        info!("⏭️ Saltando '{}' en guild {}", current.title(), self.guild_id);

        // El End del stream detenido llegará con una generación vieja
        if let Err(e) = self.sink.stop().await {
            warn!("Error al detener el stream en guild {}: {}", self.guild_id, e);
        }
        self.start_next().await;

        Ok(self.publish())
    }

    async fn pause(&mut self) -> Result<QueueSnapshot> {
        match self.queue.state() {
            PlaybackState::Playing => {
                self.sink.pause().await?;
                self.queue.mark_paused();
                info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
                Ok(self.publish())
            }
            PlaybackState::Paused => Ok(self.queue.snapshot()),
            PlaybackState::Idle | PlaybackState::Loading => Err(PlayerError::NothingPlaying),
        }
    }

    async fn resume(&mut self) -> Result<QueueSnapshot> {
        match self.queue.state() {
            PlaybackState::Paused => {
                self.sink.resume().await?;
                self.queue.mark_playing();
                info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
                Ok(self.publish())
            }
            PlaybackState::Playing => Ok(self.queue.snapshot()),
            PlaybackState::Idle | PlaybackState::Loading => Err(PlayerError::NothingPlaying),
        }
    }

    async fn stop(&mut self) -> Result<QueueSnapshot> {
        self.halt().await;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(self.publish())
    }

    fn remove(&mut self, index: i64) -> Result<QueueSnapshot> {
        let removed = self.queue.remove(index)?;
        info!("🗑️ '{}' eliminado de la cola del guild {}", removed.title(), self.guild_id);
        Ok(self.publish())
    }

    async fn set_volume(&mut self, requested: i64) -> Result<QueueSnapshot> {
        let volume = Volume::clamped(requested);

        if self.queue.current().is_some() {
            self.sink.set_volume(volume).await?;
        }
        self.queue.set_volume(requested);

        info!("🔊 Volumen ajustado a {}% en guild {}", volume.percent(), self.guild_id);
        Ok(self.publish())
    }

    async fn on_sink_event(&mut self, generation: u64, event: SinkEvent) {
        if generation != self.generation || self.queue.current().is_none() {
            debug!(
                "Evento {:?} obsoleto en guild {} (generación {}, actual {})",
                event, self.guild_id, generation, self.generation
            );
            return;
        }

        let state = self.queue.state();
        match event {
            SinkEvent::Started if state == PlaybackState::Loading => {
                self.queue.mark_playing();
                self.publish();
            }
            SinkEvent::Paused if state == PlaybackState::Playing => {
                self.queue.mark_paused();
                self.publish();
            }
            SinkEvent::Resumed if state == PlaybackState::Paused => {
                self.queue.mark_playing();
                self.publish();
            }
            SinkEvent::Completed => {
                debug!("🎵 Track terminado en guild {}", self.guild_id);
                self.start_next().await;
                self.publish();
            }
            SinkEvent::Errored(reason) => {
                // Un error de reproducción cuenta como fin de pista
                warn!("❌ Error de audio en guild {}: {}", self.guild_id, reason);
                self.start_next().await;
                self.publish();
            }
            other => debug!("Evento {:?} sin efecto en estado {:?}", other, state),
        }
    }

    /// Avanza hasta que un track arranque o la cola se vacíe
    async fn start_next(&mut self) {
        while let Some(track) = self.queue.advance() {
            self.generation += 1;
            let events = SinkEventSender::new(self.generation, self.commands.clone());

            match self.sink.play(&track, self.queue.volume(), events).await {
                Ok(()) => {
                    info!(
                        "🎵 Reproduciendo '{}' en guild {} (generación {})",
                        track.title(),
                        self.guild_id,
                        self.generation
                    );
                    return;
                }
                Err(e) => warn!(
                    "❌ No se pudo iniciar '{}' en guild {}: {}; se pasa a la siguiente",
                    track.title(),
                    self.guild_id,
                    e
                ),
            }
        }

        self.generation += 1;
        info!("📭 Cola vacía en guild {}, en espera", self.guild_id);
    }

    /// Detiene el stream y limpia todo; invalida los eventos pendientes
    async fn halt(&mut self) {
        if self.queue.current().is_some() {
            if let Err(e) = self.sink.stop().await {
                warn!("Error al detener el stream en guild {}: {}", self.guild_id, e);
            }
        }
        self.generation += 1;
        self.queue.clear();
    }

    async fn shutdown(&mut self) -> QueueSnapshot {
        self.halt().await;
        let snapshot = self.publish();
        self.broadcaster.session_closed(self.guild_id);
        info!("👋 Controlador del guild {} finalizado", self.guild_id);
        snapshot
    }

    fn publish(&self) -> QueueSnapshot {
        let snapshot = self.queue.snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        self.broadcaster.queue_updated(self.guild_id, snapshot.clone());
        snapshot
    }
}
