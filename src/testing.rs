//! In-memory voice layer for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::queue::Volume;
use crate::audio::sink::{AudioSink, SinkEvent, SinkEventSender, VoiceGateway};
use crate::error::{SessionError, SinkError};
use crate::sources::Track;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkCall {
    Play(String),
    Pause,
    Resume,
    Stop,
    Volume(u8),
}

/// Registra cada llamada; el test emite los eventos del stream a mano
#[derive(Default)]
pub(crate) struct FakeSink {
    calls: Mutex<Vec<SinkCall>>,
    streams: Mutex<Vec<SinkEventSender>>,
    broken_tracks: Mutex<HashSet<String>>,
    broken_controls: AtomicBool,
}

impl FakeSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn plays(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Play(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// `play` fails for this track id
    pub(crate) fn fail_play(&self, id: &str) {
        self.broken_tracks.lock().insert(id.to_string());
    }

    /// pause, resume and set_volume fail from now on
    pub(crate) fn fail_controls(&self) {
        self.broken_controls.store(true, Ordering::SeqCst);
    }

    /// Emisor de eventos del último stream iniciado
    pub(crate) fn latest(&self) -> SinkEventSender {
        self.streams
            .lock()
            .last()
            .cloned()
            .expect("no stream was started")
    }

    pub(crate) fn emit(&self, event: SinkEvent) {
        self.latest().send(event);
    }

    fn control(&self, call: SinkCall) -> Result<(), SinkError> {
        if self.broken_controls.load(Ordering::SeqCst) {
            return Err(SinkError(format!("{:?} failed", call)));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(
        &self,
        track: &Track,
        _volume: Volume,
        events: SinkEventSender,
    ) -> Result<(), SinkError> {
        self.calls.lock().push(SinkCall::Play(track.id().to_string()));

        if self.broken_tracks.lock().contains(track.id()) {
            return Err(SinkError(format!("cannot stream {}", track.id())));
        }
        self.streams.lock().push(events);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SinkError> {
        self.control(SinkCall::Pause)
    }

    async fn resume(&self) -> Result<(), SinkError> {
        self.control(SinkCall::Resume)
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.calls.lock().push(SinkCall::Stop);
        Ok(())
    }

    async fn set_volume(&self, volume: Volume) -> Result<(), SinkError> {
        self.control(SinkCall::Volume(volume.percent()))
    }
}

/// Un [`FakeSink`] por guild conectado
#[derive(Default)]
pub(crate) struct FakeGateway {
    sinks: Mutex<HashMap<GuildId, Arc<FakeSink>>>,
    joins: AtomicUsize,
    leaves: Mutex<Vec<GuildId>>,
    connected: Mutex<HashSet<GuildId>>,
    join_delay: Option<Duration>,
    refuse: AtomicBool,
}

impl FakeGateway {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every join takes `delay` before connecting
    pub(crate) fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            join_delay: Some(delay),
            ..Self::default()
        })
    }

    pub(crate) fn refuse_joins(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub(crate) fn sink(&self, guild_id: GuildId) -> Arc<FakeSink> {
        self.sinks
            .lock()
            .get(&guild_id)
            .cloned()
            .expect("guild never joined")
    }

    pub(crate) fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }

    pub(crate) fn leaves(&self) -> Vec<GuildId> {
        self.leaves.lock().clone()
    }

    /// Whether the guild holds a voice connection right now
    pub(crate) fn is_connected(&self, guild_id: GuildId) -> bool {
        self.connected.lock().contains(&guild_id)
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(
        &self,
        guild_id: GuildId,
        _channel_id: ChannelId,
    ) -> Result<Arc<dyn AudioSink>, SessionError> {
        if let Some(delay) = self.join_delay {
            tokio::time::sleep(delay).await;
        }
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Connection("voice server refused".to_string()));
        }

        self.joins.fetch_add(1, Ordering::SeqCst);
        let sink = FakeSink::new();
        self.sinks.lock().insert(guild_id, sink.clone());
        self.connected.lock().insert(guild_id);
        Ok(sink)
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), SessionError> {
        self.leaves.lock().push(guild_id);
        self.connected.lock().remove(&guild_id);
        Ok(())
    }
}
