//! # Event Broadcaster
//!
//! Fans out queue changes, session teardown and periodic stats to any number
//! of listeners. Sends never block and never fail: with nobody listening the
//! event is simply dropped, and a listener that falls behind loses the oldest
//! events it has not read.

use serde::Serialize;
use serenity::model::id::GuildId;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::audio::queue::QueueSnapshot;

/// Estadísticas globales del registro de sesiones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub session_count: usize,
    pub total_pending_tracks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// Estado completo de un guild tras un cambio
    QueueUpdated {
        guild_id: GuildId,
        snapshot: QueueSnapshot,
    },
    SessionClosed {
        guild_id: GuildId,
    },
    Stats(StatsSnapshot),
}

#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<PlayerEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        info!("📡 Broadcaster de eventos iniciado (capacidad {})", capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn queue_updated(&self, guild_id: GuildId, snapshot: QueueSnapshot) {
        self.send(PlayerEvent::QueueUpdated { guild_id, snapshot });
    }

    pub fn session_closed(&self, guild_id: GuildId) {
        self.send(PlayerEvent::SessionClosed { guild_id });
    }

    pub fn stats(&self, stats: StatsSnapshot) {
        self.send(PlayerEvent::Stats(stats));
    }

    fn send(&self, event: PlayerEvent) {
        // Sin oyentes el evento se descarta
        if let Ok(count) = self.tx.send(event) {
            debug!("Evento enviado a {} oyentes", count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::Volume;
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn stats(session_count: usize) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: 5,
            session_count,
            total_pending_tracks: 0,
        }
    }

    #[test]
    fn sending_without_listeners_is_fine() {
        let broadcaster = EventBroadcaster::new(4);
        assert_eq!(broadcaster.listener_count(), 0);
        broadcaster.session_closed(GuildId::new(1));
    }

    #[tokio::test]
    async fn every_listener_gets_every_event() {
        let broadcaster = EventBroadcaster::new(8);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        assert_eq!(broadcaster.listener_count(), 2);

        broadcaster.stats(stats(3));
        broadcaster.session_closed(GuildId::new(9));

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap(), PlayerEvent::Stats(stats(3)));
            assert_eq!(
                rx.recv().await.unwrap(),
                PlayerEvent::SessionClosed {
                    guild_id: GuildId::new(9)
                }
            );
        }
    }

    #[tokio::test]
    async fn slow_listener_loses_oldest_events() {
        let broadcaster = EventBroadcaster::new(2);
        let mut rx = broadcaster.subscribe();

        for count in 0..4 {
            broadcaster.stats(stats(count));
        }

        assert_eq!(rx.recv().await, Err(RecvError::Lagged(2)));
        assert_eq!(rx.recv().await.unwrap(), PlayerEvent::Stats(stats(2)));
        assert_eq!(rx.recv().await.unwrap(), PlayerEvent::Stats(stats(3)));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = PlayerEvent::QueueUpdated {
            guild_id: GuildId::new(7),
            snapshot: QueueSnapshot::empty(Volume::default()),
        };

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "queue_updated");
        assert_eq!(json["snapshot"]["state"], "idle");
        assert_eq!(json["snapshot"]["volume"], 50);

        let json = serde_json::to_value(PlayerEvent::Stats(stats(1))).unwrap();
        assert_eq!(json["type"], "stats");
        assert_eq!(json["session_count"], 1);
    }
}
