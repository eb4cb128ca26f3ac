//! "Now playing" messages in each session's notification channel.

use chrono::{DateTime, Utc};
use serenity::all::{Colour, CreateEmbed, CreateEmbedFooter, CreateMessage, Http, Timestamp};
use serenity::model::id::GuildId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::queue::PlaybackState;
use crate::broadcast::PlayerEvent;
use crate::session::SessionRegistry;
use crate::sources::Track;

const NOW_PLAYING_COLOUR: Colour = Colour::from_rgb(67, 181, 129);
const FOOTER: &str = "🎵 Open Music Queue";

/// Decide qué actualizaciones merecen un anuncio (una vez por track)
#[derive(Default)]
struct Announcements {
    last: HashMap<GuildId, (String, DateTime<Utc>)>,
}

impl Announcements {
    fn next(&mut self, event: &PlayerEvent) -> Option<(GuildId, Track)> {
        match event {
            PlayerEvent::QueueUpdated { guild_id, snapshot } => {
                if snapshot.state != PlaybackState::Playing {
                    return None;
                }
                let track = snapshot.current.as_ref()?;
                let key = (track.id().to_string(), track.resolved_at());

                if self.last.get(guild_id) == Some(&key) {
                    return None;
                }
                self.last.insert(*guild_id, key);
                Some((*guild_id, track.clone()))
            }
            PlayerEvent::SessionClosed { guild_id } => {
                self.last.remove(guild_id);
                None
            }
            PlayerEvent::Stats(_) => None,
        }
    }
}

/// Crea el embed de "Reproduciendo Ahora"
pub fn now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(NOW_PLAYING_COLOUR)
        .field("🎤 Artista", track.artist().unwrap_or("Desconocido"), true);

    if track.duration().is_zero() {
        embed = embed.field("⏱️ Duración", "🔴 En vivo", true);
    } else {
        embed = embed.field(
            "⏱️ Duración",
            humantime::format_duration(track.duration()).to_string(),
            true,
        );
    }

    embed = embed
        .field("👤 Solicitado por", format!("<@{}>", track.requester().id), true)
        .field("🔗 Fuente", track.source().as_str(), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .url(track.url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER))
}

/// Publica un embed cada vez que empieza un track nuevo
pub fn spawn_announcer(
    http: Arc<Http>,
    registry: Arc<SessionRegistry>,
    mut events: broadcast::Receiver<PlayerEvent>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut announcements = Announcements::default();
        info!("📣 Anunciador de canciones iniciado");

        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                received = events.recv() => received,
            };

            let event = match event {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("📣 Anunciador atrasado, {} eventos perdidos", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some((guild_id, track)) = announcements.next(&event) else {
                continue;
            };
            let Some(channel_id) = registry.notification_channel(guild_id) else {
                debug!("Guild {} sin canal de notificaciones", guild_id);
                continue;
            };

            let http = http.clone();
            tokio::spawn(async move {
                let message = CreateMessage::new().embed(now_playing_embed(&track));
                if let Err(e) = channel_id.send_message(&http, message).await {
                    error!("Error al enviar mensaje now playing: {:?}", e);
                }
            });
        }

        debug!("📣 Anunciador detenido");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::{QueueSnapshot, Volume};
    use crate::sources::test_track;

    fn update(guild: u64, track: Option<&Track>, state: PlaybackState) -> PlayerEvent {
        let mut snapshot = QueueSnapshot::empty(Volume::default());
        snapshot.current = track.cloned();
        snapshot.state = state;
        PlayerEvent::QueueUpdated {
            guild_id: GuildId::new(guild),
            snapshot,
        }
    }

    #[test]
    fn announces_each_track_once_when_it_starts_playing() {
        let mut announcements = Announcements::default();
        let track = test_track("a");

        assert!(announcements
            .next(&update(1, Some(&track), PlaybackState::Loading))
            .is_none());

        let (guild, announced) = announcements
            .next(&update(1, Some(&track), PlaybackState::Playing))
            .unwrap();
        assert_eq!(guild, GuildId::new(1));
        assert_eq!(announced.id(), "a");

        // Pausar y reanudar no repite el anuncio
        assert!(announcements
            .next(&update(1, Some(&track), PlaybackState::Paused))
            .is_none());
        assert!(announcements
            .next(&update(1, Some(&track), PlaybackState::Playing))
            .is_none());

        // Otro guild con el mismo track sí se anuncia
        assert!(announcements
            .next(&update(2, Some(&track), PlaybackState::Playing))
            .is_some());
    }

    #[test]
    fn closed_session_forgets_last_track() {
        let mut announcements = Announcements::default();
        let track = test_track("a");
        announcements.next(&update(1, Some(&track), PlaybackState::Playing));

        announcements.next(&PlayerEvent::SessionClosed {
            guild_id: GuildId::new(1),
        });

        assert!(announcements
            .next(&update(1, Some(&track), PlaybackState::Playing))
            .is_some());
    }

    #[test]
    fn idle_updates_are_ignored() {
        let mut announcements = Announcements::default();
        assert!(announcements
            .next(&update(1, None, PlaybackState::Idle))
            .is_none());
    }
}
