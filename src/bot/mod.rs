//! # Bot Module
//!
//! Discord gateway wiring for the session registry.
//!
//! The bot does not own playback state; it reacts to gateway events that
//! should end a session:
//!
//! - The bot is removed from a guild
//! - The bot is disconnected from its voice channel by someone else
//!
//! [`announce`] posts "now playing" messages driven by the event broadcaster.

use serenity::{
    all::{Context, EventHandler, Guild, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod announce;

use crate::session::SessionRegistry;

/// Handler de eventos de serenity
pub struct QueueBot {
    registry: Arc<SessionRegistry>,
}

impl QueueBot {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl EventHandler for QueueBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    /// Sin sesión que limpiar si el guild solo quedó no disponible
    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        if incomplete.unavailable {
            warn!("⚠️ Guild {} no disponible temporalmente", incomplete.id);
            return;
        }

        info!("🚪 Bot removido del guild {}", incomplete.id);
        self.registry.cleanup(Some(incomplete.id)).await;
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || new.channel_id.is_some() {
            return;
        }
        let (Some(guild_id), Some(old_channel)) = (new.guild_id, old.and_then(|o| o.channel_id)) else {
            return;
        };

        // Un evento tardío no debe cerrar una sesión creada en otro canal
        match self.registry.disconnect_channel(guild_id, old_channel).await {
            Ok(true) => info!("🔌 Bot desconectado del canal {} en guild {}", old_channel, guild_id),
            Ok(false) => debug!("Sin sesión en el canal {} del guild {}", old_channel, guild_id),
            Err(e) => error!("Error al cerrar la sesión del guild {}: {}", guild_id, e),
        }
    }
}
