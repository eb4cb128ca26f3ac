//! # Open Music Queue
//!
//! Per-guild playback queues for a Discord music bot: track resolution,
//! an ordered queue per guild, a playback state machine that auto-advances
//! on end of track, a registry of voice sessions and an event stream with
//! every queue change.
//!
//! Start at [`session::SessionRegistry`]; everything a command front-end
//! needs goes through it.

pub mod audio;
pub mod bot;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod session;
pub mod sources;

#[cfg(test)]
pub(crate) mod testing;

pub use audio::queue::{LoopMode, PlaybackState, QueueSnapshot, Volume};
pub use broadcast::{EventBroadcaster, PlayerEvent, StatsSnapshot};
pub use error::{PlayerError, Result};
pub use session::{RegistrySettings, Session, SessionRegistry};
pub use sources::{Requester, Track, TrackResolver};
