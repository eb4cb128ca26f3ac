//! # Audio Module
//!
//! Per-guild playback: the queue, the controller that drives it, and the
//! seam to the voice layer.
//!
//! ## Architecture
//!
//! ### [`queue`] - Queue Model
//! - Pending tracks, current track and playback flags
//! - Volume, loop mode and shuffle settings
//! - Serializable [`queue::QueueSnapshot`]
//!
//! ### [`player`] - Playback Controller
//! - One actor task per guild owns the queue
//! - Commands and audio signals share a single ordered stream
//! - Auto-advance on end of track, guarded by a generation counter
//!
//! ### [`sink`] - Audio Seam
//! - [`sink::AudioSink`] for one guild's stream
//! - [`sink::VoiceGateway`] for joining and leaving voice channels
//!
//! ### [`songbird_sink`] - Songbird Backend
//! - Voice connections through songbird, streams through yt-dlp
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_music_queue::audio::{player::PlaybackController, queue::{Queue, Volume}};
//! use open_music_queue::audio::sink::AudioSink;
//! use open_music_queue::broadcast::EventBroadcaster;
//! use serenity::all::GuildId;
//! use std::sync::Arc;
//!
//! # async fn example(sink: Arc<dyn AudioSink>) -> open_music_queue::error::Result<()> {
//! let queue = Queue::new(1000, Volume::default());
//! let (controller, _task) =
//!     PlaybackController::spawn(GuildId::new(1), queue, sink, EventBroadcaster::new(64));
//!
//! controller.pause().await?;
//! controller.resume().await?;
//! controller.skip().await?;
//! # Ok(())
//! # }
//! ```

pub mod player;
pub mod queue;
pub mod sink;
pub mod songbird_sink;
