use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::sources::Track;

/// Modo de repetición (se guarda y reporta, todavía no afecta el avance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    None,
    Track,
    Queue,
}

/// Estado de reproducción, derivado de los flags de la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Volumen en porcentaje, siempre dentro de `0..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(u8);

impl Volume {
    pub const MAX: u8 = 100;

    /// Ajusta cualquier valor al rango permitido
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, Self::MAX as i64) as u8)
    }

    pub fn percent(self) -> u8 {
        self.0
    }

    /// Ganancia lineal para el driver de audio (1.0 = 100%)
    pub fn gain(self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(50)
    }
}

impl TryFrom<i64> for Volume {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=Self::MAX as i64).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(ValidationError::VolumeOutOfRange(value))
        }
    }
}

/// Cola de un guild: pendientes, track actual y flags de reproducción
#[derive(Debug)]
pub struct Queue {
    pending: VecDeque<Track>,
    current: Option<Track>,
    playing: bool,
    paused: bool,
    volume: Volume,
    loop_mode: LoopMode,
    shuffle: bool,
    max_size: usize,
    rng: StdRng,
}

impl Queue {
    pub fn new(max_size: usize, volume: Volume) -> Self {
        Self::with_rng(max_size, volume, StdRng::from_entropy())
    }

    pub fn with_rng(max_size: usize, volume: Volume, rng: StdRng) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            playing: false,
            paused: false,
            volume,
            loop_mode: LoopMode::None,
            shuffle: false,
            max_size,
            rng,
        }
    }

    /// Agrega un track al final de la cola
    pub fn push(&mut self, track: Track) -> Result<(), ValidationError> {
        if self.pending.len() >= self.max_size {
            return Err(ValidationError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.pending.push_back(track);
        Ok(())
    }

    /// Pasa el primer pendiente a `current` (Loading); `None` si la cola quedó vacía
    pub fn advance(&mut self) -> Option<Track> {
        self.playing = false;
        self.paused = false;

        // Estricto FIFO: si shuffle está activo el orden ya fue permutado
        self.current = self.pending.pop_front();
        match &self.current {
            Some(track) => {
                info!("➡️ Siguiente en cola: {}", track.title());
                Some(track.clone())
            }
            None => {
                info!("📭 Cola vacía, no hay siguiente track");
                None
            }
        }
    }

    pub fn mark_playing(&mut self) {
        if self.current.is_some() {
            self.playing = true;
            self.paused = false;
        }
    }

    pub fn mark_paused(&mut self) {
        if self.current.is_some() {
            self.playing = false;
            self.paused = true;
        }
    }

    /// Limpia la cola y el track actual
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
        self.playing = false;
        self.paused = false;
        info!("🗑️ Cola limpiada");
    }

    /// Elimina un track pendiente; el track actual no se toca
    pub fn remove(&mut self, index: i64) -> Result<Track, ValidationError> {
        let len = self.pending.len();
        let out_of_range = ValidationError::IndexOutOfRange { index, len };

        let position = usize::try_from(index).map_err(|_| out_of_range.clone())?;
        let track = self.pending.remove(position).ok_or(out_of_range)?;

        debug!("❌ Track eliminado en posición {}", position);
        Ok(track)
    }

    pub fn set_volume(&mut self, value: i64) -> Volume {
        self.volume = Volume::clamped(value);
        self.volume
    }

    /// Alterna el modo aleatorio; solo mezcla al activarse
    pub fn toggle_shuffle(&mut self) -> bool {
        self.shuffle = !self.shuffle;
        if self.shuffle {
            self.pending.make_contiguous().shuffle(&mut self.rng);
            info!("🔀 Modo aleatorio activado ({} canciones mezcladas)", self.pending.len());
        } else {
            info!("➡️ Modo aleatorio desactivado");
        }
        self.shuffle
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::None => info!("➡️ Repetición desactivada"),
            LoopMode::Track => info!("🔂 Repetir canción activado"),
            LoopMode::Queue => info!("🔁 Repetir cola activado"),
        }
    }

    pub fn state(&self) -> PlaybackState {
        match (self.playing, self.paused, &self.current) {
            (true, _, _) => PlaybackState::Playing,
            (_, true, _) => PlaybackState::Paused,
            (_, _, Some(_)) => PlaybackState::Loading,
            _ => PlaybackState::Idle,
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    /// Copia serializable del estado actual
    pub fn snapshot(&self) -> QueueSnapshot {
        let pending: Vec<Track> = self.pending.iter().cloned().collect();
        let total_duration = pending
            .iter()
            .chain(self.current.iter())
            .map(|track| track.duration().as_secs())
            .sum();

        QueueSnapshot {
            state: self.state(),
            current: self.current.clone(),
            pending,
            playing: self.playing,
            paused: self.paused,
            volume: self.volume,
            loop_mode: self.loop_mode,
            shuffle: self.shuffle,
            total_duration,
        }
    }
}

/// Copia del estado de una cola tal como se envía a los oyentes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueSnapshot {
    pub state: PlaybackState,
    pub current: Option<Track>,
    pub pending: Vec<Track>,
    pub playing: bool,
    pub paused: bool,
    pub volume: Volume,
    pub loop_mode: LoopMode,
    pub shuffle: bool,
    /// Segundos, incluyendo el track actual
    pub total_duration: u64,
}

impl QueueSnapshot {
    /// Estado de una sesión recién creada
    pub fn empty(volume: Volume) -> Self {
        Self {
            state: PlaybackState::Idle,
            current: None,
            pending: Vec::new(),
            playing: false,
            paused: false,
            volume,
            loop_mode: LoopMode::None,
            shuffle: false,
            total_duration: 0,
        }
    }

    pub fn pending_ids(&self) -> Vec<&str> {
        self.pending.iter().map(|track| track.id()).collect()
    }
}
