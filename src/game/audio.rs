//! Audio cue triggers
//!
//! The simulation only reports cues. Playback belongs to whoever implements
//! [`AudioSink`]; it is fire-and-forget and never feeds back into state.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::game::constants::audio::{JUMP_VOLUME_BASE, JUMP_VOLUME_SPREAD};
use crate::game::event::Tick;
use crate::game::state::PeerId;

/// Sound a cue refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    Jump,
}

/// One-shot sound trigger produced during authoritative tick processing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioCue {
    pub kind: CueKind,
    /// Body that caused the cue
    pub owner: PeerId,
    pub tick: Tick,
    /// Playback volume in `[0, 1]`
    pub volume: f32,
}

impl AudioCue {
    /// Jump cue with a volume derived from `(seed, tick, owner)` only, so every
    /// peer computes the same value without shared RNG state
    pub fn jump(seed: u64, tick: Tick, owner: PeerId) -> Self {
        let bits = owner.as_u128();
        let (hi, lo) = ((bits >> 64) as u64, bits as u64);
        let mut rng = StdRng::seed_from_u64(seed ^ tick.rotate_left(32) ^ hi ^ lo.rotate_left(17));
        Self {
            kind: CueKind::Jump,
            owner,
            tick,
            volume: JUMP_VOLUME_BASE + JUMP_VOLUME_SPREAD * rng.gen::<f32>(),
        }
    }
}

/// Audio collaborator
pub trait AudioSink {
    fn play(&mut self, cue: AudioCue);
}

/// Sink that ignores every cue
#[derive(Debug, Default, Clone, Copy)]
pub struct Muted;

impl AudioSink for Muted {
    fn play(&mut self, _cue: AudioCue) {}
}

impl AudioSink for Vec<AudioCue> {
    fn play(&mut self, cue: AudioCue) {
        self.push(cue);
    }
}
