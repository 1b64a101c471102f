//! Tick-targeted input events
//!
//! Events are the only thing peers exchange about gameplay. Each one names the
//! tick it applies to; every peer applies it at exactly that tick.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::game::state::PeerId;
use crate::util::vec3::Vec3;

/// Tick index
pub type Tick = u64;

/// Directional/action intent packed into 16 bits
///
/// Low byte: direction angle, `0..=255` mapped onto `[-PI, PI]`.
/// Bit 8: move. Bit 9: jump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Intent(pub u16);

impl Intent {
    pub const IDLE: Intent = Intent(0);
    pub const MOVE: u16 = 0x1 << 8;
    pub const JUMP: u16 = 0x2 << 8;
    const ANGLE_MASK: u16 = 0xFF;

    /// Build an intent from a planar direction vector and the jump button
    ///
    /// A zero vector produces no direction and no move bit.
    pub fn from_direction(dx: f32, dy: f32, jump: bool) -> Self {
        let mut bits = 0u16;
        if dx != 0.0 || dy != 0.0 {
            let angle = dy.atan2(dx);
            bits = ((255.0 * (PI + angle) / (2.0 * PI)) as u16) & Self::ANGLE_MASK;
            bits |= Self::MOVE;
        }
        if jump {
            bits |= Self::JUMP;
        }
        Intent(bits)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn moving(&self) -> bool {
        self.0 & Self::MOVE != 0
    }

    #[inline]
    pub fn jumping(&self) -> bool {
        self.0 & Self::JUMP != 0
    }

    /// Direction angle in radians, decoded from the fixed-point byte
    #[inline]
    pub fn angle(&self) -> f32 {
        2.0 * PI * f32::from((self.0 & Self::ANGLE_MASK) as u8) / 255.0 - PI
    }
}

/// What an event does when its tick is processed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Overwrites the producer's current intent
    Intent(Intent),
    /// (Re)creates the producer's body at a position
    Spawn(Vec3),
    /// Carries no gameplay effect
    Empty,
}

/// One input event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Tick this event applies to
    pub tick: Tick,
    /// Producing peer. `None` for events authored locally; filled in when read
    /// or when received from the peer that authored them.
    #[serde(default)]
    pub producer: Option<PeerId>,
    pub payload: EventPayload,
}

impl ClientEvent {
    pub fn new(tick: Tick, payload: EventPayload) -> Self {
        Self {
            tick,
            producer: None,
            payload,
        }
    }

    pub fn intent(tick: Tick, intent: Intent) -> Self {
        Self::new(tick, EventPayload::Intent(intent))
    }

    pub fn spawn(tick: Tick, position: Vec3) -> Self {
        Self::new(tick, EventPayload::Spawn(position))
    }

    /// Copy of this event attributed to `producer` unless it already has one
    pub fn attributed_to(mut self, producer: PeerId) -> Self {
        if self.producer.is_none() {
            self.producer = Some(producer);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_idle_intent() {
        let intent = Intent::from_direction(0.0, 0.0, false);
        assert!(intent.is_idle());
        assert!(!intent.moving());
        assert!(!intent.jumping());
    }

    #[test]
    fn test_jump_only_has_no_move_bit() {
        let intent = Intent::from_direction(0.0, 0.0, true);
        assert!(intent.jumping());
        assert!(!intent.moving());
        assert!(!intent.is_idle());
    }

    #[test]
    fn test_direction_round_trip_within_quantization() {
        let step = 2.0 * PI / 255.0;
        for (dx, dy) in [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.5), (0.3, -0.9)] {
            let intent = Intent::from_direction(dx, dy, false);
            assert!(intent.moving());
            let expected = f32::atan2(dy, dx);
            assert!(
                (intent.angle() - expected).abs() <= step,
                "angle {} vs {}",
                intent.angle(),
                expected
            );
        }
    }

    #[test]
    fn test_angle_range() {
        assert!((Intent(Intent::MOVE).angle() + PI).abs() < 1e-6);
        assert!((Intent(Intent::MOVE | 0xFF).angle() - PI).abs() < 1e-5);
    }

    #[test]
    fn test_attribution_keeps_existing_producer() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let event = ClientEvent::intent(5, Intent::IDLE).attributed_to(a);
        assert_eq!(event.producer, Some(a));
        assert_eq!(event.attributed_to(b).producer, Some(a));
    }
}
