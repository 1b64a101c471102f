use serde::{Deserialize, Serialize};

use crate::game::event::{ClientEvent, EventPayload, Tick};
use crate::game::state::{PeerId, Player};

/// Message sent every frame to every connected peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub sender: PeerId,
    /// Session seed (shared by every peer in the session)
    pub seed: u64,
    /// Every event the sender authored for ticks up to here is included or
    /// was sent before
    pub horizon_tick: Tick,
    /// Highest tick of the receiver's events the sender has confirmed
    pub received_on_sender: Tick,
    /// Highest tick the sender may process with what it knows
    #[serde(default)]
    pub net_tick: Tick,
    /// Every other peer the sender tracks, with its confirmed tick there
    #[serde(default)]
    pub known_peers: Vec<KnownPeer>,
    /// Events not yet acknowledged by the receiver
    pub events: Vec<ClientEvent>,
    /// Full state, only on first contact with a peer
    #[serde(default)]
    pub init: Option<InitSnapshot>,
}

/// A third peer as seen by the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownPeer {
    pub id: PeerId,
    /// All of its events up to this tick are in the sender's log or applied;
    /// 0 while the sender has not heard from it
    pub confirmed_tick: Tick,
}

/// State handed to a peer joining a running session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitSnapshot {
    /// Next tick the sender will process; the players already include every
    /// tick before it
    pub tick: Tick,
    pub map_seed: u64,
    pub players: Vec<Player>,
}

impl Packet {
    pub fn is_init(&self) -> bool {
        self.init.is_some()
    }

    /// Reject packets that cannot come from a well-behaved peer
    ///
    /// `from` is the channel the packet arrived on; `local_id` is ours.
    pub fn validate(&self, from: PeerId, local_id: PeerId) -> Result<(), PacketError> {
        if self.sender != from {
            return Err(PacketError::SenderMismatch {
                channel: from,
                claimed: self.sender,
            });
        }
        if self.sender == local_id {
            return Err(PacketError::Echo);
        }
        for event in &self.events {
            let own = event.producer.map_or(true, |p| p == self.sender);
            // A peer cannot know its own inputs past its horizon
            if own && event.tick > self.horizon_tick {
                return Err(PacketError::EventBeyondHorizon {
                    tick: event.tick,
                    horizon: self.horizon_tick,
                });
            }
            if let EventPayload::Spawn(position) = event.payload {
                if !position.is_finite() {
                    return Err(PacketError::NonFinite);
                }
            }
        }
        if let Some(init) = &self.init {
            if init.players.iter().any(|p| !p.position.is_finite() || !p.velocity.is_finite()) {
                return Err(PacketError::NonFinite);
            }
        }
        Ok(())
    }
}

/// Reasons a packet is dropped
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacketError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("Packet claims sender {claimed} but arrived from {channel}")]
    SenderMismatch { channel: PeerId, claimed: PeerId },
    #[error("Packet echoes the local peer")]
    Echo,
    #[error("Event for tick {tick} beyond sender horizon {horizon}")]
    EventBeyondHorizon { tick: Tick, horizon: Tick },
    #[error("NaN or Infinity in packet values")]
    NonFinite,
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
