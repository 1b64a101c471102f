//! Simulation state definitions
//!
//! The world is the full authoritative entity set: one body per peer that has
//! spawned. Peers share it only through the init snapshot.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::event::Intent;
use crate::util::vec3::Vec3;

/// Unique peer identifier
pub type PeerId = Uuid;

/// Player body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Peer that owns (and steers) this body
    pub owner: PeerId,
    /// Position; `z` is height above ground
    pub position: Vec3,
    pub velocity: Vec3,
    pub alive: bool,
    /// Last intent applied for the owner
    #[serde(default)]
    pub intent: Intent,
}

impl Player {
    pub fn new(owner: PeerId, position: Vec3) -> Self {
        Self {
            owner,
            position,
            velocity: Vec3::ZERO,
            alive: true,
            intent: Intent::IDLE,
        }
    }

    /// Whether the body touches or has sunk below the ground
    pub fn grounded(&self) -> bool {
        self.position.z <= 0.0
    }
}

/// Complete simulated world
///
/// Cloning is the prediction snapshot: plain values, no shared references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct World {
    players: HashMap<PeerId, Player>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a world from a snapshot's player list
    pub fn from_players(players: impl IntoIterator<Item = Player>) -> Self {
        Self {
            players: players.into_iter().map(|p| (p.owner, p)).collect(),
        }
    }

    /// Player list ordered by owner, stable across peers
    pub fn to_players(&self) -> Vec<Player> {
        let mut players: Vec<Player> = self.players.values().cloned().collect();
        players.sort_by_key(|p| p.owner);
        players
    }

    pub fn get_player(&self, owner: PeerId) -> Option<&Player> {
        self.players.get(&owner)
    }

    pub fn get_player_mut(&mut self, owner: PeerId) -> Option<&mut Player> {
        self.players.get_mut(&owner)
    }

    /// Insert a player, replacing any body with the same owner
    pub fn insert_player(&mut self, player: Player) -> Option<Player> {
        self.players.insert(player.owner, player)
    }

    pub fn remove_player(&mut self, owner: PeerId) -> Option<Player> {
        self.players.remove(&owner)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}
