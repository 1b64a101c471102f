//! Join-in-progress synchronization
//!
//! A new peer adopts a snapshot from whichever peer reaches it first, then
//! waits until every peer it knows of has recorded it and confirmed inputs
//! past its current tick before scheduling its own spawn. Spawning any earlier
//! could land the spawn on a tick some peer has already processed.
//!
//! A peer that has not recorded us yet holds its net tick still, and every
//! peer reports its net tick, so the spawn goes past the highest one reported.

use rand::Rng;

use crate::game::constants::spawn::{X_RANGE, Y_RANGE, Z_RANGE};
use crate::game::constants::timing::JOIN_BARRIER_TICKS;
use crate::game::event::Tick;
use crate::game::state::PeerId;
use crate::net::peers::PeerRegistry;
use crate::util::vec3::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinState {
    /// No game state yet
    Unsynced,
    /// State adopted, spawn not yet scheduled
    WaitingForPeers,
    /// Spawn scheduled; full participant
    Synced,
}

impl JoinState {
    /// Whether this peer has game state and runs ticks
    pub fn is_started(&self) -> bool {
        !matches!(self, JoinState::Unsynced)
    }
}

/// Why a waiting peer has not spawned yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// The net horizon is behind the last processed tick
    NetBehind,
    /// A peer has no record or has not confirmed far enough
    PeerPending(PeerId),
    /// A peer has not shown it keeps a record of us
    Unacknowledged(PeerId),
}

#[derive(Debug, Clone)]
pub struct JoinSynchronizer {
    state: JoinState,
    spawn_tick: Option<Tick>,
}

impl Default for JoinSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinSynchronizer {
    pub fn new() -> Self {
        Self {
            state: JoinState::Unsynced,
            spawn_tick: None,
        }
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Tick our spawn was scheduled for
    pub fn spawn_tick(&self) -> Option<Tick> {
        self.spawn_tick
    }

    /// First peer in an empty session: synced at once, spawn at `spawn_tick`
    pub fn seed(&mut self, spawn_tick: Tick) {
        self.state = JoinState::Synced;
        self.spawn_tick = Some(spawn_tick);
    }

    /// Snapshot adopted; start waiting on the barrier
    pub fn adopt(&mut self) {
        self.state = JoinState::WaitingForPeers;
        self.spawn_tick = None;
    }

    /// Check the barrier for a waiting peer
    ///
    /// `tick` is the next tick to process. Passes when the net horizon has
    /// reached the last processed tick and every open peer and every recorded
    /// peer knows us and confirmed more than `JOIN_BARRIER_TICKS` past it.
    pub fn barrier(
        tick: Tick,
        net_tick: Tick,
        open_peers: &[PeerId],
        registry: &PeerRegistry,
    ) -> Result<(), Barrier> {
        // net_tick >= tick - 1, without going negative at tick 0
        if net_tick + 1 < tick {
            return Err(Barrier::NetBehind);
        }
        if let Some(peer) = open_peers.iter().find(|p| !registry.contains(**p)) {
            return Err(Barrier::PeerPending(*peer));
        }

        let mut records: Vec<_> = registry.iter().collect();
        records.sort_by_key(|r| r.id);
        for record in records {
            if !record.knows_us {
                return Err(Barrier::Unacknowledged(record.id));
            }
            // confirmed > (tick - 1) + JOIN_BARRIER_TICKS
            if record.confirmed_tick + 1 <= tick + JOIN_BARRIER_TICKS {
                return Err(Barrier::PeerPending(record.id));
            }
        }
        Ok(())
    }

    /// Advance `WaitingForPeers -> Synced` if the barrier is clear
    ///
    /// Returns the spawn tick exactly once, on the transition: `input_delay`
    /// ticks ahead, and past every net tick a peer has reported.
    pub fn poll(
        &mut self,
        tick: Tick,
        net_tick: Tick,
        input_delay: u64,
        open_peers: &[PeerId],
        registry: &PeerRegistry,
    ) -> Option<Tick> {
        if self.state != JoinState::WaitingForPeers {
            return None;
        }
        if Self::barrier(tick, net_tick, open_peers, registry).is_err() {
            return None;
        }
        let reported = registry.max_reported_net().map_or(0, |net| net + 1);
        let spawn_tick = (tick + input_delay).max(reported);
        self.state = JoinState::Synced;
        self.spawn_tick = Some(spawn_tick);
        Some(spawn_tick)
    }
}

/// Random spawn point inside the spawn area
pub fn spawn_position(rng: &mut impl Rng) -> Vec3 {
    Vec3::new(
        rng.gen_range(X_RANGE.0..X_RANGE.1),
        rng.gen_range(Y_RANGE.0..Y_RANGE.1),
        rng.gen_range(Z_RANGE.0..Z_RANGE.1),
    )
}
