//! Diagnostics reported by a session

use crate::game::event::Tick;
use crate::game::state::PeerId;
use crate::net::peers::PeerRecord;

/// How the last render frame relates to authoritative state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStatus {
    /// No tick was processed since the previous frame
    Stalled,
    /// At least one whole tick was predicted ahead
    Predicting,
    /// Only a partial tick was predicted
    Interpolating,
    /// Rendered state is exactly the authoritative state
    Live,
}

impl RenderStatus {
    pub fn classify(advanced: bool, simulated_frames: f64) -> Self {
        if !advanced {
            RenderStatus::Stalled
        } else if simulated_frames >= 1.0 {
            RenderStatus::Predicting
        } else if simulated_frames > 0.0 {
            RenderStatus::Interpolating
        } else {
            RenderStatus::Live
        }
    }
}

/// Link state of one remote peer as seen from here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    /// Channel open, nothing received yet
    Connecting,
    /// Exchanging packets, but its inputs do not yet reach past our tick
    Syncing,
    /// Its confirmed inputs run ahead of our processed tick
    Live,
    /// Channel closed; the record goes away on the next prune
    Closed,
}

impl PeerStatus {
    pub fn classify(open: bool, record: Option<&PeerRecord>, tick: Tick) -> Self {
        match (open, record) {
            (false, _) => PeerStatus::Closed,
            (true, None) => PeerStatus::Connecting,
            (true, Some(r)) if r.confirmed_tick >= tick => PeerStatus::Live,
            (true, Some(_)) => PeerStatus::Syncing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerDiagnostics {
    pub id: PeerId,
    pub status: PeerStatus,
    /// Confirmed tick minus our last processed tick
    pub lead: i64,
    pub confirmed_tick: Tick,
    pub acknowledged_tick: Tick,
}

/// Running counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub packets_dropped: u64,
    pub send_failures: u64,
    pub ticks_processed: u64,
    pub ticks_predicted: u64,
    pub frames: u64,
}
