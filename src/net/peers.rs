//! Per-peer confirmation and acknowledgement tracking
//!
//! Both counters only move forward. A stale or duplicated packet that reports
//! lower values than already recorded changes nothing, which is what makes
//! out-of-order delivery safe.
//!
//! Records also exist for peers we only know about second hand, from another
//! peer's packet. Such a record holds our horizon back until that peer talks
//! to us directly, and it lives as long as someone we hear from still lists it.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::game::event::Tick;
use crate::game::event_log::EventLog;
use crate::game::state::PeerId;
use crate::net::protocol::{KnownPeer, Packet};

/// What this peer knows about one remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: PeerId,
    /// Highest tick for which all of the peer's events are known here
    pub confirmed_tick: Tick,
    /// Highest tick of our events the peer has confirmed receiving
    pub acknowledged_tick: Tick,
    /// Highest net tick the peer has reported
    pub net_tick: Tick,
    /// A packet from the peer arrived on its own channel
    pub heard: bool,
    /// The peer keeps a record of us (it sent a regular packet)
    pub knows_us: bool,
    /// Peers listed in the peer's latest packet
    pub known_peers: SmallVec<[PeerId; 8]>,
}

impl PeerRecord {
    pub fn new(id: PeerId) -> Self {
        Self {
            id,
            confirmed_tick: 0,
            acknowledged_tick: 0,
            net_tick: 0,
            heard: false,
            knows_us: false,
            known_peers: SmallVec::new(),
        }
    }

    /// Raise the confirmed tick. Returns true if it moved.
    pub fn confirm(&mut self, tick: Tick) -> bool {
        if tick > self.confirmed_tick {
            self.confirmed_tick = tick;
            true
        } else {
            false
        }
    }

    /// Raise the acknowledged tick. Returns true if it moved.
    pub fn acknowledge(&mut self, tick: Tick) -> bool {
        if tick > self.acknowledged_tick {
            self.acknowledged_tick = tick;
            true
        } else {
            false
        }
    }
}

/// Result of applying one packet to the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    /// Events appended to the received log
    pub ingested: usize,
    pub confirmed_raised: bool,
    pub acknowledged_raised: bool,
}

/// Records for every peer we have heard from or about
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    records: HashMap<PeerId, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the record for a peer
    pub fn upsert(&mut self, id: PeerId) -> &mut PeerRecord {
        self.records.entry(id).or_insert_with(|| PeerRecord::new(id))
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerRecord> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: PeerId) -> bool {
        self.records.contains_key(&id)
    }

    pub fn remove(&mut self, id: PeerId) -> Option<PeerRecord> {
        self.records.remove(&id)
    }

    /// Apply a packet that arrived from `from` on its own channel
    ///
    /// Events are ingested only when the packet moves the peer's horizon
    /// forward, and only those after the previous horizon. `next_tick` is our
    /// first unprocessed tick: events before it can never be applied and are
    /// skipped. Events the sender forwards on behalf of other peers are
    /// skipped too; those reach us from their producer.
    pub fn observe(
        &mut self,
        from: PeerId,
        packet: &Packet,
        next_tick: Tick,
        local_id: PeerId,
        log: &mut EventLog,
    ) -> Observation {
        let record = self.upsert(from);
        let mut observation = Observation::default();

        record.heard = true;
        if !packet.is_init() {
            record.knows_us = true;
        }
        record.net_tick = record.net_tick.max(packet.net_tick);
        if packet.horizon_tick >= record.confirmed_tick {
            record.known_peers = packet
                .known_peers
                .iter()
                .map(|k| k.id)
                .filter(|id| *id != local_id && *id != from)
                .collect();
        }

        if packet.horizon_tick > record.confirmed_tick {
            let after = record.confirmed_tick;
            for event in &packet.events {
                if event.tick <= after || event.tick < next_tick {
                    continue;
                }
                if event.producer.is_some_and(|p| p != from) {
                    continue;
                }
                log.append_received(event.attributed_to(from));
                observation.ingested += 1;
            }
            observation.confirmed_raised = record.confirm(packet.horizon_tick);
        }

        observation.acknowledged_raised = record.acknowledge(packet.received_on_sender);
        observation
    }

    /// Create records for listed peers we know nothing about yet
    ///
    /// `skip` filters out ids that must not come back (ourselves, the sender,
    /// peers already gone). Returns the ids added.
    pub fn learn(&mut self, known: &[KnownPeer], skip: impl Fn(PeerId) -> bool) -> Vec<PeerId> {
        let mut added = Vec::new();
        for peer in known {
            if skip(peer.id) || self.records.contains_key(&peer.id) {
                continue;
            }
            self.records.insert(peer.id, PeerRecord::new(peer.id));
            added.push(peer.id);
        }
        added
    }

    /// Lowest confirmed tick over all records
    pub fn min_confirmed(&self) -> Option<Tick> {
        self.records.values().map(|r| r.confirmed_tick).min()
    }

    /// Lowest acknowledged tick over all records
    pub fn min_acknowledged(&self) -> Option<Tick> {
        self.records.values().map(|r| r.acknowledged_tick).min()
    }

    /// Highest net tick any peer has reported
    pub fn max_reported_net(&self) -> Option<Tick> {
        self.records.values().map(|r| r.net_tick).max()
    }

    /// Drop records that are gone; returns removed ids, sorted
    ///
    /// A peer we have heard from goes once its channel is no longer open. A
    /// peer we only know second hand stays while its channel is open or some
    /// peer we hear from still lists it.
    pub fn sweep(&mut self, is_open: impl Fn(PeerId) -> bool) -> Vec<PeerId> {
        let listed: HashSet<PeerId> = self
            .records
            .values()
            .filter(|r| r.heard)
            .flat_map(|r| r.known_peers.iter().copied())
            .collect();

        let mut removed = Vec::new();
        self.records.retain(|id, record| {
            let keep = is_open(*id) || (!record.heard && listed.contains(id));
            if !keep {
                removed.push(*id);
            }
            keep
        });
        removed.sort();
        removed
    }

    /// Every record as advertised to other peers, ordered by id
    pub fn known_peers(&self) -> Vec<KnownPeer> {
        let mut known: Vec<KnownPeer> = self
            .records
            .values()
            .map(|r| KnownPeer {
                id: r.id,
                confirmed_tick: r.confirmed_tick,
            })
            .collect();
        known.sort_by_key(|k| k.id);
        known
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::event::{ClientEvent, Intent};
    use crate::net::protocol::InitSnapshot;
    use uuid::Uuid;

    fn packet(sender: PeerId, horizon: Tick, received: Tick, ticks: &[Tick]) -> Packet {
        Packet {
            sender,
            seed: 0,
            horizon_tick: horizon,
            received_on_sender: received,
            net_tick: 0,
            known_peers: Vec::new(),
            events: ticks
                .iter()
                .map(|t| ClientEvent::intent(*t, Intent(Intent::MOVE)))
                .collect(),
            init: None,
        }
    }

    #[test]
    fn test_upsert_creates_zero_record() {
        let mut registry = PeerRegistry::new();
        let id = Uuid::new_v4();
        let record = registry.upsert(id);
        assert_eq!(record.confirmed_tick, 0);
        assert_eq!(record.acknowledged_tick, 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_observe_ingests_after_confirmed() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();

        let first = registry.observe(from, &packet(from, 10, 0, &[7, 8, 9, 10]), 0, local, &mut log);
        assert_eq!(first.ingested, 4);
        assert!(first.confirmed_raised);
        assert_eq!(registry.get(from).unwrap().confirmed_tick, 10);

        // Resend overlaps the previous horizon; only 11 and 12 are new
        let second =
            registry.observe(from, &packet(from, 12, 0, &[9, 10, 11, 12]), 0, local, &mut log);
        assert_eq!(second.ingested, 2);
        assert_eq!(log.received_len(), 6);
        assert!(log.received().iter().all(|e| e.producer == Some(from)));
    }

    #[test]
    fn test_observe_skips_processed_ticks() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();

        let observation = registry.observe(from, &packet(from, 10, 0, &[4, 5, 6, 7]), 6, local, &mut log);
        assert_eq!(observation.ingested, 2);
        assert!(log.received().iter().all(|e| e.tick >= 6));
    }

    #[test]
    fn test_stale_horizon_ignored() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();

        registry.observe(from, &packet(from, 20, 0, &[19, 20]), 0, local, &mut log);
        let stale = registry.observe(from, &packet(from, 15, 0, &[14, 15]), 0, local, &mut log);

        assert_eq!(stale.ingested, 0);
        assert!(!stale.confirmed_raised);
        assert_eq!(registry.get(from).unwrap().confirmed_tick, 20);
        assert_eq!(log.received_len(), 2);
    }

    #[test]
    fn test_stale_ack_does_not_regress() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();

        registry.observe(from, &packet(from, 5, 30, &[]), 0, local, &mut log);
        let stale = registry.observe(from, &packet(from, 6, 12, &[]), 0, local, &mut log);

        assert!(!stale.acknowledged_raised);
        assert_eq!(registry.get(from).unwrap().acknowledged_tick, 30);
    }

    #[test]
    fn test_idempotent_ack() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let p = packet(from, 14, 9, &[12, 13, 14]);

        let mut once = PeerRegistry::new();
        once.observe(from, &p, 0, local, &mut EventLog::new());

        let mut twice = PeerRegistry::new();
        let mut log = EventLog::new();
        twice.observe(from, &p, 0, local, &mut log);
        let again = twice.observe(from, &p, 0, local, &mut log);

        assert_eq!(once.get(from), twice.get(from));
        assert_eq!(again, Observation::default());
        assert_eq!(log.received_len(), 3);
    }

    #[test]
    fn test_min_over_records() {
        let mut registry = PeerRegistry::new();
        assert_eq!(registry.min_confirmed(), None);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.upsert(a).confirm(30);
        registry.upsert(a).acknowledge(4);
        registry.upsert(b).confirm(22);
        registry.upsert(b).acknowledge(9);

        assert_eq!(registry.min_confirmed(), Some(22));
        assert_eq!(registry.min_acknowledged(), Some(4));
    }

    #[test]
    fn test_observe_marks_direct_contact() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();

        let mut init = packet(from, 10, 0, &[]);
        init.init = Some(InitSnapshot {
            tick: 7,
            map_seed: 0,
            players: Vec::new(),
        });
        init.net_tick = 6;
        registry.observe(from, &init, 0, local, &mut log);
        let record = registry.get(from).unwrap();
        assert!(record.heard);
        assert!(!record.knows_us);
        assert_eq!(record.net_tick, 6);

        // A regular packet means the sender has a record of us
        let mut regular = packet(from, 11, 4, &[]);
        regular.net_tick = 3;
        registry.observe(from, &regular, 0, local, &mut log);
        let record = registry.get(from).unwrap();
        assert!(record.knows_us);
        assert_eq!(record.net_tick, 6);
    }

    #[test]
    fn test_observe_skips_forwarded_events() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let third = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();

        let mut p = packet(from, 10, 0, &[9]);
        p.events.push(ClientEvent::intent(10, Intent::IDLE).attributed_to(third));
        p.events.push(ClientEvent::intent(10, Intent::IDLE).attributed_to(local));
        p.events.push(ClientEvent::intent(10, Intent::IDLE).attributed_to(from));
        let observation = registry.observe(from, &p, 0, local, &mut log);

        assert_eq!(observation.ingested, 2);
        assert!(log.received().iter().all(|e| e.producer == Some(from)));
        assert!(!registry.contains(third));
    }

    #[test]
    fn test_learn_adds_unknown_peers_only() {
        let local = Uuid::new_v4();
        let from = Uuid::new_v4();
        let known = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        registry.upsert(known).confirm(40);

        let listed = [local, from, known, fresh].map(|id| KnownPeer {
            id,
            confirmed_tick: 50,
        });
        let added = registry.learn(&listed, |id| id == local || id == from);

        assert_eq!(added, vec![fresh]);
        assert_eq!(registry.get(known).unwrap().confirmed_tick, 40);
        // Second-hand records hold the horizon at zero until the peer talks
        let record = registry.get(fresh).unwrap();
        assert_eq!(record.confirmed_tick, 0);
        assert!(!record.heard);
        assert_eq!(registry.min_confirmed(), Some(0));
    }

    #[test]
    fn test_sweep_removes_closed_direct_peers() {
        let local = Uuid::new_v4();
        let open = Uuid::new_v4();
        let closed = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();
        registry.observe(open, &packet(open, 5, 0, &[]), 0, local, &mut log);
        registry.observe(closed, &packet(closed, 5, 0, &[]), 0, local, &mut log);

        let removed = registry.sweep(|id| id == open);
        assert_eq!(removed, vec![closed]);
        assert!(registry.contains(open));
        assert!(!registry.contains(closed));
    }

    #[test]
    fn test_sweep_keeps_listed_second_hand_peers() {
        let local = Uuid::new_v4();
        let relay = Uuid::new_v4();
        let remote = Uuid::new_v4();
        let mut registry = PeerRegistry::new();
        let mut log = EventLog::new();

        let mut p = packet(relay, 5, 0, &[]);
        p.known_peers.push(KnownPeer {
            id: remote,
            confirmed_tick: 4,
        });
        registry.observe(relay, &p, 0, local, &mut log);
        registry.learn(&p.known_peers, |id| id == local);

        // No channel to `remote`, but the relay vouches for it
        assert!(registry.sweep(|id| id == relay).is_empty());
        assert!(registry.contains(remote));

        // The relay stops listing it
        registry.observe(relay, &packet(relay, 6, 0, &[]), 0, local, &mut log);
        assert_eq!(registry.sweep(|id| id == relay), vec![remote]);
    }

    #[test]
    fn test_known_peers_sorted() {
        let mut registry = PeerRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry.upsert(a).confirm(3);
        registry.upsert(b).confirm(9);
        let known = registry.known_peers();
        assert_eq!(known.len(), 2);
        assert!(known[0].id < known[1].id);
        assert_eq!(registry.max_reported_net(), Some(0));
    }
}
