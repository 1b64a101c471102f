//! Tick-indexed event log
//!
//! Holds events authored locally (kept until every peer acknowledged them or
//! they were processed) and events received from peers (kept until processed).
//! Duplicates are tolerated: applying the same event twice at the same tick has
//! the same effect as applying it once.

use smallvec::SmallVec;

use crate::game::event::{ClientEvent, Tick};
use crate::game::state::PeerId;

/// Events for one tick. Usually a handful, so they stay inline.
pub type TickEvents = SmallVec<[ClientEvent; 8]>;

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    local: Vec<ClientEvent>,
    received: Vec<ClientEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event authored by this peer
    pub fn append_local(&mut self, event: ClientEvent) {
        self.local.push(event);
    }

    /// Append an event produced by a remote peer
    pub fn append_received(&mut self, event: ClientEvent) {
        self.received.push(event);
    }

    /// All events for `tick`: local ones first (tagged with `local_id`), then received
    pub fn events_for_tick(&self, tick: Tick, local_id: PeerId) -> TickEvents {
        self.local
            .iter()
            .filter(|e| e.tick == tick)
            .map(|e| e.attributed_to(local_id))
            .chain(self.received.iter().filter(|e| e.tick == tick).copied())
            .collect()
    }

    /// Local events with `after < tick <= upto`
    pub fn local_between(&self, after: Tick, upto: Tick) -> impl Iterator<Item = &ClientEvent> + '_ {
        self.local
            .iter()
            .filter(move |e| e.tick > after && e.tick <= upto)
    }

    /// Every pending local event with `tick <= upto`
    pub fn local_upto(&self, upto: Tick) -> impl Iterator<Item = &ClientEvent> + '_ {
        self.local.iter().filter(move |e| e.tick <= upto)
    }

    /// Received events still waiting to be processed
    pub fn received(&self) -> &[ClientEvent] {
        &self.received
    }

    /// Drop events nobody can need any more
    ///
    /// `next_tick` is the first unprocessed tick. Received events before it are
    /// applied already. Local events are additionally kept until `ack_min`, the
    /// lowest tick every peer acknowledged, so they can still be resent.
    pub fn prune(&mut self, next_tick: Tick, ack_min: Tick) {
        self.received.retain(|e| e.tick >= next_tick);
        let Some(last_processed) = next_tick.checked_sub(1) else {
            return;
        };
        let keep_after = last_processed.min(ack_min);
        self.local.retain(|e| e.tick > keep_after);
    }

    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    pub fn received_len(&self) -> usize {
        self.received.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.received.is_empty()
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.received.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::event::{EventPayload, Intent};
    use crate::util::vec3::Vec3;
    use uuid::Uuid;

    #[test]
    fn test_events_for_tick_tags_local() {
        let local_id = Uuid::new_v4();
        let remote = Uuid::new_v4();
        let mut log = EventLog::new();

        log.append_local(ClientEvent::intent(5, Intent(Intent::MOVE)));
        log.append_local(ClientEvent::intent(6, Intent::IDLE));
        log.append_received(ClientEvent::spawn(5, Vec3::ZERO).attributed_to(remote));

        let events = log.events_for_tick(5, local_id);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].producer, Some(local_id));
        assert_eq!(events[0].payload, EventPayload::Intent(Intent(Intent::MOVE)));
        assert_eq!(events[1].producer, Some(remote));

        // Reading does not change what is stored
        assert_eq!(log.local_between(0, 10).next().unwrap().producer, None);
    }

    #[test]
    fn test_local_between_is_half_open() {
        let mut log = EventLog::new();
        for tick in 1..=6 {
            log.append_local(ClientEvent::intent(tick, Intent::IDLE));
        }
        let ticks: Vec<Tick> = log.local_between(2, 5).map(|e| e.tick).collect();
        assert_eq!(ticks, vec![3, 4, 5]);

        let ticks: Vec<Tick> = log.local_upto(5).map(|e| e.tick).collect();
        assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_duplicates_kept() {
        let mut log = EventLog::new();
        let event = ClientEvent::intent(3, Intent::IDLE).attributed_to(Uuid::new_v4());
        log.append_received(event);
        log.append_received(event);
        assert_eq!(log.events_for_tick(3, Uuid::new_v4()).len(), 2);
    }

    #[test]
    fn test_prune_received_behind_next_tick() {
        let mut log = EventLog::new();
        for tick in 0..10 {
            log.append_received(ClientEvent::intent(tick, Intent::IDLE));
        }
        log.prune(6, 100);
        assert!(log.received().iter().all(|e| e.tick >= 6));
        assert_eq!(log.received_len(), 4);
    }

    #[test]
    fn test_prune_local_waits_for_ack() {
        let mut log = EventLog::new();
        for tick in 0..10 {
            log.append_local(ClientEvent::intent(tick, Intent::IDLE));
        }

        // Processed up to 7, but a peer has only acknowledged 3
        log.prune(8, 3);
        assert_eq!(log.local_len(), 6);

        // Everyone acknowledged past the processed tick
        log.prune(8, 20);
        assert_eq!(log.local_len(), 2);
    }

    #[test]
    fn test_prune_before_first_tick_keeps_everything() {
        let mut log = EventLog::new();
        log.append_local(ClientEvent::intent(0, Intent::IDLE));
        log.append_received(ClientEvent::intent(0, Intent::IDLE));
        log.prune(0, 0);
        assert_eq!(log.local_len(), 1);
        assert_eq!(log.received_len(), 1);
    }
}
