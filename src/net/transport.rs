//! Peer transport seam and an in-process mesh
//!
//! The core never opens connections itself. It sees a set of per-peer,
//! message-oriented channels with an open flag, and receives inbound bytes
//! through `Session::receive_bytes`.
//!
//! `MemoryMesh` wires several sessions together inside one process: every
//! endpoint owns a crossbeam inbox, and the link table (which pairs are
//! connected, and whether the link is still open) is shared behind a lock.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use hashbrown::{HashMap, HashSet};
use parking_lot::RwLock;

use crate::game::state::PeerId;

/// Outbound side of the per-peer channels
pub trait Transport {
    /// Every peer a channel exists for, open or not
    fn peers(&self) -> Vec<PeerId>;

    /// Whether the channel to `peer` can carry messages
    fn is_open(&self, peer: PeerId) -> bool;

    /// Send one message. Delivery is best effort.
    fn send(&mut self, peer: PeerId, payload: Vec<u8>) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("No channel to peer {0}")]
    UnknownPeer(PeerId),
    #[error("Channel to peer {0} is closed")]
    Closed(PeerId),
}

/// Message as delivered to an endpoint's inbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: PeerId,
    pub payload: Vec<u8>,
}

/// Unordered pair key for the link table
fn link_key(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Default)]
struct MeshInner {
    inboxes: HashMap<PeerId, Sender<Envelope>>,
    /// Known links and their open flag
    links: HashMap<(PeerId, PeerId), bool>,
    /// Neighbours per endpoint, for `peers()`
    neighbours: HashMap<PeerId, HashSet<PeerId>>,
}

/// Shared link table for in-process endpoints
#[derive(Clone, Default)]
pub struct MemoryMesh {
    inner: Arc<RwLock<MeshInner>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint. It starts without links.
    pub fn join(&self, id: PeerId) -> MemoryTransport {
        let (sender, receiver) = unbounded();
        let mut inner = self.inner.write();
        inner.inboxes.insert(id, sender);
        inner.neighbours.entry(id).or_default();
        MemoryTransport {
            id,
            mesh: self.clone(),
            inbox: receiver,
        }
    }

    /// Open a channel between two endpoints
    pub fn link(&self, a: PeerId, b: PeerId) {
        if a == b {
            return;
        }
        let mut inner = self.inner.write();
        inner.links.insert(link_key(a, b), true);
        inner.neighbours.entry(a).or_default().insert(b);
        inner.neighbours.entry(b).or_default().insert(a);
    }

    /// Connect `id` to every other registered endpoint
    pub fn link_all(&self, id: PeerId) {
        let others: Vec<PeerId> = {
            let inner = self.inner.read();
            inner.inboxes.keys().copied().filter(|p| *p != id).collect()
        };
        for other in others {
            self.link(id, other);
        }
    }

    /// Mark the channel between two endpoints closed. Both still list it.
    pub fn close(&self, a: PeerId, b: PeerId) {
        if let Some(open) = self.inner.write().links.get_mut(&link_key(a, b)) {
            *open = false;
        }
    }

    /// Remove an endpoint: its inbox goes away and every link to it closes
    pub fn leave(&self, id: PeerId) {
        let mut inner = self.inner.write();
        inner.inboxes.remove(&id);
        let neighbours: Vec<PeerId> = inner
            .neighbours
            .get(&id)
            .map(|n| n.iter().copied().collect())
            .unwrap_or_default();
        for other in neighbours {
            if let Some(open) = inner.links.get_mut(&link_key(id, other)) {
                *open = false;
            }
        }
    }

    fn neighbours(&self, id: PeerId) -> Vec<PeerId> {
        let inner = self.inner.read();
        let mut peers: Vec<PeerId> = inner
            .neighbours
            .get(&id)
            .map(|n| n.iter().copied().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    fn is_open(&self, a: PeerId, b: PeerId) -> bool {
        self.inner
            .read()
            .links
            .get(&link_key(a, b))
            .copied()
            .unwrap_or(false)
    }

    fn deliver(&self, from: PeerId, to: PeerId, payload: Vec<u8>) -> Result<(), TransportError> {
        let inner = self.inner.read();
        match inner.links.get(&link_key(from, to)) {
            None => return Err(TransportError::UnknownPeer(to)),
            Some(false) => return Err(TransportError::Closed(to)),
            Some(true) => {}
        }
        let inbox = inner.inboxes.get(&to).ok_or(TransportError::Closed(to))?;
        inbox
            .send(Envelope { from, payload })
            .map_err(|_| TransportError::Closed(to))
    }
}

/// One endpoint of a `MemoryMesh`
pub struct MemoryTransport {
    id: PeerId,
    mesh: MemoryMesh,
    inbox: Receiver<Envelope>,
}

impl MemoryTransport {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn mesh(&self) -> &MemoryMesh {
        &self.mesh
    }

    /// Next pending inbound message, if any
    pub fn try_recv(&self) -> Option<Envelope> {
        self.inbox.try_recv().ok()
    }

    /// Drain all pending inbound messages
    pub fn drain(&self) -> Vec<Envelope> {
        self.inbox.try_iter().collect()
    }

    pub fn pending(&self) -> usize {
        self.inbox.len()
    }
}

impl Transport for MemoryTransport {
    fn peers(&self) -> Vec<PeerId> {
        self.mesh.neighbours(self.id)
    }

    fn is_open(&self, peer: PeerId) -> bool {
        self.mesh.is_open(self.id, peer)
    }

    fn send(&mut self, peer: PeerId, payload: Vec<u8>) -> Result<(), TransportError> {
        self.mesh.deliver(self.id, peer, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_link_and_send() {
        let mesh = MemoryMesh::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ta = mesh.join(a);
        let tb = mesh.join(b);
        mesh.link(a, b);

        assert_eq!(ta.peers(), vec![b]);
        assert!(ta.is_open(b));
        ta.send(b, vec![1, 2, 3]).unwrap();

        let envelope = tb.try_recv().unwrap();
        assert_eq!(envelope.from, a);
        assert_eq!(envelope.payload, vec![1, 2, 3]);
        assert!(tb.try_recv().is_none());
    }

    #[test]
    fn test_send_without_link() {
        let mesh = MemoryMesh::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ta = mesh.join(a);
        let _tb = mesh.join(b);

        assert!(ta.peers().is_empty());
        assert_eq!(ta.send(b, vec![0]), Err(TransportError::UnknownPeer(b)));
    }

    #[test]
    fn test_closed_link_still_listed() {
        let mesh = MemoryMesh::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ta = mesh.join(a);
        let _tb = mesh.join(b);
        mesh.link(a, b);
        mesh.close(a, b);

        assert_eq!(ta.peers(), vec![b]);
        assert!(!ta.is_open(b));
        assert_eq!(ta.send(b, vec![0]), Err(TransportError::Closed(b)));
    }

    #[test]
    fn test_leave_closes_links() {
        let mesh = MemoryMesh::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let transports: Vec<MemoryTransport> = ids.iter().map(|id| mesh.join(*id)).collect();
        for id in &ids {
            mesh.link_all(*id);
        }
        assert_eq!(transports[0].peers().len(), 2);

        mesh.leave(ids[2]);
        assert!(!transports[0].is_open(ids[2]));
        assert!(!transports[1].is_open(ids[2]));
        assert!(transports[0].is_open(ids[1]));
    }

    #[test]
    fn test_drain_preserves_order() {
        let mesh = MemoryMesh::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut ta = mesh.join(a);
        let tb = mesh.join(b);
        mesh.link(a, b);

        for i in 0..5u8 {
            ta.send(b, vec![i]).unwrap();
        }
        assert_eq!(tb.pending(), 5);
        let payloads: Vec<u8> = tb.drain().into_iter().map(|e| e.payload[0]).collect();
        assert_eq!(payloads, vec![0, 1, 2, 3, 4]);
    }
}
