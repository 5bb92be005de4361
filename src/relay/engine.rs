use std::collections::HashMap;

use tracing::{debug, trace};
use tungstenite::protocol::Message as WsMessage;

use crate::peer::{Peer, PeerId};
use crate::utils::error::RelayError;

/// Outcome of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers the frame was queued for.
    pub delivered: usize,
    /// Peers still registered whose send task has already stopped.
    pub unreachable: usize,
}

/// The set of currently open connections.
///
/// There is no grouping or addressing: every registered peer receives every
/// broadcast. Peers enter on `register` once the WebSocket upgrade completes
/// and leave on `remove` when the connection closes.
#[derive(Debug, Default)]
pub struct Relay {
    peers: HashMap<PeerId, Peer>,
    max_peers: usize,
}

impl Relay {
    /// Creates an empty relay with no connection limit.
    pub fn new() -> Self {
        Self::with_max_peers(0)
    }

    /// Creates an empty relay holding at most `max_peers` connections.
    /// Zero means unlimited.
    pub fn with_max_peers(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            max_peers,
        }
    }

    pub fn max_peers(&self) -> usize {
        self.max_peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Adds a peer to the connection set.
    pub fn register(&mut self, peer: Peer) -> Result<(), RelayError> {
        if self.max_peers != 0 && self.peers.len() >= self.max_peers {
            return Err(RelayError::AtCapacity {
                limit: self.max_peers,
            });
        }
        self.peers.insert(peer.id.clone(), peer);
        Ok(())
    }

    /// Removes a peer. Dropping the returned `Peer` closes its channel, which
    /// lets the send task drain and exit.
    pub fn remove(&mut self, id: &PeerId) -> Option<Peer> {
        self.peers.remove(id)
    }

    /// Queues `frame` for every open peer, the sender included.
    ///
    /// A peer whose channel is closed is counted and skipped; it never stops
    /// delivery to the others. Nothing is retried.
    pub fn broadcast(&self, frame: &WsMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for (id, peer) in &self.peers {
            if peer.is_open() && peer.send(frame.clone()) {
                report.delivered += 1;
            } else {
                debug!(peer = %id, "peer unreachable, frame not delivered");
                report.unreachable += 1;
            }
        }

        trace!(
            delivered = report.delivered,
            unreachable = report.unreachable,
            bytes = frame.len(),
            "broadcast"
        );
        report
    }
}
