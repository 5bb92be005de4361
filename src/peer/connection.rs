use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

pub type PeerId = String;

/// A connected WebSocket peer.
///
/// The relay never writes to the socket directly. Frames are pushed onto
/// `sender` and a per-connection task drains them into the socket.
///
/// The channel is unbounded: a client that stops reading accumulates
/// queued frames until its connection fails. Broadcast never waits on a
/// slow peer; back-pressure is left to the transport buffers.
#[derive(Debug)]
pub struct Peer {
    pub id: PeerId,
    pub sender: UnboundedSender<WsMessage>,
}

impl Peer {
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
        }
    }

    /// A peer can receive broadcasts while its send task is still draining.
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queues a frame for this peer. Returns `false` if the send task is gone.
    pub fn send(&self, frame: WsMessage) -> bool {
        self.sender.send(frame).is_ok()
    }
}
