//! WebSocket transport
//!
//! Accepts TCP connections, performs the WebSocket upgrade and runs each
//! connection as two tasks:
//! - a receive loop that classifies inbound frames and fans valid JSON out
//!   through the `Relay`
//! - a send loop that drains the peer's channel into the socket
//!
//! A failure on one connection only ends that connection.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::spawn;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tracing::{debug, info, trace, warn};
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::peer::Peer;
use crate::relay::{self, Inbound, SharedRelay};
use crate::utils::error::RelayError;

/// Binds `addr` and serves until the process stops.
pub async fn start_websocket_server(addr: &str, relay: SharedRelay) -> Result<(), RelayError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    serve(listener, relay).await
}

/// Pause after a failed `accept`. Errors such as EMFILE repeat until a
/// descriptor is released, so retrying at once would spin.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Source of inbound TCP connections for the accept loop.
pub(crate) trait Acceptor {
    fn accept_conn(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn accept_conn(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        self.accept()
    }
}

/// Runs the accept loop on an already bound listener.
pub async fn serve(listener: TcpListener, relay: SharedRelay) -> Result<(), RelayError> {
    match listener.local_addr() {
        Ok(addr) => info!("WebSocket relay listening on ws://{addr}"),
        Err(_) => info!("WebSocket relay listening"),
    }

    accept_loop(&listener, relay).await
}

pub(crate) async fn accept_loop<A: Acceptor>(
    acceptor: &A,
    relay: SharedRelay,
) -> Result<(), RelayError> {
    loop {
        match acceptor.accept_conn().await {
            Ok((stream, addr)) => {
                spawn(handle_connection(stream, addr, relay.clone()));
            }
            // Accept errors concern only the pending connection; keep
            // serving the open ones.
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, relay: SharedRelay) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake error");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();
    let peer = Peer::new(tx);
    let peer_id = peer.id.clone();

    let registered = relay::lock(&relay).register(peer);
    if let Err(e) = registered {
        warn!(%addr, error = %e, "rejecting connection");
        let close = CloseFrame {
            code: CloseCode::Again,
            reason: "relay at capacity".into(),
        };
        let _ = ws_sender.send(WsMessage::Close(Some(close))).await;
        return;
    }
    info!(peer = %peer_id, %addr, "peer connected");

    {
        let peer_id = peer_id.clone();

        spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_sender.send(msg).await {
                    debug!(peer = %peer_id, error = %e, "failed to send frame");
                    break;
                }
            }

            // Closing the receiver makes later broadcasts skip this peer
            // until the receive loop removes it.
            rx.close();
            let _ = ws_sender.close().await;
            trace!(peer = %peer_id, "send loop closed");
        });
    }

    while let Some(frame) = ws_receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!(peer = %peer_id, error = %e, "connection error");
                break;
            }
        };

        match relay::classify(msg) {
            Inbound::Relay(msg) => {
                let report = relay::lock(&relay).broadcast(&msg);
                trace!(
                    peer = %peer_id,
                    delivered = report.delivered,
                    "relayed frame"
                );
            }
            Inbound::Dropped(reason) => {
                debug!(peer = %peer_id, %reason, "dropping frame");
            }
            Inbound::Control => {}
            Inbound::Close => break,
        }
    }

    // Dropping the peer closes its channel; the send loop drains and exits.
    relay::lock(&relay).remove(&peer_id);
    info!(peer = %peer_id, %addr, "peer disconnected");
}
