use serde::de::IgnoredAny;
use tungstenite::protocol::Message as WsMessage;

/// What the relay does with one inbound WebSocket frame.
#[derive(Debug, PartialEq)]
pub enum Inbound {
    /// Valid JSON; fan the original frame out unchanged.
    Relay(WsMessage),
    /// Data frame that failed validation; dropped without a reply.
    Dropped(DropReason),
    /// Ping, pong or raw frame. The WebSocket layer handles these.
    Control,
    /// The peer started the closing handshake.
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    InvalidJson(String),
    InvalidUtf8,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::InvalidJson(err) => write!(f, "invalid json: {err}"),
            DropReason::InvalidUtf8 => write!(f, "binary frame is not utf-8"),
        }
    }
}

/// Classifies an inbound frame.
///
/// The payload is parsed into `IgnoredAny`, so validation never builds a
/// value and never re-encodes anything: the returned `Relay` frame is the
/// very frame that was received.
pub fn classify(msg: WsMessage) -> Inbound {
    let verdict = match &msg {
        WsMessage::Text(text) => validate_json(text.as_bytes()),
        WsMessage::Binary(data) => match std::str::from_utf8(data) {
            Ok(text) => validate_json(text.as_bytes()),
            Err(_) => Err(DropReason::InvalidUtf8),
        },
        WsMessage::Close(_) => return Inbound::Close,
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => return Inbound::Control,
    };

    match verdict {
        Ok(()) => Inbound::Relay(msg),
        Err(reason) => Inbound::Dropped(reason),
    }
}

fn validate_json(payload: &[u8]) -> Result<(), DropReason> {
    serde_json::from_slice::<IgnoredAny>(payload)
        .map(|_| ())
        .map_err(|e| DropReason::InvalidJson(e.to_string()))
}
