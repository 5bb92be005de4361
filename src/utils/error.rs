//! The `error` module defines the error type shared across `fanout`.
//!
//! Only process-level failures are represented here. Problems with a single
//! frame or a single connection are logged where they happen and never
//! surface as a `RelayError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("relay is at capacity ({limit} connections)")]
    AtCapacity { limit: usize },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}
