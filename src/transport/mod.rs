//! The `transport` module owns the network side of the relay: the TCP
//! listener, the WebSocket upgrade and the per-connection send and receive
//! loops that connect sockets to the `Relay`.

pub mod websocket;

pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod websocket_tests;
