//! # Fanout
//!
//! `fanout` is a minimal, in-memory WebSocket broadcast relay. Every JSON frame
//! received from a connected peer is forwarded, byte for byte, to every peer
//! currently connected, the sender included. Frames that are not valid JSON
//! are dropped without a reply.
//!
//! ## Core Modules
//!
//! - `relay`: the connection set, inbound frame classification and fan-out.
//! - `peer`: represents one open WebSocket connection.
//! - `config`: loads server and relay configuration.
//! - `transport`: the WebSocket accept loop and per-connection tasks.
//! - `utils`: error type and logging setup.

pub mod config;
pub mod peer;
pub mod relay;
pub mod transport;
pub mod utils;
