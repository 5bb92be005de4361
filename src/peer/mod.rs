//! The `peer` module defines one open connection in the relay's connection
//! set: an opaque id and the channel feeding that connection's send task.

pub mod connection;
pub use connection::{Peer, PeerId};
