//! The `relay` module holds the connection set and the fan-out logic.
//!
//! The set lives behind a `std::sync::Mutex` shared across connection tasks.
//! The lock is held only for register, remove and broadcast, and never
//! across an `.await`.

pub mod engine;
pub mod frame;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use engine::{BroadcastReport, Relay};
pub use frame::{DropReason, Inbound, classify};

pub type SharedRelay = Arc<Mutex<Relay>>;

pub fn shared(relay: Relay) -> SharedRelay {
    Arc::new(Mutex::new(relay))
}

/// Locks the shared relay. A poisoned lock is recovered: the peer map stays
/// consistent even if a holder panicked.
pub fn lock(relay: &SharedRelay) -> MutexGuard<'_, Relay> {
    relay.lock().unwrap_or_else(PoisonError::into_inner)
}
