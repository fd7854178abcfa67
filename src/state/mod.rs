//! Transient coordinator state.
//!
//! - [`PresenceTracker`]: online set and live viewer rosters.
//! - [`KeyedLocks`]: per-key serialization of read-check-then-write sequences.
//! - [`ConnIdGenerator`]: connection identifiers.

pub mod locks;
mod presence;
mod uid;

pub use locks::KeyedLocks;
pub use presence::PresenceTracker;
pub use uid::{ConnId, ConnIdGenerator, new_entity_id};
