//! Connection and entity identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local id of one WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Hands out connection ids. Never reuses an id within a process.
#[derive(Debug)]
pub struct ConnIdGenerator {
    counter: AtomicU64,
}

impl Default for ConnIdGenerator {
    fn default() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }
}

impl ConnIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> ConnId {
        ConnId(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// Fresh id for a durable entity.
pub fn new_entity_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conn_ids_are_unique() {
        let generator = ConnIdGenerator::new();
        let a = generator.next();
        let b = generator.next();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "c1");
    }

    #[test]
    fn entity_ids_are_unique() {
        assert_ne!(new_entity_id(), new_entity_id());
    }
}
