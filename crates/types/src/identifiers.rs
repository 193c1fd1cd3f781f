//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a compute host (a processor in the hardware graph).
///
/// Host addresses (how an id maps to a transport endpoint) are resolved by an
/// external naming service; within the core a host is just this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(pub u32);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

/// Identity of a vertex in a cost graph (hardware or model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Globally unique, immutable handle to a model entity.
///
/// Uniqueness comes from the `(origin, seq)` pair: the host that created the
/// entity plus a per-host monotonic counter. Sequence numbers are never
/// reused, even after the entity is destroyed, so a stale reference can never
/// alias a newer entity. The declared type name rides along purely for
/// diagnostics — it plays no part in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    origin: HostId,
    seq: u64,
    type_name: String,
}

impl ObjectId {
    /// Host that created the entity. Says nothing about where it lives now.
    pub fn origin(&self) -> HostId {
        self.origin
    }

    /// Per-origin sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Declared type of the referenced entity, for diagnostics.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.origin, self.type_name, self.seq)
    }
}

/// Per-host allocator of [`ObjectId`]s.
///
/// Monotonic and never recycled. One allocator per host process.
#[derive(Debug)]
pub struct ObjectIdAllocator {
    origin: HostId,
    next: AtomicU64,
}

impl ObjectIdAllocator {
    /// Create an allocator for the given host, starting at sequence 0.
    pub fn new(origin: HostId) -> Self {
        Self {
            origin,
            next: AtomicU64::new(0),
        }
    }

    /// Allocate a fresh id for an entity of the given declared type.
    pub fn allocate(&self, type_name: &str) -> ObjectId {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        ObjectId {
            origin: self.origin,
            seq,
            type_name: type_name.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_is_monotonic() {
        let alloc = ObjectIdAllocator::new(HostId(3));
        let a = alloc.allocate("counter");
        let b = alloc.allocate("counter");
        assert_eq!(a.origin(), HostId(3));
        assert_eq!(a.seq(), 0);
        assert_eq!(b.seq(), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_object_id_display() {
        let alloc = ObjectIdAllocator::new(HostId(1));
        let id = alloc.allocate("queue");
        assert_eq!(id.to_string(), "host-1/queue#0");
    }

    #[test]
    fn test_object_id_roundtrips_through_serde() {
        let alloc = ObjectIdAllocator::new(HostId(7));
        let id = alloc.allocate("server");
        let json = serde_json::to_string(&id).unwrap();
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
