//! Per-host object location directory.
//!
//! One [`ObjectLocationDirectory`] per host process, explicitly constructed
//! and passed by reference — no ambient global state. It is the single
//! source of truth for where an entity currently lives, from this host's
//! point of view:
//!
//! - `Local`: this host holds the authoritative entity.
//! - `Remote(host)`: a cached belief, corrected lazily when wrong.
//!
//! # Concurrency
//!
//! The directory is the only structure mutated by multiple components:
//! invocation paths read, the migration controller writes. Readers do a
//! lock-free load of an entry that is replaced atomically, never mutated in
//! place, so a reader cannot observe a half-updated entry. A migration takes
//! a per-entry gate; reads arriving while the gate is held park on a bounded
//! waiter queue, and once the queue is full further readers get a retryable
//! [`DirectoryError::Busy`] instead of blocking indefinitely.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use simfabric_types::{HostId, ObjectId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Where an entity lives, from this host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// This host holds the authoritative entity.
    Local,
    /// The entity is believed to live on the given host.
    Remote(HostId),
}

/// Errors from directory operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The id was never registered here, locally or as a cache entry.
    #[error("object {0} is unknown to this directory")]
    UnknownObject(ObjectId),

    /// The operation needs the authoritative (local) entry, but this host
    /// only holds a cache entry. Caller bug or stale cache; re-resolve.
    #[error("object {0} is not local to this host")]
    NotLocal(ObjectId),

    /// An authoritative entry for this id already exists; ids are never
    /// reused, so this is a registration bug.
    #[error("object {0} is already registered locally")]
    AlreadyRegistered(ObjectId),

    /// A cache update arrived for an entity this host holds authoritatively;
    /// the update is stale gossip and was not applied.
    #[error("object {0} is held locally; cache update rejected")]
    IsLocal(ObjectId),

    /// The entry is gated by an in-progress migration and the waiter queue
    /// is full. Transient and retryable.
    #[error("object {0} is busy migrating")]
    Busy(ObjectId),
}

/// Directory tuning knobs.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Maximum invocations parked per entry during a migration. Further
    /// resolutions fail with [`DirectoryError::Busy`].
    pub max_waiters: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self { max_waiters: 32 }
    }
}

#[derive(Debug, Default)]
struct GateState {
    migrating: bool,
    waiters: usize,
}

/// Per-entry migration gate.
#[derive(Debug, Default)]
struct Gate {
    /// Fast-path mirror of `state.migrating`, so resolutions off the
    /// migration path never touch the mutex.
    closed: AtomicBool,
    state: Mutex<GateState>,
    cond: Condvar,
}

impl Gate {
    /// Park until the in-progress migration completes.
    fn wait_open(&self, id: &ObjectId, max_waiters: usize) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        while state.migrating {
            if state.waiters >= max_waiters {
                return Err(DirectoryError::Busy(id.clone()));
            }
            state.waiters += 1;
            self.cond.wait(&mut state);
            state.waiters -= 1;
        }
        Ok(())
    }

    fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.migrating {
            return false;
        }
        state.migrating = true;
        self.closed.store(true, Ordering::Release);
        true
    }

    fn open(&self) {
        let mut state = self.state.lock();
        state.migrating = false;
        self.closed.store(false, Ordering::Release);
        self.cond.notify_all();
    }
}

#[derive(Debug)]
struct Slot {
    location: ArcSwap<Location>,
    gate: Gate,
}

impl Slot {
    fn new(location: Location) -> Arc<Self> {
        Arc::new(Self {
            location: ArcSwap::from_pointee(location),
            gate: Gate::default(),
        })
    }
}

/// RAII handle over a gated entry during one migration attempt.
///
/// While the guard is held, resolutions of the entry park (or fail busy).
/// Dropping the guard without [`commit`](Self::commit) rolls back: the entry
/// is unchanged and waiters proceed against the old location.
pub struct MigrationGuard {
    id: ObjectId,
    slot: Arc<Slot>,
    committed: bool,
}

impl MigrationGuard {
    /// Atomically replace the entry and release the gate.
    pub fn commit(mut self, new_location: Location) {
        self.slot.location.store(Arc::new(new_location));
        self.committed = true;
        debug!(id = %self.id, ?new_location, "directory entry committed");
        // Drop opens the gate and wakes waiters.
    }

    /// Id this guard covers.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }
}

impl Drop for MigrationGuard {
    fn drop(&mut self) {
        if !self.committed {
            trace!(id = %self.id, "migration gate rolled back");
        }
        self.slot.gate.open();
    }
}

/// Maps ObjectIds to their believed current location.
pub struct ObjectLocationDirectory {
    host: HostId,
    config: DirectoryConfig,
    entries: DashMap<ObjectId, Arc<Slot>>,
}

impl ObjectLocationDirectory {
    pub fn new(host: HostId, config: DirectoryConfig) -> Self {
        Self {
            host,
            config,
            entries: DashMap::new(),
        }
    }

    /// Host this directory belongs to.
    pub fn host(&self) -> HostId {
        self.host
    }

    fn slot(&self, id: &ObjectId) -> Result<Arc<Slot>, DirectoryError> {
        self.entries
            .get(id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| DirectoryError::UnknownObject(id.clone()))
    }

    /// Resolve an id to its believed location.
    ///
    /// If the entry is gated by an in-progress migration this parks until
    /// the migration completes (bounded queue, [`DirectoryError::Busy`] when
    /// full); it never returns a location the migration is about to
    /// invalidate.
    pub fn resolve(&self, id: &ObjectId) -> Result<Location, DirectoryError> {
        let slot = self.slot(id)?;
        if slot.gate.closed.load(Ordering::Acquire) {
            slot.gate.wait_open(id, self.config.max_waiters)?;
        }
        Ok(**slot.location.load())
    }

    /// Record that this host now holds the authoritative entity.
    ///
    /// Promotes an existing cache entry (the receive side of a migration);
    /// a second authoritative registration is an error.
    pub fn register_local(&self, id: &ObjectId) -> Result<(), DirectoryError> {
        match self.entries.entry(id.clone()) {
            dashmap::Entry::Occupied(occupied) => {
                let slot = occupied.get();
                if matches!(**slot.location.load(), Location::Local) {
                    return Err(DirectoryError::AlreadyRegistered(id.clone()));
                }
                slot.location.store(Arc::new(Location::Local));
            }
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(Location::Local));
            }
        }
        trace!(id = %id, host = %self.host, "registered local");
        Ok(())
    }

    /// Record or correct a cached remote location.
    ///
    /// Rejected when this host holds the entity authoritatively — that
    /// update is stale gossip and the caller should log it, not apply it.
    pub fn update_cache(&self, id: &ObjectId, host: HostId) -> Result<(), DirectoryError> {
        match self.entries.entry(id.clone()) {
            dashmap::Entry::Occupied(occupied) => {
                let slot = occupied.get();
                if matches!(**slot.location.load(), Location::Local) {
                    return Err(DirectoryError::IsLocal(id.clone()));
                }
                slot.location.store(Arc::new(Location::Remote(host)));
            }
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(Slot::new(Location::Remote(host)));
            }
        }
        Ok(())
    }

    /// Drop an entry entirely (entity destroyed, or cache eviction).
    pub fn unregister(&self, id: &ObjectId) -> Result<(), DirectoryError> {
        let slot = self.slot(id)?;
        if slot.gate.closed.load(Ordering::Acquire) {
            return Err(DirectoryError::Busy(id.clone()));
        }
        self.entries.remove(id);
        Ok(())
    }

    /// Gate an entry for one migration attempt.
    ///
    /// Requires the authoritative entry; fails busy if a migration of the
    /// same entity is already in flight.
    pub fn begin_migration(&self, id: &ObjectId) -> Result<MigrationGuard, DirectoryError> {
        let slot = self.slot(id)?;
        if !matches!(**slot.location.load(), Location::Local) {
            return Err(DirectoryError::NotLocal(id.clone()));
        }
        if !slot.gate.close() {
            return Err(DirectoryError::Busy(id.clone()));
        }
        debug!(id = %id, host = %self.host, "migration gate closed");
        Ok(MigrationGuard {
            id: id.clone(),
            slot,
            committed: false,
        })
    }

    /// True if this host holds the authoritative entry for the id.
    pub fn is_local(&self, id: &ObjectId) -> bool {
        matches!(self.resolve(id), Ok(Location::Local))
    }

    /// Ids of all authoritative entries, in unspecified order.
    pub fn local_ids(&self) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|r| matches!(**r.value().location.load(), Location::Local))
            .map(|r| r.key().clone())
            .collect()
    }
}
