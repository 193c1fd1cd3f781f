//! Live-entity storage and per-type snapshot decoders.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use simfabric_types::{Entity, ObjectId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// Entities currently hosted by this process.
///
/// Each entity sits behind its own mutex: invocations of different entities
/// run in parallel, invocations of the same entity serialize. The registry
/// holds no location knowledge — that is the directory's job.
#[derive(Default)]
pub struct EntityRegistry {
    entities: DashMap<ObjectId, Arc<Mutex<Box<dyn Entity>>>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entity under its id, replacing any previous occupant.
    pub fn insert(&self, id: ObjectId, entity: Box<dyn Entity>) {
        trace!(%id, "entity registered");
        self.entities.insert(id, Arc::new(Mutex::new(entity)));
    }

    /// Drop an entity. Returns false if the id was not present.
    ///
    /// An invocation already holding the entity finishes against the removed
    /// instance; the storage itself frees when the last holder drops.
    pub fn remove(&self, id: &ObjectId) -> bool {
        self.entities.remove(id).is_some()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Run a closure against the entity, serialized with other invocations
    /// of the same entity. `None` if the id is not hosted here.
    pub fn with_entity<R>(
        &self,
        id: &ObjectId,
        f: impl FnOnce(&mut dyn Entity) -> R,
    ) -> Option<R> {
        let cell = self.entities.get(id).map(|r| Arc::clone(r.value()))?;
        let mut entity = cell.lock();
        Some(f(entity.as_mut()))
    }

    /// Sum of the load weights of all hosted entities.
    pub fn total_weight(&self) -> u64 {
        self.entities
            .iter()
            .map(|r| r.value().lock().weight())
            .sum()
    }

    /// Hosted entities with weights, sorted by id for deterministic
    /// selection in the balancer.
    pub fn entities_by_id(&self) -> Vec<(ObjectId, u64)> {
        let mut all: Vec<(ObjectId, u64)> = self
            .entities
            .iter()
            .map(|r| (r.key().clone(), r.value().lock().weight()))
            .collect();
        all.sort();
        all
    }
}

/// Errors from rehydrating a migrated entity.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// No decoder registered for the declared type on this host.
    #[error("no decoder registered for entity type {0:?}")]
    UnknownType(String),

    /// The snapshot bytes could not be decoded.
    #[error("snapshot of {type_name:?} failed to decode: {detail}")]
    Decode { type_name: String, detail: String },
}

type RestoreFn = Box<dyn Fn(&[u8]) -> Result<Box<dyn Entity>, RestoreError> + Send + Sync>;

/// Per-type snapshot decoders, keyed by declared type name.
///
/// Every host that may receive a migrated entity of some type must register
/// that type's decoder at startup; a transfer of an unknown type is declined,
/// not dropped.
#[derive(Default)]
pub struct EntityTypeRegistry {
    decoders: RwLock<HashMap<String, RestoreFn>>,
}

impl EntityTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the decoder for one entity type.
    pub fn register(
        &self,
        type_name: &str,
        decode: impl Fn(&[u8]) -> Result<Box<dyn Entity>, RestoreError> + Send + Sync + 'static,
    ) {
        self.decoders
            .write()
            .insert(type_name.to_owned(), Box::new(decode));
    }

    /// Rehydrate an entity from its snapshot.
    pub fn restore(&self, type_name: &str, bytes: &[u8]) -> Result<Box<dyn Entity>, RestoreError> {
        let decoders = self.decoders.read();
        let decode = decoders
            .get(type_name)
            .ok_or_else(|| RestoreError::UnknownType(type_name.to_owned()))?;
        decode(bytes)
    }

    /// True if a decoder for the type is registered.
    pub fn knows(&self, type_name: &str) -> bool {
        self.decoders.read().contains_key(type_name)
    }
}
