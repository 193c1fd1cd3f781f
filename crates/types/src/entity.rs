//! The entity contract between the model and the placement core.
//!
//! The model formalism (state transition logic, time advance) is an external
//! collaborator; the core only needs entities to be *invokable* by operation
//! name and *snapshotable* for transfer. Dispatch is a tagged operation match
//! per entity type, not reflection: unknown operations are a typed error.

use crate::ObjectId;
use thiserror::Error;

/// Argument list for an entity operation, as self-describing values.
pub type CallArgs = Vec<serde_json::Value>;

/// Result value of an entity operation.
pub type CallValue = serde_json::Value;

/// Errors raised by an entity's own dispatch.
#[derive(Debug, Error)]
pub enum EntityError {
    /// The entity's dispatch table has no such operation.
    #[error("entity type {type_name} has no operation {method:?}")]
    UnknownMethod {
        type_name: &'static str,
        method: String,
    },

    /// Arguments did not match what the operation expects.
    #[error("bad arguments for {method:?}: {reason}")]
    BadArguments { method: String, reason: String },

    /// The operation itself failed; propagated to the caller unchanged.
    #[error("{0}")]
    Failed(String),
}

/// Errors from snapshotting an entity for transfer.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The entity's reachable state cannot be encoded for transfer.
    #[error("state of {type_name} cannot be encoded: {reason}")]
    NonSerializable {
        type_name: &'static str,
        reason: String,
    },
}

/// A unit of model state owned by exactly one host at a time.
///
/// Implementors supply a dispatch table (a match over supported operation
/// names) and a byte-level snapshot of their full reachable state. The
/// snapshot, paired with a decoder registered for `type_name`, is the
/// migration payload.
pub trait Entity: Send {
    /// Declared type name; must match the decoder registration on every host
    /// that may receive this entity.
    fn type_name(&self) -> &'static str;

    /// Execute one named operation against the entity.
    fn dispatch(&mut self, method: &str, args: &CallArgs) -> Result<CallValue, EntityError>;

    /// Load contribution of this entity, in the same units as model-graph
    /// vertex weights. Used by the load balancer to size transfers.
    fn weight(&self) -> u64 {
        1
    }

    /// Encode the entity's full reachable state for transfer.
    ///
    /// This doubles as the serializability check: a failure rejects the
    /// migration before anything is moved.
    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError>;
}

/// Query interface for an entity's communication partners.
///
/// Supplied by the model. The migration layer asks it which entities exchange
/// messages with a migrated entity, to decide which hosts should be told
/// about the new location. Recomputed on demand, never persisted.
pub trait ObjectReferrer: Send + Sync {
    /// ObjectIds the given entity exchanges messages with.
    fn partners_of(&self, id: &ObjectId) -> Vec<ObjectId>;
}

/// A referrer that reports no partners; useful for models whose entities are
/// independent, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPartners;

impl ObjectReferrer for NoPartners {
    fn partners_of(&self, _id: &ObjectId) -> Vec<ObjectId> {
        Vec::new()
    }
}
