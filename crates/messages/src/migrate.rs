//! Entity transfer request and response.

use serde::{Deserialize, Serialize};
use simfabric_types::{HostId, NetworkMessage, ObjectId, Request};

/// Transfers one entity's serialized state to the destination host.
///
/// Sent only after the source has verified serializability. A positive
/// response means the destination has registered the entity locally — the
/// irrevocable point of the migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateRequest {
    pub id: ObjectId,
    pub source: HostId,
    pub dest: HostId,
    /// Declared entity type; selects the decoder on the destination.
    pub type_name: String,
    /// Snapshot of the entity's full reachable state.
    pub state: Vec<u8>,
    /// Load contribution, for the destination's capacity check.
    pub weight: u64,
}

/// Accept/reject answer from the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateResponse {
    pub accepted: bool,
    pub reason: Option<String>,
}

impl MigrateResponse {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn declined(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

impl NetworkMessage for MigrateRequest {
    fn message_type_id() -> &'static str {
        "migrate.request"
    }
}

impl NetworkMessage for MigrateResponse {
    fn message_type_id() -> &'static str {
        "migrate.response"
    }
}

impl Request for MigrateRequest {
    type Response = MigrateResponse;
}
