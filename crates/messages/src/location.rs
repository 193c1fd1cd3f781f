//! Post-migration location gossip.

use serde::{Deserialize, Serialize};
use simfabric_types::{HostId, NetworkMessage, ObjectId};

/// Tells a host that cached resolutions for these entities are stale.
///
/// Best-effort and lazy: a host that misses this message keeps its stale
/// cache until a misrouted invocation corrects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub entities: Vec<ObjectId>,
    pub new_host: HostId,
}

impl NetworkMessage for LocationUpdate {
    fn message_type_id() -> &'static str {
        "location.update"
    }
}
