//! Remote invocation request and response.

use serde::{Deserialize, Serialize};
use simfabric_types::{CallArgs, CallValue, HostId, NetworkMessage, ObjectId, Request};

/// A method call forwarded to the host believed to hold the entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub id: ObjectId,
    pub method: String,
    pub args: CallArgs,
}

impl InvokeRequest {
    pub fn new(id: ObjectId, method: impl Into<String>, args: CallArgs) -> Self {
        Self {
            id,
            method: method.into(),
            args,
        }
    }
}

/// Error categories carried on the wire.
///
/// The receiving gateway maps these back onto its own typed errors; the
/// message carries the category plus a human-readable detail string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvokeFaultKind {
    /// The id is not registered anywhere reachable.
    UnknownObject,
    /// The entity is mid-migration and its invocation queue is full.
    EntityBusy,
    /// The entity's own operation failed; the message is its error.
    EntityFailed,
    /// The request could not be interpreted by the remote gateway.
    BadRequest,
}

/// Outcome of a forwarded invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InvokeResponse {
    /// The entity executed; here is its result.
    Ok(CallValue),
    /// The entity could not be executed.
    Err {
        kind: InvokeFaultKind,
        message: String,
    },
    /// The receiving host no longer holds the entity. The caller should
    /// update its cached location and retry against `now_at`.
    Misrouted { now_at: HostId },
}

impl NetworkMessage for InvokeRequest {
    fn message_type_id() -> &'static str {
        "invoke.request"
    }
}

impl NetworkMessage for InvokeResponse {
    fn message_type_id() -> &'static str {
        "invoke.response"
    }
}

impl Request for InvokeRequest {
    type Response = InvokeResponse;
}

#[cfg(test)]
mod tests {
    use super::*;
    use simfabric_types::ObjectIdAllocator;

    #[test]
    fn test_invoke_request_roundtrips_through_serde() {
        let id = ObjectIdAllocator::new(HostId(0)).allocate("counter");
        let req = InvokeRequest::new(id.clone(), "add", vec![serde_json::json!(3)]);
        let bytes = serde_json::to_vec(&req).unwrap();
        let back: InvokeRequest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.id, id);
        assert_eq!(back.method, "add");
    }

    #[test]
    fn test_misrouted_response_carries_new_host() {
        let resp = InvokeResponse::Misrouted {
            now_at: HostId(4),
        };
        let bytes = serde_json::to_vec(&resp).unwrap();
        let back: InvokeResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(back, InvokeResponse::Misrouted { now_at } if now_at == HostId(4)));
    }
}
