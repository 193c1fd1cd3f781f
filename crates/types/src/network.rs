//! Network message traits.
//!
//! These traits mark types as network messages for serialization and routing.
//! Living in the foundation crate keeps the message and network crates free
//! of a dependency on each other.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Marker trait for network messages.
///
/// All messages sent between hosts must implement this trait. The type id is
/// carried on the wire so the receiving side can route raw bytes to the right
/// typed handler before decoding.
pub trait NetworkMessage: Send + Sync + Sized + Serialize + DeserializeOwned {
    /// Unique message type identifier for routing.
    fn message_type_id() -> &'static str;
}

/// Marker trait for request messages that expect a response.
pub trait Request: NetworkMessage {
    /// The response type for this request.
    type Response: NetworkMessage;
}
