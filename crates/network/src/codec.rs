//! Message encoding and decoding for network transport.
//!
//! Typed messages are serde_json-encoded then LZ4-compressed. The message
//! type travels out of band: point-to-point frames and gossip deliveries
//! carry the [`NetworkMessage::message_type_id`] next to the payload, so the
//! receiving side routes raw bytes to the right typed handler before
//! decoding.

use crate::wire;
use simfabric_types::NetworkMessage;
use thiserror::Error;

/// Errors from message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode error for {type_id}: {detail}")]
    Encode {
        type_id: &'static str,
        detail: String,
    },

    #[error("decode error for {type_id}: {detail}")]
    Decode {
        type_id: &'static str,
        detail: String,
    },

    #[error(transparent)]
    Wire(#[from] wire::WireError),
}

/// Encode a typed message to wire bytes.
pub fn encode_message<M: NetworkMessage>(message: &M) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(message).map_err(|e| CodecError::Encode {
        type_id: M::message_type_id(),
        detail: e.to_string(),
    })?;
    Ok(wire::compress(&json))
}

/// Decode wire bytes into a typed message.
pub fn decode_message<M: NetworkMessage>(bytes: &[u8]) -> Result<M, CodecError> {
    let json = wire::decompress(bytes)?;
    serde_json::from_slice(&json).map_err(|e| CodecError::Decode {
        type_id: M::message_type_id(),
        detail: e.to_string(),
    })
}
