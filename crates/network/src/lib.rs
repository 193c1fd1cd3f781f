//! Transport-independent network layer.
//!
//! This crate contains everything the runtimes share regardless of transport:
//!
//! - [`Network`]: typed message-passing interface hosts program against
//! - [`wire`]: LZ4 compress/decompress helpers
//! - [`codec`]: serde_json encode/decode for typed messages
//! - [`HandlerRegistry`]: type-erased dispatch of inbound gossip
//!
//! How a [`HostId`](simfabric_types::HostId) maps to a transport endpoint is
//! delegated to an external naming service; only the in-memory backend ships
//! in this workspace.

pub mod codec;
mod handler_registry;
mod traits;
pub mod wire;

pub use codec::{decode_message, encode_message, CodecError};
pub use handler_registry::HandlerRegistry;
pub use traits::{InboundRequestHandler, Network, RequestError, ResponseCallback};
pub use wire::{compress, decompress, WireError};
