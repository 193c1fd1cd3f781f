//! Type-erased handler registry for inbound message dispatch.
//!
//! Stores typed handlers keyed by message type id and dispatches incoming
//! wire bytes to the matching handlers after decoding.

use crate::codec;
use simfabric_types::{HostId, NetworkMessage};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::trace;

/// Type-erased handler that decodes from bytes and calls the typed handler.
type RawHandler = Box<dyn Fn(HostId, &[u8]) + Send + Sync>;

/// Registry of typed message handlers, keyed by message type id.
///
/// Thread-safe via `RwLock` — registrations are rare, dispatches frequent.
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<&'static str, Vec<RawHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a typed handler for a message type.
    ///
    /// The raw bytes are decoded into `M` before the handler runs. Decode
    /// failures drop the message with a trace log; a malformed frame from a
    /// peer must not take the delivery thread down.
    pub fn register<M: NetworkMessage + 'static>(
        &self,
        handler: Box<dyn Fn(HostId, M) + Send + Sync>,
    ) {
        let erased: RawHandler = Box::new(move |sender, bytes| {
            match codec::decode_message::<M>(bytes) {
                Ok(msg) => handler(sender, msg),
                Err(e) => trace!(%sender, error = %e, "dropping undecodable message"),
            }
        });
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .entry(M::message_type_id())
            .or_default()
            .push(erased);
    }

    /// Dispatch raw bytes to all registered handlers for the given type id.
    pub fn dispatch(&self, sender: HostId, type_id: &str, bytes: &[u8]) {
        let handlers = self
            .handlers
            .read()
            .expect("handler registry lock poisoned");
        if let Some(handlers) = handlers.get(type_id) {
            for handler in handlers {
                handler(sender, bytes);
            }
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Serialize, Deserialize)]
    struct Tick {
        n: u32,
    }

    impl NetworkMessage for Tick {
        fn message_type_id() -> &'static str {
            "test.tick"
        }
    }

    #[test]
    fn test_dispatch_routes_to_typed_handler() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen2 = Arc::clone(&seen);
        registry.register::<Tick>(Box::new(move |_, tick| {
            seen2.store(tick.n, Ordering::SeqCst);
        }));

        let bytes = codec::encode_message(&Tick { n: 42 }).unwrap();
        registry.dispatch(HostId(1), Tick::message_type_id(), &bytes);
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_unknown_type_id_is_ignored() {
        let registry = HandlerRegistry::new();
        registry.dispatch(HostId(1), "nobody.home", b"whatever");
    }
}
