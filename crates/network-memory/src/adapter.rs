//! Per-host adapter implementing the `Network` trait against the hub.

use crate::hub::HubInner;
use simfabric_network::{
    codec, InboundRequestHandler, Network, RequestError, ResponseCallback,
};
use simfabric_types::{HostId, NetworkMessage, Request};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

/// A host's handle onto the shared [`MemoryHub`](crate::MemoryHub).
///
/// Delivery is synchronous: `send_to` runs the target's listeners and
/// `request` runs the target's inbound handler on the caller's stack, after a
/// full encode/decode round-trip through the shared codec.
pub struct MemoryNetwork {
    host: HostId,
    hub: Arc<HubInner>,
}

impl MemoryNetwork {
    pub(crate) fn new(host: HostId, hub: Arc<HubInner>) -> Self {
        Self { host, hub }
    }

    /// The host this adapter belongs to.
    pub fn host(&self) -> HostId {
        self.host
    }

    fn deliver<M: NetworkMessage>(&self, peer: HostId, message: &M) {
        if self.hub.is_partitioned(self.host, peer) {
            self.hub.stats.lock().messages_dropped_partition += 1;
            trace!(from = %self.host, to = %peer, "message dropped by partition");
            return;
        }
        let Some(slot) = self.hub.slot(peer) else {
            trace!(from = %self.host, to = %peer, "no such host; message dropped");
            return;
        };
        let bytes = match codec::encode_message(message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to encode outbound message");
                return;
            }
        };
        self.hub.sample_latency();
        self.hub.stats.lock().messages_sent += 1;
        slot.registry.dispatch(self.host, M::message_type_id(), &bytes);
    }
}

impl Network for MemoryNetwork {
    fn send_to<M: NetworkMessage>(&self, peer: HostId, message: &M) {
        self.deliver(peer, message);
    }

    fn broadcast<M: NetworkMessage>(&self, message: &M) {
        let peers: Vec<HostId> = self.hub.slots.read().keys().copied().collect();
        for peer in peers {
            if peer != self.host {
                self.deliver(peer, message);
            }
        }
    }

    fn request<R: Request + 'static>(
        &self,
        peer: HostId,
        request: &R,
        _timeout: Duration,
        on_response: ResponseCallback<R::Response>,
    ) {
        {
            let mut stats = self.hub.stats.lock();
            stats.requests_sent += 1;
        }
        // A partition looks like a timeout to the caller: the request left
        // but nothing ever came back.
        if self.hub.is_partitioned(self.host, peer) {
            self.hub.stats.lock().requests_failed += 1;
            on_response(Err(RequestError::Timeout));
            return;
        }
        let Some(slot) = self.hub.slot(peer) else {
            self.hub.stats.lock().requests_failed += 1;
            on_response(Err(RequestError::PeerUnreachable(peer)));
            return;
        };
        let Some(handler) = slot.handler.get().cloned() else {
            self.hub.stats.lock().requests_failed += 1;
            on_response(Err(RequestError::PeerUnreachable(peer)));
            return;
        };

        let result = codec::encode_message(request)
            .map_err(|e| RequestError::PeerError(e.to_string()))
            .and_then(|bytes| {
                self.hub.sample_latency();
                handler.handle_request(self.host, R::message_type_id(), &bytes)
            })
            .and_then(|response_bytes| {
                self.hub.sample_latency();
                codec::decode_message::<R::Response>(&response_bytes)
                    .map_err(|e| RequestError::PeerError(e.to_string()))
            });
        if result.is_err() {
            self.hub.stats.lock().requests_failed += 1;
        }
        on_response(result);
    }

    fn on_message<M: NetworkMessage + 'static>(
        &self,
        handler: Box<dyn Fn(HostId, M) + Send + Sync>,
    ) {
        if let Some(slot) = self.hub.slot(self.host) {
            slot.registry.register(handler);
        }
    }

    fn register_inbound_handler(&self, handler: Arc<dyn InboundRequestHandler>) {
        let Some(slot) = self.hub.slot(self.host) else {
            return;
        };
        if slot.handler.set(handler).is_err() {
            warn!(host = %self.host, "inbound handler already registered; ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{MemoryHub, MemoryHubConfig};
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        n: u64,
    }

    impl NetworkMessage for Ping {
        fn message_type_id() -> &'static str {
            "test.ping"
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Pong {
        n: u64,
    }

    impl NetworkMessage for Pong {
        fn message_type_id() -> &'static str {
            "test.pong"
        }
    }

    impl Request for Ping {
        type Response = Pong;
    }

    struct Echo;

    impl InboundRequestHandler for Echo {
        fn handle_request(
            &self,
            _from: HostId,
            type_id: &str,
            bytes: &[u8],
        ) -> Result<Vec<u8>, RequestError> {
            assert_eq!(type_id, Ping::message_type_id());
            let ping: Ping = codec::decode_message(bytes)
                .map_err(|e| RequestError::PeerError(e.to_string()))?;
            codec::encode_message(&Pong { n: ping.n })
                .map_err(|e| RequestError::PeerError(e.to_string()))
        }
    }

    #[test]
    fn test_send_to_reaches_registered_listener() {
        let hub = MemoryHub::new(MemoryHubConfig::default());
        let a = hub.adapter(HostId(0));
        let b = hub.adapter(HostId(1));

        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = Arc::clone(&seen);
        b.on_message::<Ping>(Box::new(move |from, ping| {
            assert_eq!(from, HostId(0));
            seen2.store(ping.n, Ordering::SeqCst);
        }));

        a.send_to(HostId(1), &Ping { n: 9 });
        assert_eq!(seen.load(Ordering::SeqCst), 9);
        assert_eq!(hub.stats().messages_sent, 1);
    }

    #[test]
    fn test_request_roundtrip_through_codec() {
        let hub = MemoryHub::default();
        let a = hub.adapter(HostId(0));
        let b = hub.adapter(HostId(1));
        b.register_inbound_handler(Arc::new(Echo));

        let got = Arc::new(AtomicU64::new(0));
        let got2 = Arc::clone(&got);
        a.request(
            HostId(1),
            &Ping { n: 31 },
            Duration::from_secs(1),
            Box::new(move |res| {
                got2.store(res.unwrap().n, Ordering::SeqCst);
            }),
        );
        assert_eq!(got.load(Ordering::SeqCst), 31);
    }

    #[test]
    fn test_partition_turns_requests_into_timeouts() {
        let hub = MemoryHub::default();
        let a = hub.adapter(HostId(0));
        let b = hub.adapter(HostId(1));
        b.register_inbound_handler(Arc::new(Echo));
        hub.partition_bidirectional(HostId(0), HostId(1));

        let failed = Arc::new(AtomicU64::new(0));
        let failed2 = Arc::clone(&failed);
        a.request(
            HostId(1),
            &Ping { n: 1 },
            Duration::from_secs(1),
            Box::new(move |res| {
                assert_eq!(res.unwrap_err(), RequestError::Timeout);
                failed2.store(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(failed.load(Ordering::SeqCst), 1);

        hub.heal_all();
        a.send_to(HostId(1), &Ping { n: 2 });
        assert_eq!(hub.stats().messages_dropped_partition, 0);
    }
}
