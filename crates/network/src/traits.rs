//! Network trait for typed message passing.
//!
//! Defines the `Network` interface implemented by transport backends. Only
//! the deterministic in-memory backend ships in this workspace; a socket
//! backend would implement the same trait against a real endpoint registry.

use simfabric_types::{HostId, NetworkMessage, Request};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error returned when a network request fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,
    #[error("peer unreachable: {0}")]
    PeerUnreachable(HostId),
    #[error("peer returned error: {0}")]
    PeerError(String),
    #[error("network shutting down")]
    Shutdown,
}

/// Callback invoked with the decoded response of a request.
pub type ResponseCallback<R> = Box<dyn FnOnce(Result<R, RequestError>) + Send>;

/// Handler a host registers to serve inbound requests.
///
/// Receives the sender, the request type id, and the raw wire bytes; returns
/// encoded response bytes. Implementations decode, serve, and encode using
/// the shared codec.
pub trait InboundRequestHandler: Send + Sync {
    fn handle_request(
        &self,
        from: HostId,
        type_id: &str,
        bytes: &[u8],
    ) -> Result<Vec<u8>, RequestError>;
}

/// Network interface for sending typed messages and registering listeners.
///
/// Generic methods make this NOT object-safe — use `N: Network` bounds.
///
/// Sends are fire-and-forget; responses to requests arrive via callback.
/// Listeners are called from the network's delivery context and should stay
/// lightweight (push into a channel, not do heavy processing).
pub trait Network: Send + Sync {
    /// Send a one-way message to a specific host.
    fn send_to<M: NetworkMessage>(&self, peer: HostId, message: &M);

    /// Send a one-way message to every known host except the sender.
    fn broadcast<M: NetworkMessage>(&self, message: &M);

    /// Send a typed request and receive the response via callback.
    ///
    /// The callback fires exactly once, with the decoded response or an
    /// error after `timeout`. Retry logic lives with the caller — the
    /// transport never retries on its own, to avoid hidden duplicate side
    /// effects.
    fn request<R: Request + 'static>(
        &self,
        peer: HostId,
        request: &R,
        timeout: Duration,
        on_response: ResponseCallback<R::Response>,
    );

    /// Register a typed listener for a one-way message type.
    fn on_message<M: NetworkMessage + 'static>(
        &self,
        handler: Box<dyn Fn(HostId, M) + Send + Sync>,
    );

    /// Register this host's serving side for inbound requests.
    fn register_inbound_handler(&self, handler: Arc<dyn InboundRequestHandler>);
}
