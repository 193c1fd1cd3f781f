//! Location-transparent invocation.

use crate::config::GatewayConfig;
use crate::registry::EntityRegistry;
use simfabric_directory::{DirectoryError, Location, ObjectLocationDirectory};
use simfabric_messages::{InvokeFaultKind, InvokeRequest, InvokeResponse};
use simfabric_network::{Network, RequestError};
use simfabric_types::{CallArgs, CallValue, EntityError, HostId, ObjectId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors from an invocation attempt.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The id is not registered anywhere reachable. Caller bug or destroyed
    /// entity.
    #[error("object {0} is not registered anywhere reachable")]
    UnknownObject(ObjectId),

    /// The call was scoped local-only but the entity lives elsewhere.
    /// Structural operations that are meaningless across a host boundary
    /// fail fast here instead of silently acting on a proxy.
    #[error("operation {method:?} on {id} is local-only, but the entity is remote")]
    NonLocalInvocationForbidden { id: ObjectId, method: String },

    /// The remote host did not answer in time. Retryable by the caller
    /// (against a possibly updated directory entry); never retried
    /// internally, to avoid hidden duplicate side effects.
    #[error("transport failure invoking {id}")]
    Transport {
        id: ObjectId,
        #[source]
        source: RequestError,
    },

    /// The entity is mid-migration and its invocation queue is full.
    /// Transient; retry.
    #[error("object {0} is busy migrating; retry")]
    EntityBusy(ObjectId),

    /// The entity's own dispatch failed; its error, propagated unchanged.
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// The remote gateway could not interpret the request.
    #[error("remote gateway rejected the request: {0}")]
    BadRequest(String),

    /// Redirects did not converge; concurrent migrations outpaced us.
    #[error("invocation of {id} still misrouted after {hops} hops")]
    TooManyHops { id: ObjectId, hops: usize },
}

fn directory_error(e: DirectoryError) -> InvokeError {
    match e {
        DirectoryError::Busy(id) => InvokeError::EntityBusy(id),
        DirectoryError::UnknownObject(id)
        | DirectoryError::NotLocal(id)
        | DirectoryError::AlreadyRegistered(id)
        | DirectoryError::IsLocal(id) => InvokeError::UnknownObject(id),
    }
}

/// Whether a call may be forwarded across a host boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeScope {
    /// Execute wherever the entity lives (the default).
    Anywhere,
    /// The operation is only meaningful against the local instance.
    LocalOnly,
}

/// Invokes entity operations by id, local or remote.
///
/// Synchronous from the caller's perspective: `invoke` returns when local
/// execution completes or the remote round-trip does. Invocations issued by
/// one caller to one entity are therefore delivered in issue order.
pub struct InvocationGateway<N: Network> {
    host: HostId,
    directory: Arc<ObjectLocationDirectory>,
    entities: Arc<EntityRegistry>,
    network: Arc<N>,
    config: GatewayConfig,
}

impl<N: Network> InvocationGateway<N> {
    pub fn new(
        host: HostId,
        directory: Arc<ObjectLocationDirectory>,
        entities: Arc<EntityRegistry>,
        network: Arc<N>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            host,
            directory,
            entities,
            network,
            config,
        }
    }

    /// Invoke an operation wherever the entity lives.
    pub fn invoke(
        &self,
        id: &ObjectId,
        method: &str,
        args: CallArgs,
    ) -> Result<CallValue, InvokeError> {
        self.invoke_scoped(id, method, args, InvokeScope::Anywhere)
    }

    /// Invoke with an explicit forwarding scope.
    ///
    /// Follows `Misrouted` redirects up to the configured hop limit,
    /// correcting the local cache as it goes — the lazy repair path for
    /// stale resolutions after a migration.
    pub fn invoke_scoped(
        &self,
        id: &ObjectId,
        method: &str,
        args: CallArgs,
        scope: InvokeScope,
    ) -> Result<CallValue, InvokeError> {
        for hop in 0..=self.config.max_forward_hops {
            match self.directory.resolve(id).map_err(directory_error)? {
                Location::Local => return self.dispatch_local(id, method, &args),
                Location::Remote(peer) => {
                    if scope == InvokeScope::LocalOnly {
                        return Err(InvokeError::NonLocalInvocationForbidden {
                            id: id.clone(),
                            method: method.to_owned(),
                        });
                    }
                    match self.invoke_remote(peer, id, method, &args)? {
                        InvokeResponse::Ok(value) => return Ok(value),
                        InvokeResponse::Err { kind, message } => {
                            return Err(wire_fault(id, kind, message))
                        }
                        InvokeResponse::Misrouted { now_at } => {
                            debug!(%id, stale = %peer, fresh = %now_at, hop, "misrouted; correcting cache");
                            if let Err(e) = self.directory.update_cache(id, now_at) {
                                // The entity came home mid-flight; loop and
                                // resolve again.
                                trace!(%id, error = %e, "cache correction skipped");
                            }
                        }
                    }
                }
            }
        }
        Err(InvokeError::TooManyHops {
            id: id.clone(),
            hops: self.config.max_forward_hops,
        })
    }

    fn dispatch_local(
        &self,
        id: &ObjectId,
        method: &str,
        args: &CallArgs,
    ) -> Result<CallValue, InvokeError> {
        match self.entities.with_entity(id, |e| e.dispatch(method, args)) {
            Some(result) => Ok(result?),
            // Directory said local but the entity is gone: destroyed in the
            // race window. Same answer as never-registered.
            None => Err(InvokeError::UnknownObject(id.clone())),
        }
    }

    fn invoke_remote(
        &self,
        peer: HostId,
        id: &ObjectId,
        method: &str,
        args: &CallArgs,
    ) -> Result<InvokeResponse, InvokeError> {
        let request = InvokeRequest::new(id.clone(), method, args.clone());
        let (tx, rx) = crossbeam::channel::bounded(1);
        self.network.request(
            peer,
            &request,
            self.config.request_timeout,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        trace!(from = %self.host, to = %peer, %id, method, "invocation forwarded");
        let grace = self.config.request_timeout + Duration::from_millis(100);
        match rx.recv_timeout(grace) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(InvokeError::Transport {
                id: id.clone(),
                source: e,
            }),
            Err(_) => Err(InvokeError::Transport {
                id: id.clone(),
                source: RequestError::Timeout,
            }),
        }
    }
}

fn wire_fault(id: &ObjectId, kind: InvokeFaultKind, message: String) -> InvokeError {
    match kind {
        InvokeFaultKind::UnknownObject => InvokeError::UnknownObject(id.clone()),
        InvokeFaultKind::EntityBusy => InvokeError::EntityBusy(id.clone()),
        InvokeFaultKind::EntityFailed => InvokeError::Entity(EntityError::Failed(message)),
        InvokeFaultKind::BadRequest => InvokeError::BadRequest(message),
    }
}
