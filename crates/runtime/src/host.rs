//! The host runtime: one process's slice of the distributed simulation.
//!
//! A [`Host`] owns the local entity registry, the location directory, the
//! invocation gateway, and the migration controller, and serves the inbound
//! side of all three request protocols. It also implements [`Processor`],
//! the surface the balancing loop drives.

use crate::balancer::{BalanceInput, BalanceOutput, BalancerProtocol, BalancerStatus, Processor};
use crate::config::HostConfig;
use crate::gateway::{InvocationGateway, InvokeError, InvokeScope};
use crate::migration::{MigrationController, MigrationError, MigrationReport};
use crate::registry::{EntityRegistry, EntityTypeRegistry};
use simfabric_directory::{DirectoryError, Location, ObjectLocationDirectory};
use simfabric_messages::{
    InvokeFaultKind, InvokeRequest, InvokeResponse, LoadReport, LocationUpdate, MigrateRequest,
    MigrateResponse, OfferDecision, OfferedEntity, ReceiveOffer,
};
use simfabric_network::{
    decode_message, encode_message, InboundRequestHandler, Network, RequestError,
};
use simfabric_types::{
    CallArgs, CallValue, Entity, EntityError, HostId, Neighbourhood, NetworkMessage, ObjectId,
    ObjectIdAllocator, ObjectReferrer, Request,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// One simulation host: entities, directory, and the protocol endpoints.
///
/// Created with [`Host::new`] and wired to its transport with
/// [`Host::attach`]; the two are separate so the `Arc` exists before any
/// handler that captures it is registered.
pub struct Host<N: Network + 'static> {
    id: HostId,
    config: HostConfig,
    directory: Arc<ObjectLocationDirectory>,
    entities: Arc<EntityRegistry>,
    types: Arc<EntityTypeRegistry>,
    network: Arc<N>,
    gateway: InvocationGateway<N>,
    controller: MigrationController<N>,
    allocator: ObjectIdAllocator,
    neighbourhood: Neighbourhood,
    balancer: parking_lot::Mutex<Option<BalancerProtocol>>,
}

impl<N: Network + 'static> Host<N> {
    pub fn new(
        config: HostConfig,
        network: Arc<N>,
        referrer: Arc<dyn ObjectReferrer>,
        neighbourhood: Neighbourhood,
    ) -> Arc<Self> {
        let id = config.host;
        let directory = Arc::new(ObjectLocationDirectory::new(id, config.directory.clone()));
        let entities = Arc::new(EntityRegistry::new());
        let gateway = InvocationGateway::new(
            id,
            Arc::clone(&directory),
            Arc::clone(&entities),
            Arc::clone(&network),
            config.gateway.clone(),
        );
        let controller = MigrationController::new(
            id,
            Arc::clone(&directory),
            Arc::clone(&entities),
            referrer,
            Arc::clone(&network),
            config.migration.clone(),
        );
        Arc::new(Self {
            id,
            config,
            directory,
            entities,
            types: Arc::new(EntityTypeRegistry::new()),
            network,
            gateway,
            controller,
            allocator: ObjectIdAllocator::new(id),
            neighbourhood,
            balancer: parking_lot::Mutex::new(None),
        })
    }

    /// Register this host's serving side with its transport.
    ///
    /// Listeners hold only a weak reference, so dropping the last strong
    /// `Arc` retires the host even while the transport lives on.
    pub fn attach(self: &Arc<Self>) {
        self.network
            .register_inbound_handler(Arc::clone(self) as Arc<dyn InboundRequestHandler>);

        let weak = Arc::downgrade(self);
        self.network.on_message::<LocationUpdate>(Box::new(move |from, update| {
            if let Some(host) = weak.upgrade() {
                host.apply_location_update(from, update);
            }
        }));

        let weak = Arc::downgrade(self);
        self.network.on_message::<LoadReport>(Box::new(move |_from, report| {
            if let Some(host) = weak.upgrade() {
                // Recording a report never produces outputs, so this is safe
                // to run inline on the delivery context.
                host.on_balance_input(BalanceInput::NeighbourReport {
                    host: report.host,
                    load: report.load,
                });
            }
        }));
        info!(host = %self.id, "host attached");
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn directory(&self) -> &Arc<ObjectLocationDirectory> {
        &self.directory
    }

    pub fn entities(&self) -> &Arc<EntityRegistry> {
        &self.entities
    }

    pub fn types(&self) -> &Arc<EntityTypeRegistry> {
        &self.types
    }

    /// Current total entity weight hosted here.
    pub fn load(&self) -> u64 {
        self.entities.total_weight()
    }

    /// Create a new entity on this host. Returns its cluster-unique id.
    pub fn register_entity(
        &self,
        entity: Box<dyn Entity>,
    ) -> Result<ObjectId, DirectoryError> {
        let id = self.allocator.allocate(entity.type_name());
        self.directory.register_local(&id)?;
        self.entities.insert(id.clone(), entity);
        Ok(id)
    }

    /// Destroy a locally hosted entity.
    pub fn destroy_entity(&self, id: &ObjectId) -> Result<(), DirectoryError> {
        self.directory.unregister(id)?;
        self.entities.remove(id);
        Ok(())
    }

    /// Invoke an entity operation by id, local or remote.
    pub fn invoke(
        &self,
        id: &ObjectId,
        method: &str,
        args: CallArgs,
    ) -> Result<CallValue, InvokeError> {
        self.gateway.invoke(id, method, args)
    }

    /// Invoke with an explicit forwarding scope.
    pub fn invoke_scoped(
        &self,
        id: &ObjectId,
        method: &str,
        args: CallArgs,
        scope: InvokeScope,
    ) -> Result<CallValue, InvokeError> {
        self.gateway.invoke_scoped(id, method, args, scope)
    }

    /// Move a locally hosted entity to another host.
    pub fn migrate_entity(
        &self,
        id: &ObjectId,
        dest: HostId,
    ) -> Result<MigrationReport, MigrationError> {
        self.controller.migrate(id, dest)
    }

    /// Feed one input through the balancing state machine and execute every
    /// output it produces, including the inputs those executions feed back.
    pub fn on_balance_input(&self, input: BalanceInput) {
        let mut pending = vec![input];
        while let Some(input) = pending.pop() {
            let outputs = match self.balancer.lock().as_mut() {
                Some(balancer) => balancer.handle(input),
                None => return,
            };
            for output in outputs {
                match output {
                    BalanceOutput::BroadcastLoad { load } => {
                        self.network.broadcast(&LoadReport {
                            host: self.id,
                            load,
                        });
                    }
                    BalanceOutput::SendOffer { dest, budget } => {
                        let (ids, moved) = self.select_entities(budget);
                        if ids.is_empty() {
                            pending.push(BalanceInput::OfferDeclined { dest });
                            continue;
                        }
                        if self.migrate(&ids, dest) {
                            pending.push(BalanceInput::OfferAccepted { dest, moved });
                        } else {
                            pending.push(BalanceInput::OfferDeclined { dest });
                        }
                    }
                }
            }
        }
    }

    /// Lightest entities first, so one offer moves many small entities
    /// instead of one heavy one.
    fn select_entities(&self, budget: u64) -> (Vec<ObjectId>, u64) {
        let mut all = self.entities.entities_by_id();
        all.sort_by_key(|(id, weight)| (*weight, id.clone()));
        let mut picked = Vec::new();
        let mut total = 0;
        for (id, weight) in all {
            if total + weight > budget {
                break;
            }
            total += weight;
            picked.push(id);
        }
        (picked, total)
    }

    fn apply_location_update(&self, from: HostId, update: LocationUpdate) {
        for id in &update.entities {
            match self.directory.update_cache(id, update.new_host) {
                Ok(()) => trace!(%id, new_host = %update.new_host, "location cache updated"),
                Err(DirectoryError::IsLocal(id)) => {
                    // We host the entity, so our own record is authoritative;
                    // the sender is working from an older world.
                    warn!(%id, %from, "stale location update for a local entity; ignored")
                }
                Err(e) => warn!(%id, %from, error = %e, "location update not applied"),
            }
        }
    }

    fn serve_invoke(&self, request: InvokeRequest) -> InvokeResponse {
        match self.directory.resolve(&request.id) {
            Ok(Location::Local) => {
                let result = self
                    .entities
                    .with_entity(&request.id, |e| e.dispatch(&request.method, &request.args));
                match result {
                    Some(Ok(value)) => InvokeResponse::Ok(value),
                    Some(Err(e)) => InvokeResponse::Err {
                        kind: entity_fault_kind(&e),
                        message: e.to_string(),
                    },
                    None => InvokeResponse::Err {
                        kind: InvokeFaultKind::UnknownObject,
                        message: format!("{} is gone", request.id),
                    },
                }
            }
            // The caller's cache is stale; point it at what we know.
            Ok(Location::Remote(now_at)) => InvokeResponse::Misrouted { now_at },
            Err(DirectoryError::Busy(id)) => InvokeResponse::Err {
                kind: InvokeFaultKind::EntityBusy,
                message: format!("{id} is migrating"),
            },
            Err(e) => InvokeResponse::Err {
                kind: InvokeFaultKind::UnknownObject,
                message: e.to_string(),
            },
        }
    }

    /// Accepting a transfer registers the entity before the response leaves,
    /// making the acceptance irrevocable: once the source sees it, exactly
    /// one host answers `Local` for the id.
    fn serve_migrate(&self, from: HostId, request: MigrateRequest) -> MigrateResponse {
        if request.dest != self.id {
            return MigrateResponse::declined(format!(
                "transfer addressed to {}, received by {}",
                request.dest, self.id
            ));
        }
        let projected = self.entities.total_weight() + request.weight;
        if projected > self.config.capacity {
            debug!(id = %request.id, %from, projected, capacity = self.config.capacity, "transfer over capacity");
            return MigrateResponse::declined(format!(
                "capacity {} exceeded ({projected} projected)",
                self.config.capacity
            ));
        }
        let entity = match self.types.restore(&request.type_name, &request.state) {
            Ok(entity) => entity,
            Err(e) => return MigrateResponse::declined(e.to_string()),
        };
        if self.entities.contains(&request.id) {
            return MigrateResponse::declined(format!("{} is already hosted here", request.id));
        }
        // Registry first, directory second: the moment the entry answers
        // `Local`, the entity must be there to serve.
        self.entities.insert(request.id.clone(), entity);
        if let Err(e) = self.directory.register_local(&request.id) {
            self.entities.remove(&request.id);
            return MigrateResponse::declined(e.to_string());
        }
        info!(id = %request.id, %from, weight = request.weight, "entity received");
        MigrateResponse::accepted()
    }

    fn serve_request<R>(
        &self,
        bytes: &[u8],
        serve: impl FnOnce(R) -> R::Response,
    ) -> Result<Vec<u8>, RequestError>
    where
        R: Request,
    {
        let request: R =
            decode_message(bytes).map_err(|e| RequestError::PeerError(e.to_string()))?;
        let response = serve(request);
        encode_message(&response).map_err(|e| RequestError::PeerError(e.to_string()))
    }
}

impl<N: Network + 'static> InboundRequestHandler for Host<N> {
    fn handle_request(
        &self,
        from: HostId,
        type_id: &str,
        bytes: &[u8],
    ) -> Result<Vec<u8>, RequestError> {
        if type_id == InvokeRequest::message_type_id() {
            self.serve_request(bytes, |request| self.serve_invoke(request))
        } else if type_id == MigrateRequest::message_type_id() {
            self.serve_request(bytes, |request| self.serve_migrate(from, request))
        } else if type_id == ReceiveOffer::message_type_id() {
            self.serve_request(bytes, |offer: ReceiveOffer| {
                if self.receive(from, &offer) {
                    OfferDecision {
                        accepted: true,
                        reason: None,
                    }
                } else {
                    OfferDecision {
                        accepted: false,
                        reason: Some("offer refused".to_owned()),
                    }
                }
            })
        } else {
            Err(RequestError::PeerError(format!(
                "unknown request type {type_id:?}"
            )))
        }
    }
}

impl<N: Network + 'static> Processor for Host<N> {
    /// Offer first, then transfer entity by entity. A refusal costs one
    /// round-trip and moves nothing.
    fn migrate(&self, ids: &[ObjectId], dest: HostId) -> bool {
        if !self.neighbourhood.are_neighbours(self.id, dest) {
            warn!(%dest, "migration target is not a neighbour; refused");
            return false;
        }
        let entities: Vec<OfferedEntity> = ids
            .iter()
            .filter_map(|id| {
                self.entities
                    .with_entity(id, |e| e.weight())
                    .map(|weight| OfferedEntity {
                        id: id.clone(),
                        weight,
                    })
            })
            .collect();
        if entities.is_empty() {
            return false;
        }

        let offer = ReceiveOffer {
            source: self.id,
            entities,
        };
        let (tx, rx) = crossbeam::channel::bounded(1);
        self.network.request(
            dest,
            &offer,
            self.config.gateway.request_timeout,
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        match rx.recv_timeout(self.config.gateway.request_timeout) {
            Ok(Ok(decision)) if decision.accepted => {}
            Ok(Ok(decision)) => {
                debug!(%dest, reason = ?decision.reason, "offer declined");
                return false;
            }
            Ok(Err(e)) => {
                warn!(%dest, error = %e, "offer failed");
                return false;
            }
            Err(_) => {
                warn!(%dest, "offer timed out");
                return false;
            }
        }

        let mut all_moved = true;
        for id in ids {
            match self.controller.migrate(id, dest) {
                Ok(report) => trace!(%id, %dest, phase = ?report.phase, "entity moved"),
                Err(e) => {
                    warn!(%id, %dest, error = %e, "entity did not move");
                    all_moved = false;
                }
            }
        }
        all_moved
    }

    fn receive(&self, source: HostId, offer: &ReceiveOffer) -> bool {
        if !self.neighbourhood.are_neighbours(self.id, source) {
            warn!(%source, "offer from non-neighbour refused");
            return false;
        }
        let projected = self.entities.total_weight() + offer.total_weight();
        let accept = projected <= self.config.capacity;
        debug!(%source, projected, capacity = self.config.capacity, accept, "offer decided");
        accept
    }

    fn update(&self, ids: &[ObjectId], new_host: HostId) {
        self.apply_location_update(
            new_host,
            LocationUpdate {
                entities: ids.to_vec(),
                new_host,
            },
        );
    }

    fn neighbours(&self) -> BTreeSet<HostId> {
        self.neighbourhood.neighbours_of(self.id)
    }

    fn set_load_balancer(&self, balancer: BalancerProtocol) {
        *self.balancer.lock() = Some(balancer);
    }

    fn load_balancer(&self) -> Option<BalancerStatus> {
        self.balancer.lock().as_ref().map(|b| b.status())
    }
}

fn entity_fault_kind(error: &EntityError) -> InvokeFaultKind {
    match error {
        EntityError::UnknownMethod { .. } | EntityError::BadArguments { .. } => {
            InvokeFaultKind::BadRequest
        }
        EntityError::Failed(_) => InvokeFaultKind::EntityFailed,
    }
}

/// Control messages for a host's service loop.
#[derive(Debug)]
pub enum ServiceMessage {
    /// Feed one input through the balancing state machine.
    Balance(BalanceInput),
    /// Drain and stop. Migrations already in flight complete first; the loop
    /// only exits between messages.
    Farewell,
}

/// Spawn the host's service thread.
///
/// The thread owns balancing for its host: periodic load measurement and
/// ticks arrive as [`ServiceMessage::Balance`] and run here, off the network
/// delivery context.
pub fn spawn_service<N: Network + 'static>(
    host: Arc<Host<N>>,
    channel_capacity: usize,
) -> (
    crossbeam::channel::Sender<ServiceMessage>,
    std::thread::JoinHandle<()>,
) {
    let (tx, rx) = crossbeam::channel::bounded(channel_capacity);
    let handle = std::thread::spawn(move || {
        debug!(host = %host.id(), "service loop started");
        while let Ok(message) = rx.recv() {
            match message {
                ServiceMessage::Balance(input) => host.on_balance_input(input),
                ServiceMessage::Farewell => break,
            }
        }
        debug!(host = %host.id(), "service loop stopped");
    });
    (tx, handle)
}
