//! Load-balancing negotiation messages.

use serde::{Deserialize, Serialize};
use simfabric_types::{HostId, NetworkMessage, ObjectId, Request};

/// One entity in a migration offer, with its load contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferedEntity {
    pub id: ObjectId,
    pub weight: u64,
}

/// First phase of the receiver-makes-right protocol: the overloaded host
/// offers a batch of entities to a neighbour. No state moves yet; the
/// neighbour only answers whether it would take the load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveOffer {
    pub source: HostId,
    pub entities: Vec<OfferedEntity>,
}

impl ReceiveOffer {
    pub fn total_weight(&self) -> u64 {
        self.entities.iter().map(|e| e.weight).sum()
    }
}

/// The neighbour's local decision on an offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferDecision {
    pub accepted: bool,
    pub reason: Option<String>,
}

/// Periodic load observation gossiped to neighbours.
///
/// Load *measurement* is an external collaborator's job; this message only
/// carries the resulting scalar so a balancer can rank its neighbours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub host: HostId,
    pub load: u64,
}

impl NetworkMessage for ReceiveOffer {
    fn message_type_id() -> &'static str {
        "balance.offer"
    }
}

impl NetworkMessage for OfferDecision {
    fn message_type_id() -> &'static str {
        "balance.decision"
    }
}

impl NetworkMessage for LoadReport {
    fn message_type_id() -> &'static str {
        "balance.load"
    }
}

impl Request for ReceiveOffer {
    type Response = OfferDecision;
}
