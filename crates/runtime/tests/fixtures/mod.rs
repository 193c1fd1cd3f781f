//! Shared fixtures: small entity types and host construction helpers.

#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use simfabric_network_memory::{MemoryHub, MemoryNetwork};
use simfabric_runtime::{EntityTypeRegistry, Host, HostConfig, RestoreError};
use simfabric_types::{
    CallArgs, CallValue, Entity, EntityError, HostId, Neighbourhood, NoPartners, ObjectId,
    ObjectReferrer, SnapshotError,
};
use std::sync::Arc;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Honours `RUST_LOG`; run tests with it set to see the protocol traces.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A counter entity with a configurable load weight.
#[derive(Debug, Serialize, Deserialize)]
pub struct Counter {
    pub value: u64,
    pub weight: u64,
}

impl Counter {
    pub fn new(weight: u64) -> Self {
        Self { value: 0, weight }
    }
}

impl Entity for Counter {
    fn type_name(&self) -> &'static str {
        "counter"
    }

    fn dispatch(&mut self, method: &str, args: &CallArgs) -> Result<CallValue, EntityError> {
        match method {
            "add" => {
                let n = args
                    .first()
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| EntityError::BadArguments {
                        method: method.to_owned(),
                        reason: "expected one unsigned integer".into(),
                    })?;
                self.value += n;
                Ok(serde_json::json!(self.value))
            }
            "get" => Ok(serde_json::json!(self.value)),
            other => Err(EntityError::UnknownMethod {
                type_name: "counter",
                method: other.to_owned(),
            }),
        }
    }

    fn weight(&self) -> u64 {
        self.weight
    }

    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        serde_json::to_vec(self).map_err(|e| SnapshotError::NonSerializable {
            type_name: "counter",
            reason: e.to_string(),
        })
    }
}

pub fn register_counter_decoder(types: &EntityTypeRegistry) {
    types.register("counter", |bytes| {
        let counter: Counter = serde_json::from_slice(bytes).map_err(|e| RestoreError::Decode {
            type_name: "counter".into(),
            detail: e.to_string(),
        })?;
        Ok(Box::new(counter))
    });
}

/// An entity whose state refuses to travel.
pub struct Anchored;

impl Entity for Anchored {
    fn type_name(&self) -> &'static str {
        "anchored"
    }

    fn dispatch(&mut self, method: &str, _args: &CallArgs) -> Result<CallValue, EntityError> {
        match method {
            "ping" => Ok(serde_json::json!("pong")),
            other => Err(EntityError::UnknownMethod {
                type_name: "anchored",
                method: other.to_owned(),
            }),
        }
    }

    fn snapshot(&self) -> Result<Vec<u8>, SnapshotError> {
        Err(SnapshotError::NonSerializable {
            type_name: "anchored",
            reason: "holds a live resource handle".into(),
        })
    }
}

/// Referrer answering a fixed partner list for every entity.
pub struct StaticReferrer(pub Vec<ObjectId>);

impl ObjectReferrer for StaticReferrer {
    fn partners_of(&self, _id: &ObjectId) -> Vec<ObjectId> {
        self.0.clone()
    }
}

/// A host on the given hub with counter decoding registered.
pub fn host(
    hub: &MemoryHub,
    id: u32,
    capacity: u64,
    neighbourhood: &Neighbourhood,
) -> Arc<Host<MemoryNetwork>> {
    host_with_referrer(hub, id, capacity, neighbourhood, Arc::new(NoPartners))
}

pub fn host_with_referrer(
    hub: &MemoryHub,
    id: u32,
    capacity: u64,
    neighbourhood: &Neighbourhood,
    referrer: Arc<dyn ObjectReferrer>,
) -> Arc<Host<MemoryNetwork>> {
    init_tracing();
    let network = Arc::new(hub.adapter(HostId(id)));
    let host = Host::new(
        HostConfig::new(HostId(id), capacity),
        network,
        referrer,
        neighbourhood.clone(),
    );
    host.attach();
    register_counter_decoder(host.types());
    host
}

/// Full mesh over `n` hosts numbered from zero.
pub fn mesh(n: u32) -> Neighbourhood {
    Neighbourhood::full_mesh((0..n).map(HostId))
}
