//! Invocation through the gateway: local, remote, and misrouted paths must
//! all produce the same observable result.

mod fixtures;

use fixtures::{host, mesh, Counter};
use simfabric_network_memory::{MemoryHub, MemoryHubConfig};
use simfabric_runtime::{InvokeError, InvokeScope};
use simfabric_types::{HostId, ObjectIdAllocator};

#[test]
fn test_local_invocation() {
    let hub = MemoryHub::new(MemoryHubConfig::default());
    let topology = mesh(1);
    let a = host(&hub, 0, 100, &topology);
    assert_eq!(a.directory().host(), HostId(0));

    let id = a.register_entity(Box::new(Counter::new(1))).unwrap();
    assert_eq!(
        a.invoke(&id, "add", vec![serde_json::json!(5)]).unwrap(),
        serde_json::json!(5)
    );
    assert_eq!(a.invoke(&id, "get", vec![]).unwrap(), serde_json::json!(5));

    // Entirely local; nothing crossed the wire.
    assert_eq!(hub.stats().requests_sent, 0);
}

#[test]
fn test_remote_invocation_matches_local() {
    let hub = MemoryHub::new(MemoryHubConfig::default());
    let topology = mesh(2);
    let a = host(&hub, 0, 100, &topology);
    let b = host(&hub, 1, 100, &topology);

    let id = b.register_entity(Box::new(Counter::new(1))).unwrap();
    a.directory().update_cache(&id, HostId(1)).unwrap();

    // Same call, invoked from either side, gives the same answer.
    assert_eq!(
        a.invoke(&id, "add", vec![serde_json::json!(3)]).unwrap(),
        serde_json::json!(3)
    );
    assert_eq!(
        b.invoke(&id, "add", vec![serde_json::json!(4)]).unwrap(),
        serde_json::json!(7)
    );
    assert_eq!(a.invoke(&id, "get", vec![]).unwrap(), serde_json::json!(7));
    assert!(hub.stats().requests_sent >= 2);
}

#[test]
fn test_unknown_object_fails() {
    let hub = MemoryHub::new(MemoryHubConfig::default());
    let topology = mesh(1);
    let a = host(&hub, 0, 100, &topology);

    let ghost = ObjectIdAllocator::new(HostId(9)).allocate("counter");
    assert!(matches!(
        a.invoke(&ghost, "get", vec![]),
        Err(InvokeError::UnknownObject(_))
    ));
}

#[test]
fn test_unknown_method_is_a_typed_error() {
    let hub = MemoryHub::new(MemoryHubConfig::default());
    let topology = mesh(2);
    let a = host(&hub, 0, 100, &topology);
    let b = host(&hub, 1, 100, &topology);

    let id = a.register_entity(Box::new(Counter::new(1))).unwrap();
    assert!(matches!(
        a.invoke(&id, "frobnicate", vec![]),
        Err(InvokeError::Entity(_))
    ));

    // The same mistake over the wire comes back as a bad request rather
    // than being silently dropped.
    b.directory().update_cache(&id, HostId(0)).unwrap();
    assert!(matches!(
        b.invoke(&id, "frobnicate", vec![]),
        Err(InvokeError::BadRequest(_))
    ));
}

#[test]
fn test_misrouted_invocation_corrects_the_cache() {
    let hub = MemoryHub::new(MemoryHubConfig::default());
    let topology = mesh(3);
    let a = host(&hub, 0, 100, &topology);
    let b = host(&hub, 1, 100, &topology);
    let c = host(&hub, 2, 100, &topology);

    // The entity lives on B. A knows that; C is working from a stale view
    // that still points at A.
    let id = b.register_entity(Box::new(Counter::new(1))).unwrap();
    a.directory().update_cache(&id, HostId(1)).unwrap();
    c.directory().update_cache(&id, HostId(0)).unwrap();

    // C's call lands on A, comes back misrouted with the fresh location,
    // and succeeds on the retry.
    assert_eq!(
        c.invoke(&id, "add", vec![serde_json::json!(2)]).unwrap(),
        serde_json::json!(2)
    );

    // The repair stuck: the next call goes straight to B.
    let before = hub.stats().requests_sent;
    assert_eq!(c.invoke(&id, "get", vec![]).unwrap(), serde_json::json!(2));
    assert_eq!(hub.stats().requests_sent, before + 1);
}

#[test]
fn test_local_only_scope_refuses_remote_target() {
    let hub = MemoryHub::new(MemoryHubConfig::default());
    let topology = mesh(2);
    let a = host(&hub, 0, 100, &topology);
    let b = host(&hub, 1, 100, &topology);

    let id = b.register_entity(Box::new(Counter::new(1))).unwrap();
    a.directory().update_cache(&id, HostId(1)).unwrap();

    let before = hub.stats().requests_sent;
    assert!(matches!(
        a.invoke_scoped(&id, "get", vec![], InvokeScope::LocalOnly),
        Err(InvokeError::NonLocalInvocationForbidden { .. })
    ));
    // Refused before any network contact.
    assert_eq!(hub.stats().requests_sent, before);

    // The owning host may still run it.
    assert!(b
        .invoke_scoped(&id, "get", vec![], InvokeScope::LocalOnly)
        .is_ok());
}

#[test]
fn test_partitioned_peer_surfaces_as_transport_error() {
    let hub = MemoryHub::new(MemoryHubConfig::default());
    let topology = mesh(2);
    let a = host(&hub, 0, 100, &topology);
    let b = host(&hub, 1, 100, &topology);

    let id = b.register_entity(Box::new(Counter::new(1))).unwrap();
    a.directory().update_cache(&id, HostId(1)).unwrap();

    hub.partition_bidirectional(HostId(0), HostId(1));
    assert!(matches!(
        a.invoke(&id, "get", vec![]),
        Err(InvokeError::Transport { .. })
    ));

    hub.heal_all();
    assert!(a.invoke(&id, "get", vec![]).is_ok());
}
