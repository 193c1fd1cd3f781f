//! Shared hub connecting all in-memory hosts.

use crate::adapter::MemoryNetwork;
use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use simfabric_network::{HandlerRegistry, InboundRequestHandler};
use simfabric_types::HostId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Configuration for the in-memory network.
#[derive(Debug, Clone)]
pub struct MemoryHubConfig {
    /// Base one-way latency, sampled into the traffic stats. Delivery itself
    /// is synchronous; the sampled values let tests reason about what a real
    /// transport would have added.
    pub base_latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Seed for the latency-sampling RNG; identical seeds give identical
    /// sampled totals.
    pub seed: u64,
}

impl Default for MemoryHubConfig {
    fn default() -> Self {
        Self {
            base_latency: Duration::from_millis(1),
            jitter_fraction: 0.1,
            seed: 0,
        }
    }
}

/// Traffic counters, for assertions about what crossed the wire.
#[derive(Debug, Default, Clone)]
pub struct TrafficStats {
    pub messages_sent: u64,
    pub messages_dropped_partition: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
    /// Sum of sampled one-way latencies.
    pub simulated_latency: Duration,
}

/// Per-host attachment point.
pub(crate) struct Slot {
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) handler: Arc<OnceLock<Arc<dyn InboundRequestHandler>>>,
}

pub(crate) struct HubInner {
    pub(crate) config: MemoryHubConfig,
    pub(crate) slots: RwLock<HashMap<HostId, Arc<Slot>>>,
    /// Directional: `(a, b)` present means traffic from `a` to `b` is cut.
    pub(crate) partitions: RwLock<HashSet<(HostId, HostId)>>,
    pub(crate) rng: Mutex<ChaCha8Rng>,
    pub(crate) stats: Mutex<TrafficStats>,
}

impl HubInner {
    pub(crate) fn is_partitioned(&self, from: HostId, to: HostId) -> bool {
        self.partitions.read().contains(&(from, to))
    }

    /// Sample a one-way latency into the stats.
    pub(crate) fn sample_latency(&self) {
        let base = self.config.base_latency.as_secs_f64();
        let jitter = {
            let mut rng = self.rng.lock();
            rng.gen_range(0.0..=self.config.jitter_fraction.max(f64::EPSILON))
        };
        let sampled = Duration::from_secs_f64(base * (1.0 + jitter));
        self.stats.lock().simulated_latency += sampled;
    }

    pub(crate) fn slot(&self, host: HostId) -> Option<Arc<Slot>> {
        self.slots.read().get(&host).cloned()
    }
}

/// Hub shared by every in-memory host.
#[derive(Clone)]
pub struct MemoryHub {
    pub(crate) inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new(config: MemoryHubConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            inner: Arc::new(HubInner {
                config,
                slots: RwLock::new(HashMap::new()),
                partitions: RwLock::new(HashSet::new()),
                rng: Mutex::new(rng),
                stats: Mutex::new(TrafficStats::default()),
            }),
        }
    }

    /// Create (or re-obtain) the network adapter for a host.
    pub fn adapter(&self, host: HostId) -> MemoryNetwork {
        self.inner
            .slots
            .write()
            .entry(host)
            .or_insert_with(|| {
                Arc::new(Slot {
                    registry: Arc::new(HandlerRegistry::new()),
                    handler: Arc::new(OnceLock::new()),
                })
            });
        MemoryNetwork::new(host, Arc::clone(&self.inner))
    }

    /// Cut traffic from `from` to `to` only.
    pub fn partition_unidirectional(&self, from: HostId, to: HostId) {
        self.inner.partitions.write().insert((from, to));
    }

    /// Cut traffic both ways between two hosts.
    pub fn partition_bidirectional(&self, a: HostId, b: HostId) {
        let mut partitions = self.inner.partitions.write();
        partitions.insert((a, b));
        partitions.insert((b, a));
    }

    /// Remove all partitions.
    pub fn heal_all(&self) {
        self.inner.partitions.write().clear();
    }

    /// Snapshot of the traffic counters.
    pub fn stats(&self) -> TrafficStats {
        self.inner.stats.lock().clone()
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new(MemoryHubConfig::default())
    }
}
