//! Consolidated configuration for a host runtime.

use crate::balancer::BalancerConfig;
use simfabric_directory::DirectoryConfig;
use simfabric_types::HostId;
use std::time::Duration;

/// Invocation gateway tuning.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Caller-supplied deadline for one remote invocation round-trip.
    pub request_timeout: Duration,

    /// How many `Misrouted` redirects to follow before giving up. One hop is
    /// the steady state; a chain only appears during concurrent migration.
    pub max_forward_hops: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            max_forward_hops: 3,
        }
    }
}

/// Migration controller tuning.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Deadline for the state-transfer round-trip to the destination.
    pub transfer_timeout: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_secs(5),
        }
    }
}

/// Configuration for [`Host`](crate::Host).
///
/// Bundles all sub-component configs so callers can pass a single value.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// This host's identity.
    pub host: HostId,

    /// Total entity weight this host is willing to carry; the capacity check
    /// applied to inbound offers and transfers.
    pub capacity: u64,

    pub directory: DirectoryConfig,
    pub gateway: GatewayConfig,
    pub migration: MigrationConfig,
    pub balancer: BalancerConfig,
}

impl HostConfig {
    /// Defaults for everything but the identity and capacity.
    pub fn new(host: HostId, capacity: u64) -> Self {
        Self {
            host,
            capacity,
            directory: DirectoryConfig::default(),
            gateway: GatewayConfig::default(),
            migration: MigrationConfig::default(),
            balancer: BalancerConfig::default(),
        }
    }
}
