//! Host runtime for distributed simulation entities.
//!
//! Ties the location directory, entity registries, and network together into
//! a [`Host`] that can:
//!
//! - invoke any entity by [`ObjectId`](simfabric_types::ObjectId) without
//!   knowing whether it is local or remote ([`InvocationGateway`])
//! - relocate an entity to another host without losing invocations
//!   ([`MigrationController`], driving the sans-IO [`MigrationProtocol`])
//! - negotiate migrations with neighbours under load ([`BalancerProtocol`],
//!   the [`Processor`] protocol surface)
//!
//! The protocol cores are synchronous, deterministic state machines; all I/O
//! happens in the runners that drive them.

mod balancer;
mod config;
mod gateway;
mod host;
mod migration;
mod registry;

pub use balancer::{
    BalanceInput, BalanceOutput, BalancerConfig, BalancerProtocol, BalancerStatus, Processor,
};
pub use config::{GatewayConfig, HostConfig, MigrationConfig};
pub use gateway::{InvocationGateway, InvokeError, InvokeScope};
pub use host::{spawn_service, Host, ServiceMessage};
pub use migration::{
    MigrationController, MigrationError, MigrationInput, MigrationOutput, MigrationPhase,
    MigrationProtocol, MigrationReport,
};
pub use registry::{EntityRegistry, EntityTypeRegistry, RestoreError};
