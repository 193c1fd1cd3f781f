//! Network messages for the placement and migration protocols.
//!
//! Three request/response pairs and two gossip messages:
//!
//! - [`InvokeRequest`] / [`InvokeResponse`]: location-transparent method calls
//! - [`MigrateRequest`] / [`MigrateResponse`]: entity state transfer
//! - [`ReceiveOffer`] / [`OfferDecision`]: load-balancing negotiation
//! - [`LocationUpdate`]: best-effort cache correction after a migration
//! - [`LoadReport`]: neighbour load observations for the balancer

pub mod balance;
pub mod invoke;
pub mod location;
pub mod migrate;

pub use balance::{LoadReport, OfferDecision, OfferedEntity, ReceiveOffer};
pub use invoke::{InvokeFaultKind, InvokeRequest, InvokeResponse};
pub use location::LocationUpdate;
pub use migrate::{MigrateRequest, MigrateResponse};
