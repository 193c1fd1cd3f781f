//! Load-balancing protocol state machine.
//!
//! Pure synchronous state machine for peer-to-peer load balancing over a
//! fixed neighbourhood. Tracks load reports and decides when to offer
//! entities to a less-loaded neighbour. Does NOT pick which entities move,
//! send messages, or migrate anything — those stay in the runner behind the
//! [`Processor`] trait.
//!
//! Receiver-makes-right: the overloaded host only *offers*; the destination
//! accepts or declines against its own capacity, so no transfer can overload
//! the receiving side.

use simfabric_messages::ReceiveOffer;
use simfabric_types::{HostId, ObjectId};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, trace};

/// Configuration for the balancing protocol.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Local load must exceed the neighbourhood average by this factor before
    /// the host starts offering entities away.
    pub overload_ratio: f64,

    /// Largest fraction of local load offered in one round. Small steps keep
    /// the neighbourhood from oscillating.
    pub max_transfer_fraction: f64,

    /// How long to leave a neighbour alone after it declines an offer.
    pub decline_backoff: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            overload_ratio: 1.25,
            max_transfer_fraction: 0.25,
            decline_backoff: Duration::from_secs(10),
        }
    }
}

/// Inputs to the balancing state machine.
#[derive(Debug)]
pub enum BalanceInput {
    /// Fresh measurement of this host's own load.
    LocalLoad(u64),
    /// A neighbour reported its load.
    NeighbourReport { host: HostId, load: u64 },
    /// The neighbour took the offered entities; `moved` weight left us.
    OfferAccepted { dest: HostId, moved: u64 },
    /// The neighbour refused the offer.
    OfferDeclined { dest: HostId },
    /// Periodic wall-clock tick; drives backoff expiry and re-evaluation.
    Tick { now: Duration },
}

/// Outputs from the balancing state machine.
#[derive(Debug, PartialEq, Eq)]
pub enum BalanceOutput {
    /// Gossip our load to every neighbour.
    BroadcastLoad { load: u64 },
    /// Offer up to `budget` weight of entities to `dest`.
    SendOffer { dest: HostId, budget: u64 },
}

/// Balancing status snapshot for external APIs.
#[derive(Debug, Clone)]
pub struct BalancerStatus {
    pub local_load: u64,
    pub neighbour_loads: BTreeMap<HostId, u64>,
    /// Neighbour an offer is outstanding with, if any.
    pub offer_in_flight: Option<HostId>,
}

/// Balancing state machine.
///
/// Decisions are made only on [`BalanceInput::LocalLoad`] and
/// [`BalanceInput::Tick`]; a neighbour report alone never triggers an offer,
/// so handling gossip inline on the network thread cannot recurse into a
/// migration.
pub struct BalancerProtocol {
    config: BalancerConfig,
    neighbours: BTreeSet<HostId>,
    local_load: u64,
    neighbour_loads: BTreeMap<HostId, u64>,
    backoff_until: BTreeMap<HostId, Duration>,
    now: Duration,
    offer_in_flight: Option<HostId>,
}

impl BalancerProtocol {
    pub fn new(config: BalancerConfig, neighbours: BTreeSet<HostId>) -> Self {
        Self {
            config,
            neighbours,
            local_load: 0,
            neighbour_loads: BTreeMap::new(),
            backoff_until: BTreeMap::new(),
            now: Duration::ZERO,
            offer_in_flight: None,
        }
    }

    pub fn status(&self) -> BalancerStatus {
        BalancerStatus {
            local_load: self.local_load,
            neighbour_loads: self.neighbour_loads.clone(),
            offer_in_flight: self.offer_in_flight,
        }
    }

    /// Process an input and return outputs.
    pub fn handle(&mut self, input: BalanceInput) -> Vec<BalanceOutput> {
        match input {
            BalanceInput::LocalLoad(load) => {
                self.local_load = load;
                let mut outputs = vec![BalanceOutput::BroadcastLoad { load }];
                outputs.extend(self.decide());
                outputs
            }
            BalanceInput::NeighbourReport { host, load } => {
                if self.neighbours.contains(&host) {
                    trace!(%host, load, "neighbour load recorded");
                    self.neighbour_loads.insert(host, load);
                } else {
                    trace!(%host, "load report from non-neighbour ignored");
                }
                vec![]
            }
            BalanceInput::OfferAccepted { dest, moved } => {
                debug!(%dest, moved, "offer accepted");
                self.offer_in_flight = None;
                self.local_load = self.local_load.saturating_sub(moved);
                vec![]
            }
            BalanceInput::OfferDeclined { dest } => {
                debug!(%dest, "offer declined; backing off");
                self.offer_in_flight = None;
                self.backoff_until
                    .insert(dest, self.now + self.config.decline_backoff);
                vec![]
            }
            BalanceInput::Tick { now } => {
                self.now = now;
                self.backoff_until.retain(|_, until| *until > now);
                self.decide()
            }
        }
    }

    /// One offer at a time; a second would double-count the weight we expect
    /// to shed with the first.
    fn decide(&mut self) -> Vec<BalanceOutput> {
        if self.offer_in_flight.is_some() || self.neighbour_loads.is_empty() {
            return vec![];
        }
        let total: u64 = self.local_load + self.neighbour_loads.values().sum::<u64>();
        let average = total as f64 / (self.neighbour_loads.len() + 1) as f64;
        if (self.local_load as f64) <= average * self.config.overload_ratio {
            return vec![];
        }

        // Least-loaded neighbour not in backoff, ties broken by id.
        let candidate = self
            .neighbour_loads
            .iter()
            .filter(|(host, _)| !self.backoff_until.contains_key(*host))
            .filter(|(_, load)| (**load as f64) < average)
            .min_by_key(|(host, load)| (**load, **host));
        let Some((&dest, &dest_load)) = candidate else {
            return vec![];
        };

        let headroom = ((self.local_load as f64 - dest_load as f64) / 2.0) as u64;
        let cap = (self.local_load as f64 * self.config.max_transfer_fraction) as u64;
        let budget = headroom.min(cap);
        if budget == 0 {
            return vec![];
        }

        debug!(%dest, budget, local = self.local_load, "offering load away");
        self.offer_in_flight = Some(dest);
        vec![BalanceOutput::SendOffer { dest, budget }]
    }
}

/// Runner-side surface the balancing loop drives.
///
/// A host implements this; the service loop feeds protocol outputs through
/// it and the inbound handlers call [`receive`](Self::receive) for offers
/// arriving from neighbours.
pub trait Processor: Send + Sync {
    /// Move the listed entities to `dest`. True if every migration committed.
    fn migrate(&self, ids: &[ObjectId], dest: HostId) -> bool;

    /// Decide an inbound offer against local capacity. True accepts.
    fn receive(&self, source: HostId, offer: &ReceiveOffer) -> bool;

    /// Record that the listed entities now live on `new_host`.
    fn update(&self, ids: &[ObjectId], new_host: HostId);

    /// The hosts this one may exchange load with.
    fn neighbours(&self) -> BTreeSet<HostId>;

    /// Install the balancing state machine.
    fn set_load_balancer(&self, balancer: BalancerProtocol);

    /// Snapshot of the balancing state, if one is installed.
    fn load_balancer(&self) -> Option<BalancerStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(neighbours: &[u32]) -> BalancerProtocol {
        BalancerProtocol::new(
            BalancerConfig::default(),
            neighbours.iter().map(|h| HostId(*h)).collect(),
        )
    }

    fn report(p: &mut BalancerProtocol, host: u32, load: u64) {
        assert!(p
            .handle(BalanceInput::NeighbourReport {
                host: HostId(host),
                load,
            })
            .is_empty());
    }

    #[test]
    fn test_local_load_broadcasts_and_offers_when_overloaded() {
        let mut p = subject(&[1, 2]);
        report(&mut p, 1, 10);
        report(&mut p, 2, 40);

        let outputs = p.handle(BalanceInput::LocalLoad(100));
        // avg = 150/3 = 50; 100 > 62.5 → offer to the least-loaded host.
        assert_eq!(outputs[0], BalanceOutput::BroadcastLoad { load: 100 });
        assert_eq!(
            outputs[1],
            BalanceOutput::SendOffer {
                dest: HostId(1),
                budget: 25, // capped at a quarter of local load
            }
        );
    }

    #[test]
    fn test_balanced_host_only_broadcasts() {
        let mut p = subject(&[1, 2]);
        report(&mut p, 1, 45);
        report(&mut p, 2, 55);
        let outputs = p.handle(BalanceInput::LocalLoad(50));
        assert_eq!(outputs, vec![BalanceOutput::BroadcastLoad { load: 50 }]);
    }

    #[test]
    fn test_one_offer_in_flight_at_a_time() {
        let mut p = subject(&[1]);
        report(&mut p, 1, 0);
        let outputs = p.handle(BalanceInput::LocalLoad(100));
        assert_eq!(outputs.len(), 2);
        // Still overloaded, but the first offer is pending.
        assert!(p.handle(BalanceInput::Tick { now: Duration::from_secs(1) }).is_empty());

        p.handle(BalanceInput::OfferAccepted {
            dest: HostId(1),
            moved: 25,
        });
        assert_eq!(p.status().local_load, 75);
        assert_eq!(p.status().offer_in_flight, None);
    }

    #[test]
    fn test_decline_backs_off_then_retries() {
        let mut p = subject(&[1]);
        report(&mut p, 1, 0);
        p.handle(BalanceInput::LocalLoad(100));
        p.handle(BalanceInput::OfferDeclined { dest: HostId(1) });

        // Inside the backoff window nothing is offered.
        assert!(p
            .handle(BalanceInput::Tick {
                now: Duration::from_secs(5)
            })
            .is_empty());

        // After it expires the neighbour is fair game again.
        let outputs = p.handle(BalanceInput::Tick {
            now: Duration::from_secs(11),
        });
        assert!(matches!(
            outputs.as_slice(),
            [BalanceOutput::SendOffer { dest, .. }] if *dest == HostId(1)
        ));
    }

    #[test]
    fn test_report_from_non_neighbour_is_ignored() {
        let mut p = subject(&[1]);
        report(&mut p, 9, 0);
        assert!(p.status().neighbour_loads.is_empty());
    }

    #[test]
    fn test_no_offer_without_underloaded_candidate() {
        let mut p = subject(&[1]);
        report(&mut p, 1, 90);
        // avg = 95; local 100 < 118.75, not overloaded.
        let outputs = p.handle(BalanceInput::LocalLoad(100));
        assert_eq!(outputs, vec![BalanceOutput::BroadcastLoad { load: 100 }]);
    }
}
