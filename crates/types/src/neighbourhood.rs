//! Permitted migration topology.

use crate::HostId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Symmetric relation between hosts that are allowed migration targets of one
/// another.
///
/// The load-balancing protocol runs over this topology: a host only ever
/// offers entities to its neighbours, which bounds the migration graph's
/// diameter and avoids global coordination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Neighbourhood {
    links: BTreeMap<HostId, BTreeSet<HostId>>,
}

impl Neighbourhood {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host with no links yet.
    pub fn add_host(&mut self, host: HostId) {
        self.links.entry(host).or_default();
    }

    /// Link two hosts symmetrically. Self-links are ignored.
    pub fn add_link(&mut self, a: HostId, b: HostId) {
        if a == b {
            return;
        }
        self.links.entry(a).or_default().insert(b);
        self.links.entry(b).or_default().insert(a);
    }

    /// True if `b` is a permitted migration target of `a`.
    pub fn are_neighbours(&self, a: HostId, b: HostId) -> bool {
        self.links.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Neighbours of a host, in ascending id order.
    pub fn neighbours_of(&self, host: HostId) -> BTreeSet<HostId> {
        self.links.get(&host).cloned().unwrap_or_default()
    }

    /// All known hosts.
    pub fn hosts(&self) -> impl Iterator<Item = HostId> + '_ {
        self.links.keys().copied()
    }

    /// Build a fully connected topology over the given hosts.
    pub fn full_mesh(hosts: impl IntoIterator<Item = HostId>) -> Self {
        let hosts: Vec<_> = hosts.into_iter().collect();
        let mut n = Self::new();
        for &a in &hosts {
            n.add_host(a);
            for &b in &hosts {
                n.add_link(a, b);
            }
        }
        n
    }
}
