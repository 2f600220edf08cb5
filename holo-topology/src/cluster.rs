//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::types::{Link, NodePortTuple, SwitchId, TopologyInput};

/// Maximal set of switches connected through non-blocked OpenFlow links.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Cluster {
    // Smallest switch id in the cluster.
    pub id: SwitchId,
    // Intra-cluster links, indexed by both endpoints. Every member switch
    // has an entry, even when isolated.
    pub links: BTreeMap<SwitchId, BTreeSet<Link>>,
}

/// Maximal set of switch ports leaking broadcast traffic to one another
/// through non-OpenFlow infrastructure.
#[derive(Clone, Debug, Eq, Serialize)]
pub struct BroadcastDomain {
    pub id: u64,
    pub ports: BTreeSet<NodePortTuple>,
}

/// Result of the connected-components analysis over the switch graph.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Clusters {
    pub clusters: BTreeMap<SwitchId, Cluster>,
    pub switch_cluster: BTreeMap<SwitchId, SwitchId>,
}

// ===== impl Cluster =====

impl Cluster {
    fn new(id: SwitchId) -> Cluster {
        Cluster {
            id,
            links: Default::default(),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = SwitchId> + '_ {
        self.links.keys().copied()
    }

    pub fn contains(&self, switch: SwitchId) -> bool {
        self.links.contains_key(&switch)
    }

    fn add_link(&mut self, link: Link) {
        for switch in [link.src, link.dst] {
            self.links.entry(switch).or_default().insert(link);
        }
    }
}

// ===== impl BroadcastDomain =====

impl BroadcastDomain {
    pub fn new(id: u64) -> BroadcastDomain {
        BroadcastDomain {
            id,
            ports: Default::default(),
        }
    }
}

// Broadcast domains are identified by their member ports. The numeric id is
// only a label assigned in discovery order.
impl PartialEq for BroadcastDomain {
    fn eq(&self, other: &Self) -> bool {
        self.ports == other.ports
    }
}

impl std::fmt::Display for BroadcastDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:", self.id)?;
        for npt in &self.ports {
            write!(f, " {}", npt)?;
        }
        write!(f, "]")
    }
}

// ===== impl Clusters =====

impl Clusters {
    pub fn get(&self, switch: SwitchId) -> Option<&Cluster> {
        self.switch_cluster
            .get(&switch)
            .and_then(|cluster_id| self.clusters.get(cluster_id))
    }

    pub fn cluster_id(&self, switch: SwitchId) -> Option<SwitchId> {
        self.switch_cluster.get(&switch).copied()
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

// ===== global functions =====

// Groups switches into clusters: undirected connected components over the
// links that are neither blocked nor attached to a broadcast domain port.
//
// Intra-cluster links are then assigned to their clusters.
pub(crate) fn identify_clusters(
    switches: &BTreeSet<SwitchId>,
    input: &TopologyInput,
) -> Clusters {
    let eligible = |link: &&Link| {
        !input.is_blocked_link(link) && !input.is_broadcast_domain_link(link)
    };

    // Build undirected adjacency.
    let mut adjacency: BTreeMap<SwitchId, BTreeSet<SwitchId>> = BTreeMap::new();
    for (npt, links) in input.port_links() {
        if input.is_marked_broadcast_domain_port(&npt) {
            continue;
        }
        for link in links.iter().filter(eligible) {
            adjacency.entry(link.src).or_default().insert(link.dst);
            adjacency.entry(link.dst).or_default().insert(link.src);
        }
    }

    // Breadth-first search from every unvisited switch. Switches are
    // visited in ascending order, so the first switch of a component is
    // also its smallest one.
    let mut result = Clusters::default();
    let mut queue = VecDeque::new();
    for switch in switches {
        if result.switch_cluster.contains_key(switch) {
            continue;
        }

        let mut cluster = Cluster::new(*switch);
        result.switch_cluster.insert(*switch, *switch);
        queue.push_back(*switch);
        while let Some(u) = queue.pop_front() {
            cluster.links.entry(u).or_default();
            for v in adjacency.get(&u).into_iter().flatten() {
                if result.switch_cluster.contains_key(v) {
                    continue;
                }
                result.switch_cluster.insert(*v, *switch);
                queue.push_back(*v);
            }
        }
        result.clusters.insert(cluster.id, cluster);
    }

    // Assign intra-cluster links.
    for (_, links) in input.port_links() {
        for link in links.iter().filter(eligible) {
            let (Some(c1), Some(c2)) = (
                result.switch_cluster.get(&link.src),
                result.switch_cluster.get(&link.dst),
            ) else {
                continue;
            };
            if c1 != c2 {
                continue;
            }
            if let Some(cluster) = result.clusters.get_mut(c1) {
                cluster.add_link(*link);
            }
        }
    }

    result
}

// Groups broadcast domain ports into broadcast domains: undirected
// connected components over all links incident to the visited ports.
//
// Domains are numbered from 1 in discovery order.
pub fn identify_broadcast_domains(
    broadcast_domain_ports: &BTreeSet<NodePortTuple>,
    switch_port_links: &BTreeMap<NodePortTuple, BTreeSet<Link>>,
) -> Vec<BroadcastDomain> {
    let mut domains: Vec<BroadcastDomain> = vec![];
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::new();

    for npt in broadcast_domain_ports {
        if !visited.insert(*npt) {
            continue;
        }

        let mut domain = BroadcastDomain::new(domains.len() as u64 + 1);
        domain.ports.insert(*npt);
        queue.push_back(*npt);
        while let Some(curr) = queue.pop_front() {
            for link in switch_port_links.get(&curr).into_iter().flatten() {
                let other = link.other_end(&curr);
                if visited.insert(other) {
                    domain.ports.insert(other);
                    queue.push_back(other);
                }
            }
        }
        domains.push(domain);
    }

    domains
}

// ===== unit tests =====
