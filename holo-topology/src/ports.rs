//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};

use crate::cluster::Clusters;
use crate::higher::HigherTopology;
use crate::types::{
    HtNodeId, NodePortTuple, OrderedNodePair, SwitchId, TopologyInput,
};

/// Per node-pair port assignments of the higher-level topology.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PortTables {
    // Ports allowed to carry unicast traffic between two adjacent nodes.
    // Only pairs that are part of the forest have an entry.
    pub allowed_unicast_ports: BTreeMap<OrderedNodePair, BTreeSet<NodePortTuple>>,
    // Canonical port accepting broadcast traffic between two nodes.
    pub allowed_incoming_broadcast_ports: BTreeMap<OrderedNodePair, NodePortTuple>,
    // Switches that reach an adjacent node through a given port.
    pub permitted_switches: BTreeMap<NodePortTuple, BTreeSet<SwitchId>>,
    // Nodes whose transit traffic uses a given port.
    pub permitted_port_to_domains: BTreeMap<NodePortTuple, BTreeSet<HtNodeId>>,
}

// ===== impl PortTables =====

impl PortTables {
    // Creates an empty allowed-port set for every forest edge.
    pub(crate) fn new(forest: &BTreeSet<OrderedNodePair>) -> PortTables {
        PortTables {
            allowed_unicast_ports: forest
                .iter()
                .map(|onp| (*onp, BTreeSet::new()))
                .collect(),
            ..Default::default()
        }
    }

    // Classifies every port carrying an inter-node link as either allowed
    // for unicast between the two nodes or blocked. For every allowed node
    // pair, the smallest port is elected to accept incoming broadcast
    // traffic.
    //
    // Returns the ports that must be blocked.
    pub(crate) fn classify_ports(
        &mut self,
        input: &TopologyInput,
        clusters: &Clusters,
        ht: &HigherTopology,
        port_domains: &BTreeMap<NodePortTuple, u64>,
    ) -> BTreeSet<NodePortTuple> {
        let mut blocked = BTreeSet::new();

        for (_, links) in input.port_links() {
            for link in links {
                if input.is_blocked_link(link) {
                    continue;
                }
                let (Some(n1), Some(n2)) = (
                    ht.cluster_node(clusters, link.src),
                    ht.cluster_node(clusters, link.dst),
                ) else {
                    continue;
                };
                let npt1 = link.src_npt();
                let npt2 = link.dst_npt();

                if input.is_broadcast_domain_link(link) {
                    let Some(z) = port_domains
                        .get(&npt1)
                        .or_else(|| port_domains.get(&npt2))
                        .and_then(|domain_id| ht.domain_keys.get(domain_id))
                        .copied()
                    else {
                        continue;
                    };

                    for (n, npt) in [(n1, npt1), (n2, npt2)] {
                        let onp = OrderedNodePair::new(n, z);
                        if self.allowed_unicast_ports.contains_key(&onp) {
                            self.allow(onp, npt);
                            self.allow(onp.reverse(), npt);
                            self.elect_broadcast_port(onp, npt);
                            self.elect_broadcast_port(onp.reverse(), npt);
                        } else {
                            // The node pair isn't part of the forest.
                            blocked.insert(npt);
                        }
                    }
                } else {
                    if n1 == n2 {
                        continue;
                    }

                    let onp = OrderedNodePair::new(n1, n2);
                    if self.allowed_unicast_ports.contains_key(&onp) {
                        self.allow(onp, npt1);
                        self.allow(onp.reverse(), npt2);
                        self.elect_broadcast_port(onp, npt1);
                        self.elect_broadcast_port(onp.reverse(), npt2);
                    } else {
                        blocked.insert(npt1);
                        blocked.insert(npt2);
                    }
                }
            }
        }

        blocked
    }

    fn allow(&mut self, onp: OrderedNodePair, npt: NodePortTuple) {
        self.allowed_unicast_ports.entry(onp).or_default().insert(npt);
    }

    fn elect_broadcast_port(&mut self, onp: OrderedNodePair, npt: NodePortTuple) {
        let prev = self.allowed_incoming_broadcast_ports.entry(onp).or_insert(npt);
        if npt < *prev {
            *prev = npt;
        }
    }

    // Resolves, for every switch of every cluster and every adjacent node,
    // the allowed port closest to that switch. Then, for every two distinct
    // neighbors of a cluster, resolves the closest pair of ports that
    // carries transit traffic between them.
    pub(crate) fn compute_switch_port_mappings<F>(
        &mut self,
        clusters: &Clusters,
        ht: &HigherTopology,
        cost: F,
    ) where
        F: Fn(SwitchId, SwitchId) -> Option<u32>,
    {
        for cluster in clusters.clusters.values() {
            let Some(n) = ht.cluster_keys.get(&cluster.id).copied() else {
                continue;
            };
            let Some(nbrs) = ht.neighbors.get(&n) else {
                continue;
            };

            for nbr in nbrs {
                let onp = OrderedNodePair::new(n, *nbr);
                let Some(ports) = self.allowed_unicast_ports.get(&onp) else {
                    continue;
                };

                // Map every switch of the cluster to a port.
                let mut assignments = vec![];
                for s in cluster.nodes() {
                    let mut best: Option<(u32, NodePortTuple)> = None;
                    for npt in ports {
                        let Some(c) = cost(s, npt.node) else {
                            continue;
                        };
                        if best.is_none_or(|(best_cost, _)| c < best_cost) {
                            best = Some((c, *npt));
                        }
                    }
                    if let Some((_, npt)) = best {
                        assignments.push((npt, s));
                    }
                }

                // Map every other neighbor to a pair of ports. The pair is
                // resolved once, by the neighbor with the highest id.
                let mut transit = vec![];
                for othernbr in nbrs.range(..*nbr) {
                    let other_onp = OrderedNodePair::new(n, *othernbr);
                    let Some(other_ports) =
                        self.allowed_unicast_ports.get(&other_onp)
                    else {
                        continue;
                    };

                    let mut best: Option<(u32, NodePortTuple, NodePortTuple)> =
                        None;
                    for input in other_ports {
                        for output in ports {
                            let Some(c) = cost(input.node, output.node) else {
                                continue;
                            };
                            if best.is_none_or(|(best_cost, _, _)| c < best_cost)
                            {
                                best = Some((c, *input, *output));
                            }
                        }
                    }
                    if let Some((_, input, output)) = best {
                        transit.push((output, *othernbr));
                        transit.push((input, *nbr));
                    }
                }

                for (npt, s) in assignments {
                    self.permitted_switches.entry(npt).or_default().insert(s);
                }
                for (npt, node) in transit {
                    self.permitted_port_to_domains
                        .entry(npt)
                        .or_default()
                        .insert(node);
                }
            }
        }
    }

    // Returns the first port allowed between the given node pair that the
    // permission table grants to `s`.
    pub(crate) fn permitted(
        &self,
        onp: OrderedNodePair,
        permitted: &BTreeMap<NodePortTuple, BTreeSet<u64>>,
        s: u64,
    ) -> Option<NodePortTuple> {
        self.allowed_unicast_ports
            .get(&onp)?
            .iter()
            .find(|npt| permitted.get(npt).is_some_and(|set| set.contains(&s)))
            .copied()
    }
}
