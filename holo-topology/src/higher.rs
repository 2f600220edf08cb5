//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use enum_as_inner::EnumAsInner;
use serde::Serialize;

use crate::cluster::{BroadcastDomain, Clusters};
use crate::types::{HtNodeId, OrderedNodePair, SwitchId, TopologyInput};

/// Node of the higher-level topology.
#[derive(Clone, Copy, Debug, EnumAsInner, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HtNode {
    // Cluster, identified by its cluster id.
    Cluster(SwitchId),
    // Broadcast domain, identified by its domain id.
    BroadcastDomain(u64),
}

/// Graph whose vertices are clusters and broadcast domains.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct HigherTopology {
    pub nodes: BTreeMap<HtNodeId, HtNode>,
    pub cluster_keys: BTreeMap<SwitchId, HtNodeId>,
    pub domain_keys: BTreeMap<u64, HtNodeId>,
    pub neighbors: BTreeMap<HtNodeId, BTreeSet<HtNodeId>>,
    // For every source, the next hop towards every reachable destination.
    pub next_hop: BTreeMap<HtNodeId, BTreeMap<HtNodeId, HtNodeId>>,
    // L2 domain id of every cluster node.
    pub l2_domain_ids: BTreeMap<HtNodeId, SwitchId>,
}

// ===== impl HtNode =====

impl std::fmt::Display for HtNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HtNode::Cluster(id) => write!(f, "cluster {:016x}", id),
            HtNode::BroadcastDomain(id) => write!(f, "broadcast-domain {}", id),
        }
    }
}

// ===== impl HigherTopology =====

impl HigherTopology {
    // Creates one node per cluster and per broadcast domain, and connects
    // them.
    //
    // Node ids are dense and start at 1: clusters come first in ascending
    // cluster id, followed by the broadcast domains in ascending domain id.
    pub(crate) fn new(
        clusters: &Clusters,
        domains: &[BroadcastDomain],
        input: &TopologyInput,
    ) -> HigherTopology {
        let mut ht = HigherTopology::default();

        for cluster_id in clusters.clusters.keys() {
            let nid = ht.nodes.len() as HtNodeId + 1;
            ht.nodes.insert(nid, HtNode::Cluster(*cluster_id));
            ht.cluster_keys.insert(*cluster_id, nid);
        }
        let mut domain_ids =
            domains.iter().map(|bd| bd.id).collect::<Vec<_>>();
        domain_ids.sort_unstable();
        for domain_id in domain_ids {
            let nid = ht.nodes.len() as HtNodeId + 1;
            ht.nodes.insert(nid, HtNode::BroadcastDomain(domain_id));
            ht.domain_keys.insert(domain_id, nid);
        }
        for nid in ht.nodes.keys() {
            ht.neighbors.insert(*nid, Default::default());
        }

        // Cluster-to-cluster edges.
        for (npt, links) in input.port_links() {
            if input.is_marked_broadcast_domain_port(&npt) {
                continue;
            }
            for link in links {
                if input.is_blocked_link(link)
                    || input.is_broadcast_domain_link(link)
                {
                    continue;
                }
                let (Some(n1), Some(n2)) = (
                    ht.cluster_node(clusters, link.src),
                    ht.cluster_node(clusters, link.dst),
                ) else {
                    continue;
                };
                if n1 != n2 {
                    ht.add_edge(n1, n2);
                }
            }
        }

        // Cluster-to-broadcast domain edges.
        for bd in domains {
            let Some(n2) = ht.domain_keys.get(&bd.id).copied() else {
                continue;
            };
            for npt in &bd.ports {
                if let Some(n1) = ht.cluster_node(clusters, npt.node) {
                    ht.add_edge(n1, n2);
                }
            }
        }

        ht
    }

    fn add_edge(&mut self, n1: HtNodeId, n2: HtNodeId) {
        self.neighbors.entry(n1).or_default().insert(n2);
        self.neighbors.entry(n2).or_default().insert(n1);
    }

    // Returns the node of the cluster containing the given switch.
    pub fn cluster_node(
        &self,
        clusters: &Clusters,
        switch: SwitchId,
    ) -> Option<HtNodeId> {
        clusters
            .cluster_id(switch)
            .and_then(|cluster_id| self.cluster_keys.get(&cluster_id))
            .copied()
    }

    pub fn is_broadcast_domain(&self, nid: HtNodeId) -> bool {
        self.nodes
            .get(&nid)
            .is_some_and(|node| node.is_broadcast_domain())
    }

    // Computes a breadth-first spanning forest and returns its edges, both
    // directions included.
    pub(crate) fn compute_forest(&self) -> BTreeSet<OrderedNodePair> {
        let mut forest = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();

        for s in self.neighbors.keys() {
            if !visited.insert(*s) {
                continue;
            }
            queue.push_back(*s);
            while let Some(u) = queue.pop_front() {
                for nbr in self.neighbors.get(&u).into_iter().flatten() {
                    if visited.insert(*nbr) {
                        queue.push_back(*nbr);
                        forest.insert(OrderedNodePair::new(u, *nbr));
                        forest.insert(OrderedNodePair::new(*nbr, u));
                    }
                }
            }
        }

        forest
    }

    // Builds the next-hop table of every node, walking only the edges of
    // the forest.
    pub(crate) fn compute_next_hops(
        &mut self,
        forest: &BTreeSet<OrderedNodePair>,
    ) {
        self.next_hop.clear();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();

        for (s, nbrs) in &self.neighbors {
            let mut nh = BTreeMap::new();
            nh.insert(*s, *s);

            for nbr in nbrs {
                if !forest.contains(&OrderedNodePair::new(*s, *nbr)) {
                    continue;
                }
                nh.insert(*nbr, *nbr);

                // Search from the neighbor, never going back through s.
                visited.clear();
                visited.insert(*s);
                visited.insert(*nbr);
                queue.clear();
                queue.push_back(*nbr);
                while let Some(u) = queue.pop_front() {
                    for v in self.neighbors.get(&u).into_iter().flatten() {
                        if !forest.contains(&OrderedNodePair::new(u, *v)) {
                            continue;
                        }
                        if visited.insert(*v) {
                            queue.push_back(*v);
                            nh.insert(*v, *nbr);
                        }
                    }
                }
            }

            self.next_hop.insert(*s, nh);
        }
    }

    // Assigns to every cluster node the smallest cluster id among all the
    // clusters it can reach.
    pub(crate) fn compute_l2_domain_ids(&mut self) {
        self.l2_domain_ids.clear();
        for (n, node) in &self.nodes {
            let HtNode::Cluster(cluster_id) = node else {
                continue;
            };
            if self.l2_domain_ids.contains_key(n) {
                continue;
            }
            let Some(reachable) = self.next_hop.get(n) else {
                continue;
            };

            let reachable_clusters = reachable.keys().filter_map(|nbr| {
                self.nodes
                    .get(nbr)
                    .and_then(|node| node.as_cluster())
                    .map(|cluster_id| (*nbr, *cluster_id))
            });
            let l2_domain_id = reachable_clusters
                .clone()
                .map(|(_, cluster_id)| cluster_id)
                .fold(*cluster_id, SwitchId::min);
            for (nbr, _) in reachable_clusters {
                self.l2_domain_ids.insert(nbr, l2_domain_id);
            }
        }
    }

    /// Returns the sequence of higher-level nodes from `src` to `dst`
    /// following the next-hop tables, or `None` when `dst` isn't reachable.
    pub fn path(&self, src: HtNodeId, dst: HtNodeId) -> Option<Vec<HtNodeId>> {
        let mut path = vec![src];
        let mut curr = src;
        while curr != dst {
            curr = *self.next_hop.get(&curr)?.get(&dst)?;
            if path.len() > self.nodes.len() {
                return None;
            }
            path.push(curr);
        }
        Some(path)
    }

    // Returns whether dst is reachable from src.
    pub fn is_reachable(&self, src: HtNodeId, dst: HtNodeId) -> bool {
        self.next_hop
            .get(&src)
            .is_some_and(|nh| nh.contains_key(&dst))
    }
}

// ===== unit tests =====
