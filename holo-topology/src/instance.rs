//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};

use tracing::{trace, warn};

use crate::cluster::{self, BroadcastDomain, Cluster, Clusters};
use crate::debug::Debug;
use crate::error::Error;
use crate::higher::HigherTopology;
use crate::ports::PortTables;
use crate::route::{self, RouteCache};
use crate::spf::{self, BroadcastTree, BroadcastTreeMultipath};
use crate::tunnel;
use crate::types::{
    HtNodeId, Link, NodePortTuple, OrderedNodePair, PortId, Route, RouteId,
    SwitchId, TopologyInput,
};

/// Immutable topology snapshot computed from one link-discovery feed.
#[derive(Debug)]
pub struct TopologyInstance {
    tunnel_domain: Option<SwitchId>,
    input: TopologyInput,
    switches: BTreeSet<SwitchId>,
    clusters: Clusters,
    broadcast_domains: Vec<BroadcastDomain>,
    port_domains: BTreeMap<NodePortTuple, u64>,
    ht: HigherTopology,
    ports: PortTables,
    trees: BTreeMap<SwitchId, BroadcastTree>,
    trees_multipath: BTreeMap<SwitchId, BroadcastTreeMultipath>,
    cluster_broadcast_trees: BTreeMap<SwitchId, BroadcastTree>,
    cluster_broadcast_ports: BTreeMap<SwitchId, BTreeSet<NodePortTuple>>,
    route_cache: RouteCache,
}

// Stitched list of switch ports and the largest number of equal-cost
// choices seen along it.
type PortList = (Vec<NodePortTuple>, usize);

// ===== impl TopologyInstance =====

impl TopologyInstance {
    /// Computes a new topology instance.
    ///
    /// `broadcast_domains` is the set of broadcast domains identified over
    /// the feed. When `tunnel_domain` is set, every tunnel port is linked to
    /// that synthetic switch before anything else is computed.
    pub fn compute(
        input: TopologyInput,
        broadcast_domains: &[BroadcastDomain],
        tunnel_domain: Option<SwitchId>,
    ) -> TopologyInstance {
        let mut input = sanitize(input);
        let mut switches = input.switches();

        // Create tunnel domain links.
        if let Some(tunnel_domain) = tunnel_domain {
            tunnel::inject_tunnel_links(
                &mut input,
                &mut switches,
                tunnel_domain,
            );
        }

        // Copy the broadcast domains.
        let broadcast_domains = broadcast_domains.to_vec();
        let port_domains = broadcast_domains
            .iter()
            .flat_map(|bd| bd.ports.iter().map(|npt| (*npt, bd.id)))
            .collect::<BTreeMap<_, _>>();

        // Compute clusters and the higher-level topology on top of them.
        let clusters = cluster::identify_clusters(&switches, &input);
        let mut ht =
            HigherTopology::new(&clusters, &broadcast_domains, &input);
        let forest = ht.compute_forest();
        ht.compute_next_hops(&forest);
        ht.compute_l2_domain_ids();

        // Classify ports by node pair of the higher-level topology.
        let mut ports = PortTables::new(&forest);
        let blocked =
            ports.classify_ports(&input, &clusters, &ht, &port_domains);
        for npt in &blocked {
            if !input.blocked_ports.contains(npt) {
                Debug::PortBlocked(npt).log();
            }
        }
        input.blocked_ports.extend(blocked);

        // Tunnel links weigh more than any path free of tunnels.
        let tunnel_weight = input.switch_ports.len() as u32 + 1;
        let link_cost = input
            .tunnel_ports
            .iter()
            .filter_map(|npt| input.switch_port_links.get(npt))
            .flatten()
            .map(|link| (*link, tunnel_weight))
            .collect::<BTreeMap<Link, u32>>();

        // Compute destination-rooted shortest path trees in every cluster.
        let mut trees = BTreeMap::new();
        let mut trees_multipath = BTreeMap::new();
        for cluster in clusters.clusters.values() {
            for node in cluster.nodes() {
                trees.insert(
                    node,
                    spf::dijkstra(cluster, node, &link_cost, true),
                );
                trees_multipath.insert(
                    node,
                    spf::dijkstra_multipath(cluster, node, &link_cost, true),
                );
            }
        }

        // Compute the broadcast tree of every cluster.
        let mut cluster_broadcast_trees = BTreeMap::new();
        let mut cluster_broadcast_ports = BTreeMap::new();
        for cluster in clusters.clusters.values() {
            let tree = spf::dijkstra(cluster, cluster.id, &link_cost, true);
            let ports = tree
                .links
                .values()
                .flatten()
                .flat_map(|link| [link.src_npt(), link.dst_npt()])
                .collect::<BTreeSet<_>>();
            cluster_broadcast_ports.insert(cluster.id, ports);
            cluster_broadcast_trees.insert(cluster.id, tree);
        }

        // Resolve which ports every switch uses to reach the adjacent
        // higher-level nodes.
        ports.compute_switch_port_mappings(&clusters, &ht, |src, dst| {
            trees.get(&dst).and_then(|tree| tree.cost(src))
        });

        let instance = TopologyInstance {
            tunnel_domain,
            input,
            switches,
            clusters,
            broadcast_domains,
            port_domains,
            ht,
            ports,
            trees,
            trees_multipath,
            cluster_broadcast_trees,
            cluster_broadcast_ports,
            route_cache: Default::default(),
        };
        instance.trace_dump();
        instance
    }

    fn trace_dump(&self) {
        trace!(clusters = ?self.clusters.clusters.keys().collect::<Vec<_>>(), "clusters");
        trace!(broadcast_domains = ?self.broadcast_domains, "broadcast domains");
        trace!(nodes = ?self.ht.nodes, "higher-level topology nodes");
        trace!(neighbors = ?self.ht.neighbors, "higher-level topology neighbors");
        trace!(next_hops = ?self.ht.next_hop, "higher-level topology reachability");
        trace!(l2_domain_ids = ?self.ht.l2_domain_ids, "L2 domain ids");
        trace!(ports = ?self.ports.allowed_unicast_ports, "allowed unicast ports");
        trace!(
            ports = ?self.ports.allowed_incoming_broadcast_ports,
            "allowed incoming broadcast ports"
        );
        trace!(ports = ?self.ports.permitted_switches, "permitted switches");
        trace!(
            ports = ?self.ports.permitted_port_to_domains,
            "permitted ports to broadcast domains"
        );
    }

    // ----- accessors -----

    pub fn tunnel_domain(&self) -> Option<SwitchId> {
        self.tunnel_domain
    }

    pub fn input(&self) -> &TopologyInput {
        &self.input
    }

    pub fn switches(&self) -> &BTreeSet<SwitchId> {
        &self.switches
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.clusters.values()
    }

    pub fn cluster(&self, switch: SwitchId) -> Option<&Cluster> {
        self.clusters.get(switch)
    }

    pub fn blocked_ports(&self) -> &BTreeSet<NodePortTuple> {
        &self.input.blocked_ports
    }

    pub fn broadcast_domains(&self) -> &[BroadcastDomain] {
        &self.broadcast_domains
    }

    pub fn higher_topology(&self) -> &HigherTopology {
        &self.ht
    }

    pub fn port_tables(&self) -> &PortTables {
        &self.ports
    }

    pub fn allowed_unicast_ports(
        &self,
    ) -> &BTreeMap<OrderedNodePair, BTreeSet<NodePortTuple>> {
        &self.ports.allowed_unicast_ports
    }

    pub fn allowed_incoming_broadcast_ports(
        &self,
    ) -> &BTreeMap<OrderedNodePair, NodePortTuple> {
        &self.ports.allowed_incoming_broadcast_ports
    }

    pub fn allowed_port_to_broadcast_domains(
        &self,
    ) -> &BTreeMap<NodePortTuple, BTreeSet<HtNodeId>> {
        &self.ports.permitted_port_to_domains
    }

    pub fn destination_rooted_tree(
        &self,
        dst: SwitchId,
    ) -> Option<&BroadcastTree> {
        self.trees.get(&dst)
    }

    pub fn destination_rooted_tree_multipath(
        &self,
        dst: SwitchId,
    ) -> Option<&BroadcastTreeMultipath> {
        self.trees_multipath.get(&dst)
    }

    pub fn cluster_broadcast_tree(
        &self,
        cluster_id: SwitchId,
    ) -> Option<&BroadcastTree> {
        self.cluster_broadcast_trees.get(&cluster_id)
    }

    pub fn route_cache(&self) -> &RouteCache {
        &self.route_cache
    }

    // ----- port queries -----

    pub fn is_broadcast_domain_port(&self, sw: SwitchId, port: PortId) -> bool {
        self.port_domains
            .contains_key(&NodePortTuple::new(sw, port))
    }

    /// Returns whether the given port connects an end host (as opposed to
    /// another switch of the same cluster).
    pub fn is_attachment_point_port(&self, sw: SwitchId, port: PortId) -> bool {
        let npt = NodePortTuple::new(sw, port);

        // Ports unknown to topology are attachment points.
        let Some(links) = self.input.switch_port_links.get(&npt) else {
            return true;
        };

        // So are broadcast domain ports.
        if self.port_domains.contains_key(&npt) {
            return true;
        }

        // A single link leaving the cluster doesn't make the port internal.
        if links.len() == 1 {
            for link in links {
                if !self.in_same_openflow_domain(link.src, link.dst) {
                    return true;
                }
            }
        }

        false
    }

    pub fn is_internal_to_openflow_domain(
        &self,
        sw: SwitchId,
        port: PortId,
    ) -> bool {
        !self.is_attachment_point_port(sw, port)
    }

    /// Returns whether the port may send and receive packets.
    pub fn is_allowed(&self, sw: SwitchId, port: PortId) -> bool {
        !self.input.blocked_ports.contains(&NodePortTuple::new(sw, port))
    }

    /// Returns whether broadcast packets received on the given port must be
    /// accepted.
    pub fn is_incoming_broadcast_allowed(
        &self,
        sw: SwitchId,
        port: PortId,
    ) -> bool {
        let npt = NodePortTuple::new(sw, port);

        if self.is_internal_to_openflow_domain(sw, port) {
            let cluster_id = self.openflow_domain_id(sw);
            self.cluster_broadcast_ports
                .get(&cluster_id)
                .is_some_and(|ports| ports.contains(&npt))
        } else if self.port_domains.contains_key(&npt) {
            let Some(n) = self.ht.cluster_node(&self.clusters, sw) else {
                return false;
            };
            self.ht.neighbors.get(&n).into_iter().flatten().any(|nbr| {
                self.ports
                    .allowed_incoming_broadcast_ports
                    .get(&OrderedNodePair::new(n, *nbr))
                    == Some(&npt)
            })
        } else {
            true
        }
    }

    /// Returns the ports of the cluster broadcast tree, tunnel ports
    /// excluded.
    pub fn broadcast_node_ports_in_cluster(
        &self,
        sw: SwitchId,
    ) -> BTreeSet<NodePortTuple> {
        let cluster_id = self.openflow_domain_id(sw);
        self.cluster_broadcast_ports
            .get(&cluster_id)
            .map(|ports| {
                ports
                    .difference(&self.input.tunnel_ports)
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ----- domain queries -----

    /// Returns the cluster id of the given switch. Switches unknown to
    /// topology form their own domain.
    pub fn openflow_domain_id(&self, sw: SwitchId) -> SwitchId {
        self.clusters.cluster_id(sw).unwrap_or(sw)
    }

    pub fn in_same_openflow_domain(&self, sw1: SwitchId, sw2: SwitchId) -> bool {
        self.openflow_domain_id(sw1) == self.openflow_domain_id(sw2)
    }

    pub fn switches_in_openflow_domain(
        &self,
        sw: SwitchId,
    ) -> BTreeSet<SwitchId> {
        match self.clusters.get(sw) {
            Some(cluster) => cluster
                .nodes()
                .filter(|node| Some(*node) != self.tunnel_domain)
                .collect(),
            None => [sw].into(),
        }
    }

    pub fn l2_domain_id(&self, sw: SwitchId) -> SwitchId {
        let Some(cluster_id) = self.clusters.cluster_id(sw) else {
            return sw;
        };
        self.ht
            .cluster_keys
            .get(&cluster_id)
            .and_then(|n| self.ht.l2_domain_ids.get(n))
            .copied()
            .unwrap_or(cluster_id)
    }

    /// Returns whether the clusters of both switches are connected in the
    /// higher-level topology.
    pub fn in_same_l2_domain(&self, sw1: SwitchId, sw2: SwitchId) -> bool {
        if sw1 == sw2 {
            return true;
        }
        let (Some(n1), Some(n2)) = (
            self.ht.cluster_node(&self.clusters, sw1),
            self.ht.cluster_node(&self.clusters, sw2),
        ) else {
            return false;
        };
        self.ht.is_reachable(n1, n2)
    }

    pub fn in_same_broadcast_domain(
        &self,
        sw1: SwitchId,
        port1: PortId,
        sw2: SwitchId,
        port2: PortId,
    ) -> bool {
        let bd1 = self.port_domains.get(&NodePortTuple::new(sw1, port1));
        let bd2 = self.port_domains.get(&NodePortTuple::new(sw2, port2));
        match (bd1, bd2) {
            (Some(bd1), Some(bd2)) => bd1 == bd2,
            _ => sw1 == sw2 && port1 == port2,
        }
    }

    /// Returns the broadcast domain ports of the given switch.
    pub fn broadcast_domain_ports(&self, sw: SwitchId) -> BTreeSet<PortId> {
        self.port_domains
            .keys()
            .filter(|npt| npt.node == sw)
            .map(|npt| npt.port)
            .collect()
    }

    /// Returns all the ports sharing a broadcast domain with `npt`.
    pub fn broadcast_domain_of(
        &self,
        npt: &NodePortTuple,
    ) -> Option<&BTreeSet<NodePortTuple>> {
        let domain_id = self.port_domains.get(npt)?;
        self.broadcast_domains
            .iter()
            .find(|bd| bd.id == *domain_id)
            .map(|bd| &bd.ports)
    }

    // ----- broadcast queries -----

    /// Returns the ports of `target` where a broadcast packet received on
    /// `(src, src_port)` must be flooded to reach the adjacent higher-level
    /// nodes.
    pub fn broadcast_ports(
        &self,
        target: SwitchId,
        src: SwitchId,
        src_port: PortId,
    ) -> BTreeSet<PortId> {
        let mut result = BTreeSet::new();

        // Get the consistent attachment point for the source in the
        // cluster containing the target switch.
        let Some(npt_src) =
            self.consistent_broadcast_attachment_point(target, src, src_port)
        else {
            return result;
        };
        if !self.in_same_openflow_domain(target, npt_src.node) {
            return result;
        }

        let (cluster_switch, permitted, key) =
            match self.port_domains.get(&npt_src) {
                Some(domain_id) => {
                    let Some(bd_node) = self.ht.domain_keys.get(domain_id)
                    else {
                        return result;
                    };
                    (target, &self.ports.permitted_port_to_domains, *bd_node)
                }
                None => (src, &self.ports.permitted_switches, src),
            };
        let Some(n1) = self.ht.cluster_node(&self.clusters, cluster_switch)
        else {
            return result;
        };
        for nbr in self.ht.neighbors.get(&n1).into_iter().flatten() {
            let onp = OrderedNodePair::new(n1, *nbr);
            if let Some(x) = self.ports.permitted(onp, permitted, key)
                && x.node == target
            {
                result.insert(x.port);
            }
        }

        result
    }

    /// Returns the port of the local cluster accepting broadcast traffic
    /// from the broadcast domain of `(src, src_port)`.
    pub fn allowed_incoming_broadcast_port(
        &self,
        src: SwitchId,
        src_port: PortId,
    ) -> Option<NodePortTuple> {
        let src_npt = NodePortTuple::new(src, src_port);
        if !self.port_domains.contains_key(&src_npt) {
            return None;
        }

        let ht_src_cluster = self.ht.cluster_node(&self.clusters, src)?;
        let ht_src = self.ht_node_id(src, src_port)?;
        if ht_src == ht_src_cluster {
            warn!(%src, port = %src_port, "broadcast domain port without broadcast domain");
            return Some(src_npt);
        }

        self.ports
            .allowed_incoming_broadcast_ports
            .get(&OrderedNodePair::new(ht_src, ht_src_cluster))
            .copied()
    }

    /// Returns the port through which a broadcast packet received on
    /// `(src, src_port)` leaves the local cluster towards
    /// `(dst, dst_port)`.
    pub fn allowed_outgoing_broadcast_port(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
    ) -> Option<NodePortTuple> {
        let dst_npt = NodePortTuple::new(dst, dst_port);
        let Some(ht_src_cluster) = self.ht.cluster_node(&self.clusters, src)
        else {
            return (src == dst).then_some(dst_npt);
        };

        let ht_src = self.ht_node_id(src, src_port)?;
        let ht_dst = self.ht_node_id(dst, dst_port)?;
        let next_hop = *self.ht.next_hop.get(&ht_src_cluster)?.get(&ht_dst)?;
        let onp = OrderedNodePair::new(ht_src_cluster, next_hop);

        if ht_src_cluster == ht_dst && !self.port_domains.contains_key(&dst_npt)
        {
            return Some(dst_npt);
        }

        if ht_src == ht_src_cluster {
            // Internal source: use the port permitted for the switch.
            self.ports
                .permitted(onp, &self.ports.permitted_switches, src)
        } else {
            // Source in a broadcast domain: find where its traffic enters
            // the cluster, then the port permitted for that switch.
            let npt = self.ports.permitted(
                onp,
                &self.ports.permitted_port_to_domains,
                ht_src,
            )?;
            self.ports
                .permitted(onp, &self.ports.permitted_switches, npt.node)
        }
    }

    /// Returns whether a device moving from the old attachment point to the
    /// new one is consistent with the higher-level forest.
    pub fn is_consistent(
        &self,
        old_sw: SwitchId,
        old_port: PortId,
        new_sw: SwitchId,
        new_port: PortId,
    ) -> bool {
        if old_sw == new_sw && old_port == new_port {
            return true;
        }
        if self.is_internal_to_openflow_domain(new_sw, new_port) {
            return true;
        }
        if !self.is_broadcast_domain_port(new_sw, new_port) {
            return false;
        }

        let Some(ht_new_cluster) = self.ht.cluster_node(&self.clusters, new_sw)
        else {
            return false;
        };
        let (Some(ht_old), Some(ht_new)) = (
            self.ht_node_id(old_sw, old_port),
            self.ht_node_id(new_sw, new_port),
        ) else {
            return false;
        };

        self.ht
            .next_hop
            .get(&ht_new_cluster)
            .and_then(|nh| nh.get(&ht_old))
            .is_some_and(|next_hop| *next_hop == ht_new)
    }

    // Returns the attachment point, inside the cluster of `target`, of a
    // device attached to `(ap_sw, ap_port)`.
    fn consistent_broadcast_attachment_point(
        &self,
        target: SwitchId,
        ap_sw: SwitchId,
        ap_port: PortId,
    ) -> Option<NodePortTuple> {
        if !self.is_attachment_point_port(ap_sw, ap_port) {
            return None;
        }

        let npt = NodePortTuple::new(ap_sw, ap_port);
        let target_cluster = self.clusters.cluster_id(target);
        let ap_node = match self.port_domains.get(&npt) {
            Some(domain_id) => {
                target_cluster?;
                *self.ht.domain_keys.get(domain_id)?
            }
            None => {
                let ap_cluster = self.clusters.cluster_id(ap_sw);
                if ap_sw == target && ap_cluster.is_none() {
                    return Some(npt);
                }
                let (ap_cluster, target_cluster) = (ap_cluster?, target_cluster?);
                if ap_cluster == target_cluster {
                    return Some(npt);
                }
                *self.ht.cluster_keys.get(&ap_cluster)?
            }
        };
        let target_node = *self.ht.cluster_keys.get(&target_cluster?)?;

        // The attachment point is the port accepting broadcast traffic on
        // the last hop of the higher-level path.
        let path = self.ht.path(ap_node, target_node)?;
        let [.., prev, last] = path.as_slice() else {
            return None;
        };
        self.ports
            .allowed_incoming_broadcast_ports
            .get(&OrderedNodePair::new(*last, *prev))
            .copied()
    }

    // Returns the higher-level node on the far side of the given port: its
    // broadcast domain, the cluster at the other end of its links, or the
    // cluster of the switch itself.
    fn ht_node_id(&self, sw: SwitchId, port: PortId) -> Option<HtNodeId> {
        let npt = NodePortTuple::new(sw, port);
        if let Some(domain_id) = self.port_domains.get(&npt) {
            return self.ht.domain_keys.get(domain_id).copied();
        }
        if let Some(links) = self.input.switch_port_links.get(&npt) {
            let link = links.last()?;
            let other = link.other_end(&npt);
            return self.ht.cluster_node(&self.clusters, other.node);
        }
        self.ht.cluster_node(&self.clusters, sw)
    }

    /// Returns the higher-level path between two nodes.
    pub fn ht_path(
        &self,
        src: HtNodeId,
        dst: HtNodeId,
    ) -> Option<Vec<HtNodeId>> {
        self.ht.path(src, dst)
    }

    // ----- route queries -----

    /// Returns the route between two switch ports, using `cookie` to pick
    /// among equal-cost alternatives. Empty routes aren't represented.
    pub fn route(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
        cookie: u64,
    ) -> Option<Route> {
        if src == dst && src_port == dst_port {
            return None;
        }

        let (path, route_count) =
            self.build_node_port_list(src, src_port, dst, dst_port, cookie)?;

        // Both ports on the same broadcast domain: no hop to program.
        if path.is_empty() {
            return None;
        }
        let id = RouteId::new(src, dst, cookie);
        Some(Route::new(id, path, route_count.max(1)))
    }

    /// Returns every equal-cost route between two switches.
    pub fn routes(&self, src: SwitchId, dst: SwitchId) -> Vec<Route> {
        let Some(first) = self.switch_route(src, dst, 0) else {
            return vec![];
        };
        let route_count = first.route_count as u64;
        let mut routes = vec![first];
        routes.extend(
            (1..route_count).filter_map(|cookie| {
                self.switch_route(src, dst, cookie)
            }),
        );
        routes
    }

    /// Returns the route between two switches, stitched across clusters
    /// when needed.
    pub fn switch_route(
        &self,
        src: SwitchId,
        dst: SwitchId,
        cookie: u64,
    ) -> Option<Route> {
        let (path, route_count) =
            self.multiroute(src, false, dst, false, cookie)?;
        if path.is_empty() {
            return None;
        }
        let id = RouteId::new(src, dst, cookie);
        Some(Route::new(id, path, route_count.max(1)))
    }

    /// Returns the route between two switches of the same cluster.
    ///
    /// Routes are memoized per (src, dst, cookie), with the cookie reduced
    /// to the number of distinct choices of the destination tree.
    pub fn intra_cluster_route(
        &self,
        src: SwitchId,
        dst: SwitchId,
        cookie: u64,
    ) -> Option<Route> {
        if src == dst {
            return None;
        }

        let period = self
            .trees_multipath
            .get(&dst)
            .map_or(1, BroadcastTreeMultipath::cookie_period);
        let key = RouteId::new(src, dst, cookie % period);
        let mut route = self.route_cache.get_or_compute(key, |key| {
            route::build_route(
                key,
                &self.trees_multipath,
                &self.switches,
                self.tunnel_domain,
            )
        })?;
        route.id.cookie = cookie;
        Some(route)
    }

    /// Returns the first port of the route between two switch ports.
    pub fn incoming_switch_port(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
    ) -> Option<NodePortTuple> {
        match self.build_node_port_list(src, src_port, dst, dst_port, 0) {
            Some((path, _)) if !path.is_empty() => path.first().copied(),
            _ => (src == dst).then(|| NodePortTuple::new(src, src_port)),
        }
    }

    /// Returns the last port of the route between two switch ports.
    pub fn outgoing_switch_port(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
    ) -> Option<NodePortTuple> {
        match self.build_node_port_list(src, src_port, dst, dst_port, 0) {
            Some((path, _)) if !path.is_empty() => path.last().copied(),
            _ => (src == dst).then(|| NodePortTuple::new(dst, dst_port)),
        }
    }

    // Builds the full list of switch ports between two attachment points.
    //
    // Endpoints attached to a broadcast domain are resolved to the domain
    // itself, which then consumes that endpoint.
    fn build_node_port_list(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
        cookie: u64,
    ) -> Option<PortList> {
        let src_npt = NodePortTuple::new(src, src_port);
        let dst_npt = NodePortTuple::new(dst, dst_port);

        let resolve = |npt: &NodePortTuple| match self.port_domains.get(npt) {
            Some(domain_id) => {
                self.ht.domain_keys.get(domain_id).map(|n| (*n, true))
            }
            None => Some((npt.node, false)),
        };
        let (n1, src_bd) = resolve(&src_npt)?;
        let (n2, dst_bd) = resolve(&dst_npt)?;

        let (mut path, route_count) =
            match self.multiroute(n1, src_bd, n2, dst_bd, cookie) {
                Some(result) => result,
                None if src != dst => return None,
                None => (vec![], 0),
            };

        if !src_bd {
            path.insert(0, src_npt);
        }
        if !dst_bd {
            path.push(dst_npt);
        }

        Some((path, route_count))
    }

    // Stitches the route between two endpoints, each either a switch or a
    // broadcast domain node.
    fn multiroute(
        &self,
        src_id: u64,
        src_bd: bool,
        dst_id: u64,
        dst_bd: bool,
        cookie: u64,
    ) -> Option<PortList> {
        // Switches in different L2 domains can't reach each other.
        if !src_bd && !dst_bd && !self.in_same_l2_domain(src_id, dst_id) {
            return None;
        }

        let resolve = |id: u64, bd: bool| {
            if bd {
                self.ht.is_broadcast_domain(id).then_some(id)
            } else {
                self.ht.cluster_node(&self.clusters, id)
            }
        };
        let n1 = resolve(src_id, src_bd)?;
        let n2 = resolve(dst_id, dst_bd)?;

        // Both are switches of the same cluster: direct path.
        if !src_bd && !dst_bd && n1 == n2 {
            return Some(match self.intra_cluster_route(src_id, dst_id, cookie) {
                Some(route) => (route.path, route.route_count),
                None => (vec![], 0),
            });
        }

        let ht_path = self.ht.path(n1, n2)?;
        let mut path = vec![];
        let mut route_count = 0;
        let mut extend = |(ports, count): PortList| {
            path.extend(ports);
            route_count = route_count.max(count);
        };

        // First hop, unless starting at a broadcast domain.
        if let Some(first) = ht_path.first()
            && !self.ht.is_broadcast_domain(*first)
        {
            let next = *ht_path.get(1)?;
            extend(self.first_hop_route(src_id, next, cookie)?);
        }

        // Transit clusters.
        for window in ht_path.windows(3) {
            let &[from, through, to] = window else {
                continue;
            };
            if self.ht.is_broadcast_domain(through) {
                continue;
            }
            match self.route_through_cluster(from, to, through, cookie) {
                Some(segment) => extend(segment),
                None => {
                    trace!(src = %src_id, dst = %dst_id, "no route through cluster");
                    return None;
                }
            }
        }

        // Last hop, unless ending at a broadcast domain.
        if let [.., prev, last] = ht_path.as_slice()
            && !self.ht.is_broadcast_domain(*last)
        {
            extend(self.last_hop_route(*prev, dst_id, cookie)?);
        }

        Some((path, route_count))
    }

    // Path from a switch to the port connecting its cluster to `ht_node`.
    fn first_hop_route(
        &self,
        sw: SwitchId,
        ht_node: HtNodeId,
        cookie: u64,
    ) -> Option<PortList> {
        let n1 = self.ht.cluster_node(&self.clusters, sw)?;
        let onp = OrderedNodePair::new(n1, ht_node);
        let dst_npt =
            self.ports
                .permitted(onp, &self.ports.permitted_switches, sw)?;

        let (mut path, route_count) =
            self.intra_segment(sw, dst_npt.node, cookie)?;
        path.push(dst_npt);
        Some((path, route_count))
    }

    // Path from the port connecting `ht_node` to the cluster of `sw`, down
    // to that switch.
    fn last_hop_route(
        &self,
        ht_node: HtNodeId,
        sw: SwitchId,
        cookie: u64,
    ) -> Option<PortList> {
        let n1 = self.ht.cluster_node(&self.clusters, sw)?;
        let onp = OrderedNodePair::new(n1, ht_node);
        let src_npt =
            self.ports
                .permitted(onp, &self.ports.permitted_switches, sw)?;

        let (path, route_count) =
            self.intra_segment(src_npt.node, sw, cookie)?;
        let mut result = vec![src_npt];
        result.extend(path);
        Some((result, route_count))
    }

    // Path across the cluster `through`, from the port facing `from` to
    // the port facing `to`.
    fn route_through_cluster(
        &self,
        from: HtNodeId,
        to: HtNodeId,
        through: HtNodeId,
        cookie: u64,
    ) -> Option<PortList> {
        let permitted = &self.ports.permitted_port_to_domains;
        let dst_npt = self.ports.permitted(
            OrderedNodePair::new(through, to),
            permitted,
            from,
        )?;
        let src_npt = self.ports.permitted(
            OrderedNodePair::new(through, from),
            permitted,
            to,
        )?;

        let (path, route_count) =
            self.intra_segment(src_npt.node, dst_npt.node, cookie)?;
        let mut result = vec![src_npt];
        result.extend(path);
        result.push(dst_npt);
        Some((result, route_count))
    }

    // Intra-cluster segment of a stitched route. Staying on the same switch
    // is an empty segment, while an unreachable switch breaks the route.
    fn intra_segment(
        &self,
        src: SwitchId,
        dst: SwitchId,
        cookie: u64,
    ) -> Option<PortList> {
        if src == dst {
            return Some((vec![], 0));
        }
        self.intra_cluster_route(src, dst, cookie)
            .map(|route| (route.path, route.route_count))
    }
}

// ===== helper functions =====

// Drops links stored under a port that isn't one of their endpoints, and
// registers switches and ports only known through links.
fn sanitize(mut input: TopologyInput) -> TopologyInput {
    let mut missing = vec![];
    for (npt, links) in input.switch_port_links.iter_mut() {
        links.retain(|link| {
            let valid = link.src_npt() == *npt || link.dst_npt() == *npt;
            if !valid {
                Error::LinkPortMismatch(*npt, *link).log();
            }
            valid
        });
        for link in links.iter() {
            for end in [link.src_npt(), link.dst_npt()] {
                let known = input
                    .switch_ports
                    .get(&end.node)
                    .is_some_and(|ports| ports.contains(&end.port));
                if !known {
                    missing.push((end, *link));
                }
            }
        }
    }

    for (npt, link) in missing {
        if !input.switch_ports.contains_key(&npt.node) {
            Error::UnknownSwitch(npt.node, link).log();
        }
        input.switch_ports.entry(npt.node).or_default().insert(npt.port);
    }
    input.switch_port_links.retain(|_, links| !links.is_empty());

    input
}
