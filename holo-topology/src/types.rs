//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::error::{Error, IoError};

// Datapath identifier of an OpenFlow switch.
pub type SwitchId = u64;
// OpenFlow port number.
pub type PortId = u16;
// Dense identifier of a node in the higher-level topology.
pub type HtNodeId = u64;

/// A physical attachment point: one port of one switch.
///
/// The total order compares the switch id first and the port id second.
/// This order decides which port is the canonical ingress for broadcast
/// traffic between two higher-level nodes.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct NodePortTuple {
    pub node: SwitchId,
    pub port: PortId,
}

/// Directed link between two switch ports.
///
/// The field order defines the total order used to sort equal-cost next
/// hops: source switch, source port, destination switch, destination port.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct Link {
    pub src: SwitchId,
    pub src_port: PortId,
    pub dst: SwitchId,
    pub dst_port: PortId,
}

/// Directed pair of node identifiers.
///
/// Both directions of a pair are stored as separate keys since the state
/// attached to `(a, b)` and `(b, a)` differs (e.g. the allowed ports of
/// `(a, b)` are the ports on the side of `a`).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Deserialize, Serialize)]
pub struct OrderedNodePair {
    pub src: u64,
    pub dst: u64,
}

/// Key of a computed route.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, new)]
#[derive(Serialize)]
pub struct RouteId {
    pub src: SwitchId,
    pub dst: SwitchId,
    pub cookie: u64,
}

/// Ordered list of switch ports describing a path hop by hop (egress port,
/// ingress port, egress port, ...).
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Serialize)]
pub struct Route {
    pub id: RouteId,
    pub path: Vec<NodePortTuple>,
    // Largest number of equal-cost alternatives seen at any hop.
    pub route_count: usize,
}

/// Link-discovery state consumed by every topology recompute.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyInput {
    pub switch_ports: BTreeMap<SwitchId, BTreeSet<PortId>>,
    #[serde(with = "port_links")]
    pub switch_port_links: BTreeMap<NodePortTuple, BTreeSet<Link>>,
    #[serde(default)]
    pub blocked_ports: BTreeSet<NodePortTuple>,
    #[serde(default)]
    pub broadcast_domain_ports: BTreeSet<NodePortTuple>,
    #[serde(default)]
    pub tunnel_ports: BTreeSet<NodePortTuple>,
}

// ===== impl NodePortTuple =====

impl std::fmt::Display for NodePortTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}:{}", self.node, self.port)
    }
}

// ===== impl Link =====

impl Link {
    pub fn src_npt(&self) -> NodePortTuple {
        NodePortTuple::new(self.src, self.src_port)
    }

    pub fn dst_npt(&self) -> NodePortTuple {
        NodePortTuple::new(self.dst, self.dst_port)
    }

    // Returns the endpoint of the link opposite to the given port.
    pub fn other_end(&self, npt: &NodePortTuple) -> NodePortTuple {
        if self.src_npt() == *npt {
            self.dst_npt()
        } else {
            self.src_npt()
        }
    }

    pub fn reverse(&self) -> Link {
        Link::new(self.dst, self.dst_port, self.src, self.src_port)
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.src_npt(), self.dst_npt())
    }
}

// ===== impl OrderedNodePair =====

impl OrderedNodePair {
    pub fn reverse(&self) -> OrderedNodePair {
        OrderedNodePair::new(self.dst, self.src)
    }
}

// ===== impl TopologyInput =====

impl TopologyInput {
    /// Parses a link-state feed encoded in JSON.
    pub fn from_json(data: &str) -> Result<TopologyInput, Error> {
        serde_json::from_str(data).map_err(Error::InvalidFeed)
    }

    /// Reads a link-state feed from a JSON file.
    pub fn load(path: &str) -> Result<TopologyInput, Error> {
        let data = std::fs::read_to_string(path)
            .map_err(|error| IoError::FeedRead(path.to_owned(), error))?;
        TopologyInput::from_json(&data)
    }

    // Adds a bidirectional link, registering both ports.
    pub fn add_link(&mut self, link: Link) {
        for npt in [link.src_npt(), link.dst_npt()] {
            self.switch_ports.entry(npt.node).or_default().insert(npt.port);
            let links = self.switch_port_links.entry(npt).or_default();
            links.insert(link);
            links.insert(link.reverse());
        }
    }

    /// Returns whether the feed marked the given port as facing a broadcast
    /// domain.
    ///
    /// Unmarked ports linked to a marked one join the same domain once the
    /// topology is computed; use the instance to query domain membership.
    pub fn is_marked_broadcast_domain_port(
        &self,
        npt: &NodePortTuple,
    ) -> bool {
        self.broadcast_domain_ports.contains(npt)
    }

    // A link is blocked when either of its endpoints is blocked.
    pub fn is_blocked_link(&self, link: &Link) -> bool {
        self.blocked_ports.contains(&link.src_npt())
            || self.blocked_ports.contains(&link.dst_npt())
    }

    // A link belongs to a broadcast domain when either of its endpoints is
    // a broadcast domain port.
    pub fn is_broadcast_domain_link(&self, link: &Link) -> bool {
        self.is_marked_broadcast_domain_port(&link.src_npt())
            || self.is_marked_broadcast_domain_port(&link.dst_npt())
    }

    // Iterates over the links attached to every port of every switch.
    pub fn port_links(
        &self,
    ) -> impl Iterator<Item = (NodePortTuple, &BTreeSet<Link>)> + '_ {
        self.switch_ports.iter().flat_map(move |(switch, ports)| {
            ports.iter().filter_map(move |port| {
                let npt = NodePortTuple::new(*switch, *port);
                self.switch_port_links.get(&npt).map(|links| (npt, links))
            })
        })
    }

    // Returns all known switches, including the ones only referenced by
    // links.
    pub fn switches(&self) -> BTreeSet<SwitchId> {
        self.switch_ports
            .keys()
            .copied()
            .chain(
                self.switch_port_links
                    .values()
                    .flatten()
                    .flat_map(|link| [link.src, link.dst]),
            )
            .collect()
    }
}

// JSON object keys must be strings, so the port-to-links map is encoded as
// a list of entries.
mod port_links {
    use std::collections::{BTreeMap, BTreeSet};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{Link, NodePortTuple};

    #[derive(Deserialize, Serialize)]
    struct Entry {
        port: NodePortTuple,
        links: BTreeSet<Link>,
    }

    pub(super) fn serialize<S>(
        map: &BTreeMap<NodePortTuple, BTreeSet<Link>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let entries = map
            .iter()
            .map(|(port, links)| Entry {
                port: *port,
                links: links.clone(),
            })
            .collect::<Vec<_>>();
        entries.serialize(serializer)
    }

    pub(super) fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<NodePortTuple, BTreeSet<Link>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        let mut map: BTreeMap<NodePortTuple, BTreeSet<Link>> = BTreeMap::new();
        for entry in entries {
            map.entry(entry.port).or_default().extend(entry.links);
        }
        Ok(map)
    }
}

// ===== unit tests =====
