//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::cluster::Cluster;
use crate::types::{Link, SwitchId};

// Cost of unreachable nodes.
pub const MAX_PATH_WEIGHT: u32 = u32::MAX;

/// Destination-rooted tree with a single next-hop link per node.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BroadcastTree {
    pub root: SwitchId,
    pub links: BTreeMap<SwitchId, Option<Link>>,
    pub costs: BTreeMap<SwitchId, u32>,
}

/// Destination-rooted tree with every equal-cost next-hop link per node.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct BroadcastTreeMultipath {
    pub root: SwitchId,
    // Next-hop links, sorted.
    pub links: BTreeMap<SwitchId, Vec<Link>>,
    pub costs: BTreeMap<SwitchId, u32>,
}

// Candidate node waiting to be added to the tree.
#[derive(Debug)]
struct Candidate {
    node: SwitchId,
    distance: u32,
    links: Vec<Link>,
}

// ===== impl BroadcastTree =====

impl BroadcastTree {
    /// Returns the cost from `node` to the root, or `None` when the node is
    /// unreachable.
    pub fn cost(&self, node: SwitchId) -> Option<u32> {
        self.costs
            .get(&node)
            .copied()
            .filter(|cost| *cost != MAX_PATH_WEIGHT)
    }

    pub fn link(&self, node: SwitchId) -> Option<&Link> {
        self.links.get(&node).and_then(Option::as_ref)
    }
}

// ===== impl BroadcastTreeMultipath =====

impl BroadcastTreeMultipath {
    pub fn cost(&self, node: SwitchId) -> Option<u32> {
        self.costs
            .get(&node)
            .copied()
            .filter(|cost| *cost != MAX_PATH_WEIGHT)
    }

    pub fn links(&self, node: SwitchId) -> &[Link] {
        self.links.get(&node).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the least common multiple of the number of equal-cost links
    /// of every node.
    ///
    /// Two cookies equal modulo this period select the same link at every
    /// hop of the tree.
    pub fn cookie_period(&self) -> u64 {
        self.links
            .values()
            .map(|links| links.len().max(1) as u64)
            .fold(1, |period, choices| {
                let gcd = gcd(period, choices);
                (period / gcd).saturating_mul(choices)
            })
    }
}

// ===== global functions =====

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

// Returns the weight of the given link. Links missing from the cost table
// weigh 1.
fn link_weight(link_cost: &BTreeMap<Link, u32>, link: &Link) -> u32 {
    link_cost.get(link).copied().unwrap_or(1)
}

// Runs Dijkstra over the links of the given cluster.
//
// When `dst_rooted` is set, the tree is rooted at the destination: each
// node records the link it uses to move towards the root. Otherwise links
// point away from the root.
//
// With `multipath` unset, a node keeps the first next-hop link found at its
// best cost. With `multipath` set, every distinct equal-cost link is kept.
fn run(
    cluster: &Cluster,
    root: SwitchId,
    link_cost: &BTreeMap<Link, u32>,
    dst_rooted: bool,
    multipath: bool,
) -> (BTreeMap<SwitchId, Vec<Link>>, BTreeMap<SwitchId, u32>) {
    let mut links: BTreeMap<SwitchId, Vec<Link>> =
        cluster.nodes().map(|node| (node, vec![])).collect();
    let mut costs: BTreeMap<SwitchId, u32> = cluster
        .nodes()
        .map(|node| (node, MAX_PATH_WEIGHT))
        .collect();

    // Initialize SPT and candidate list.
    let mut spt = BTreeSet::new();
    let mut cand_list = BTreeMap::new();
    cand_list.insert(
        (0, root),
        Candidate {
            node: root,
            distance: 0,
            links: vec![],
        },
    );

    // Main SPF loop.
    while let Some((_, vertex)) = cand_list.pop_first() {
        // Add node to SPT.
        spt.insert(vertex.node);
        costs.insert(vertex.node, vertex.distance);
        links.insert(vertex.node, vertex.links);

        for link in cluster.links.get(&vertex.node).into_iter().flatten() {
            let neighbor = if dst_rooted { link.src } else { link.dst };

            // Links pointing the other way produce this condition.
            if neighbor == vertex.node {
                continue;
            }

            // Check if the neighbor is already on the shortest-path tree.
            if spt.contains(&neighbor) {
                continue;
            }

            let distance =
                vertex.distance.saturating_add(link_weight(link_cost, link));
            if distance >= MAX_PATH_WEIGHT {
                continue;
            }

            // Check if the neighbor is already present on the candidate
            // list.
            if let Some((cand_key, cand_v)) =
                cand_list.iter_mut().find(|(_, cand_v)| cand_v.node == neighbor)
            {
                match distance.cmp(&cand_v.distance) {
                    std::cmp::Ordering::Less => {
                        // Remove candidate since its key has changed. It will
                        // be re-added with the correct key below.
                        let cand_key = *cand_key;
                        cand_list.remove(&cand_key);
                    }
                    std::cmp::Ordering::Equal => {
                        if multipath && !cand_v.links.contains(link) {
                            cand_v.links.push(*link);
                        }
                        continue;
                    }
                    std::cmp::Ordering::Greater => {
                        // Ignore higher cost path.
                        continue;
                    }
                }
            }
            cand_list.insert(
                (distance, neighbor),
                Candidate {
                    node: neighbor,
                    distance,
                    links: vec![*link],
                },
            );
        }
    }

    (links, costs)
}

/// Computes the single-path tree rooted at `root`.
pub fn dijkstra(
    cluster: &Cluster,
    root: SwitchId,
    link_cost: &BTreeMap<Link, u32>,
    dst_rooted: bool,
) -> BroadcastTree {
    let (links, costs) = run(cluster, root, link_cost, dst_rooted, false);
    let links = links
        .into_iter()
        .map(|(node, links)| (node, links.first().copied()))
        .collect();

    BroadcastTree { root, links, costs }
}

/// Computes the equal-cost multipath tree rooted at `root`.
pub fn dijkstra_multipath(
    cluster: &Cluster,
    root: SwitchId,
    link_cost: &BTreeMap<Link, u32>,
    dst_rooted: bool,
) -> BroadcastTreeMultipath {
    let (mut links, costs) = run(cluster, root, link_cost, dst_rooted, true);
    for links in links.values_mut() {
        links.sort();
    }

    BroadcastTreeMultipath { root, links, costs }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(links: &[Link]) -> Cluster {
        let mut switches = BTreeSet::new();
        let mut cluster_links: BTreeMap<SwitchId, BTreeSet<Link>> =
            BTreeMap::new();
        for link in links {
            switches.insert(link.src);
            switches.insert(link.dst);
            for link in [*link, link.reverse()] {
                cluster_links.entry(link.src).or_default().insert(link);
                cluster_links.entry(link.dst).or_default().insert(link);
            }
        }
        Cluster {
            id: switches.first().copied().unwrap_or_default(),
            links: cluster_links,
        }
    }

    #[test]
    fn dst_rooted_line() {
        let c = cluster(&[Link::new(1, 1, 2, 1), Link::new(2, 2, 3, 1)]);
        let tree = dijkstra(&c, 3, &BTreeMap::new(), true);

        assert_eq!(tree.cost(3), Some(0));
        assert_eq!(tree.cost(2), Some(1));
        assert_eq!(tree.cost(1), Some(2));
        assert_eq!(tree.link(3), None);
        assert_eq!(tree.link(2), Some(&Link::new(2, 2, 3, 1)));
        assert_eq!(tree.link(1), Some(&Link::new(1, 1, 2, 1)));
    }

    #[test]
    fn multipath_dual_link() {
        let c = cluster(&[Link::new(1, 2, 2, 2), Link::new(1, 1, 2, 1)]);
        let tree = dijkstra_multipath(&c, 2, &BTreeMap::new(), true);

        assert_eq!(tree.cost(1), Some(1));
        assert_eq!(
            tree.links(1),
            &[Link::new(1, 1, 2, 1), Link::new(1, 2, 2, 2)]
        );
        assert!(tree.links(2).is_empty());

        // The single-path variant keeps exactly one of them.
        let tree = dijkstra(&c, 2, &BTreeMap::new(), true);
        assert_eq!(tree.link(1), Some(&Link::new(1, 1, 2, 1)));
    }

    #[test]
    fn multipath_diamond() {
        // 1 reaches 4 through either 2 or 3.
        let c = cluster(&[
            Link::new(1, 1, 2, 1),
            Link::new(1, 2, 3, 1),
            Link::new(2, 2, 4, 1),
            Link::new(3, 2, 4, 2),
        ]);
        let tree = dijkstra_multipath(&c, 4, &BTreeMap::new(), true);

        assert_eq!(tree.cost(1), Some(2));
        assert_eq!(
            tree.links(1),
            &[Link::new(1, 1, 2, 1), Link::new(1, 2, 3, 1)]
        );
        assert_eq!(tree.links(2), &[Link::new(2, 2, 4, 1)]);
        assert_eq!(tree.links(3), &[Link::new(3, 2, 4, 2)]);
        assert_eq!(tree.cookie_period(), 2);
    }

    #[test]
    fn cookie_period_covers_every_hop() {
        let links = |count: u16| {
            (1..=count).map(|port| Link::new(1, port, 2, port)).collect()
        };
        let mut tree = BroadcastTreeMultipath::default();
        assert_eq!(tree.cookie_period(), 1);

        tree.links.insert(1, links(2));
        tree.links.insert(2, links(3));
        tree.links.insert(3, links(4));
        tree.links.insert(4, vec![]);
        assert_eq!(tree.cookie_period(), 12);
    }

    #[test]
    fn weighted_links_are_avoided() {
        // Direct 1-3 link is expensive, so the path through 2 wins.
        let c = cluster(&[
            Link::new(1, 1, 2, 1),
            Link::new(2, 2, 3, 1),
            Link::new(1, 9, 3, 9),
        ]);
        let mut link_cost = BTreeMap::new();
        link_cost.insert(Link::new(1, 9, 3, 9), 5);
        link_cost.insert(Link::new(3, 9, 1, 9), 5);
        let tree = dijkstra(&c, 3, &link_cost, true);

        assert_eq!(tree.cost(1), Some(2));
        assert_eq!(tree.link(1), Some(&Link::new(1, 1, 2, 1)));
    }

    #[test]
    fn unreachable_nodes_keep_sentinel() {
        let mut c = cluster(&[Link::new(1, 1, 2, 1)]);
        c.links.insert(3, BTreeSet::new());
        let tree = dijkstra_multipath(&c, 1, &BTreeMap::new(), true);

        assert_eq!(tree.cost(3), None);
        assert_eq!(tree.costs[&3], MAX_PATH_WEIGHT);
        assert!(tree.links(3).is_empty());
    }
}
