//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use holo_topology::types::Link;
use maplit::btreeset;

use super::*;

#[test]
fn line_of_three_switches() {
    let instance =
        compute(feed(&[Link::new(1, 1, 2, 1), Link::new(2, 2, 3, 1)]));

    let clusters = instance.clusters().collect::<Vec<_>>();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].nodes().collect::<Vec<_>>(), vec![1, 2, 3]);

    let route = instance.route(1, HOST_PORT, 3, HOST_PORT, 0).unwrap();
    assert_eq!(
        route.path,
        vec![
            npt(1, HOST_PORT),
            npt(1, 1),
            npt(2, 1),
            npt(2, 2),
            npt(3, 1),
            npt(3, HOST_PORT),
        ]
    );
    assert_eq!(route.route_count, 1);

    // Host ports are attachment points, inter-switch ports aren't.
    assert!(instance.is_attachment_point_port(1, HOST_PORT));
    assert!(!instance.is_attachment_point_port(2, 1));
    assert!(instance.is_allowed(2, 2));
    assert_eq!(
        instance.incoming_switch_port(1, HOST_PORT, 3, HOST_PORT),
        Some(npt(1, HOST_PORT))
    );
    assert_eq!(
        instance.outgoing_switch_port(1, HOST_PORT, 3, HOST_PORT),
        Some(npt(3, HOST_PORT))
    );
}

#[test]
fn dual_link_multipath() {
    let instance =
        compute(feed(&[Link::new(1, 2, 2, 2), Link::new(1, 1, 2, 1)]));

    let tree = instance.destination_rooted_tree_multipath(2).unwrap();
    assert_eq!(
        tree.links(1),
        &[Link::new(1, 1, 2, 1), Link::new(1, 2, 2, 2)]
    );

    let route = instance.route(1, HOST_PORT, 2, HOST_PORT, 0).unwrap();
    assert_eq!(route.route_count, 2);
    assert_eq!(
        route.path,
        vec![npt(1, HOST_PORT), npt(1, 1), npt(2, 1), npt(2, HOST_PORT)]
    );
    let route = instance.route(1, HOST_PORT, 2, HOST_PORT, 1).unwrap();
    assert_eq!(route.route_count, 2);
    assert_eq!(
        route.path,
        vec![npt(1, HOST_PORT), npt(1, 2), npt(2, 2), npt(2, HOST_PORT)]
    );

    let routes = instance.routes(1, 2);
    assert_eq!(routes.len(), 2);
    assert_ne!(routes[0].path, routes[1].path);
}

#[test]
fn route_cache_bounded_across_cookies() {
    let instance =
        compute(feed(&[Link::new(1, 2, 2, 2), Link::new(1, 1, 2, 1)]));

    let mut paths = BTreeSet::new();
    for cookie in 0..1000 {
        let route = instance.route(1, HOST_PORT, 2, HOST_PORT, cookie).unwrap();
        assert_eq!(route.id.cookie, cookie);
        assert_eq!(route.route_count, 2);
        paths.insert(route.path);
    }
    assert_eq!(paths.len(), 2);

    // One cached route per distinct choice of next-hop link.
    assert_eq!(instance.route_cache().len(), 2);

    // Cookies sharing a choice still select the same path.
    assert_eq!(
        instance.route(1, HOST_PORT, 2, HOST_PORT, 7).unwrap().path,
        instance.route(1, HOST_PORT, 2, HOST_PORT, 1).unwrap().path
    );
}

#[test]
fn switches_behind_hub() {
    // Both switches reach the hub through port 5; switch 1 also through
    // port 6.
    let mut input = feed(&[Link::new(1, 5, 2, 5), Link::new(1, 6, 2, 5)]);
    input.broadcast_domain_ports = btreeset! { npt(1, 5), npt(1, 6), npt(2, 5) };
    let instance = compute(input);

    // One broadcast domain with every hub port.
    let domains = instance.broadcast_domains();
    assert_eq!(domains.len(), 1);
    assert_eq!(
        domains[0].ports,
        btreeset! { npt(1, 5), npt(1, 6), npt(2, 5) }
    );
    assert!(instance.is_broadcast_domain_port(1, 5));
    assert!(instance.is_broadcast_domain_port(2, 5));
    assert!(!instance.is_broadcast_domain_port(1, HOST_PORT));
    assert_eq!(instance.broadcast_domain_ports(1), btreeset! { 5, 6 });
    assert!(instance.in_same_broadcast_domain(1, 6, 2, 5));

    // Each switch is a cluster of its own, joined through the hub.
    assert_eq!(instance.clusters().count(), 2);
    assert!(!instance.in_same_openflow_domain(1, 2));
    assert!(instance.in_same_l2_domain(1, 2));
    assert_eq!(instance.l2_domain_id(2), 1);

    // The hub is crossed in a single hop through the smallest port.
    let route = instance.route(1, HOST_PORT, 2, HOST_PORT, 0).unwrap();
    assert_eq!(
        route.path,
        vec![npt(1, HOST_PORT), npt(1, 5), npt(2, 5), npt(2, HOST_PORT)]
    );

    // Ports on the same hub need no switch hop between them.
    assert_eq!(instance.route(1, 5, 2, 5, 0), None);
    assert_eq!(instance.route(1, 5, 1, 6, 0), None);
    let route = instance.route(1, 6, 2, HOST_PORT, 0).unwrap();
    assert_eq!(route.path, vec![npt(2, 5), npt(2, HOST_PORT)]);

    // Broadcast traffic from the hub enters switch 1 through port 5 only.
    assert_eq!(instance.allowed_incoming_broadcast_port(1, 6), Some(npt(1, 5)));
    assert!(instance.is_incoming_broadcast_allowed(1, 5));
    assert!(!instance.is_incoming_broadcast_allowed(1, 6));
    assert!(instance.is_incoming_broadcast_allowed(1, HOST_PORT));
    assert_eq!(
        instance.allowed_outgoing_broadcast_port(1, HOST_PORT, 2, HOST_PORT),
        Some(npt(1, 5))
    );

    // Both hub ports of switch 1 stay usable.
    assert!(instance.is_allowed(1, 5));
    assert!(instance.is_allowed(1, 6));
}

#[test]
fn unmarked_port_joins_marked_domain() {
    // Only the hub side of switch 2 is marked by the feed.
    let mut input = feed(&[Link::new(1, 1, 2, 1), Link::new(2, 2, 3, 1)]);
    input.broadcast_domain_ports = btreeset! { npt(2, 2) };
    let instance = compute(input);

    assert_eq!(
        instance.broadcast_domains()[0].ports,
        btreeset! { npt(2, 2), npt(3, 1) }
    );
    assert!(instance.is_broadcast_domain_port(3, 1));
    assert!(!instance.input().is_marked_broadcast_domain_port(&npt(3, 1)));
    assert!(instance.input().is_marked_broadcast_domain_port(&npt(2, 2)));

    // The link to the hub doesn't merge switch 3 into the cluster.
    assert_eq!(instance.clusters().count(), 2);
    let route = instance.route(1, HOST_PORT, 3, HOST_PORT, 0).unwrap();
    assert_eq!(
        route.path,
        vec![
            npt(1, HOST_PORT),
            npt(1, 1),
            npt(2, 1),
            npt(2, 2),
            npt(3, 1),
            npt(3, HOST_PORT),
        ]
    );
}

#[test]
fn redundant_hubs_block_ports() {
    // Two hubs between the same pair of switches form a loop.
    let mut input = feed(&[Link::new(1, 5, 2, 5), Link::new(1, 6, 2, 6)]);
    input.broadcast_domain_ports =
        btreeset! { npt(1, 5), npt(2, 5), npt(1, 6), npt(2, 6) };
    let instance = compute(input);

    assert_eq!(instance.broadcast_domains().len(), 2);
    assert!(instance.is_allowed(1, 5));
    assert!(instance.is_allowed(2, 5));
    assert!(instance.is_allowed(1, 6));
    assert!(!instance.is_allowed(2, 6));
    assert!(instance.blocked_ports().contains(&npt(2, 6)));

    let route = instance.route(1, HOST_PORT, 2, HOST_PORT, 0).unwrap();
    assert_eq!(
        route.path,
        vec![npt(1, HOST_PORT), npt(1, 5), npt(2, 5), npt(2, HOST_PORT)]
    );

    // Broadcast received from the host of switch 1 is flooded to both hubs,
    // but switch 2 doesn't send it back to the hub it came from.
    assert_eq!(instance.broadcast_ports(1, 1, HOST_PORT), btreeset! { 5, 6 });
    assert!(instance.broadcast_ports(2, 1, HOST_PORT).is_empty());
}

#[test]
fn clusters_stitched_through_hub() {
    // Two clusters of two switches each, connected through a hub.
    let mut input = feed(&[
        Link::new(1, 1, 2, 1),
        Link::new(3, 1, 4, 1),
        Link::new(2, 5, 3, 5),
    ]);
    input.broadcast_domain_ports = btreeset! { npt(2, 5), npt(3, 5) };
    let instance = compute(input);

    assert_eq!(instance.clusters().count(), 2);
    assert_eq!(instance.openflow_domain_id(2), 1);
    assert_eq!(instance.openflow_domain_id(4), 3);
    assert_eq!(instance.switches_in_openflow_domain(4), btreeset! { 3, 4 });

    let route = instance.route(1, HOST_PORT, 4, HOST_PORT, 0).unwrap();
    assert_eq!(
        route.path,
        vec![
            npt(1, HOST_PORT),
            npt(1, 1),
            npt(2, 1),
            npt(2, 5),
            npt(3, 5),
            npt(3, 1),
            npt(4, 1),
            npt(4, HOST_PORT),
        ]
    );

    // Switch level route between both clusters.
    let routes = instance.routes(1, 4);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].path.first(), Some(&npt(1, 1)));
    assert_eq!(routes[0].path.last(), Some(&npt(4, 1)));

    // Devices seen on the hub port are consistent when moving from the
    // other cluster.
    assert!(instance.is_consistent(1, HOST_PORT, 3, 5));
    assert!(!instance.is_consistent(1, HOST_PORT, 4, HOST_PORT));
    assert!(instance.is_consistent(1, HOST_PORT, 1, HOST_PORT));
}

#[test]
fn transit_cluster_between_hubs() {
    // Cluster {2, 3} sits between two hubs.
    let mut input = feed(&[
        Link::new(1, 5, 2, 5),
        Link::new(2, 1, 3, 1),
        Link::new(3, 5, 4, 5),
    ]);
    input.broadcast_domain_ports =
        btreeset! { npt(1, 5), npt(2, 5), npt(3, 5), npt(4, 5) };
    let instance = compute(input);

    assert_eq!(instance.clusters().count(), 3);
    assert_eq!(instance.broadcast_domains().len(), 2);

    let route = instance.route(1, HOST_PORT, 4, HOST_PORT, 0).unwrap();
    assert_eq!(
        route.path,
        vec![
            npt(1, HOST_PORT),
            npt(1, 5),
            npt(2, 5),
            npt(2, 1),
            npt(3, 1),
            npt(3, 5),
            npt(4, 5),
            npt(4, HOST_PORT),
        ]
    );

    // A route starting on the hub port is resolved from the hub itself.
    let route = instance.route(2, 5, 4, HOST_PORT, 0).unwrap();
    assert_eq!(route.path.first(), Some(&npt(2, 5)));
    assert_eq!(route.path.last(), Some(&npt(4, HOST_PORT)));
}
