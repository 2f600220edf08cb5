//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use maplit::btreeset;

use super::*;

// Two clusters joined by a hub, a diamond inside the first one and an
// isolated switch.
fn topology() -> TopologyInput {
    let mut input = feed(&[
        Link::new(1, 1, 2, 1),
        Link::new(1, 2, 3, 1),
        Link::new(2, 2, 4, 1),
        Link::new(3, 2, 4, 2),
        Link::new(4, 5, 5, 5),
        Link::new(5, 1, 6, 1),
    ]);
    input.broadcast_domain_ports = btreeset! { npt(4, 5), npt(5, 5) };
    input.switch_ports.entry(7).or_default().insert(HOST_PORT);
    input
}

#[test]
fn every_switch_in_exactly_one_cluster() {
    let input = topology();
    let switches = input.switches();
    let instance = compute(input);

    let mut seen = BTreeSet::new();
    for cluster in instance.clusters() {
        for node in cluster.nodes() {
            assert!(seen.insert(node), "switch {node} in two clusters");
            assert_eq!(instance.openflow_domain_id(node), cluster.id);
        }
    }
    assert_eq!(seen, switches);

    // Every broadcast domain port belongs to exactly one domain.
    let mut seen = BTreeSet::new();
    for bd in instance.broadcast_domains() {
        for npt in &bd.ports {
            assert!(seen.insert(*npt));
        }
    }
    assert_eq!(seen, instance.input().broadcast_domain_ports);
}

#[test]
fn recompute_is_idempotent() {
    let first = compute(topology());
    let second = compute(topology());

    assert_eq!(
        first.clusters().collect::<Vec<_>>(),
        second.clusters().collect::<Vec<_>>()
    );
    assert_eq!(first.broadcast_domains(), second.broadcast_domains());
    assert_eq!(first.higher_topology(), second.higher_topology());
    assert_eq!(first.port_tables(), second.port_tables());
    assert_eq!(first.blocked_ports(), second.blocked_ports());
}

#[test]
fn higher_level_paths() {
    let instance = compute(topology());
    let ht = instance.higher_topology();

    // Clusters 1 and 5 plus the hub form one component, cluster 7 another.
    let c1 = ht.cluster_keys[&1];
    let c5 = ht.cluster_keys[&5];
    let c7 = ht.cluster_keys[&7];
    let bd = ht.domain_keys[&1];

    let path = instance.ht_path(c1, c5).unwrap();
    assert_eq!(path, vec![c1, bd, c5]);
    assert_eq!(instance.ht_path(c5, c1).unwrap(), vec![c5, bd, c1]);
    assert_eq!(instance.ht_path(c1, c1).unwrap(), vec![c1]);
    assert_eq!(instance.ht_path(c1, c7), None);

    assert!(instance.in_same_l2_domain(2, 6));
    assert!(!instance.in_same_l2_domain(2, 7));
    assert_eq!(instance.l2_domain_id(6), 1);
    assert_eq!(instance.l2_domain_id(7), 7);
}

#[test]
fn multipath_is_deterministic() {
    let instance = compute(topology());

    // Switch 1 reaches switch 4 through either 2 or 3.
    let route = instance.route(1, HOST_PORT, 4, HOST_PORT, 0).unwrap();
    assert_eq!(route.route_count, 2);
    assert_eq!(instance.route(1, HOST_PORT, 4, HOST_PORT, 0), Some(route.clone()));

    let alternatives = (0..route.route_count as u64)
        .filter_map(|cookie| instance.route(1, HOST_PORT, 4, HOST_PORT, cookie))
        .map(|route| route.path)
        .collect::<BTreeSet<_>>();
    assert_eq!(alternatives.len(), 2);

    // Cookies wrap around the number of choices.
    let wrapped = instance.route(1, HOST_PORT, 4, HOST_PORT, 2).unwrap();
    assert_eq!(wrapped.path, route.path);

    // Every route crosses the hub to reach switch 6.
    for cookie in 0..4 {
        let route = instance.route(1, HOST_PORT, 6, HOST_PORT, cookie).unwrap();
        assert!(route.path.windows(2).any(|w| w == [npt(4, 5), npt(5, 5)]));
        assert_eq!(route.path.last(), Some(&npt(6, HOST_PORT)));
    }

    assert_eq!(instance.routes(1, 4).len(), 2);
}

#[test]
fn no_route_boundaries() {
    let instance = compute(topology());

    for cookie in 0..3 {
        assert_eq!(instance.route(1, HOST_PORT, 1, HOST_PORT, cookie), None);
    }

    // Disconnected and unknown switches.
    assert_eq!(instance.route(1, HOST_PORT, 7, HOST_PORT, 0), None);
    assert_eq!(instance.route(1, HOST_PORT, 42, 1, 0), None);
    assert!(instance.routes(1, 7).is_empty());
    assert!(instance.routes(1, 1).is_empty());
    assert_eq!(instance.incoming_switch_port(1, HOST_PORT, 7, HOST_PORT), None);

    // Same switch, different ports.
    let route = instance.route(1, HOST_PORT, 1, 1, 0).unwrap();
    assert_eq!(route.path, vec![npt(1, HOST_PORT), npt(1, 1)]);
    assert_eq!(
        instance.outgoing_switch_port(7, HOST_PORT, 7, 1),
        Some(npt(7, 1))
    );
}

#[test]
fn tunnels_only_used_as_last_resort() {
    // Switches 1 and 3 are connected through switch 2 and through a tunnel.
    let mut input = feed(&[Link::new(1, 1, 2, 1), Link::new(2, 2, 3, 1)]);
    input.tunnel_ports = btreeset! { npt(1, 50), npt(3, 50) };
    let td = 1000;
    let instance = TopologyInstance::compute(input.clone(), &[], Some(td));

    assert_eq!(instance.switches_in_openflow_domain(1), btreeset! { 1, 2, 3 });
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

    // Without the direct path the tunnel is used, and the tunnel domain
    // switch doesn't show up in the route.
    input.blocked_ports.insert(npt(2, 2));
    let instance = TopologyInstance::compute(input, &[], Some(td));
    let route = instance.route(1, HOST_PORT, 3, HOST_PORT, 0).unwrap();
    assert_eq!(
        route.path,
        vec![npt(1, HOST_PORT), npt(1, 50), npt(3, 50), npt(3, HOST_PORT)]
    );
    assert!(route.path.iter().all(|npt| npt.node != td));

    // Tunnel ports aren't flooded to.
    let ports = instance.broadcast_node_ports_in_cluster(1);
    assert!(!ports.is_empty());
    assert!(ports.iter().all(|npt| npt.node != td && npt.port != 50));
}

#[test]
fn inconsistent_feed_is_tolerated() {
    let mut input = TopologyInput::default();
    input.switch_ports.insert(1, btreeset! { 1 });
    // Link stored under a port it doesn't touch.
    input
        .switch_port_links
        .entry(npt(1, 1))
        .or_default()
        .insert(Link::new(3, 1, 4, 1));
    // Link towards a switch missing from the port map.
    input
        .switch_port_links
        .entry(npt(1, 1))
        .or_default()
        .insert(Link::new(1, 1, 2, 1));

    let instance = compute(input);
    assert_eq!(instance.switches(), &btreeset! { 1, 2 });
    assert!(instance.input().switch_ports[&2].contains(&1));
    assert!(instance.in_same_openflow_domain(1, 2));
    assert!(
        instance
            .input()
            .switch_port_links
            .values()
            .flatten()
            .all(|link| link.src != 3)
    );
}
