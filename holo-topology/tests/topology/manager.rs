//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use holo_topology::config::{TUNNEL_DOMAIN_BASE, TopologyCfg};
use holo_topology::error::Error;
use holo_topology::liveness::TunnelLinkStatus;
use holo_topology::southbound::{ControllerService, TunnelManager};
use holo_topology::tasks;
use holo_topology::TopologyManager;
use maplit::btreeset;

use super::*;

#[derive(Debug, Default)]
struct Controller {
    sent: AtomicUsize,
}

#[derive(Debug)]
struct Tunnels;

impl ControllerService for Controller {
    fn switches(&self) -> BTreeSet<SwitchId> {
        btreeset! { 1, 2, 3 }
    }

    fn send_tunnel_probe(
        &self,
        _switch: SwitchId,
        _port: PortId,
        _dst_addr: IpAddr,
    ) -> std::io::Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl TunnelManager for Tunnels {
    fn tunnel_port_number(&self, _switch: SwitchId) -> Option<PortId> {
        Some(50)
    }

    fn tunnel_ip_addr(&self, switch: SwitchId) -> Option<IpAddr> {
        Some(IpAddr::V4(Ipv4Addr::new(192, 0, 2, switch as u8)))
    }

    fn is_tunnel_active(&self, _switch: SwitchId) -> bool {
        true
    }
}

fn manager(controller: &Arc<Controller>) -> TopologyManager {
    let config = TopologyCfg {
        tunnel_detection_timeout: 10,
        tunnel_verification_timeout: 10,
        ..Default::default()
    };
    TopologyManager::new(config, Some(controller.clone()), Some(Arc::new(Tunnels)))
}

// Switches 1 and 3 reach each other through switch 2 and through a tunnel.
fn tunneled_feed() -> TopologyInput {
    let mut input = feed(&[Link::new(1, 1, 2, 1), Link::new(2, 2, 3, 1)]);
    input.tunnel_ports = btreeset! { npt(1, 50), npt(3, 50) };
    input
}

#[test]
fn update_requires_feed() {
    let manager = manager(&Default::default());
    assert!(matches!(manager.update(), Err(Error::MissingInput(_))));
    assert!(manager.routes(1, 2, true).is_empty());
}

#[test]
fn recompute_only_on_change() {
    let manager = manager(&Default::default());
    manager.set_input(tunneled_feed());
    assert_eq!(manager.update().ok(), Some(true));
    assert_eq!(manager.tunnel_domain_id(), Some(TUNNEL_DOMAIN_BASE));

    // Same feed, nothing to do.
    let snapshot = manager.snapshot();
    manager.set_input(tunneled_feed());
    assert_eq!(manager.update().ok(), Some(false));
    assert!(Arc::ptr_eq(&snapshot, &manager.snapshot()));

    // Broadcast domain change.
    let mut input = tunneled_feed();
    input.broadcast_domain_ports.insert(npt(2, 2));
    manager.set_input(input);
    assert_eq!(manager.update().ok(), Some(true));
    assert!(!Arc::ptr_eq(&snapshot, &manager.snapshot()));
    assert!(manager.is_broadcast_domain_port(2, 2, true));
}

#[test]
fn snapshot_with_and_without_tunnels() {
    let manager = manager(&Default::default());
    let mut input = tunneled_feed();
    input.blocked_ports.insert(npt(2, 2));
    manager.set_input(input);
    assert_eq!(manager.update().ok(), Some(true));

    // Switch 3 is only reachable through the tunnel.
    let route = manager.route(1, HOST_PORT, 3, HOST_PORT, 0, true).unwrap();
    assert_eq!(
        route.path,
        vec![npt(1, HOST_PORT), npt(1, 50), npt(3, 50), npt(3, HOST_PORT)]
    );
    assert_eq!(manager.route(1, HOST_PORT, 3, HOST_PORT, 0, false), None);
    assert!(manager.in_same_l2_domain(1, 3, true));
    assert!(!manager.in_same_l2_domain(1, 3, false));

    let snapshot = manager.snapshot();
    assert_eq!(snapshot.with_tunnels.tunnel_domain(), Some(TUNNEL_DOMAIN_BASE));
    assert!(snapshot.without_tunnels.input().tunnel_ports.is_empty());
    assert!(
        !snapshot
            .without_tunnels
            .input()
            .switch_port_links
            .contains_key(&npt(1, 50))
    );
}

#[test]
fn unanswered_tunnel_goes_down() {
    let controller = Arc::new(Controller::default());
    let manager = manager(&controller);

    manager.detect_tunnel_source(1, 3);
    let start = Instant::now();

    // Detection timeout: a probe is sent.
    let events = manager.tick_liveness(start + Duration::from_millis(500));
    assert!(events.is_empty());
    assert_eq!(controller.sent.load(Ordering::SeqCst), 1);

    // Verification timeout: the tunnel is down.
    let events = manager.tick_liveness(start + Duration::from_millis(1000));
    assert_eq!(events.len(), 1);
    let [fwd, rev] = manager.tunnel_liveness_state(1, 3);
    assert_eq!(fwd.status, TunnelLinkStatus::Down);
    assert_eq!(rev.status, TunnelLinkStatus::Down);
    assert_eq!(manager.tunnel_liveness_state_all().len(), 1);

    manager.clear_tunnel_liveness_state();
    let [fwd, _] = manager.tunnel_liveness_state(1, 3);
    assert_eq!(fwd.status, TunnelLinkStatus::Up);
}

#[test]
fn timeouts_adjustable_at_runtime() {
    let manager = manager(&Default::default());
    assert_eq!(manager.tunnel_detection_timeout(), Duration::from_millis(10));

    manager.set_tunnel_detection_timeout(Duration::from_secs(5));
    manager.set_tunnel_verification_timeout(Duration::from_secs(6));
    assert_eq!(manager.tunnel_detection_timeout(), Duration::from_secs(5));
    assert_eq!(manager.tunnel_verification_timeout(), Duration::from_secs(6));

    manager.verify_tunnel_on_demand(1, 2);
    manager.tick_liveness(Instant::now() + Duration::from_secs(1));
    assert_eq!(manager.liveness().detection_queue().len(), 2);
}

#[tokio::test]
async fn tick_task_publishes_snapshot() {
    let manager = Arc::new(manager(&Default::default()));
    manager.set_input(tunneled_feed());

    let _task = tasks::topology_tick(&manager, Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(manager.route(1, HOST_PORT, 3, HOST_PORT, 0, true).is_some());
}

#[tokio::test]
async fn tick_task_runs_liveness_without_feed() {
    let controller = Arc::new(Controller::default());
    let manager = Arc::new(manager(&controller));
    manager.detect_tunnel_source(1, 3);

    let _task = tasks::topology_tick(&manager, Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // No feed yet: nothing is published, but tunnel liveness keeps going.
    assert!(matches!(manager.update(), Err(Error::MissingInput(_))));
    assert!(controller.sent.load(Ordering::SeqCst) >= 1);
}
