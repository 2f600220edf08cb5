//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::cluster::{self, BroadcastDomain};
use crate::config::TopologyCfg;
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::TopologyInstance;
use crate::liveness::{LivenessDetector, TunnelEvent};
use crate::southbound::{ControllerService, TunnelManager};
use crate::tunnel;
use crate::types::{NodePortTuple, PortId, Route, SwitchId, TopologyInput};

/// Pair of topology instances published together.
#[derive(Debug)]
pub struct Snapshot {
    pub with_tunnels: TopologyInstance,
    pub without_tunnels: TopologyInstance,
}

/// Owner of the published topology snapshot.
///
/// Readers get the current snapshot without locking. A new snapshot is
/// computed off to the side and published with a single pointer swap.
#[derive(Debug)]
pub struct TopologyManager {
    config: TopologyCfg,
    controller: Option<Arc<dyn ControllerService>>,
    tunnel_manager: Option<Arc<dyn TunnelManager>>,
    snapshot: ArcSwap<Snapshot>,
    state: Mutex<ManagerState>,
    liveness: LivenessDetector,
}

// Inputs of the last published snapshot and the feed pending computation.
#[derive(Debug, Default)]
struct ManagerState {
    feed: Option<TopologyInput>,
    published: Option<TopologyInput>,
    tunnel_domain: Option<SwitchId>,
    broadcast_domains: Vec<BroadcastDomain>,
}

// ===== impl Snapshot =====

impl Snapshot {
    fn empty() -> Snapshot {
        Snapshot {
            with_tunnels: TopologyInstance::compute(Default::default(), &[], None),
            without_tunnels: TopologyInstance::compute(
                Default::default(),
                &[],
                None,
            ),
        }
    }

    pub fn instance(&self, tunnel_enabled: bool) -> &TopologyInstance {
        if tunnel_enabled {
            &self.with_tunnels
        } else {
            &self.without_tunnels
        }
    }
}

// ===== impl TopologyManager =====

impl TopologyManager {
    pub fn new(
        config: TopologyCfg,
        controller: Option<Arc<dyn ControllerService>>,
        tunnel_manager: Option<Arc<dyn TunnelManager>>,
    ) -> TopologyManager {
        let liveness = LivenessDetector::new(&config);
        TopologyManager {
            config,
            controller,
            tunnel_manager,
            snapshot: ArcSwap::from_pointee(Snapshot::empty()),
            state: Default::default(),
            liveness,
        }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn config(&self) -> &TopologyCfg {
        &self.config
    }

    /// Stores the latest link-discovery feed. It's taken into account by the
    /// next call to [`TopologyManager::update`].
    pub fn set_input(&self, input: TopologyInput) {
        self.state().feed = Some(input);
    }

    /// Recomputes the topology if anything it depends on changed since the
    /// last publication: the feed, the tunnel domain id or the broadcast
    /// domains.
    ///
    /// Returns whether a new snapshot was published.
    pub fn update(&self) -> Result<bool, Error> {
        let mut state = self.state();
        let Some(input) = state.feed.clone() else {
            return Err(Error::MissingInput("link-discovery feed"));
        };

        let mut recompute = state.published.as_ref() != Some(&input);

        // The tunnel domain id must not collide with any known switch.
        let mut switches = input.switches();
        if let Some(controller) = &self.controller {
            switches.extend(controller.switches());
        }
        let tunnel_domain = tunnel::allocate_tunnel_domain(
            self.config.tunnel_domain_base,
            &switches,
        );
        if state.tunnel_domain != Some(tunnel_domain) {
            Debug::TunnelDomainUpdate(state.tunnel_domain, tunnel_domain).log();
            state.tunnel_domain = Some(tunnel_domain);
            recompute = true;
        }

        let broadcast_domains = cluster::identify_broadcast_domains(
            &input.broadcast_domain_ports,
            &input.switch_port_links,
        );
        if state.broadcast_domains != broadcast_domains {
            Debug::BroadcastDomainsUpdate(broadcast_domains.len()).log();
            state.broadcast_domains = broadcast_domains;
            recompute = true;
        }

        if !recompute {
            Debug::TopologyUnchanged.log();
            return Ok(false);
        }

        // First the instance with every tunnel link removed, then the
        // complete one.
        Debug::TopologyCompute(false).log();
        let without_tunnels = TopologyInstance::compute(
            tunnel::strip_tunnels(&input),
            &state.broadcast_domains,
            Some(tunnel_domain),
        );
        Debug::TopologyCompute(true).log();
        let with_tunnels = TopologyInstance::compute(
            input.clone(),
            &state.broadcast_domains,
            Some(tunnel_domain),
        );

        Debug::TopologyPublish(
            with_tunnels.clusters().count(),
            with_tunnels.broadcast_domains().len(),
        )
        .log();
        self.snapshot.store(Arc::new(Snapshot {
            with_tunnels,
            without_tunnels,
        }));
        state.published = Some(input);

        Ok(true)
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn tunnel_domain_id(&self) -> Option<SwitchId> {
        self.state().tunnel_domain
    }

    // ----- topology queries -----

    pub fn is_attachment_point_port(
        &self,
        sw: SwitchId,
        port: PortId,
        tunnel_enabled: bool,
    ) -> bool {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .is_attachment_point_port(sw, port)
    }

    pub fn is_allowed(
        &self,
        sw: SwitchId,
        port: PortId,
        tunnel_enabled: bool,
    ) -> bool {
        self.snapshot.load().instance(tunnel_enabled).is_allowed(sw, port)
    }

    pub fn is_broadcast_domain_port(
        &self,
        sw: SwitchId,
        port: PortId,
        tunnel_enabled: bool,
    ) -> bool {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .is_broadcast_domain_port(sw, port)
    }

    pub fn in_same_l2_domain(
        &self,
        sw1: SwitchId,
        sw2: SwitchId,
        tunnel_enabled: bool,
    ) -> bool {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .in_same_l2_domain(sw1, sw2)
    }

    pub fn in_same_broadcast_domain(
        &self,
        sw1: SwitchId,
        port1: PortId,
        sw2: SwitchId,
        port2: PortId,
        tunnel_enabled: bool,
    ) -> bool {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .in_same_broadcast_domain(sw1, port1, sw2, port2)
    }

    pub fn route(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
        cookie: u64,
        tunnel_enabled: bool,
    ) -> Option<Route> {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .route(src, src_port, dst, dst_port, cookie)
    }

    pub fn routes(
        &self,
        src: SwitchId,
        dst: SwitchId,
        tunnel_enabled: bool,
    ) -> Vec<Route> {
        self.snapshot.load().instance(tunnel_enabled).routes(src, dst)
    }

    pub fn incoming_switch_port(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
        tunnel_enabled: bool,
    ) -> Option<NodePortTuple> {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .incoming_switch_port(src, src_port, dst, dst_port)
    }

    pub fn outgoing_switch_port(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
        tunnel_enabled: bool,
    ) -> Option<NodePortTuple> {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .outgoing_switch_port(src, src_port, dst, dst_port)
    }

    pub fn broadcast_ports(
        &self,
        target: SwitchId,
        src: SwitchId,
        src_port: PortId,
        tunnel_enabled: bool,
    ) -> BTreeSet<PortId> {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .broadcast_ports(target, src, src_port)
    }

    pub fn allowed_incoming_broadcast_port(
        &self,
        src: SwitchId,
        src_port: PortId,
        tunnel_enabled: bool,
    ) -> Option<NodePortTuple> {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .allowed_incoming_broadcast_port(src, src_port)
    }

    pub fn allowed_outgoing_broadcast_port(
        &self,
        src: SwitchId,
        src_port: PortId,
        dst: SwitchId,
        dst_port: PortId,
        tunnel_enabled: bool,
    ) -> Option<NodePortTuple> {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .allowed_outgoing_broadcast_port(src, src_port, dst, dst_port)
    }

    pub fn is_consistent(
        &self,
        old_sw: SwitchId,
        old_port: PortId,
        new_sw: SwitchId,
        new_port: PortId,
        tunnel_enabled: bool,
    ) -> bool {
        self.snapshot
            .load()
            .instance(tunnel_enabled)
            .is_consistent(old_sw, old_port, new_sw, new_port)
    }

    // ----- tunnel liveness -----

    pub fn liveness(&self) -> &LivenessDetector {
        &self.liveness
    }

    pub fn detect_tunnel_source(&self, src: SwitchId, dst: SwitchId) {
        self.liveness.detect_tunnel_source(src, dst);
    }

    pub fn detect_tunnel_destination(&self, src: SwitchId, dst: SwitchId) {
        self.liveness.detect_tunnel_destination(src, dst);
    }

    pub fn verify_tunnel_on_demand(&self, src: SwitchId, dst: SwitchId) {
        self.liveness.verify_tunnel_on_demand(src, dst);
    }

    pub fn tunnel_link_update(&self, src: SwitchId, dst: SwitchId) {
        self.liveness.tunnel_link_update(src, dst);
    }

    pub fn remove_tunnel_port(&self, switch: SwitchId) {
        self.liveness.remove_tunnel_port(switch);
    }

    pub fn clear_tunnel_liveness_state(&self) {
        self.liveness.clear();
    }

    pub fn tunnel_liveness_state(
        &self,
        src: SwitchId,
        dst: SwitchId,
    ) -> [TunnelEvent; 2] {
        self.liveness
            .liveness_state(src, dst, self.tunnel_manager.as_deref())
    }

    pub fn tunnel_liveness_state_all(&self) -> Vec<TunnelEvent> {
        self.liveness.liveness_state_all()
    }

    /// Runs one liveness tick. Returns the tunnels declared down.
    pub fn tick_liveness(&self, now: Instant) -> Vec<TunnelEvent> {
        self.liveness.tick(
            now,
            self.controller.as_deref(),
            self.tunnel_manager.as_deref(),
        )
    }

    pub fn tunnel_detection_timeout(&self) -> Duration {
        self.liveness.detection_timeout()
    }

    pub fn set_tunnel_detection_timeout(&self, timeout: Duration) {
        self.liveness.set_detection_timeout(timeout);
    }

    pub fn tunnel_verification_timeout(&self) -> Duration {
        self.liveness.verification_timeout()
    }

    pub fn set_tunnel_verification_timeout(&self, timeout: Duration) {
        self.liveness.set_verification_timeout(timeout);
    }
}
