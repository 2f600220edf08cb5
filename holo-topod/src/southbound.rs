//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::sync::Mutex;

use holo_topology::southbound::{ControllerService, TunnelManager};
use holo_topology::types::{PortId, SwitchId};
use tracing::debug;

use crate::config::TunnelEndpoint;

// Switches known from the last link-state feed. The daemon has no datapath
// connections, so tunnel probes can't be sent.
#[derive(Debug, Default)]
pub struct FeedController {
    switches: Mutex<BTreeSet<SwitchId>>,
}

// Tunnel endpoints taken from the configuration file.
#[derive(Debug)]
pub struct StaticTunnels {
    endpoints: BTreeMap<SwitchId, TunnelEndpoint>,
}

// ===== impl FeedController =====

impl FeedController {
    pub fn update(&self, switches: BTreeSet<SwitchId>) {
        match self.switches.lock() {
            Ok(mut current) => *current = switches,
            Err(poisoned) => *poisoned.into_inner() = switches,
        }
    }
}

impl ControllerService for FeedController {
    fn switches(&self) -> BTreeSet<SwitchId> {
        match self.switches.lock() {
            Ok(switches) => switches.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn send_tunnel_probe(
        &self,
        switch: SwitchId,
        port: PortId,
        dst_addr: IpAddr,
    ) -> std::io::Result<()> {
        debug!(%switch, %port, %dst_addr, "tunnel probe requested");
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "no datapath connection",
        ))
    }
}

// ===== impl StaticTunnels =====

impl StaticTunnels {
    pub fn new(endpoints: &[TunnelEndpoint]) -> StaticTunnels {
        StaticTunnels {
            endpoints: endpoints
                .iter()
                .map(|endpoint| (endpoint.switch, endpoint.clone()))
                .collect(),
        }
    }
}

impl TunnelManager for StaticTunnels {
    fn tunnel_port_number(&self, switch: SwitchId) -> Option<PortId> {
        self.endpoints.get(&switch).map(|endpoint| endpoint.port)
    }

    fn tunnel_ip_addr(&self, switch: SwitchId) -> Option<IpAddr> {
        self.endpoints.get(&switch).map(|endpoint| endpoint.address)
    }

    fn is_tunnel_active(&self, switch: SwitchId) -> bool {
        self.endpoints
            .get(&switch)
            .is_some_and(|endpoint| endpoint.active)
    }
}
