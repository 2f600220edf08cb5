//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::types::{PortId, SwitchId};

/// Access to the switches connected to the controller.
pub trait ControllerService: Send + Sync + std::fmt::Debug {
    /// Returns the ids of all connected switches.
    fn switches(&self) -> BTreeSet<SwitchId>;

    /// Sends a link-discovery probe out of the tunnel port of `switch`,
    /// encapsulated towards the tunnel endpoint `dst_addr`.
    ///
    /// The send is fire-and-forget: success only means the probe was handed
    /// over to the switch.
    fn send_tunnel_probe(
        &self,
        switch: SwitchId,
        port: PortId,
        dst_addr: IpAddr,
    ) -> std::io::Result<()>;
}

/// Tunnel endpoint state of the connected switches.
pub trait TunnelManager: Send + Sync + std::fmt::Debug {
    // Tunnel loopback port of the given switch, if tunnels are enabled on it.
    fn tunnel_port_number(&self, switch: SwitchId) -> Option<PortId>;

    // Tunnel endpoint address of the given switch.
    fn tunnel_ip_addr(&self, switch: SwitchId) -> Option<IpAddr>;

    fn is_tunnel_active(&self, switch: SwitchId) -> bool;
}
