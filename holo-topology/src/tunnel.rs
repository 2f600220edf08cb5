//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use crate::types::{Link, NodePortTuple, PortId, SwitchId, TopologyInput};

// Returns the identifier of the synthetic tunnel switch: the first id,
// starting from `base`, that doesn't collide with a connected switch.
pub fn allocate_tunnel_domain(
    base: SwitchId,
    switches: &BTreeSet<SwitchId>,
) -> SwitchId {
    let mut tid = base;
    while switches.contains(&tid) {
        tid = tid.wrapping_add(1);
    }
    tid
}

// Connects every tunnel port to a freshly numbered port of the tunnel
// domain switch. The tunnel domain ports become tunnel ports themselves.
pub(crate) fn inject_tunnel_links(
    input: &mut TopologyInput,
    switches: &mut BTreeSet<SwitchId>,
    tunnel_domain: SwitchId,
) {
    let tunnel_ports = input.tunnel_ports.iter().copied().collect::<Vec<_>>();
    let mut tport: PortId = 1;
    for npt in tunnel_ports {
        switches.insert(npt.node);
        switches.insert(tunnel_domain);
        input.add_link(Link::new(npt.node, npt.port, tunnel_domain, tport));
        tport = tport.wrapping_add(1);
    }

    for port in 1..tport {
        input
            .tunnel_ports
            .insert(NodePortTuple::new(tunnel_domain, port));
    }
}

// Returns a copy of the feed without tunnels: links attached to tunnel
// ports are dropped and no port is flagged as a tunnel port.
pub(crate) fn strip_tunnels(input: &TopologyInput) -> TopologyInput {
    let mut stripped = input.clone();
    stripped.tunnel_ports.clear();
    stripped
        .switch_port_links
        .retain(|npt, _| !input.tunnel_ports.contains(npt));
    for links in stripped.switch_port_links.values_mut() {
        links.retain(|link| {
            !input.tunnel_ports.contains(&link.src_npt())
                && !input.tunnel_ports.contains(&link.dst_npt())
        });
    }
    stripped.switch_port_links.retain(|_, links| !links.is_empty());
    stripped
}

// ===== unit tests =====
