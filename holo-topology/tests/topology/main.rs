//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod manager;
mod properties;
mod scenarios;

use holo_topology::TopologyInstance;
use holo_topology::cluster::{self, BroadcastDomain};
use holo_topology::types::{Link, NodePortTuple, PortId, SwitchId, TopologyInput};

//
// Helper functions.
//

// Port every switch uses to reach its local host.
pub const HOST_PORT: PortId = 100;

pub fn npt(node: SwitchId, port: PortId) -> NodePortTuple {
    NodePortTuple::new(node, port)
}

// Builds a feed out of bidirectional links. Every switch also gets a host
// port without links.
pub fn feed(links: &[Link]) -> TopologyInput {
    let mut input = TopologyInput::default();
    for link in links {
        input.add_link(*link);
    }
    let switches = input.switches();
    for switch in switches {
        input.switch_ports.entry(switch).or_default().insert(HOST_PORT);
    }
    input
}

pub fn broadcast_domains(input: &TopologyInput) -> Vec<BroadcastDomain> {
    cluster::identify_broadcast_domains(
        &input.broadcast_domain_ports,
        &input.switch_port_links,
    )
}

// Computes an instance the same way the manager does, without tunnels.
pub fn compute(input: TopologyInput) -> TopologyInstance {
    let domains = broadcast_domains(&input);
    TopologyInstance::compute(input, &domains, None)
}
