//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use tracing::{debug, debug_span};

use crate::types::{NodePortTuple, PortId, SwitchId};

// Topology debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    TopologyInputPending(&'static str),
    TopologyCompute(bool),
    TopologyUnchanged,
    TopologyPublish(usize, usize),
    TunnelDomainUpdate(Option<SwitchId>, SwitchId),
    BroadcastDomainsUpdate(usize),
    PortBlocked(&'a NodePortTuple),
    TunnelDetectionEnqueue(SwitchId, SwitchId),
    TunnelVerificationEnqueue(SwitchId, SwitchId),
    TunnelDetectionClear(SwitchId, SwitchId),
    TunnelVerificationSkip(SwitchId, SwitchId),
    TunnelProbeTx(SwitchId, SwitchId, PortId, IpAddr),
    TunnelStatusClear(SwitchId),
    TunnelLivenessClear,
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub(crate) fn log(&self) {
        match self {
            Debug::TopologyInputPending(input) => {
                // Parent span(s): topology
                debug!(%input, "{}", self);
            }
            Debug::TopologyCompute(tunnels) => {
                // Parent span(s): topology
                debug_span!("compute", %tunnels).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::TopologyUnchanged | Debug::TunnelLivenessClear => {
                // Parent span(s): topology
                debug!("{}", self);
            }
            Debug::TopologyPublish(clusters, domains) => {
                // Parent span(s): topology
                debug!(%clusters, %domains, "{}", self);
            }
            Debug::TunnelDomainUpdate(old, new) => {
                // Parent span(s): topology
                debug!(old = ?old, %new, "{}", self);
            }
            Debug::BroadcastDomainsUpdate(count) => {
                // Parent span(s): topology
                debug!(%count, "{}", self);
            }
            Debug::PortBlocked(npt) => {
                // Parent span(s): topology:compute
                debug_span!("port", switch = %npt.node, port = %npt.port)
                    .in_scope(|| {
                        debug!("{}", self);
                    });
            }
            Debug::TunnelDetectionEnqueue(src, dst)
            | Debug::TunnelVerificationEnqueue(src, dst)
            | Debug::TunnelDetectionClear(src, dst)
            | Debug::TunnelVerificationSkip(src, dst) => {
                // Parent span(s): topology
                debug_span!("tunnel", %src, %dst).in_scope(|| {
                    debug!("{}", self);
                });
            }
            Debug::TunnelProbeTx(src, dst, port, address) => {
                // Parent span(s): topology
                debug_span!("tunnel", %src, %dst).in_scope(|| {
                    debug!(%port, %address, "{}", self);
                });
            }
            Debug::TunnelStatusClear(switch) => {
                // Parent span(s): topology
                debug!(%switch, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::TopologyInputPending(..) => {
                write!(f, "waiting for topology input")
            }
            Debug::TopologyCompute(..) => {
                write!(f, "computing topology instance")
            }
            Debug::TopologyUnchanged => {
                write!(f, "topology unchanged, skipping recompute")
            }
            Debug::TopologyPublish(..) => {
                write!(f, "published new topology snapshot")
            }
            Debug::TunnelDomainUpdate(..) => {
                write!(f, "tunnel domain changed")
            }
            Debug::BroadcastDomainsUpdate(..) => {
                write!(f, "broadcast domains changed")
            }
            Debug::PortBlocked(..) => {
                write!(f, "port blocked")
            }
            Debug::TunnelDetectionEnqueue(..) => {
                write!(f, "tunnel detection enqueued")
            }
            Debug::TunnelVerificationEnqueue(..) => {
                write!(f, "tunnel verification enqueued")
            }
            Debug::TunnelDetectionClear(..) => {
                write!(f, "tunnel destination reached, clearing")
            }
            Debug::TunnelVerificationSkip(..) => {
                write!(f, "tunnel not active, skipping verification")
            }
            Debug::TunnelProbeTx(..) => {
                write!(f, "sending tunnel liveness probe")
            }
            Debug::TunnelStatusClear(..) => {
                write!(f, "tunnel port removed, clearing status")
            }
            Debug::TunnelLivenessClear => {
                write!(f, "tunnel liveness state cleared")
            }
        }
    }
}
