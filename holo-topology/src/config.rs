//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::SwitchId;

// First candidate identifier of the synthetic tunnel switch.
pub const TUNNEL_DOMAIN_BASE: SwitchId = 0x00FF_FFFF_FFFF_FFFF;

/// Topology configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopologyCfg {
    // Recompute and liveness tick cadence (milliseconds).
    pub compute_interval: u64,
    // Time a detection entry may stay pending before a probe is sent
    // (milliseconds).
    pub tunnel_detection_timeout: u64,
    // Time a probed tunnel has to answer before it's declared down
    // (milliseconds).
    pub tunnel_verification_timeout: u64,
    pub tunnel_domain_base: SwitchId,
}

// ===== impl TopologyCfg =====

impl TopologyCfg {
    pub fn compute_interval(&self) -> Duration {
        Duration::from_millis(self.compute_interval)
    }

    pub fn tunnel_detection_timeout(&self) -> Duration {
        Duration::from_millis(self.tunnel_detection_timeout)
    }

    pub fn tunnel_verification_timeout(&self) -> Duration {
        Duration::from_millis(self.tunnel_verification_timeout)
    }
}

impl Default for TopologyCfg {
    fn default() -> TopologyCfg {
        TopologyCfg {
            compute_interval: 500,
            tunnel_detection_timeout: 2000,
            tunnel_verification_timeout: 2000,
            tunnel_domain_base: TUNNEL_DOMAIN_BASE,
        }
    }
}
