//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Serialize, Serializer};
use tracing::{trace, warn};

use crate::config::TopologyCfg;
use crate::debug::Debug;
use crate::error::{Error, IoError};
use crate::southbound::{ControllerService, TunnelManager};
use crate::types::{OrderedNodePair, SwitchId};

/// Tunnel liveness detector.
///
/// A pair enters the detection queue when traffic is about to traverse a
/// tunnel towards a destination switch. Pairs not cleared within the
/// detection timeout are probed and moved to the verification queue. Pairs
/// not cleared within the verification timeout are declared down.
#[derive(Debug)]
pub struct LivenessDetector {
    state: Mutex<LivenessState>,
}

#[derive(Debug)]
struct LivenessState {
    detection_timeout: Duration,
    verification_timeout: Duration,
    detection: VecDeque<(OrderedNodePair, Instant)>,
    verification: VecDeque<(OrderedNodePair, Instant)>,
    // Recorded events, indexed by both endpoints.
    status: BTreeMap<SwitchId, BTreeMap<SwitchId, TunnelEvent>>,
}

/// Liveness status of a directed tunnel.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TunnelLinkStatus {
    Unknown,
    Down,
    Up,
    NotEnabled,
    NotActive,
}

/// Liveness status of the tunnel between two switches.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TunnelEvent {
    #[serde(serialize_with = "serialize_dpid")]
    pub src_dpid: SwitchId,
    #[serde(serialize_with = "serialize_dpid")]
    pub dst_dpid: SwitchId,
    pub status: TunnelLinkStatus,
    pub last_verified: DateTime<Utc>,
}

// ===== impl LivenessDetector =====

impl LivenessDetector {
    pub fn new(config: &TopologyCfg) -> LivenessDetector {
        LivenessDetector {
            state: Mutex::new(LivenessState {
                detection_timeout: config.tunnel_detection_timeout(),
                verification_timeout: config.tunnel_verification_timeout(),
                detection: Default::default(),
                verification: Default::default(),
                status: Default::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LivenessState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Notes that traffic from `src` is about to traverse a tunnel towards
    /// `dst`. Pairs already pending are left untouched.
    pub fn detect_tunnel_source(&self, src: SwitchId, dst: SwitchId) {
        let onp = OrderedNodePair::new(src, dst);
        let mut state = self.state();
        if state.is_pending(&onp) {
            return;
        }

        Debug::TunnelDetectionEnqueue(src, dst).log();
        state.detection.push_back((onp, Instant::now()));
    }

    /// Notes that traffic from `src` came out of a tunnel at `dst`. The
    /// tunnel is presumed alive.
    pub fn detect_tunnel_destination(&self, src: SwitchId, dst: SwitchId) {
        let onp = OrderedNodePair::new(src, dst);
        let mut state = self.state();
        if state.is_pending(&onp) {
            Debug::TunnelDetectionClear(src, dst).log();
        }
        state.detection.retain(|(pending, _)| *pending != onp);
        state.verification.retain(|(pending, _)| *pending != onp);
        state.remove_status(&onp);
    }

    /// Notes that a link-discovery probe was received over a tunnel.
    pub fn tunnel_link_update(&self, src: SwitchId, dst: SwitchId) {
        self.detect_tunnel_destination(src, dst);
    }

    /// Verifies both directions of the tunnel between two switches.
    pub fn verify_tunnel_on_demand(&self, src: SwitchId, dst: SwitchId) {
        self.detect_tunnel_source(src, dst);
        self.detect_tunnel_source(dst, src);
    }

    /// Forgets every tunnel involving the given switch.
    pub fn remove_tunnel_port(&self, switch: SwitchId) {
        Debug::TunnelStatusClear(switch).log();
        let mut state = self.state();
        state.status.remove(&switch);
        for events in state.status.values_mut() {
            events.remove(&switch);
        }
        state.status.retain(|_, events| !events.is_empty());
    }

    /// Clears all liveness state.
    pub fn clear(&self) {
        Debug::TunnelLivenessClear.log();
        let mut state = self.state();
        state.detection.clear();
        state.verification.clear();
        state.status.clear();
    }

    /// Processes the entries whose timeout expired by `now`.
    ///
    /// Returns the tunnels declared down.
    pub fn tick(
        &self,
        now: Instant,
        controller: Option<&dyn ControllerService>,
        tunnel_manager: Option<&dyn TunnelManager>,
    ) -> Vec<TunnelEvent> {
        // Collect expired entries, releasing the lock before any probe is
        // sent.
        let (failed, expired) = {
            let mut state = self.state();
            let verification_timeout = state.verification_timeout;
            let detection_timeout = state.detection_timeout;
            let failed = drain_expired(
                &mut state.verification,
                now,
                verification_timeout,
            );
            let expired =
                drain_expired(&mut state.detection, now, detection_timeout);
            (failed, expired)
        };

        // Probed tunnels that didn't answer in time are down.
        let mut events = vec![];
        for onp in failed {
            warn!(src = %onp.src, dst = %onp.dst, "tunnel link failed");
            let event = TunnelEvent::new(onp.src, onp.dst, TunnelLinkStatus::Down);
            if self.add_to_status(event.clone(), controller, tunnel_manager) {
                events.push(event);
            }
        }

        // Probe tunnels whose destination wasn't detected in time.
        for onp in expired {
            if self.verify_tunnel_liveness(onp, controller, tunnel_manager) {
                Debug::TunnelVerificationEnqueue(onp.src, onp.dst).log();
                self.state().verification.push_back((onp, now));
            }
        }

        events
    }

    // Sends a probe out of the tunnel port of the source switch. Returns
    // whether the pair is now waiting for verification.
    fn verify_tunnel_liveness(
        &self,
        onp: OrderedNodePair,
        controller: Option<&dyn ControllerService>,
        tunnel_manager: Option<&dyn TunnelManager>,
    ) -> bool {
        let (src, dst) = (onp.src, onp.dst);
        let Some(tunnel_manager) = tunnel_manager else {
            Error::TunnelManagerUnavailable(src, dst).log();
            return false;
        };

        // Endpoints must be tunnel active for the probe to make sense.
        if !tunnel_manager.is_tunnel_active(src)
            || !tunnel_manager.is_tunnel_active(dst)
        {
            Debug::TunnelVerificationSkip(src, dst).log();
            return false;
        }

        let (Some(port), Some(addr)) = (
            tunnel_manager.tunnel_port_number(src),
            tunnel_manager.tunnel_ip_addr(dst),
        ) else {
            trace!(%src, %dst, "missing tunnel endpoint information");
            return false;
        };
        let Some(controller) =
            controller.filter(|controller| controller.switches().contains(&src))
        else {
            trace!(%src, "cannot send tunnel probe: switch not connected");
            return false;
        };

        Debug::TunnelProbeTx(src, dst, port, addr).log();
        match controller.send_tunnel_probe(src, port, addr) {
            Ok(()) => true,
            Err(error) => {
                Error::from(IoError::ProbeSend(src, dst, error)).log();
                false
            }
        }
    }

    // Records an event under both endpoints. Only tunnels between connected
    // and tunnel-active switches are recorded.
    fn add_to_status(
        &self,
        event: TunnelEvent,
        controller: Option<&dyn ControllerService>,
        tunnel_manager: Option<&dyn TunnelManager>,
    ) -> bool {
        let (src, dst) = (event.src_dpid, event.dst_dpid);
        let (Some(controller), Some(tunnel_manager)) = (controller, tunnel_manager)
        else {
            return false;
        };
        let switches = controller.switches();
        if !switches.contains(&src)
            || !switches.contains(&dst)
            || !tunnel_manager.is_tunnel_active(src)
            || !tunnel_manager.is_tunnel_active(dst)
        {
            return false;
        }

        let mut state = self.state();
        state
            .status
            .entry(src)
            .or_default()
            .insert(dst, event.clone());
        state.status.entry(dst).or_default().insert(src, event);
        true
    }

    /// Returns every recorded event, each reported once.
    pub fn liveness_state_all(&self) -> Vec<TunnelEvent> {
        let state = self.state();
        state
            .status
            .values()
            .flat_map(|events| events.values())
            .map(|event| ((event.src_dpid, event.dst_dpid), event.clone()))
            .collect::<BTreeMap<_, _>>()
            .into_values()
            .collect()
    }

    /// Returns the status of both directions of the tunnel between two
    /// switches.
    pub fn liveness_state(
        &self,
        src: SwitchId,
        dst: SwitchId,
        tunnel_manager: Option<&dyn TunnelManager>,
    ) -> [TunnelEvent; 2] {
        [
            self.liveness_state_directional(src, dst, tunnel_manager),
            self.liveness_state_directional(dst, src, tunnel_manager),
        ]
    }

    fn liveness_state_directional(
        &self,
        src: SwitchId,
        dst: SwitchId,
        tunnel_manager: Option<&dyn TunnelManager>,
    ) -> TunnelEvent {
        let recorded = self
            .state()
            .status
            .get(&src)
            .and_then(|events| events.get(&dst))
            .cloned();
        if let Some(event) = recorded {
            return event;
        }

        let status = match tunnel_manager {
            Some(tm)
                if tm.tunnel_port_number(src).is_some()
                    && tm.tunnel_port_number(dst).is_some() =>
            {
                if tm.is_tunnel_active(src) && tm.is_tunnel_active(dst) {
                    TunnelLinkStatus::Up
                } else {
                    TunnelLinkStatus::Down
                }
            }
            _ => TunnelLinkStatus::NotEnabled,
        };
        TunnelEvent::new(src, dst, status)
    }

    pub fn detection_timeout(&self) -> Duration {
        self.state().detection_timeout
    }

    pub fn set_detection_timeout(&self, timeout: Duration) {
        self.state().detection_timeout = timeout;
    }

    pub fn verification_timeout(&self) -> Duration {
        self.state().verification_timeout
    }

    pub fn set_verification_timeout(&self, timeout: Duration) {
        self.state().verification_timeout = timeout;
    }

    pub fn detection_queue(&self) -> Vec<OrderedNodePair> {
        self.state().detection.iter().map(|(onp, _)| *onp).collect()
    }

    pub fn verification_queue(&self) -> Vec<OrderedNodePair> {
        self.state().verification.iter().map(|(onp, _)| *onp).collect()
    }
}

// ===== impl LivenessState =====

impl LivenessState {
    fn is_pending(&self, onp: &OrderedNodePair) -> bool {
        self.detection.iter().any(|(pending, _)| pending == onp)
            || self.verification.iter().any(|(pending, _)| pending == onp)
    }

    fn remove_status(&mut self, onp: &OrderedNodePair) {
        if let Some(events) = self.status.get_mut(&onp.src) {
            events.remove(&onp.dst);
        }
        if let Some(events) = self.status.get_mut(&onp.dst) {
            events.remove(&onp.src);
        }
        self.status.retain(|_, events| !events.is_empty());
    }
}

// ===== impl TunnelLinkStatus =====

impl std::fmt::Display for TunnelLinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunnelLinkStatus::Unknown => write!(f, "unknown"),
            TunnelLinkStatus::Down => write!(f, "down"),
            TunnelLinkStatus::Up => write!(f, "up"),
            TunnelLinkStatus::NotEnabled => write!(f, "not-enabled"),
            TunnelLinkStatus::NotActive => write!(f, "not-active"),
        }
    }
}

// ===== impl TunnelEvent =====

impl TunnelEvent {
    pub fn new(
        src_dpid: SwitchId,
        dst_dpid: SwitchId,
        status: TunnelLinkStatus,
    ) -> TunnelEvent {
        TunnelEvent {
            src_dpid,
            dst_dpid,
            status,
            last_verified: Utc::now(),
        }
    }
}

// ===== helper functions =====

// Removes from the front of the queue every entry older than `timeout`.
fn drain_expired(
    queue: &mut VecDeque<(OrderedNodePair, Instant)>,
    now: Instant,
    timeout: Duration,
) -> Vec<OrderedNodePair> {
    let mut expired = vec![];
    while let Some((onp, enqueued)) = queue.front().copied() {
        if now.saturating_duration_since(enqueued) < timeout {
            break;
        }
        queue.pop_front();
        expired.push(onp);
    }
    expired
}

// Datapath ids are displayed as eight colon-separated hex bytes.
fn serialize_dpid<S>(dpid: &SwitchId, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let dpid = dpid
        .to_be_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .join(":");
    serializer.serialize_str(&dpid)
}

// ===== unit tests =====
