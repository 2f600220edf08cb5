//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::trace;

use crate::spf::BroadcastTreeMultipath;
use crate::types::{NodePortTuple, Route, RouteId, SwitchId};

/// Memoized intra-cluster routes of one topology snapshot.
///
/// Each key is computed at most once: concurrent lookups of the same key
/// wait for the first computation to finish.
#[derive(Debug, Default)]
pub struct RouteCache {
    entries: Mutex<HashMap<RouteId, Arc<OnceLock<Option<Route>>>>>,
}

// ===== impl RouteCache =====

impl RouteCache {
    pub fn get_or_compute<F>(&self, id: RouteId, compute: F) -> Option<Route>
    where
        F: FnOnce(RouteId) -> Option<Route>,
    {
        let cell = {
            let mut entries = match self.entries.lock() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries.entry(id).or_default().clone()
        };
        cell.get_or_init(|| compute(id)).clone()
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        match self.entries.lock() {
            Ok(mut entries) => entries.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

// ===== global functions =====

// Walks the multipath tree rooted at the destination, picking at every hop
// the link indexed by the cookie modulo the number of equal-cost choices.
//
// Ports of the tunnel domain switch are left out of the resulting path. An
// empty path means there's no route.
pub(crate) fn build_route(
    id: RouteId,
    trees: &BTreeMap<SwitchId, BroadcastTreeMultipath>,
    switches: &BTreeSet<SwitchId>,
    tunnel_domain: Option<SwitchId>,
) -> Option<Route> {
    let tree = trees.get(&id.dst)?;

    // Standalone switches have no route.
    if !switches.contains(&id.src) || !switches.contains(&id.dst) {
        trace!(src = %id.src, dst = %id.dst, "standalone switch");
        return None;
    }

    let mut path = vec![];
    let mut route_count = 0;
    let mut curr = id.src;
    while curr != id.dst {
        let choices = tree.links(curr);
        if choices.is_empty() || path.len() > 2 * tree.links.len() {
            return None;
        }
        let link = choices[(id.cookie % choices.len() as u64) as usize];
        route_count = route_count.max(choices.len());
        path.push(link.src_npt());
        path.push(link.dst_npt());
        curr = link.dst;
    }

    path.retain(|npt: &NodePortTuple| Some(npt.node) != tunnel_domain);
    if path.is_empty() {
        return None;
    }

    Some(Route::new(id, path, route_count))
}

// ===== unit tests =====
