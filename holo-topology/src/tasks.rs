//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio::{task, time};
use tracing::{Instrument, debug_span, warn};

use crate::debug::Debug;
use crate::error::Error;
use crate::manager::TopologyManager;

//
// Topology tasks diagram:
//
//                    +--------------+
//   feed reload ---> |              |
//                    |   manager    | ---> published snapshot
//   tick (1x) -----> |              |
//                    +--------------+
//                           |
//                           V (Nx) tunnel probes
//

/// A handle for the task created by the [`Task::spawn`] function.
///
/// Dropping this handle cancels the task.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: task::JoinHandle<T>,
}

/// A handle for the interval task created by the [`IntervalTask::new`]
/// function.
///
/// Dropping this handle cancels the interval task.
#[derive(Debug)]
pub struct IntervalTask {
    _task: Task<()>,
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future),
        }
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Spawns a new task that will call the provided async closure whenever the
    /// specified interval timer ticks.
    pub fn new<F, Fut>(
        interval: Duration,
        tick_on_start: bool,
        mut cb: F,
    ) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let task = Task::spawn(
            async move {
                let mut interval_fut = if tick_on_start {
                    time::interval(interval)
                } else {
                    time::interval_at(Instant::now() + interval, interval)
                };

                loop {
                    interval_fut.tick().await;
                    (cb)().await;
                }
            }
            .in_current_span(),
        );

        IntervalTask { _task: task }
    }
}

// ===== global functions =====

// Periodic topology tick: recomputes the topology when its inputs changed and
// runs the tunnel liveness timers.
pub fn topology_tick(
    manager: &Arc<TopologyManager>,
    interval: Duration,
) -> IntervalTask {
    let manager = manager.clone();
    IntervalTask::new(interval, false, move || {
        let manager = manager.clone();
        async move {
            debug_span!("topology").in_scope(|| {
                match manager.update() {
                    Ok(_) => (),
                    // Nothing to compute until the first feed arrives.
                    Err(Error::MissingInput(input)) => {
                        Debug::TopologyInputPending(input).log();
                    }
                    Err(error) => error.log(),
                }
                for event in manager.tick_liveness(std::time::Instant::now()) {
                    warn!(
                        src = %event.src_dpid,
                        dst = %event.dst_dpid,
                        status = %event.status,
                        "tunnel status changed"
                    );
                }
            });
        }
        .in_current_span()
    })
}

// ===== unit tests =====
