//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod cluster;
pub mod config;
pub mod debug;
pub mod error;
pub mod higher;
pub mod instance;
pub mod liveness;
pub mod manager;
pub mod ports;
pub mod route;
pub mod southbound;
pub mod spf;
pub mod tasks;
pub mod tunnel;
pub mod types;

pub use config::TopologyCfg;
pub use error::Error;
pub use instance::TopologyInstance;
pub use manager::TopologyManager;
pub use types::{Link, NodePortTuple, Route, TopologyInput};
