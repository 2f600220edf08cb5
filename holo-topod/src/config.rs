//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::net::IpAddr;

use holo_topology::TopologyCfg;
use holo_topology::types::{PortId, SwitchId};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub feed: Feed,
    pub topology: TopologyCfg,
    pub tunnels: Vec<TunnelEndpoint>,
    pub logging: Logging,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Feed {
    pub path: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelEndpoint {
    pub switch: SwitchId,
    pub port: PortId,
    pub address: IpAddr,
    #[serde(default = "tunnel_active_default")]
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Logging {
    pub file: LoggingFile,
    pub stdout: LoggingStdout,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFile {
    pub enabled: bool,
    pub dir: String,
    pub name: String,
    pub rotation: LoggingFileRotation,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingStdout {
    pub enabled: bool,
    #[serde(flatten)]
    pub fmt: LoggingFmt,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingFmt {
    pub style: LoggingFmtStyle,
    pub colors: bool,
    pub show_thread_id: bool,
    pub show_source: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFileRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingFmtStyle {
    Compact,
    Full,
    Json,
    Pretty,
}

// ===== impl Config =====

impl Config {
    const DFLT_FILEPATH: &'static str = "/etc/holo-topod.toml";

    pub(crate) fn load(config_file: Option<&str>) -> Config {
        let config_file = config_file.unwrap_or(Config::DFLT_FILEPATH);

        match std::fs::read_to_string(config_file) {
            Ok(config_str) => toml::from_str(&config_str)
                .expect("Failed to parse configuration file"),
            Err(err) => {
                eprintln!("Failed to load configuration file: {err}");
                eprintln!("Falling back to default configuration...");
                Config::default()
            }
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            feed: Default::default(),
            topology: Default::default(),
            tunnels: Default::default(),
            logging: Default::default(),
        }
    }
}

// ===== impl Feed =====

impl Default for Feed {
    fn default() -> Feed {
        Feed {
            path: "/var/opt/holo/link-state.json".to_owned(),
        }
    }
}

// ===== impl LoggingFile =====

impl Default for LoggingFile {
    fn default() -> LoggingFile {
        LoggingFile {
            enabled: false,
            dir: "/var/log".to_owned(),
            name: "holo-topod.log".to_owned(),
            rotation: Default::default(),
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingStdout =====

impl Default for LoggingStdout {
    fn default() -> LoggingStdout {
        LoggingStdout {
            enabled: true,
            fmt: Default::default(),
        }
    }
}

// ===== impl LoggingFmt =====

impl Default for LoggingFmt {
    fn default() -> LoggingFmt {
        LoggingFmt {
            style: LoggingFmtStyle::Full,
            colors: false,
            show_thread_id: false,
            show_source: false,
        }
    }
}

// ===== helper functions =====

fn tunnel_active_default() -> bool {
    true
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config() {
        let config: Config = toml::from_str(
            r#"
            [feed]
            path = "/tmp/feed.json"

            [topology]
            compute_interval = 250
            tunnel_detection_timeout = 1000

            [[tunnels]]
            switch = 1
            port = 50
            address = "192.0.2.1"

            [[tunnels]]
            switch = 2
            port = 50
            address = "192.0.2.2"
            active = false

            [logging.stdout]
            style = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.feed.path, "/tmp/feed.json");
        assert_eq!(config.topology.compute_interval, 250);
        assert_eq!(config.topology.tunnel_detection_timeout, 1000);
        assert_eq!(config.topology.tunnel_verification_timeout, 2000);
        assert_eq!(config.tunnels.len(), 2);
        assert!(config.tunnels[0].active);
        assert!(!config.tunnels[1].active);
        assert!(config.logging.stdout.enabled);
        assert!(matches!(
            config.logging.stdout.fmt.style,
            LoggingFmtStyle::Json
        ));
        assert!(!config.logging.file.enabled);
    }
}
