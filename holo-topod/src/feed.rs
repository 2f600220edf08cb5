//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::SystemTime;

use holo_topology::TopologyInput;
use tracing::info;

// Link-state feed file, read again whenever its modification time changes.
#[derive(Debug)]
pub struct FeedWatcher {
    path: String,
    // Modification time seen on the last read attempt.
    last_read: Option<Option<SystemTime>>,
}

// ===== impl FeedWatcher =====

impl FeedWatcher {
    pub fn new(path: String) -> FeedWatcher {
        FeedWatcher {
            path,
            last_read: None,
        }
    }

    // Returns the feed if the file changed since the last call. Read and
    // parse errors are logged once per file change.
    pub fn poll(&mut self) -> Option<TopologyInput> {
        let modified = std::fs::metadata(&self.path)
            .and_then(|metadata| metadata.modified())
            .ok();
        if self.last_read == Some(modified) {
            return None;
        }
        self.last_read = Some(modified);

        match TopologyInput::load(&self.path) {
            Ok(input) => {
                info!(path = %self.path, "link-state feed loaded");
                Some(input)
            }
            Err(error) => {
                error.log();
                None
            }
        }
    }
}

// ===== unit tests =====

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_read_once_per_change() {
        let path = std::env::temp_dir()
            .join(format!("holo-topod-feed-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "switch_ports": { "1": [1] }, "switch_port_links": [] }"#,
        )
        .unwrap();

        let mut watcher = FeedWatcher::new(path.display().to_string());
        let input = watcher.poll().unwrap();
        assert!(input.switch_ports.contains_key(&1));
        assert!(watcher.poll().is_none());

        std::fs::remove_file(&path).unwrap();
        assert!(watcher.poll().is_none());
        assert!(watcher.poll().is_none());
    }
}
