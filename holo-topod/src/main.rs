//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;
mod feed;
mod southbound;

use std::sync::Arc;

use clap::{App, Arg};
use config::{Config, LoggingFileRotation, LoggingFmtStyle};
use feed::FeedWatcher;
use holo_topology::TopologyManager;
use holo_topology::tasks::{self, IntervalTask};
use southbound::{FeedController, StaticTunnels};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_appender::rolling;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    // Enable logging to a file.
    let file = config.file.enabled.then(|| {
        let file_appender = match config.file.rotation {
            LoggingFileRotation::Never => {
                rolling::never(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Hourly => {
                rolling::hourly(&config.file.dir, &config.file.name)
            }
            LoggingFileRotation::Daily => {
                rolling::daily(&config.file.dir, &config.file.name)
            }
        };

        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(false)
            .with_thread_ids(config.file.fmt.show_thread_id)
            .with_file(config.file.fmt.show_source)
            .with_line_number(config.file.fmt.show_source)
            .with_ansi(config.file.fmt.colors);
        let layer = match config.file.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    // Enable logging to stdout.
    let stdout = config.stdout.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(config.stdout.fmt.show_thread_id)
            .with_file(config.stdout.fmt.show_source)
            .with_line_number(config.stdout.fmt.show_source)
            .with_ansi(config.stdout.fmt.colors);
        let layer = match config.stdout.fmt.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("holo=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file)
        .with(stdout)
        .init();
}

fn signal_listener() -> mpsc::Receiver<()> {
    let (signal_tx, signal_rx) = mpsc::channel(1);

    tokio::task::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).unwrap();
        let mut sigterm = signal(SignalKind::terminate()).unwrap();

        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
                let _ = signal_tx.send(()).await;
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                let _ = signal_tx.send(()).await;
            }
        }
    });

    signal_rx
}

// Reloads the link-state feed whenever the file changes.
fn feed_reload(
    config: &Config,
    controller: &Arc<FeedController>,
    manager: &Arc<TopologyManager>,
) -> IntervalTask {
    let mut watcher = FeedWatcher::new(config.feed.path.clone());
    let controller = controller.clone();
    let manager = manager.clone();
    IntervalTask::new(config.topology.compute_interval(), true, move || {
        if let Some(input) = watcher.poll() {
            controller.update(input.switches());
            manager.set_input(input);
        }
        async {}
    })
}

// ===== main =====

fn main() {
    // Parse command-line parameters.
    let matches = App::new("Holo topology daemon")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    // Read configuration file.
    let config_file = matches.value_of("config");
    let config = Config::load(config_file);

    // Initialize tracing.
    init_tracing(&config.logging);

    // We're ready to go!
    info!("starting up");

    // Main loop.
    let main = || async {
        // Spawn signal listener.
        let mut signal_rx = signal_listener();

        let controller = Arc::new(FeedController::default());
        let tunnels = Arc::new(StaticTunnels::new(&config.tunnels));
        let manager = Arc::new(TopologyManager::new(
            config.topology.clone(),
            Some(controller.clone()),
            Some(tunnels),
        ));

        let _feed_reload = feed_reload(&config, &controller, &manager);
        let _topology_tick =
            tasks::topology_tick(&manager, config.topology.compute_interval());

        let _ = signal_rx.recv().await;
    };
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(async {
            main().await;
        });

    info!("exiting");
}
