// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;
mod relay;

use args::Args;
use clap::Parser;
use edgefirst_lidarhub::{DeviceManager, FleetConfig, probe_udp};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use zenoh::{
    Config,
    qos::{CongestionControl, Priority},
};

#[tokio::main]
async fn main() -> Result<(), zenoh::Error> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.rust_log)
        .with_thread_names(true)
        .init();

    let fleet = match &args.config {
        Some(path) => FleetConfig::load(path)?,
        None => FleetConfig::default_fleet(),
    };

    if args.list {
        let devices: Vec<_> = fleet.devices.values().collect();
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    if let Some(port) = args.probe {
        let timeout = Duration::from_millis(args.probe_timeout);
        let outcome = tokio::task::spawn_blocking(move || probe_udp(port, timeout)).await?;
        println!("{}", serde_json::to_string(&outcome)?);
        return Ok(());
    }

    let ids: Vec<String> = if args.devices.is_empty() {
        fleet.ids().map(str::to_string).collect()
    } else {
        args.devices.clone()
    };

    let session = zenoh::open(Config::try_from(&args)?).await?;
    let manager = Arc::new(DeviceManager::new(fleet));

    let mut relays = JoinSet::new();
    for id in ids {
        let Some(stream) = manager.start(&id) else {
            warn!(device = %id, "not started");
            continue;
        };

        let topic = args.frames_topic(&id);
        let publisher = match session
            .declare_publisher(topic.clone())
            .priority(Priority::DataHigh)
            .congestion_control(CongestionControl::Drop)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to create publisher {}: {:?}", topic, e);
                manager.stop(&id);
                continue;
            }
        };

        info!(device = %id, "relaying frames on {}", topic);
        relays.spawn(relay::relay_thread(id, stream, publisher));
    }

    if relays.is_empty() {
        error!("no device could be started");
        return Err("no device could be started".into());
    }

    match wait_for_shutdown(&mut relays).await? {
        Shutdown::Signal => info!("shutting down"),
        Shutdown::StreamsClosed => warn!("every device stream closed, shutting down"),
    }

    // Stopping blocks up to the stop timeout
    let shutdown = manager.clone();
    tokio::task::spawn_blocking(move || shutdown.stop_all()).await?;

    while relays.join_next().await.is_some() {}

    session.close().await?;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Shutdown {
    /// Interrupted by the user
    Signal,
    /// No relay is left, e.g. every unit failed to bind
    StreamsClosed,
}

/// Wait for ctrl-c or for every relay to finish, whichever comes first.
async fn wait_for_shutdown(relays: &mut JoinSet<()>) -> std::io::Result<Shutdown> {
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| Shutdown::Signal),
        _ = async { while relays.join_next().await.is_some() {} } => Ok(Shutdown::StreamsClosed),
    }
}
