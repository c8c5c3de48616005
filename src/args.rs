// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_lidarhub::probe::DEFAULT_TIMEOUT;
use serde_json::json;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Device table in JSON.  When omitted the default eighteen sensor fleet
    /// (ids 109 to 126 on ports 2309 to 2326) is used.
    #[arg(long, env = "LIDAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Devices to stream, comma separated.  All configured devices when empty.
    #[arg(long, env, value_delimiter = ',')]
    pub devices: Vec<String>,

    /// Print the device table as JSON and exit
    #[arg(long)]
    pub list: bool,

    /// Wait for one datagram on the given UDP port, print the result as JSON
    /// and exit
    #[arg(long, value_name = "PORT")]
    pub probe: Option<u16>,

    /// Probe timeout in milliseconds
    #[arg(long, env, default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    pub probe_timeout: u64,

    /// lidar base topic, frames are published on <topic>/<device>/frames
    #[arg(long, env, default_value = "rt/lidar")]
    pub lidar_topic: String,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl Args {
    /// Key expression a device's frames are published on.
    pub fn frames_topic(&self, device_id: &str) -> String {
        format!("{}/{}/frames", self.lidar_topic, device_id)
    }
}

impl TryFrom<&Args> for Config {
    type Error = zenoh::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(args.mode).to_string())?;

        if !args.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(args.connect).to_string())?;
        }

        if !args.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(args.listen).to_string())?;
        }

        if args.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        config.insert_json5("scouting/multicast/interface", &json!("lo").to_string())?;

        Ok(config)
    }
}
