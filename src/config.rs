// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Device table and ingestion tunables.
//!
//! Configuration is an explicit value built once at startup and handed to the
//! [`crate::manager::DeviceManager`]; nothing here is global.
//!
//! # JSON layout
//!
//! ```json
//! {
//!   "devices": [
//!     { "id": "109", "ip": "192.168.50.109", "udp_port": 2309 }
//!   ],
//!   "ingest": { "recv_buffer": 8388608 }
//! }
//! ```

use crate::{lidar::Error, stream::DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, net::Ipv4Addr, path::Path, time::Duration};

/// First sensor id of the default fleet.
const FLEET_FIRST_ID: u8 = 109;

/// Last sensor id of the default fleet (inclusive).
const FLEET_LAST_ID: u8 = 126;

/// UDP port of the first sensor; ports increase with the id.
const FLEET_BASE_PORT: u16 = 2309;

/// Static configuration of one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    /// Sensor address, informational; packets are accepted from any sender
    pub ip: Ipv4Addr,
    /// Local UDP port the sensor streams to
    pub udp_port: u16,
}

/// Ingestion unit tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Requested SO_RCVBUF in bytes
    pub recv_buffer: usize,
    /// Receive timeout between cancellation checks, milliseconds
    pub recv_timeout_ms: u64,
    /// Largest datagram read from the socket
    pub max_datagram: usize,
    /// Frames buffered between a unit and its consumer
    pub channel_capacity: usize,
    /// Grace period before a stopping unit is forcibly terminated, milliseconds
    pub stop_timeout_ms: u64,
}

impl IngestConfig {
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            recv_buffer: 8 * 1024 * 1024,
            recv_timeout_ms: 500,
            max_datagram: 1500,
            channel_capacity: DEFAULT_CAPACITY,
            stop_timeout_ms: 1000,
        }
    }
}

#[derive(Deserialize)]
struct FleetFile {
    devices: Vec<DeviceConfig>,
    #[serde(default)]
    ingest: IngestConfig,
}

/// The configured device table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetConfig {
    pub devices: BTreeMap<String, DeviceConfig>,
    pub ingest: IngestConfig,
}

impl FleetConfig {
    /// Build a fleet from a list of devices. Duplicate ids and duplicate
    /// ports are rejected; port 0 (ephemeral) may repeat.
    pub fn new(devices: Vec<DeviceConfig>, ingest: IngestConfig) -> Result<Self, Error> {
        let mut table = BTreeMap::new();
        for device in devices {
            if device.udp_port != 0
                && table
                    .values()
                    .any(|d: &DeviceConfig| d.udp_port == device.udp_port)
            {
                return Err(Error::Config(format!(
                    "device {} reuses udp port {}",
                    device.id, device.udp_port
                )));
            }
            if let Some(prev) = table.insert(device.id.clone(), device) {
                return Err(Error::Config(format!("duplicate device id {}", prev.id)));
            }
        }
        if ingest.channel_capacity == 0 {
            return Err(Error::Config("channel capacity must be at least 1".to_string()));
        }
        Ok(Self {
            devices: table,
            ingest,
        })
    }

    /// The eighteen-sensor installation: ids 109..=126 at
    /// `192.168.50.<id>`, streaming to ports 2309..=2326.
    pub fn default_fleet() -> Self {
        let devices = (FLEET_FIRST_ID..=FLEET_LAST_ID)
            .map(|i| {
                let id = i.to_string();
                (
                    id.clone(),
                    DeviceConfig {
                        id,
                        ip: Ipv4Addr::new(192, 168, 50, i),
                        udp_port: FLEET_BASE_PORT + (i - FLEET_FIRST_ID) as u16,
                    },
                )
            })
            .collect();
        Self {
            devices,
            ingest: IngestConfig::default(),
        }
    }

    /// Parse a fleet from JSON text.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let file: FleetFile = serde_json::from_str(json)?;
        Self::new(file.devices, file.ingest)
    }

    /// Load a fleet from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.get(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }
}
