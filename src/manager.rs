// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Device lifecycle manager.
//!
//! The manager owns the registry of running ingestion units, at most one per
//! device id. Each unit runs on its own named OS thread with its own
//! single-threaded runtime, so a panic or a socket fault in one unit never
//! reaches another unit or the caller.
//!
//! Stopping is cooperative with a bounded wait: the unit's cancellation flag
//! is cleared, the manager waits up to the configured stop timeout (1 s by
//! default) and then forces termination. A thread cannot be killed, so forced
//! termination closes the unit's frame stream and sets the thread aside: the
//! unit can no longer deliver anything and exits on its next push or flag
//! check. Until that thread has actually exited it may still hold the device
//! socket, so the device cannot be started again.
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarhub::{config::FleetConfig, manager::DeviceManager};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(DeviceManager::new(FleetConfig::default_fleet()));
//! let stream = manager.start("109").expect("unknown device");
//! while let Some(frame) = stream.recv().await {
//!     // forward frame
//! }
//! manager.stop_all();
//! ```

use crate::{
    config::{DeviceConfig, FleetConfig, IngestConfig},
    ingest::run_udp_unit,
    stream::{FrameSender, FrameStream, channel},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

/// Interval between liveness checks while waiting for a unit to exit.
const JOIN_POLL: Duration = Duration::from_millis(10);

/// Launches the body of an ingestion unit.
///
/// The body owns `sender` and must return once `running` is cleared or a push
/// reports the channel closed.
pub trait UnitLauncher: Send + Sync {
    fn launch(
        &self,
        device: &DeviceConfig,
        config: &IngestConfig,
        sender: FrameSender,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>>;
}

/// Default launcher: the UDP ingestion unit on a thread named `lidar-<id>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpLauncher;

impl UnitLauncher for UdpLauncher {
    fn launch(
        &self,
        device: &DeviceConfig,
        config: &IngestConfig,
        sender: FrameSender,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<JoinHandle<()>> {
        let device = device.clone();
        let config = config.clone();

        thread::Builder::new()
            .name(format!("lidar-{}", device.id))
            .spawn(move || {
                let id = device.id.clone();
                if let Some(stats) = run_udp_unit(device, config, sender, running) {
                    debug!(device = %id, ?stats, "unit exited");
                }
            })
    }
}

struct Unit {
    stream: FrameStream,
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    leases: usize,
}

/// Registry of running ingestion units.
pub struct DeviceManager {
    fleet: FleetConfig,
    launcher: Box<dyn UnitLauncher>,
    units: Mutex<HashMap<String, Unit>>,
    /// Force-terminated units whose threads have not exited yet
    lingering: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DeviceManager {
    /// Manager launching UDP ingestion units for the given fleet.
    pub fn new(fleet: FleetConfig) -> Self {
        Self::with_launcher(fleet, UdpLauncher)
    }

    /// Manager with a custom unit body.
    pub fn with_launcher(fleet: FleetConfig, launcher: impl UnitLauncher + 'static) -> Self {
        Self {
            fleet,
            launcher: Box::new(launcher),
            units: Mutex::new(HashMap::new()),
            lingering: Mutex::new(HashMap::new()),
        }
    }

    pub fn fleet(&self) -> &FleetConfig {
        &self.fleet
    }

    /// Start the unit for `id` and return its frame stream.
    ///
    /// Idempotent: a registered device returns its existing stream. Returns
    /// `None` for an unknown id, when the unit thread could not be spawned,
    /// or while a force-terminated unit for `id` is still exiting.
    pub fn start(&self, id: &str) -> Option<FrameStream> {
        let mut units = self.units();
        self.start_locked(&mut units, id)
    }

    fn start_locked(
        &self,
        units: &mut HashMap<String, Unit>,
        id: &str,
    ) -> Option<FrameStream> {
        if let Some(unit) = units.get(id) {
            debug!(device = id, "already running");
            return Some(unit.stream.clone());
        }

        let Some(device) = self.fleet.get(id) else {
            warn!(device = id, "unknown device");
            return None;
        };

        if self.is_lingering(id) {
            warn!(device = id, "previous unit has not exited yet, not starting");
            return None;
        }

        let (sender, stream) = channel(self.fleet.ingest.channel_capacity);
        let running = Arc::new(AtomicBool::new(true));

        let handle = match self
            .launcher
            .launch(device, &self.fleet.ingest, sender, running.clone())
        {
            Ok(handle) => handle,
            Err(e) => {
                error!(device = id, "failed to launch unit: {}", e);
                return None;
            }
        };

        info!(device = id, port = device.udp_port, "unit started");
        units.insert(
            id.to_string(),
            Unit {
                stream: stream.clone(),
                running,
                handle,
                leases: 0,
            },
        );
        Some(stream)
    }

    /// Stop the unit for `id`. Unregistered ids are ignored.
    ///
    /// The entry leaves the registry before anything else, so concurrent
    /// callers never operate on the same unit twice. Blocks for at most the
    /// configured stop timeout.
    pub fn stop(&self, id: &str) {
        let Some(unit) = self.units().remove(id) else {
            debug!(device = id, "not running");
            return;
        };

        unit.running.store(false, Ordering::Release);
        let deadline = Instant::now() + self.fleet.ingest.stop_timeout();
        self.reap(id, unit, deadline);
    }

    /// Stop every registered unit. All units are signalled first and then
    /// share a single deadline.
    pub fn stop_all(&self) {
        let units: Vec<(String, Unit)> = self.units().drain().collect();
        if units.is_empty() {
            return;
        }

        info!(count = units.len(), "stopping all units");
        for (_, unit) in &units {
            unit.running.store(false, Ordering::Release);
        }

        let deadline = Instant::now() + self.fleet.ingest.stop_timeout();
        for (id, unit) in units {
            self.reap(&id, unit, deadline);
        }
    }

    /// Start the device if needed and hold it running until the returned
    /// lease, and every other lease on it, is dropped.
    pub fn acquire(self: &Arc<Self>, id: &str) -> Option<DeviceLease> {
        let mut units = self.units();
        let stream = self.start_locked(&mut units, id)?;
        if let Some(unit) = units.get_mut(id) {
            unit.leases += 1;
            debug!(device = id, leases = unit.leases, "lease acquired");
        }

        Some(DeviceLease {
            manager: Arc::clone(self),
            id: id.to_string(),
            stream,
        })
    }

    fn release(&self, id: &str, stream: &FrameStream) {
        let unit = {
            let mut units = self.units();
            let Some(unit) = units.get_mut(id) else {
                return;
            };
            // The lease may outlive its unit if the device was stopped
            // explicitly, possibly restarted since.
            if !unit.stream.same_stream(stream) {
                return;
            }
            unit.leases = unit.leases.saturating_sub(1);
            debug!(device = id, leases = unit.leases, "lease released");
            if unit.leases > 0 {
                return;
            }
            units.remove(id)
        };

        if let Some(unit) = unit {
            unit.running.store(false, Ordering::Release);
            let deadline = Instant::now() + self.fleet.ingest.stop_timeout();
            self.reap(id, unit, deadline);
        }
    }

    /// Wait for a signalled unit until `deadline`, then force termination.
    fn reap(&self, id: &str, unit: Unit, deadline: Instant) {
        while !unit.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL);
        }

        if unit.handle.is_finished() {
            match unit.handle.join() {
                Ok(()) => info!(device = id, "unit stopped"),
                Err(_) => error!(device = id, "unit panicked"),
            }
            return;
        }

        warn!(
            device = id,
            timeout = ?self.fleet.ingest.stop_timeout(),
            "unit did not stop in time, forcing termination"
        );
        unit.stream.close();
        self.lingering().insert(id.to_string(), unit.handle);
    }

    /// Returns true while a force-terminated unit for `id` is still running.
    /// Exited ones are joined and forgotten.
    pub fn is_lingering(&self, id: &str) -> bool {
        let mut lingering = self.lingering();
        match lingering.get(id) {
            Some(handle) if !handle.is_finished() => true,
            Some(_) => {
                if let Some(handle) = lingering.remove(id) {
                    if handle.join().is_err() {
                        error!(device = id, "unit panicked");
                    }
                }
                debug!(device = id, "lingering unit exited");
                false
            }
            None => false,
        }
    }

    /// Returns true if a unit is registered for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.units().contains_key(id)
    }

    /// Returns true if the unit for `id` is registered and its thread has not
    /// exited (a unit whose bind failed stays registered until stopped).
    pub fn is_alive(&self, id: &str) -> bool {
        self.units()
            .get(id)
            .is_some_and(|unit| !unit.handle.is_finished())
    }

    /// Registered device ids, sorted.
    pub fn running_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.units().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.units().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units().is_empty()
    }

    // A panic while the lock is held cannot leave the map half updated, so a
    // poisoned lock is still usable.
    fn units(&self) -> MutexGuard<'_, HashMap<String, Unit>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lingering(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.lingering.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Keeps a device running while held. Obtained from
/// [`DeviceManager::acquire`].
///
/// Dropping the last lease of a device stops it, blocking for at most the
/// stop timeout; from async code drop it inside `spawn_blocking`.
pub struct DeviceLease {
    manager: Arc<DeviceManager>,
    id: String,
    stream: FrameStream,
}

impl DeviceLease {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stream(&self) -> &FrameStream {
        &self.stream
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.manager.release(&self.id, &self.stream);
    }
}
