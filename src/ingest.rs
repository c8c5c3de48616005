// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-device ingestion loop.
//!
//! One unit owns one packet source (normally the device's bound UDP socket),
//! decodes every datagram, assembles frames and pushes each completed frame,
//! serialized, into the unit's bounded channel.
//!
//! ```text
//! Binding ──bind ok──► Running ──flag cleared / consumer closed──► Stopped
//!    │
//!    └──bind failed──► (unit exits, no retry)
//! ```
//!
//! The only suspension point is the receive, raced against the receive
//! timeout. When the timeout wins the cancellation flag is re-checked; the
//! receive future is cancellation safe so no datagram is lost mid-read.

use crate::{
    assembler::Frame,
    config::{DeviceConfig, IngestConfig},
    formats::encode_frame,
    lidar::LidarDriver,
    lss3::{Lss3Driver, PACKET_SIZE},
    packet_source::{PacketSource, UdpSource},
    stream::{FrameSender, PushOutcome},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle state of an ingestion unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Binding,
    Running,
    Stopped,
}

/// Counters reported when a unit stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Datagrams received
    pub datagrams: u64,
    /// Datagrams shorter than a sensor packet, ignored
    pub short_packets: u64,
    /// Frames queued for the consumer
    pub frames_sent: u64,
    /// Frames discarded because the channel was full
    pub frames_dropped: u64,
    /// Packets the driver rejected
    pub packet_errors: u64,
    /// Receive timeouts (idle periods)
    pub timeouts: u64,
    /// Non-fatal receive errors
    pub socket_errors: u64,
}

/// A running ingestion loop over any packet source.
///
/// The driver defaults to [`Lss3Driver`], whose decoding never fails; other
/// drivers may reject packets, which is logged and counted.
pub struct IngestUnit<S: PacketSource, D: LidarDriver = Lss3Driver> {
    device_id: String,
    source: S,
    driver: D,
    sender: FrameSender,
    running: Arc<AtomicBool>,
    recv_timeout: Duration,
    max_datagram: usize,
    stats: IngestStats,
}

impl<S: PacketSource> IngestUnit<S> {
    pub fn new(
        device_id: impl Into<String>,
        source: S,
        sender: FrameSender,
        running: Arc<AtomicBool>,
        config: &IngestConfig,
    ) -> Self {
        Self::with_driver(device_id, source, Lss3Driver::new(), sender, running, config)
    }
}

impl<S: PacketSource, D: LidarDriver> IngestUnit<S, D> {
    pub fn with_driver(
        device_id: impl Into<String>,
        source: S,
        driver: D,
        sender: FrameSender,
        running: Arc<AtomicBool>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            source,
            driver,
            sender,
            running,
            recv_timeout: config.recv_timeout(),
            max_datagram: config.max_datagram,
            stats: IngestStats::default(),
        }
    }

    /// Run until the cancellation flag clears, the consumer closes the
    /// channel, or a finite source is exhausted.
    pub async fn run(mut self) -> IngestStats {
        info!(device = %self.device_id, state = ?UnitState::Running, "ingestion running");

        let mut buf = vec![0u8; self.max_datagram];

        while self.running.load(Ordering::Acquire) && self.source.has_more() {
            let len = match tokio::time::timeout(self.recv_timeout, self.source.recv(&mut buf)).await
            {
                Err(_) => {
                    self.stats.timeouts += 1;
                    continue;
                }
                Ok(Err(e)) => {
                    self.stats.socket_errors += 1;
                    warn!(device = %self.device_id, "recv error: {}", e);
                    continue;
                }
                Ok(Ok(len)) => len,
            };

            self.stats.datagrams += 1;
            if len < PACKET_SIZE {
                self.stats.short_packets += 1;
                trace!(device = %self.device_id, len, "ignoring short datagram");
                continue;
            }

            match self.driver.process_packet(&buf[..len]) {
                Ok(Some(frame)) => {
                    if !self.publish(frame) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.stats.packet_errors += 1;
                    warn!(device = %self.device_id, "packet error: {}", e);
                }
            }
        }

        info!(
            device = %self.device_id,
            state = ?UnitState::Stopped,
            datagrams = self.stats.datagrams,
            frames_sent = self.stats.frames_sent,
            frames_dropped = self.stats.frames_dropped,
            socket_errors = self.stats.socket_errors,
            packet_errors = self.stats.packet_errors,
            "ingestion stopped"
        );

        self.stats
    }

    /// Serialize and push a frame. Returns false once the consumer is gone.
    fn publish(&mut self, frame: Frame) -> bool {
        let frame_id = frame.frame_id;
        let n_points = frame.point_count();

        match self.sender.push(encode_frame(&frame)) {
            PushOutcome::Sent => {
                self.stats.frames_sent += 1;
                debug!(device = %self.device_id, frame_id, n_points, "frame queued");
                true
            }
            PushOutcome::Dropped => {
                self.stats.frames_dropped += 1;
                trace!(device = %self.device_id, frame_id, "channel full, frame dropped");
                true
            }
            PushOutcome::Closed => {
                info!(device = %self.device_id, frame_id, "consumer closed the channel");
                false
            }
        }
    }
}

/// Body of a live device unit: bind the device socket and run the loop on a
/// single-threaded runtime owned by the calling thread.
///
/// Returns `None` if the runtime could not be built or the bind failed; the
/// unit is not retried.
pub fn run_udp_unit(
    device: DeviceConfig,
    config: IngestConfig,
    sender: FrameSender,
    running: Arc<AtomicBool>,
) -> Option<IngestStats> {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(device = %device.id, "unable to build runtime: {}", e);
            return None;
        }
    };

    rt.block_on(async move {
        debug!(device = %device.id, state = ?UnitState::Binding, port = device.udp_port, "binding");

        let source = match UdpSource::bind_device(device.udp_port, config.recv_buffer) {
            Ok(source) => source,
            Err(e) => {
                error!(device = %device.id, port = device.udp_port, "bind failed: {}", e);
                return None;
            }
        };

        if let Ok(addr) = source.local_addr() {
            info!(device = %device.id, "listening on {}", addr);
        }

        Some(
            IngestUnit::new(device.id, source, sender, running, &config)
                .run()
                .await,
        )
    })
}
