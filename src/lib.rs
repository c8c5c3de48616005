// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! EdgeFirst LiDAR Hub Library
//!
//! Decode-and-stream pipeline for fleets of LS-S3 dual-mirror scanning
//! LiDARs.
//!
//! # Architecture
//!
//! Every device runs as an isolated ingestion unit owned by the
//! [`manager::DeviceManager`]:
//!
//! ```text
//! ┌─────────────────┐     ┌───────────────┐     ┌─────────────────┐
//! │  PacketSource   │ ──► │  lss3::decode │ ──► │  FrameAssembler │
//! │  (UDP/scripted) │     │  (per packet) │     │  (per device)   │
//! └─────────────────┘     └───────────────┘     └─────────────────┘
//!                                                       │ Frame
//!                                                       ▼
//!                               ┌─────────────────────────────────────┐
//!                               │  formats::encode_frame              │
//!                               │  ──► bounded channel (drop newest)  │
//!                               └─────────────────────────────────────┘
//!                                                       │
//!                                                       ▼
//!                                             FrameStream consumer
//! ```
//!
//! # Modules
//!
//! - [`lss3`]: LS-S3 packet decoder and geometric reconstruction
//! - [`assembler`]: Frame assembly across packets
//! - [`buffer`]: Structure-of-arrays point storage
//! - [`formats`]: Frame wire format
//! - [`ingest`]: Per-device ingestion loop
//! - [`manager`]: Device lifecycle manager
//! - [`stream`]: Bounded drop-newest frame channel
//! - [`packet_source`]: Packet source abstraction for testing
//! - [`config`]: Device table and ingestion tunables
//! - [`probe`]: Raw UDP connectivity probe
//! - [`common`]: Shared socket setup
//! - [`lidar`]: Driver trait and error handling
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarhub::{DeviceManager, FleetConfig, FrameView};
//! use std::sync::Arc;
//!
//! let manager = Arc::new(DeviceManager::new(FleetConfig::default_fleet()));
//! let stream = manager.start("109").expect("unknown device");
//!
//! while let Some(data) = stream.recv().await {
//!     let frame = FrameView::parse(&data)?;
//!     for point in frame.points() {
//!         // point.x, point.y, point.z, point.intensity
//!     }
//! }
//! ```

pub mod assembler;
pub mod buffer;
pub mod common;
pub mod config;
pub mod formats;
pub mod ingest;
pub mod lidar;
pub mod lss3;
pub mod manager;
pub mod packet_source;
pub mod probe;
pub mod stream;

// Re-exports for convenience
pub use assembler::{Frame, FrameAssembler};
pub use buffer::{DecodedPoint, PointBuffer};
pub use config::{DeviceConfig, FleetConfig, IngestConfig};
pub use formats::{FrameView, encode_frame};
pub use lidar::{Error, LidarDriver};
pub use lss3::{Lss3Driver, PacketResult, decode};
pub use manager::{DeviceLease, DeviceManager, UnitLauncher};
pub use packet_source::PacketSource;
pub use probe::{ProbeOutcome, ProbeStatus, probe_udp};
pub use stream::{FrameSender, FrameStream, PushOutcome};
