// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame assembly across packets.
//!
//! The LS-S3 closes a scan with a header record. Points decoded from every
//! packet up to and including the boundary packet belong to the frame being
//! closed; the next packet starts a fresh frame.

use crate::{buffer::PointBuffer, lss3::PacketResult};

/// Typical LS-S3 scan size, used to pre-size the accumulator.
const POINTS_PER_FRAME: usize = 64 * 1024;

/// A completed scan frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame sequence ID (wraps at u32::MAX)
    pub frame_id: u32,
    /// Capture time of the packet that closed the frame, unix seconds
    pub timestamp: f64,
    /// Points in arrival order
    pub points: PointBuffer,
}

impl Frame {
    /// Number of points in the frame as carried on the wire.
    #[inline]
    pub fn point_count(&self) -> u32 {
        self.points.len() as u32
    }
}

/// Per-device frame accumulator.
///
/// Owned by exactly one ingestion loop; never shared across devices.
#[derive(Debug)]
pub struct FrameAssembler {
    pending: PointBuffer,
    running_count: usize,
    frame_id: u32,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            pending: PointBuffer::with_capacity(POINTS_PER_FRAME),
            running_count: 0,
            frame_id: 0,
        }
    }

    /// Number of points accumulated for the frame in progress.
    #[inline]
    pub fn running_count(&self) -> usize {
        self.running_count
    }

    /// ID the next emitted frame will carry.
    #[inline]
    pub fn next_frame_id(&self) -> u32 {
        self.frame_id
    }

    /// Consume one decoded packet.
    ///
    /// Returns the completed frame when the packet carries a boundary and at
    /// least one point has been accumulated. A boundary with nothing pending
    /// (e.g. the first packet after start) emits nothing.
    pub fn feed(&mut self, packet: PacketResult) -> Option<Frame> {
        self.pending.extend_from(&packet.points);
        self.running_count += packet.points.len();

        if !packet.frame_boundary || self.running_count == 0 {
            return None;
        }

        let points = std::mem::replace(
            &mut self.pending,
            PointBuffer::with_capacity(self.running_count),
        );
        let frame = Frame {
            frame_id: self.frame_id,
            timestamp: packet.capture_time,
            points,
        };

        self.frame_id = self.frame_id.wrapping_add(1);
        self.running_count = 0;

        Some(frame)
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
