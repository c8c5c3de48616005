// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame wire format.
//!
//! Completed frames cross the channel and the relay as one flat
//! little-endian message, unchanged all the way to the viewer.
//!
//! ```text
//! ┌─────────────┬──────────────┬──────────────────────────────────────────┐
//! │ frame_id:u32│ n_points:u32 │ n_points × point (16 bytes)              │
//! │ 4B LE       │ 4B LE        │                                          │
//! └─────────────┴──────────────┴──────────────────────────────────────────┘
//!
//! point:
//! ┌───────┬───────┬───────┬───────────────┐
//! │ x:f32 │ y:f32 │ z:f32 │ intensity:f32 │
//! │ 4B    │ 4B    │ 4B    │ 4B            │
//! └───────┴───────┴───────┴───────────────┘
//! ```

use crate::{assembler::Frame, buffer::DecodedPoint, lidar::Error};

/// Size of the frame header in bytes
pub const FRAME_HEADER_SIZE: usize = 8;

/// Size of one serialized point in bytes
pub const POINT_STRIDE: usize = 16;

/// Serialize a frame into its wire representation.
#[inline(never)]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let n_points = frame.points.len();
    let mut data = vec![0u8; FRAME_HEADER_SIZE + POINT_STRIDE * n_points];
    encode_frame_into(frame, &mut data);
    data
}

/// Serialize a frame into a pre-allocated buffer.
///
/// # Panics
///
/// Panics if `out` is shorter than `8 + 16 * n_points` bytes.
pub fn encode_frame_into(frame: &Frame, out: &mut [u8]) {
    let points = &frame.points;
    let n_points = points.len();
    assert!(out.len() >= FRAME_HEADER_SIZE + POINT_STRIDE * n_points);

    out[0..4].copy_from_slice(&frame.frame_id.to_le_bytes());
    out[4..8].copy_from_slice(&frame.point_count().to_le_bytes());

    let (x, y, z, intensity) = (points.x(), points.y(), points.z(), points.intensity());
    let body = &mut out[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + POINT_STRIDE * n_points];

    for (index, chunk) in body.chunks_exact_mut(POINT_STRIDE).enumerate() {
        chunk[0..4].copy_from_slice(&x[index].to_le_bytes());
        chunk[4..8].copy_from_slice(&y[index].to_le_bytes());
        chunk[8..12].copy_from_slice(&z[index].to_le_bytes());
        chunk[12..16].copy_from_slice(&(intensity[index] as f32).to_le_bytes());
    }
}

/// Borrowed view over a serialized frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub frame_id: u32,
    pub point_count: u32,
    body: &'a [u8],
}

impl<'a> FrameView<'a> {
    /// Parse the header and validate the body length.
    pub fn parse(data: &'a [u8]) -> Result<Self, Error> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(Error::UnexpectedEnd(data.len()));
        }

        let frame_id = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let point_count = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let body_len = point_count as usize * POINT_STRIDE;

        if data.len() < FRAME_HEADER_SIZE + body_len {
            return Err(Error::InvalidPacket(format!(
                "frame {} declares {} points but carries {} bytes",
                frame_id,
                point_count,
                data.len() - FRAME_HEADER_SIZE
            )));
        }

        Ok(Self {
            frame_id,
            point_count,
            body: &data[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + body_len],
        })
    }

    /// Iterate over the points. Intensity is truncated back to `u8`.
    pub fn points(&self) -> impl Iterator<Item = DecodedPoint> + 'a {
        let body = self.body;
        body.chunks_exact(POINT_STRIDE).map(|c| {
            let f = |i: usize| f32::from_le_bytes([c[i], c[i + 1], c[i + 2], c[i + 3]]);
            DecodedPoint {
                x: f(0),
                y: f(4),
                z: f(8),
                intensity: f(12) as u8,
            }
        })
    }
}
