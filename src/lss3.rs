// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! LS-S3 dual-mirror scanning LiDAR decoder.
//!
//! The LS-S3 streams fixed-layout UDP packets. Each packet carries a burst of
//! 8-byte records followed by a UTC trailer. Points are reconstructed with the
//! sensor's fixed dual-reflector optical model.
//!
//! # Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────┬──────────────────┐
//! │ Data: 149 records × 8 bytes = 1192 bytes     │ Trailer: 14 bytes│
//! └──────────────────────────────────────────────┴──────────────────┘
//! ```
//!
//! ## Measurement record
//! ```text
//! ┌──────────┬──────────────────────────┬────────────┬───────────┐
//! │ b0 b1    │ b2 b3                    │ b4 b5 b6   │ b7        │
//! │ h angle  │ ch:2 sign:1 v angle:13   │ distance   │ intensity │
//! │ i16 BE   │ (sign-extended if sign)  │ u24 BE mm  │ u8        │
//! └──────────┴──────────────────────────┴────────────┴───────────┘
//! ```
//!
//! ## Header record
//! First five bytes are `FF AA BB CC DD`; marks the end of a scan revolution.
//!
//! ## Trailer
//! Bytes 2..8 are year (since 2000), month, day, hour, minute, second and
//! bytes 8..12 a big-endian nanosecond fraction.

use crate::{
    assembler::{Frame, FrameAssembler},
    buffer::PointBuffer,
    lidar::{Error, LidarDriver},
};
use chrono::NaiveDate;
use std::f32::consts::PI;

/// Minimum packet size: data segment plus trailer
pub const PACKET_SIZE: usize = 1206;

/// Size of the record data segment in bytes
pub const DATA_SEGMENT_SIZE: usize = 1192;

/// Size of each record in bytes
pub const RECORD_SIZE: usize = 8;

/// Number of records per packet
pub const RECORDS_PER_PACKET: usize = DATA_SEGMENT_SIZE / RECORD_SIZE;

/// Marker carried in the first five bytes of a header record
pub const FRAME_MARKER: [u8; 5] = [0xFF, 0xAA, 0xBB, 0xCC, 0xDD];

/// Horizontal angle resolution in degrees
const H_ANGLE_RESOLUTION: f32 = 0.01;

/// Vertical (galvo) angle resolution in degrees
const V_ANGLE_RESOLUTION: f32 = 0.0025;

/// Distance resolution in meters (1mm)
const DISTANCE_RESOLUTION: f32 = 0.001;

/// Dead-zone correction added to the galvo angle, degrees
const DEAD_ZONE_OFFSET: f32 = 6.37;

/// Folding mirror offset per channel, degrees
const MIRROR_OFFSET_ANGLES: [f32; 4] = [1.5, -0.5, 0.5, -1.5];

/// Points closer than this to the origin on every axis are invalid returns
const DEGENERATE_THRESHOLD: f32 = 0.1;

const DEG2RAD: f32 = PI / 180.0;

/// Output of decoding a single packet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketResult {
    /// Non-degenerate points in record order
    pub points: PointBuffer,
    /// Packet contained at least one header record
    pub frame_boundary: bool,
    /// Capture time in unix seconds, 0.0 when the trailer is unusable
    pub capture_time: f64,
}

/// Scalars of one measurement record after scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Horizontal angle in degrees
    pub horizontal: f32,
    /// Vertical galvo angle in degrees, before dead-zone correction
    pub vertical: f32,
    /// Channel id (0..=3)
    pub channel: u8,
    /// Folding mirror offset for the channel, degrees
    pub mirror_offset: f32,
    /// Range in meters
    pub distance: f32,
    pub intensity: u8,
}

/// Returns true if the record is a frame header rather than a measurement.
#[inline]
pub fn is_header_record(record: &[u8]) -> bool {
    record.len() >= FRAME_MARKER.len() && record[..FRAME_MARKER.len()] == FRAME_MARKER
}

/// Decode the scalar fields of an 8-byte measurement record.
pub fn decode_record(record: &[u8; RECORD_SIZE]) -> Measurement {
    let horizontal = i16::from_be_bytes([record[0], record[1]]) as f32 * H_ANGLE_RESOLUTION;

    let channel = record[2] >> 6;
    let negative = (record[2] >> 5) & 0x01 == 1;

    // Negative angles are 14-bit two's complement; the top two bits hold the
    // channel id so they are forced to 1 before reinterpreting.
    let vertical_raw = if negative {
        (u16::from_be_bytes([record[2], record[3]]) | 0xC000) as i16 as f32
    } else {
        u16::from_be_bytes([record[2] & 0x3F, record[3]]) as f32
    };
    let vertical = vertical_raw * V_ANGLE_RESOLUTION;

    let distance =
        u32::from_be_bytes([0, record[4], record[5], record[6]]) as f32 * DISTANCE_RESOLUTION;

    Measurement {
        horizontal,
        vertical,
        channel,
        mirror_offset: MIRROR_OFFSET_ANGLES[(channel % 4) as usize],
        distance,
        intensity: record[7],
    }
}

/// Reconstruct a Cartesian point from the dual-mirror optical model.
///
/// Angles are in degrees, `distance` in meters. Both square roots are clamped
/// at zero so rounding noise near the poles cannot produce NaN.
pub fn reconstruct(
    horizontal: f32,
    vertical: f32,
    mirror_offset: f32,
    distance: f32,
) -> (f32, f32, f32) {
    let (sin_30, cos_30) = (30.0 * DEG2RAD).sin_cos();
    let sin_60 = (60.0 * DEG2RAD).sin();

    let (sin_mirror, cos_mirror) = (mirror_offset * DEG2RAD).sin_cos();
    let (sin_galva, cos_galva) = ((vertical + DEAD_ZONE_OFFSET) * DEG2RAD).sin_cos();
    let (sin_h, cos_h) = (horizontal * DEG2RAD).sin_cos();

    let r0 = cos_30 * cos_mirror * cos_galva - sin_galva * sin_mirror;

    let sin_v = 2.0 * r0 * sin_galva + sin_mirror;
    let cos_v = (1.0 - sin_v * sin_v).max(0.0).sqrt();
    let denom = if cos_v != 0.0 { cos_v } else { 1.0 };

    let sin_cite = (2.0 * r0 * cos_galva * sin_30 - cos_mirror * sin_60) / denom;
    let cos_cite = (1.0 - sin_cite * sin_cite).max(0.0).sqrt();

    let sin_cite_h = sin_h * cos_cite + cos_h * sin_cite;
    let cos_cite_h = cos_h * cos_cite - sin_h * sin_cite;

    (
        distance * cos_v * sin_cite_h,
        distance * cos_v * cos_cite_h,
        distance * sin_v,
    )
}

/// A point is kept only if some axis is farther than the threshold from the
/// origin; a NaN coordinate never qualifies.
#[inline]
fn is_degenerate(x: f32, y: f32, z: f32) -> bool {
    !(x.abs() > DEGENERATE_THRESHOLD
        || y.abs() > DEGENERATE_THRESHOLD
        || z.abs() > DEGENERATE_THRESHOLD)
}

/// Parse the trailer timestamp into unix seconds.
///
/// The calendar fields are interpreted as UTC. Fails on any impossible
/// calendar value or a trailer shorter than 12 bytes.
pub fn parse_timestamp(trailer: &[u8]) -> Result<f64, Error> {
    if trailer.len() < 12 {
        return Err(Error::UnexpectedEnd(trailer.len()));
    }

    let t = &trailer[2..8];
    let year = 2000 + t[0] as i32;
    let nanos = u32::from_be_bytes([trailer[8], trailer[9], trailer[10], trailer[11]]);

    let instant = NaiveDate::from_ymd_opt(year, t[1] as u32, t[2] as u32)
        .and_then(|date| date.and_hms_opt(t[3] as u32, t[4] as u32, t[5] as u32))
        .ok_or_else(|| {
            Error::InvalidTimestamp(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, t[1], t[2], t[3], t[4], t[5]
            ))
        })?;

    Ok(instant.and_utc().timestamp() as f64 + nanos as f64 / 1e9)
}

/// Decode one LS-S3 packet.
///
/// Packets shorter than [`PACKET_SIZE`] decode to an empty, non-boundary
/// result with a zero timestamp. Decoding never fails.
pub fn decode(packet: &[u8]) -> PacketResult {
    if packet.len() < PACKET_SIZE {
        return PacketResult::default();
    }

    let (data, trailer) = packet.split_at(DATA_SEGMENT_SIZE);
    let capture_time = parse_timestamp(trailer).unwrap_or(0.0);

    let mut points = PointBuffer::with_capacity(RECORDS_PER_PACKET);
    let mut frame_boundary = false;

    for chunk in data.chunks_exact(RECORD_SIZE) {
        if is_header_record(chunk) {
            frame_boundary = true;
            continue;
        }

        let Ok(record) = <&[u8; RECORD_SIZE]>::try_from(chunk) else {
            continue;
        };
        let m = decode_record(record);
        let (x, y, z) = reconstruct(m.horizontal, m.vertical, m.mirror_offset, m.distance);

        if !is_degenerate(x, y, z) {
            points.push(x, y, z, m.intensity);
        }
    }

    PacketResult {
        points,
        frame_boundary,
        capture_time,
    }
}

/// LS-S3 driver: packet decoding plus frame assembly.
#[derive(Debug, Default)]
pub struct Lss3Driver {
    assembler: FrameAssembler,
}

impl Lss3Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access the frame assembler state.
    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }
}

impl LidarDriver for Lss3Driver {
    fn process_packet(&mut self, data: &[u8]) -> Result<Option<Frame>, Error> {
        Ok(self.assembler.feed(decode(data)))
    }
}

/// Builders for synthetic packets, shared by unit and integration tests.
pub mod synth {
    use super::*;

    /// Encode a measurement record from raw field values.
    ///
    /// `vertical_raw` is the signed count of 0.0025° steps.
    pub fn measurement_record(
        horizontal_raw: i16,
        channel: u8,
        vertical_raw: i16,
        distance_mm: u32,
        intensity: u8,
    ) -> [u8; RECORD_SIZE] {
        let h = horizontal_raw.to_be_bytes();
        let v = if vertical_raw < 0 {
            // 14-bit two's complement with the sign flag set
            (vertical_raw as u16) & 0x3FFF
        } else {
            (vertical_raw as u16) & 0x1FFF
        };
        let b2 = ((channel & 0x03) << 6) | ((v >> 8) as u8 & 0x3F);
        let d = distance_mm.to_be_bytes();
        [h[0], h[1], b2, v as u8, d[1], d[2], d[3], intensity]
    }

    /// Header record carrying the frame marker.
    pub fn header_record() -> [u8; RECORD_SIZE] {
        let mut record = [0u8; RECORD_SIZE];
        record[..FRAME_MARKER.len()].copy_from_slice(&FRAME_MARKER);
        record
    }

    /// Trailer with the given calendar fields and nanosecond fraction.
    pub fn trailer(fields: [u8; 6], nanos: u32) -> [u8; PACKET_SIZE - DATA_SEGMENT_SIZE] {
        let mut t = [0u8; PACKET_SIZE - DATA_SEGMENT_SIZE];
        t[2..8].copy_from_slice(&fields);
        t[8..12].copy_from_slice(&nanos.to_be_bytes());
        t
    }

    /// Build a full packet from up to 149 records; the rest are zero records,
    /// which reconstruct to the origin and are filtered as degenerate.
    pub fn packet(records: &[[u8; RECORD_SIZE]], boundary: bool) -> Vec<u8> {
        let mut packet = vec![0u8; PACKET_SIZE];
        let mut slot = 0;
        if boundary {
            packet[..RECORD_SIZE].copy_from_slice(&header_record());
            slot = 1;
        }
        for record in records.iter().take(RECORDS_PER_PACKET - slot) {
            let start = slot * RECORD_SIZE;
            packet[start..start + RECORD_SIZE].copy_from_slice(record);
            slot += 1;
        }
        packet[DATA_SEGMENT_SIZE..].copy_from_slice(&trailer([24, 6, 1, 12, 0, 0], 0));
        packet
    }

    /// A plausible return: 10m straight ahead on channel 1.
    pub fn forward_record(intensity: u8) -> [u8; RECORD_SIZE] {
        measurement_record(0, 1, 0, 10_000, intensity)
    }
}

#[cfg(test)]
mod tests {
    use super::synth::*;
    use super::*;

    #[test]
    fn test_short_packet_is_empty() {
        for len in [0, 1, 100, PACKET_SIZE - 1] {
            let result = decode(&vec![0xFF; len]);
            assert!(result.points.is_empty());
            assert!(!result.frame_boundary);
            assert_eq!(result.capture_time, 0.0);
        }
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(RECORDS_PER_PACKET, 149);
        assert_eq!(RECORDS_PER_PACKET * RECORD_SIZE, DATA_SEGMENT_SIZE);
    }

    #[test]
    fn test_boundary_packet_point_count() {
        let records: Vec<_> = (0..148).map(|i| forward_record(i as u8)).collect();
        let packet = packet(&records, true);
        assert_eq!(packet.len(), PACKET_SIZE);

        let result = decode(&packet);
        assert!(result.frame_boundary);
        assert!(result.points.len() <= 148);
        assert_eq!(result.points.len(), 148);
        assert_eq!(result.points.intensity()[5], 5);
    }

    #[test]
    fn test_marker_anywhere_marks_boundary() {
        let mut packet = packet(&[forward_record(1)], false);
        let at = 100 * RECORD_SIZE;
        packet[at..at + RECORD_SIZE].copy_from_slice(&header_record());
        let result = decode(&packet);
        assert!(result.frame_boundary);
        assert_eq!(result.points.len(), 1);
    }

    #[test]
    fn test_horizontal_twos_complement() {
        let record = [0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let m = decode_record(&record);
        assert!((m.horizontal - -327.68).abs() < 1e-3);

        let record = [0x7F, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let m = decode_record(&record);
        assert!((m.horizontal - 327.67).abs() < 1e-3);
    }

    #[test]
    fn test_vertical_sign_handling() {
        // Channel 0, sign flag set: 0x360C | 0xC000 = 0xF60C = -2548
        let record = [0x00, 0x00, 0x36, 0x0C, 0x00, 0x00, 0x00, 0x00];
        let m = decode_record(&record);
        assert_eq!(m.channel, 0);
        assert!((m.vertical - -6.37).abs() < 1e-4);

        // Channel 2, sign flag clear: (0x1F & 0x3F) << 8 | 0x40 = 8000
        let record = [0x00, 0x00, 0x9F, 0x40, 0x00, 0x00, 0x00, 0x00];
        let m = decode_record(&record);
        assert_eq!(m.channel, 2);
        assert!((m.vertical - 20.0).abs() < 1e-4);
        assert_eq!(m.mirror_offset, 0.5);
    }

    #[test]
    fn test_distance_and_intensity() {
        let record = [0x00, 0x00, 0x40, 0x00, 0x01, 0x86, 0xA0, 0xC8];
        let m = decode_record(&record);
        assert!((m.distance - 100.0).abs() < 1e-3);
        assert_eq!(m.intensity, 200);
        assert_eq!(m.channel, 1);
        assert_eq!(m.mirror_offset, -0.5);
    }

    #[test]
    fn test_synth_record_round_trip() {
        let record = measurement_record(-1234, 3, -2548, 5_432, 77);
        let m = decode_record(&record);
        assert!((m.horizontal - -12.34).abs() < 1e-3);
        assert_eq!(m.channel, 3);
        assert!((m.vertical - -6.37).abs() < 1e-4);
        assert!((m.distance - 5.432).abs() < 1e-4);
        assert_eq!(m.intensity, 77);
    }

    #[test]
    fn test_boresight_reconstruction() {
        let distance = 12.5;
        let (x, y, z) = reconstruct(0.0, -DEAD_ZONE_OFFSET, 0.0, distance);
        assert!(x.abs() < 1e-4, "x = {}", x);
        assert!((y - distance).abs() < 1e-4, "y = {}", y);
        assert!(z.abs() < 1e-4, "z = {}", z);
    }

    #[test]
    fn test_reconstruction_is_finite() {
        for h in [-180.0f32, -90.0, 0.0, 45.0, 179.99] {
            for v in [-20.0f32, -6.37, 0.0, 10.0, 20.0] {
                for mirror in MIRROR_OFFSET_ANGLES {
                    let (x, y, z) = reconstruct(h, v, mirror, 50.0);
                    assert!(x.is_finite() && y.is_finite() && z.is_finite());
                    let r = (x * x + y * y + z * z).sqrt();
                    assert!(r <= 50.0 * 1.5, "range blew up: {}", r);
                }
            }
        }
    }

    #[test]
    fn test_degenerate_points_dropped() {
        // Zero distance reconstructs to the origin
        let near = measurement_record(0, 0, 0, 0, 9);
        // 5cm is still inside the threshold on every axis
        let close = measurement_record(0, 0, 0, 50, 9);
        let result = decode(&packet(&[near, close, forward_record(9)], false));
        assert_eq!(result.points.len(), 1);
        assert!(!result.frame_boundary);
    }

    #[test]
    fn test_degenerate_predicate() {
        assert!(is_degenerate(0.0, 0.0, 0.0));
        assert!(is_degenerate(0.1, -0.1, 0.1));
        assert!(!is_degenerate(0.0, 0.11, 0.0));
        assert!(!is_degenerate(0.0, 0.0, -5.0));
        // NaN never counts as away from the origin
        assert!(is_degenerate(f32::NAN, f32::NAN, f32::NAN));
        assert!(is_degenerate(f32::NAN, 0.0, 0.05));
        assert!(!is_degenerate(f32::NAN, 3.0, 0.0));
    }

    #[test]
    fn test_timestamp_parse() {
        // 2024-06-01 12:00:00 UTC = 1717243200
        let t = trailer([24, 6, 1, 12, 0, 0], 500_000_000);
        let ts = parse_timestamp(&t).unwrap();
        assert!((ts - 1_717_243_200.5).abs() < 1e-6);
    }

    #[test]
    fn test_timestamp_invalid_calendar() {
        let t = trailer([24, 13, 1, 0, 0, 0], 0);
        assert!(matches!(parse_timestamp(&t), Err(Error::InvalidTimestamp(_))));

        let t = trailer([24, 2, 30, 0, 0, 0], 0);
        assert!(parse_timestamp(&t).is_err());

        assert!(matches!(parse_timestamp(&[0u8; 4]), Err(Error::UnexpectedEnd(4))));
    }

    #[test]
    fn test_decode_bad_timestamp_is_zero() {
        let mut packet = packet(&[forward_record(1)], true);
        packet[DATA_SEGMENT_SIZE..].copy_from_slice(&trailer([24, 13, 40, 99, 0, 0], 0));
        let result = decode(&packet);
        assert_eq!(result.capture_time, 0.0);
        assert!(result.frame_boundary);
        assert_eq!(result.points.len(), 1);
    }

    #[test]
    fn test_driver_emits_frame() {
        let mut driver = Lss3Driver::new();
        let data = packet(&[forward_record(1), forward_record(2)], false);
        assert!(driver.process_packet(&data).unwrap().is_none());

        let data = packet(&[forward_record(3)], true);
        let frame = driver.process_packet(&data).unwrap().unwrap();
        assert_eq!(frame.frame_id, 0);
        assert_eq!(frame.point_count(), 3);
        assert_eq!(driver.assembler().next_frame_id(), 1);
    }
}
