// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Point batch storage shared by the decoder and the frame assembler.
//!
//! Points are stored in a structure-of-arrays (SoA) layout. A single packet
//! yields at most 149 points, so the decoder allocates a small buffer per
//! packet. The assembler hands its buffer over with each emitted frame and
//! starts the next one pre-sized to the frame just closed.
//!
//! ```text
//! ┌──────────────────────── PointBuffer ───────────────────────┐
//! │  x: [f32]   y: [f32]   z: [f32]   intensity: [u8]          │
//! │   ▲ packet 0 points ▲ packet 1 points ▲ ... (arrival order) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use edgefirst_lidarhub::buffer::PointBuffer;
//!
//! let mut frame = PointBuffer::with_capacity(1024);
//!
//! let mut batch = PointBuffer::default();
//! batch.push(1.0, 2.0, 3.0, 128);
//! batch.push(4.0, 5.0, 6.0, 255);
//!
//! frame.extend_from(&batch);
//! assert_eq!(frame.len(), 2);
//! assert_eq!(frame.x()[1], 4.0);
//! ```

/// A single reconstructed measurement in sensor-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: u8,
}

/// Growable point cloud buffer.
///
/// Unlike a fixed-capacity scratch buffer this never drops points: a scan
/// frame has no hard upper bound, it is closed by a boundary marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointBuffer {
    x: Vec<f32>,
    y: Vec<f32>,
    z: Vec<f32>,
    intensity: Vec<u8>,
}

impl PointBuffer {
    /// Create an empty buffer with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            intensity: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the buffer contains no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Returns the number of points the buffer can hold without reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.x.capacity()
    }

    /// Clear all points, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
        self.z.clear();
        self.intensity.clear();
    }

    /// Append a point.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32, intensity: u8) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.intensity.push(intensity);
    }

    /// Append every point of `other`, preserving its order.
    pub fn extend_from(&mut self, other: &PointBuffer) {
        self.x.extend_from_slice(&other.x);
        self.y.extend_from_slice(&other.y);
        self.z.extend_from_slice(&other.z);
        self.intensity.extend_from_slice(&other.intensity);
    }

    /// Returns the point at `index`, if any.
    pub fn get(&self, index: usize) -> Option<DecodedPoint> {
        if index >= self.len() {
            return None;
        }
        Some(DecodedPoint {
            x: self.x[index],
            y: self.y[index],
            z: self.z[index],
            intensity: self.intensity[index],
        })
    }

    /// Iterate over the points in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = DecodedPoint> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    #[inline]
    pub fn x(&self) -> &[f32] {
        &self.x
    }

    #[inline]
    pub fn y(&self) -> &[f32] {
        &self.y
    }

    #[inline]
    pub fn z(&self) -> &[f32] {
        &self.z
    }

    #[inline]
    pub fn intensity(&self) -> &[u8] {
        &self.intensity
    }
}

impl FromIterator<DecodedPoint> for PointBuffer {
    fn from_iter<I: IntoIterator<Item = DecodedPoint>>(iter: I) -> Self {
        let mut buf = PointBuffer::default();
        for p in iter {
            buf.push(p.x, p.y, p.z, p.intensity);
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_buffer_basic() {
        let mut buf = PointBuffer::with_capacity(100);
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 100);

        buf.push(1.0, 2.0, 3.0, 128);
        assert_eq!(buf.len(), 1);
        assert!(!buf.is_empty());
        assert_eq!(buf.x()[0], 1.0);
        assert_eq!(buf.y()[0], 2.0);
        assert_eq!(buf.z()[0], 3.0);
        assert_eq!(buf.intensity()[0], 128);

        buf.clear();
        assert!(buf.is_empty());
        // Allocation is kept for the next frame
        assert!(buf.capacity() >= 100);
    }

    #[test]
    fn test_point_buffer_grows_past_capacity() {
        let mut buf = PointBuffer::with_capacity(2);
        for i in 0..10 {
            buf.push(i as f32, 0.0, 0.0, i as u8);
        }
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.x()[9], 9.0);
    }

    #[test]
    fn test_extend_preserves_order() {
        let mut a = PointBuffer::default();
        a.push(1.0, 1.0, 1.0, 1);
        let mut b = PointBuffer::default();
        b.push(2.0, 2.0, 2.0, 2);
        b.push(3.0, 3.0, 3.0, 3);

        a.extend_from(&b);
        assert_eq!(a.x(), &[1.0, 2.0, 3.0]);
        assert_eq!(a.intensity(), &[1, 2, 3]);
    }

    #[test]
    fn test_iter_and_collect() {
        let points = vec![
            DecodedPoint { x: 0.5, y: 1.5, z: -2.0, intensity: 7 },
            DecodedPoint { x: 3.0, y: 0.0, z: 0.0, intensity: 255 },
        ];
        let buf: PointBuffer = points.iter().copied().collect();
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.iter().collect::<Vec<_>>(), points);
        assert_eq!(buf.get(1), Some(points[1]));
        assert_eq!(buf.get(2), None);
    }
}
