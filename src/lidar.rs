// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common LiDAR types and the driver trait.
//!
//! This module holds the crate-wide error type and the [`LidarDriver`]
//! abstraction implemented by sensor drivers.

use crate::assembler::Frame;
use std::fmt;

/// Common error type for LiDAR operations
///
/// Decoding never surfaces these for malformed sensor data; they are used for
/// I/O, configuration and the fallible helpers that the decoder wraps.
#[derive(Debug)]
pub enum Error {
    /// I/O error (socket, file operations)
    Io(std::io::Error),
    /// Invalid packet data
    InvalidPacket(String),
    /// Sensor trailer carried an impossible calendar value
    InvalidTimestamp(String),
    /// Unexpected end of data at given byte position
    UnexpectedEnd(usize),
    /// Configuration error
    Config(String),
    /// Malformed JSON configuration
    Json(serde_json::Error),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
            Error::InvalidTimestamp(msg) => write!(f, "invalid timestamp: {}", msg),
            Error::UnexpectedEnd(len) => write!(f, "unexpected end of data at {} bytes", len),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Json(err) => write!(f, "json error: {}", err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

/// Trait for LiDAR driver implementations
///
/// A driver consumes raw UDP payloads and internally handles packet parsing,
/// point reconstruction and frame assembly.
pub trait LidarDriver: Send {
    /// Process a UDP packet, returning a complete frame when ready
    ///
    /// # Returns
    /// - `Ok(None)` if more packets are needed to complete the frame
    /// - `Ok(Some(frame))` when a complete frame is ready
    /// - `Err` on packet errors the driver chooses to surface
    fn process_packet(&mut self, data: &[u8]) -> Result<Option<Frame>, Error>;
}
