// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Packet source abstraction for the ingestion loop.
//!
//! The ingestion loop does not care where datagrams come from:
//!
//! - **Live operation**: [`UdpSource`] over a bound device socket
//! - **Testing**: [`ScriptedSource`] replaying packets, optionally with stalls
//!   that exercise the receive-timeout path
//! - **Benchmarking**: [`LoopSource`] cycling a packet set
//!
//! # Example
//!
//! ```ignore
//! use edgefirst_lidarhub::packet_source::{PacketSource, UdpSource};
//!
//! let mut source = UdpSource::bind_device(2309, 8 * 1024 * 1024)?;
//! let mut buf = [0u8; 1500];
//! while source.has_more() {
//!     let len = source.recv(&mut buf).await?;
//!     // Decode buf[..len]
//! }
//! ```

use crate::{common, lidar::Error};
use std::{
    collections::VecDeque,
    future::Future,
    net::{Ipv4Addr, SocketAddr},
    pin::Pin,
    time::Duration,
};
use tracing::debug;

/// Trait for packet sources.
///
/// `recv` must be cancellation safe: the ingestion loop races it against a
/// timeout and drops the future when the timeout wins.
pub trait PacketSource: Send {
    /// Receive the next packet into the provided buffer.
    ///
    /// # Returns
    /// - `Ok(len)` - Number of bytes received
    /// - `Err` - I/O or source error
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>>;

    /// Check if more packets are available.
    ///
    /// Live sockets always return `true`; finite sources return `false` once
    /// exhausted, which ends the ingestion loop.
    fn has_more(&self) -> bool;
}

/// UDP socket packet source for live sensor operation.
pub struct UdpSource {
    socket: tokio::net::UdpSocket,
}

impl UdpSource {
    /// Wrap an already bound std socket. Must be called within a tokio
    /// runtime.
    pub fn from_std(socket: std::net::UdpSocket) -> Result<Self, Error> {
        socket.set_nonblocking(true)?;
        Ok(Self {
            socket: tokio::net::UdpSocket::from_std(socket)?,
        })
    }

    /// Bind the wildcard address on `port` with address reuse and the
    /// requested receive buffer.
    pub fn bind_device(port: u16, recv_buffer: usize) -> Result<Self, Error> {
        Self::bind(Ipv4Addr::UNSPECIFIED, port, recv_buffer)
    }

    /// Bind a specific local address.
    pub fn bind(ip: Ipv4Addr, port: u16, recv_buffer: usize) -> Result<Self, Error> {
        let socket = common::bind_udp(ip, port, recv_buffer)?;
        match common::recv_buffer_size(&socket) {
            Ok(granted) if granted < recv_buffer => debug!(
                port,
                requested = recv_buffer,
                granted,
                "receive buffer clamped, raise net.core.rmem_max"
            ),
            Ok(_) => {}
            Err(e) => debug!(port, "unable to read receive buffer size: {}", e),
        }
        Self::from_std(socket)
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }
}

impl PacketSource for UdpSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            let (len, _src) = self.socket.recv_from(buf).await?;
            Ok(len)
        })
    }

    fn has_more(&self) -> bool {
        true
    }
}

/// One step of a [`ScriptedSource`].
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver a datagram
    Packet(Vec<u8>),
    /// Produce nothing for this long, then move on
    Stall(Duration),
    /// Fail the receive with an I/O error
    Fault,
}

/// Scripted packet source for tests and benchmarks.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Deliver the given packets back to back.
    pub fn from_packets(packets: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self::new(packets.into_iter().map(Step::Packet))
    }

    /// Number of steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl PacketSource for ScriptedSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            // A stall only completes its sleep when polled to the end, so a
            // timeout that wins the race leaves the step in place for the next
            // call, just as a socket keeps an unread datagram.
            if let Some(Step::Stall(duration)) = self.steps.front() {
                tokio::time::sleep(*duration).await;
                self.steps.pop_front();
                return Ok(0);
            }

            match self.steps.pop_front() {
                Some(Step::Packet(packet)) => {
                    let len = packet.len().min(buf.len());
                    buf[..len].copy_from_slice(&packet[..len]);
                    Ok(len)
                }
                Some(Step::Fault) => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "scripted fault",
                ))),
                Some(Step::Stall(_)) | None => Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no more packets",
                ))),
            }
        })
    }

    fn has_more(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// Replays a packet set cyclically until `total` packets have been delivered.
///
/// Useful for driving the ingestion loop at full speed in benchmarks.
pub struct LoopSource {
    packets: Vec<Vec<u8>>,
    next: usize,
    remaining: usize,
}

impl LoopSource {
    pub fn new(packets: Vec<Vec<u8>>, total: usize) -> Self {
        let remaining = if packets.is_empty() { 0 } else { total };
        Self {
            packets,
            next: 0,
            remaining,
        }
    }
}

impl PacketSource for LoopSource {
    fn recv<'a>(
        &'a mut self,
        buf: &'a mut [u8],
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + 'a>> {
        Box::pin(async move {
            if self.remaining == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "no more packets",
                )));
            }
            let packet = &self.packets[self.next];
            let len = packet.len().min(buf.len());
            buf[..len].copy_from_slice(&packet[..len]);
            self.next = (self.next + 1) % self.packets.len();
            self.remaining -= 1;
            Ok(len)
        })
    }

    fn has_more(&self) -> bool {
        self.remaining > 0
    }
}
