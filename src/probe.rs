// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Raw UDP connectivity probe.
//!
//! Binds the port on its own, waits for one datagram and reports what
//! arrived. Used to check that a sensor is streaming to the expected port
//! before its unit is started; a port already held by a running unit reports
//! an error.

use serde::Serialize;
use std::{io::ErrorKind, net::UdpSocket, time::Duration};
use tracing::debug;

use crate::common::any_addr;

/// Default time to wait for a datagram.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    /// A datagram arrived
    Ok,
    /// Nothing arrived before the timeout
    Fail,
    /// The port could not be bound or read
    Error,
}

/// Probe result, serialized as `{"status": "...", "msg": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub msg: String,
}

impl ProbeOutcome {
    fn new(status: ProbeStatus, msg: impl Into<String>) -> Self {
        Self {
            status,
            msg: msg.into(),
        }
    }
}

/// Wait up to `timeout` for one datagram on `port`.
pub fn probe_udp(port: u16, timeout: Duration) -> ProbeOutcome {
    let socket = match UdpSocket::bind(any_addr(port)) {
        Ok(socket) => socket,
        Err(e) => return ProbeOutcome::new(ProbeStatus::Error, e.to_string()),
    };
    if let Err(e) = socket.set_read_timeout(Some(timeout)) {
        return ProbeOutcome::new(ProbeStatus::Error, e.to_string());
    }

    let mut buf = [0u8; 1024];
    let outcome = match socket.recv_from(&mut buf) {
        Ok((len, src)) => {
            ProbeOutcome::new(ProbeStatus::Ok, format!("received {} bytes from {}", len, src))
        }
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            ProbeOutcome::new(ProbeStatus::Fail, "timeout: no data received")
        }
        Err(e) => ProbeOutcome::new(ProbeStatus::Error, e.to_string()),
    };

    debug!(port, status = ?outcome.status, "{}", outcome.msg);
    outcome
}
