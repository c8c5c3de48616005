// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Socket setup shared by the ingestion units and the probe.

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

#[cfg(target_os = "linux")]
use tracing::warn;

/// Bind a UDP socket with address reuse and a large receive buffer.
///
/// The receive buffer request is best effort: the kernel may clamp it to
/// `net.core.rmem_max`, and a failure to enlarge it is only logged. Failure to
/// create or bind the socket is returned to the caller.
#[cfg(target_os = "linux")]
pub fn bind_udp(ip: Ipv4Addr, port: u16, recv_buffer: usize) -> std::io::Result<UdpSocket> {
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0) };
    if raw < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created descriptor owned by nobody else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let one: libc::c_int = 1;
    let err = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of_val(&one) as libc::socklen_t,
        )
    };
    if err != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let size = recv_buffer.min(libc::c_int::MAX as usize) as libc::c_int;
    let err = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &size as *const _ as *const libc::c_void,
            std::mem::size_of_val(&size) as libc::socklen_t,
        )
    };
    if err != 0 {
        warn!(
            "setsockopt SO_RCVBUF failed: {}",
            std::io::Error::last_os_error()
        );
    }

    let addr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(ip.octets()),
        },
        sin_zero: [0; 8],
    };
    let err = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if err != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(UdpSocket::from(fd))
}

#[cfg(not(target_os = "linux"))]
pub fn bind_udp(ip: Ipv4Addr, port: u16, _recv_buffer: usize) -> std::io::Result<UdpSocket> {
    UdpSocket::bind(SocketAddrV4::new(ip, port))
}

/// Receive buffer size actually granted by the kernel.
#[cfg(target_os = "linux")]
pub fn recv_buffer_size(socket: &UdpSocket) -> std::io::Result<usize> {
    use std::os::fd::AsRawFd;

    let mut size: libc::c_int = 0;
    let mut len = std::mem::size_of_val(&size) as libc::socklen_t;
    let err = unsafe {
        libc::getsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &mut size as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };
    if err != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(size as usize)
}

#[cfg(not(target_os = "linux"))]
pub fn recv_buffer_size(_socket: &UdpSocket) -> std::io::Result<usize> {
    Ok(0)
}

/// Wildcard address used for device sockets.
pub fn any_addr(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)
}
