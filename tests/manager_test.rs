// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Device manager driving real UDP ingestion units.

use edgefirst_lidarhub::{
    DeviceConfig, DeviceManager, FleetConfig, FrameStream, FrameView, IngestConfig, ProbeStatus,
    lss3::synth::{forward_record, packet},
    probe_udp,
};
use std::{
    net::{Ipv4Addr, UdpSocket},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

fn free_port() -> u16 {
    UdpSocket::bind("0.0.0.0:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn fleet(ports: &[(&str, u16)]) -> FleetConfig {
    let devices = ports
        .iter()
        .map(|(id, port)| DeviceConfig {
            id: id.to_string(),
            ip: Ipv4Addr::LOCALHOST,
            udp_port: *port,
        })
        .collect();
    let ingest = IngestConfig {
        recv_timeout_ms: 50,
        ..Default::default()
    };
    FleetConfig::new(devices, ingest).unwrap()
}

/// Send scans to `port` until a frame shows up on `stream`. The unit binds on
/// its own thread, so early datagrams may arrive before the socket exists.
fn wait_for_frame(stream: &FrameStream, port: u16) -> Vec<u8> {
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        sender
            .send_to(&packet(&[forward_record(42)], false), ("127.0.0.1", port))
            .unwrap();
        sender
            .send_to(&packet(&[forward_record(43)], true), ("127.0.0.1", port))
            .unwrap();
        if let Some(frame) = stream.recv_timeout(Duration::from_millis(50)) {
            return frame;
        }
    }
    panic!("no frame received on port {}", port);
}

#[test]
fn test_start_streams_frames() {
    let port = free_port();
    let manager = DeviceManager::new(fleet(&[("109", port)]));

    let stream = manager.start("109").unwrap();
    let data = wait_for_frame(&stream, port);
    let view = FrameView::parse(&data).unwrap();
    assert!(view.point_count >= 1);
    assert!(view.points().all(|p| p.intensity == 42 || p.intensity == 43));

    manager.stop("109");
    assert!(!manager.contains("109"));
}

#[test]
fn test_start_twice_binds_once() {
    let port = free_port();
    let manager = DeviceManager::new(fleet(&[("109", port)]));

    let first = manager.start("109").unwrap();
    wait_for_frame(&first, port);
    let second = manager.start("109").unwrap();
    assert!(first.same_stream(&second));
    assert_eq!(manager.len(), 1);

    // The unit holds the port, so an independent bind is refused
    let outcome = probe_udp(port, Duration::from_millis(100));
    assert_eq!(outcome.status, ProbeStatus::Error);

    let start = Instant::now();
    manager.stop("109");
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(manager.is_empty());

    // After stopping, the socket is released
    let deadline = Instant::now() + Duration::from_secs(2);
    while probe_udp(port, Duration::from_millis(10)).status == ProbeStatus::Error {
        assert!(Instant::now() < deadline, "port {} still held", port);
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_bind_failure_is_contained() {
    let holder = UdpSocket::bind("0.0.0.0:0").unwrap();
    let busy = holder.local_addr().unwrap().port();
    let good = free_port();
    let manager = DeviceManager::new(fleet(&[("busy", busy), ("good", good)]));

    let busy_stream = manager.start("busy").unwrap();
    let good_stream = manager.start("good").unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while manager.is_alive("busy") && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!manager.is_alive("busy"));
    assert!(busy_stream.is_closed());

    // The other device keeps streaming
    wait_for_frame(&good_stream, good);
    assert!(manager.is_alive("good"));

    manager.stop_all();
    assert!(manager.is_empty());
}

#[test]
fn test_lease_lifecycle() {
    let port = free_port();
    let manager = Arc::new(DeviceManager::new(fleet(&[("109", port)])));

    let viewer = manager.acquire("109").unwrap();
    wait_for_frame(viewer.stream(), port);
    assert!(manager.acquire("nope").is_none());

    drop(viewer);
    assert!(manager.is_empty());
}
