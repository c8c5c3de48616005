// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! End-to-end ingestion over a real UDP socket on the loopback interface.

use edgefirst_lidarhub::{
    FrameView,
    config::IngestConfig,
    ingest::IngestUnit,
    lss3::synth::{forward_record, measurement_record, packet},
    packet_source::UdpSource,
    stream::channel,
};
use std::{
    net::{Ipv4Addr, UdpSocket},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

fn config() -> IngestConfig {
    IngestConfig {
        recv_timeout_ms: 50,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_udp_packets_produce_frame() {
    let source = UdpSource::bind(Ipv4Addr::LOCALHOST, 0, 1024 * 1024).unwrap();
    let addr = source.local_addr().unwrap();

    let (tx, rx) = channel(5);
    let running = Arc::new(AtomicBool::new(true));
    let unit = tokio::spawn(IngestUnit::new("loopback", source, tx, running.clone(), &config()).run());

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let scan = [
        packet(&[forward_record(10), forward_record(11)], false),
        packet(&[forward_record(12)], false),
        packet(&[measurement_record(1000, 2, -400, 20_000, 13)], false),
        packet(&[forward_record(14)], true),
    ];
    for datagram in &scan {
        sender.send_to(datagram, addr).unwrap();
    }
    // Unrelated traffic is ignored
    sender.send_to(b"hello", addr).unwrap();

    let data = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no frame within 5s")
        .expect("stream closed");
    let view = FrameView::parse(&data).unwrap();
    assert_eq!(view.frame_id, 0);
    assert_eq!(view.point_count, 5);
    assert_eq!(data.len(), 8 + 5 * 16);

    let intensities: Vec<u8> = view.points().map(|p| p.intensity).collect();
    assert_eq!(intensities, vec![10, 11, 12, 13, 14]);

    running.store(false, Ordering::Release);
    let stats = tokio::time::timeout(Duration::from_secs(2), unit)
        .await
        .expect("unit ignored cancellation")
        .unwrap();
    assert_eq!(stats.frames_sent, 1);
    assert!(stats.short_packets >= 1);
}

#[tokio::test]
async fn test_consecutive_frames_increment_id() {
    let source = UdpSource::bind(Ipv4Addr::LOCALHOST, 0, 1024 * 1024).unwrap();
    let addr = source.local_addr().unwrap();

    let (tx, rx) = channel(5);
    let running = Arc::new(AtomicBool::new(true));
    let unit = tokio::spawn(IngestUnit::new("loopback", source, tx, running.clone(), &config()).run());

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    for i in 0..3u8 {
        sender
            .send_to(&packet(&[forward_record(i)], false), addr)
            .unwrap();
        sender.send_to(&packet(&[], true), addr).unwrap();
    }

    let mut ids = Vec::new();
    while ids.len() < 3 {
        let data = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("missing frame")
            .expect("stream closed");
        ids.push(FrameView::parse(&data).unwrap().frame_id);
    }
    assert_eq!(ids, vec![0, 1, 2]);

    running.store(false, Ordering::Release);
    unit.await.unwrap();
}
