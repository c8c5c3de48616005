// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Bounded frame channel between an ingestion unit and its consumer.
//!
//! The channel carries serialized frames (see [`crate::formats`]). It is
//! single-producer (the ingestion unit) and intended single-consumer (the
//! relay). The producer never blocks: when the channel is full the frame being
//! pushed is dropped. Dropping the newest frame rather than the oldest is a
//! load-shedding contract: a stalled consumer costs frames, never ingestion
//! liveness.

use kanal::{Receiver, Sender};
use std::{sync::Arc, time::Duration};

/// Default channel capacity in frames.
pub const DEFAULT_CAPACITY: usize = 5;

/// Result of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued
    Sent,
    /// Channel full, frame discarded
    Dropped,
    /// Consumer side closed the channel; the producer should stop
    Closed,
}

/// Producer half, owned by the ingestion unit.
#[derive(Debug)]
pub struct FrameSender {
    tx: Sender<Vec<u8>>,
}

impl FrameSender {
    /// Push a serialized frame without blocking.
    pub fn push(&self, frame: Vec<u8>) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(true) => PushOutcome::Sent,
            Ok(false) => PushOutcome::Dropped,
            Err(_) => PushOutcome::Closed,
        }
    }

    /// Returns true once the consumer side has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half handed out by the device manager.
///
/// Cloning yields another handle to the same channel; handles compare equal
/// with [`FrameStream::same_stream`]. Concurrent draining from several clones
/// splits frames between them, so fan-out belongs downstream.
#[derive(Debug, Clone)]
pub struct FrameStream {
    rx: Arc<Receiver<Vec<u8>>>,
}

impl FrameStream {
    /// Returns true if both handles refer to the same channel.
    pub fn same_stream(&self, other: &FrameStream) -> bool {
        Arc::ptr_eq(&self.rx, &other.rx)
    }

    /// Take the oldest queued frame, if any.
    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok().flatten()
    }

    /// Wait up to `timeout` for a frame.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Wait for the next frame. Returns `None` once the channel is closed or
    /// the producer is gone and the queue is drained.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        self.rx.as_async().recv().await.ok()
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.rx.capacity()
    }

    /// Close the channel from the consumer side. Queued frames are discarded
    /// and any further push reports [`PushOutcome::Closed`].
    pub fn close(&self) {
        let _ = self.rx.close();
    }

    /// Returns true once the channel is closed or the producer is gone.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed() || self.rx.is_disconnected()
    }
}

/// Create a bounded frame channel.
pub fn channel(capacity: usize) -> (FrameSender, FrameStream) {
    let (tx, rx) = kanal::bounded(capacity);
    (FrameSender { tx }, FrameStream { rx: Arc::new(rx) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_recv() {
        let (tx, rx) = channel(DEFAULT_CAPACITY);
        assert_eq!(rx.capacity(), 5);
        assert!(rx.is_empty());

        assert_eq!(tx.push(vec![1, 2, 3]), PushOutcome::Sent);
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv(), Some(vec![1, 2, 3]));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_full_channel_drops_newest() {
        let (tx, rx) = channel(DEFAULT_CAPACITY);
        for marker in 0..5u8 {
            assert_eq!(tx.push(vec![marker]), PushOutcome::Sent);
        }
        assert_eq!(tx.push(vec![99]), PushOutcome::Dropped);
        assert_eq!(rx.len(), 5);

        let drained: Vec<_> = std::iter::from_fn(|| rx.try_recv()).collect();
        assert_eq!(drained, vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn test_close_from_consumer() {
        let (tx, rx) = channel(2);
        rx.close();
        assert!(rx.is_closed());
        assert!(tx.is_closed());
        assert_eq!(tx.push(vec![1]), PushOutcome::Closed);
    }

    #[test]
    fn test_producer_gone() {
        let (tx, rx) = channel(2);
        assert_eq!(tx.push(vec![1]), PushOutcome::Sent);
        drop(tx);
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)), Some(vec![1]));
        assert!(rx.is_closed());
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_same_stream() {
        let (_tx, a) = channel(1);
        let (_tx2, b) = channel(1);
        assert!(a.same_stream(&a.clone()));
        assert!(!a.same_stream(&b));
    }

    #[tokio::test]
    async fn test_async_recv() {
        let (tx, rx) = channel(1);
        tx.push(vec![5]);
        assert_eq!(rx.recv().await, Some(vec![5]));
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
