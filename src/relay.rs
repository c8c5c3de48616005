// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_lidarhub::{FrameStream, FrameView};
use tracing::{error, info, trace, warn};
use zenoh::bytes::{Encoding, ZBytes};

/// Forward every frame of a device stream, unchanged, as one zenoh message.
///
/// The stream has a single consumer (this task); zenoh fans each message out
/// to every subscriber. Returns once the stream is closed.
pub async fn relay_thread(
    device_id: String,
    stream: FrameStream,
    publ: zenoh::pubsub::Publisher<'static>,
) {
    let mut relayed = 0u64;

    while let Some(frame) = stream.recv().await {
        match FrameView::parse(&frame) {
            Ok(view) => trace!(
                device = %device_id,
                frame_id = view.frame_id,
                n_points = view.point_count,
                "relaying frame"
            ),
            Err(e) => {
                warn!(device = %device_id, "dropping malformed frame: {}", e);
                continue;
            }
        }

        match publ
            .put(ZBytes::from(frame))
            .encoding(Encoding::APPLICATION_OCTET_STREAM)
            .await
        {
            Ok(_) => relayed += 1,
            Err(e) => error!(device = %device_id, "{} publish error: {:?}", publ.key_expr(), e),
        }
    }

    info!(device = %device_id, relayed, "frame stream closed");
}
