//! State shared by the receive loops and the session driver
//!
//! One lock covers the reassembly buffer and the ABR engine so a tile
//! insertion and its timing samples land together, before the driver's next
//! bitrate decision can observe them.

use std::time::Instant;

use tile_abr::{AbrConfig, AbrEngine, LadderError};
use tile_buffer::{ReassemblyBuffer, TileArrival};
use tile_metrics::ThroughputMeter;
use tile_wire::VideoPacket;
use tokio::sync::{Mutex, MutexGuard, Notify};

/// Everything guarded by the session lock
#[derive(Debug)]
pub struct SessionInner {
    pub buffer: ReassemblyBuffer,
    pub abr: AbrEngine,
    pub meter: ThroughputMeter,
    segment_duration_secs: f64,
    streams_ended: usize,
}

impl SessionInner {
    /// Number of receive loops that have exited
    pub fn streams_ended(&self) -> usize {
        self.streams_ended
    }
}

#[derive(Debug)]
pub struct SessionState {
    inner: Mutex<SessionInner>,
    updated: Notify,
}

impl SessionState {
    pub fn new(
        client_id: impl Into<String>,
        window_limit: usize,
        abr_config: &AbrConfig,
    ) -> Result<Self, LadderError> {
        let abr = AbrEngine::new(abr_config)?;
        Ok(Self {
            inner: Mutex::new(SessionInner {
                buffer: ReassemblyBuffer::new(client_id, window_limit),
                abr,
                meter: ThroughputMeter::new(),
                segment_duration_secs: abr_config.segment_duration_secs,
                streams_ended: 0,
            }),
            updated: Notify::new(),
        })
    }

    pub async fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().await
    }

    /// Insert a received tile and record its samples
    ///
    /// `frame_len` is the length of the frame body the tile arrived in.
    pub async fn ingest(
        &self,
        packet: VideoPacket,
        frame_len: usize,
        received_at: Instant,
    ) -> TileArrival {
        let arrival = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            inner.meter.record(frame_len);

            let arrival = inner.buffer.insert_tile(packet, received_at);
            if arrival.stored {
                inner.abr.record_download_size(frame_len as u64);
                if let Some(elapsed) = arrival.download_time {
                    inner
                        .abr
                        .record_download_time(elapsed.as_secs_f64(), arrival.segment);
                }
                let level = inner.buffer.buffered_seconds(inner.segment_duration_secs);
                inner.abr.observe_buffer_level(level);
            }
            inner.abr.prune_through(inner.buffer.base_offset());
            arrival
        };
        self.updated.notify_waiters();
        arrival
    }

    /// Decide the bitrate for `segment` from the samples recorded so far
    pub async fn next_bitrate(&self, segment: u32) -> u32 {
        self.inner.lock().await.abr.next_bitrate(segment)
    }

    /// Drop consumed segments and their ABR records
    pub async fn evict_through(&self, index: u32) {
        let mut inner = self.inner.lock().await;
        inner.buffer.evict_through(index);
        let base = inner.buffer.base_offset();
        inner.abr.prune_through(base);
        let level = inner.buffer.buffered_seconds(inner.segment_duration_secs);
        inner.abr.observe_buffer_level(level);
    }

    /// Called by a receive loop as it exits
    pub async fn stream_ended(&self) {
        self.inner.lock().await.streams_ended += 1;
        self.updated.notify_waiters();
    }

    /// Wait until `segment` has every tile
    ///
    /// Returns false if the segment was evicted first or a receive loop
    /// ended, since the missing tiles can no longer arrive.
    pub async fn wait_for_segment(&self, segment: u32) -> bool {
        loop {
            let notified = self.updated.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let inner = self.inner.lock().await;
                if inner.buffer.is_complete(segment) {
                    return true;
                }
                if segment <= inner.buffer.base_offset() || inner.streams_ended > 0 {
                    return false;
                }
            }

            notified.await;
        }
    }
}
