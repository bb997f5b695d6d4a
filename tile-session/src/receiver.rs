use std::sync::Arc;
use std::time::Instant;

use tile_wire::{read_frame, QuicPacket, FRAME_HEADER_SIZE};
use tokio::io::AsyncRead;

use crate::state::SessionState;

/// What one receive loop saw before it exited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    /// Frames decoded, including control frames
    pub frames: u64,
    /// Bytes read including length headers
    pub bytes: u64,
    /// Tiles stored in the buffer
    pub tiles: u64,
    /// The peer sent an end-of-stream frame
    pub end_of_stream: bool,
}

/// Read frames from one priority stream into the shared state
///
/// Exits on an end-of-stream frame, a clean EOF, or the first read or decode
/// failure. Tiles already committed stay in the buffer either way.
pub async fn receive_loop<R>(mut reader: R, label: &'static str, state: Arc<SessionState>) -> ReceiveSummary
where
    R: AsyncRead + Unpin,
{
    let mut summary = ReceiveSummary::default();

    loop {
        let body = match read_frame(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!(stream = label, "stream closed without end-of-stream");
                break;
            }
            Err(e) => {
                tracing::warn!(stream = label, error = %e, "read failed, stopping receive loop");
                break;
            }
        };
        let received_at = Instant::now();
        summary.bytes += (FRAME_HEADER_SIZE + body.len()) as u64;

        let packet = match QuicPacket::decode(&body) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!(stream = label, error = %e, "undecodable frame, stopping receive loop");
                break;
            }
        };
        summary.frames += 1;

        if let Some(push) = packet.push_status {
            tracing::trace!(stream = label, push, "push status");
        }

        if let Some(video) = packet.video {
            match video.validate() {
                Ok(()) => {
                    let arrival = state.ingest(video, body.len(), received_at).await;
                    if arrival.stored {
                        summary.tiles += 1;
                    }
                    tracing::debug!(
                        stream = label,
                        segment = arrival.segment,
                        tile = arrival.tile,
                        stored = arrival.stored,
                        "received tile"
                    );
                }
                Err(violation) => {
                    tracing::warn!(stream = label, error = %violation, "skipping invalid tile");
                }
            }
        }

        if packet.end_stream {
            summary.end_of_stream = true;
            tracing::debug!(stream = label, "end of stream");
            break;
        }
    }

    state.stream_ended().await;
    summary
}
