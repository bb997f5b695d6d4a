//! Receive loops and session state over in-memory streams

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tile_abr::{AbrAlgorithm, AbrConfig};
use tile_buffer::Segment;
use tile_session::{receive_loop, SessionState};
use tile_wire::{encode_frame, write_frame, Priority, QuicPacket, VideoPacket, MAX_TILE};
use tokio::io::AsyncWriteExt;

fn state() -> Arc<SessionState> {
    let config = AbrConfig::new(vec![400, 800, 1600], AbrAlgorithm::Basic);
    Arc::new(SessionState::new("viewer", 10, &config).unwrap())
}

fn tile(segment: u32, tile: u16, size: usize) -> VideoPacket {
    VideoPacket {
        segment,
        tile,
        priority: if tile == 1 { Priority::High } else { Priority::Low },
        bitrate: 400,
        payload: Bytes::from(vec![0u8; size]),
    }
}

fn complete_indices(segments: impl Iterator<Item = u32>) -> Vec<u32> {
    segments.collect()
}

#[tokio::test]
async fn test_two_tiles_then_decision() {
    let state = state();
    let t0 = Instant::now();
    let at = |ms: u64| t0 + Duration::from_millis(ms);

    state.ingest(tile(1, 1, 50_000), 50_000, at(0)).await;
    {
        let inner = state.lock().await;
        assert_eq!(inner.buffer.complete_count(), 0);
    }
    state.ingest(tile(1, 2, 60_000), 60_000, at(100)).await;
    {
        let inner = state.lock().await;
        assert_eq!(inner.abr.latest_download_time(), 0.1);
        assert_eq!(inner.buffer.complete_count(), 0, "segment 1 still has missing tiles");
    }

    // The running average starts at zero, so sigma is 0 and the lowest
    // rung has nowhere lower to go
    assert_eq!(state.next_bitrate(2).await, 400);
    {
        let inner = state.lock().await;
        assert_eq!(inner.abr.chosen_bitrate(2), Some(400));
        assert_eq!(inner.abr.average_download_time(), Some(0.1));
    }

    for (i, t) in (3..=MAX_TILE).enumerate() {
        let ms = 200 + 100 * i as u64;
        state.ingest(tile(1, t, 1_000), 1_000, at(ms)).await;
        let inner = state.lock().await;
        assert_eq!(
            inner.buffer.is_complete(1),
            t == MAX_TILE,
            "segment 1 completes exactly with its last tile"
        );
    }

    state.ingest(tile(2, 1, 1_000), 1_000, at(500)).await;
    state.ingest(tile(2, 2, 1_000), 1_000, at(600)).await;
    {
        let inner = state.lock().await;
        let ready = complete_indices(
            inner
                .buffer
                .complete_segments_ready_for_playback()
                .map(Segment::index),
        );
        assert_eq!(ready, vec![1]);
        assert_eq!(inner.buffer.len(), 2);
    }

    // Steady 100ms arrivals give sigma = 1, short of the 1600/400 span the
    // bottom rung needs
    assert_eq!(state.next_bitrate(3).await, 400);

    // average = (0.1 * 4 + 0.1) / 4 = 0.125 against a 20ms arrival
    state.ingest(tile(2, 3, 1_000), 1_000, at(620)).await;
    assert_eq!(state.next_bitrate(4).await, 1600);
}

#[tokio::test]
async fn test_receive_loops_fill_shared_buffer() {
    let state = state();
    let (mut high_tx, high_rx) = tokio::io::duplex(1 << 20);
    let (mut low_tx, low_rx) = tokio::io::duplex(1 << 20);

    let high = tokio::spawn(receive_loop(high_rx, "high", state.clone()));
    let low = tokio::spawn(receive_loop(low_rx, "low", state.clone()));

    // Segment 2 arrives before segment 1 on the LOW stream
    for segment in [2, 1] {
        for t in 2..=MAX_TILE {
            let packet = QuicPacket::video("viewer", tile(segment, t, 64));
            write_frame(&mut low_tx, &packet).await.unwrap();
        }
    }
    for segment in [1, 2] {
        let packet = QuicPacket::video("viewer", tile(segment, 1, 64));
        write_frame(&mut high_tx, &packet).await.unwrap();
    }
    for writer in [&mut high_tx, &mut low_tx] {
        write_frame(writer, &QuicPacket::control("viewer", true))
            .await
            .unwrap();
    }

    let high = high.await.unwrap();
    let low = low.await.unwrap();
    assert!(high.end_of_stream && low.end_of_stream);
    assert_eq!(high.tiles, 2);
    assert_eq!(low.tiles, 8);
    assert_eq!(high.frames, 3);

    let inner = state.lock().await;
    let ready = complete_indices(
        inner
            .buffer
            .complete_segments_ready_for_playback()
            .map(Segment::index),
    );
    assert_eq!(ready, vec![1, 2]);
    assert_eq!(inner.streams_ended(), 2);
}

#[tokio::test]
async fn test_decode_error_stops_only_that_stream() {
    let state = state();
    let (mut high_tx, high_rx) = tokio::io::duplex(1 << 16);
    let (mut low_tx, low_rx) = tokio::io::duplex(1 << 16);

    let high = tokio::spawn(receive_loop(high_rx, "high", state.clone()));
    let low = tokio::spawn(receive_loop(low_rx, "low", state.clone()));

    write_frame(&mut low_tx, &QuicPacket::video("viewer", tile(1, 2, 16)))
        .await
        .unwrap();

    // Valid length header around a body with a corrupted checksum
    let mut frame = encode_frame(&QuicPacket::video("viewer", tile(1, 3, 16)));
    let last = frame.len() - 1;
    frame[last] ^= 0xff;
    low_tx.write_all(&frame).await.unwrap();

    let low = low.await.unwrap();
    assert!(!low.end_of_stream);
    assert_eq!(low.tiles, 1);

    // The HIGH stream keeps working and the committed tile survives
    write_frame(&mut high_tx, &QuicPacket::video("viewer", tile(1, 1, 16)))
        .await
        .unwrap();
    write_frame(&mut high_tx, &QuicPacket::control("viewer", true))
        .await
        .unwrap();
    let high = high.await.unwrap();
    assert!(high.end_of_stream);

    let inner = state.lock().await;
    assert_eq!(inner.buffer.segment(1).unwrap().filled(), 2);
}

#[tokio::test]
async fn test_out_of_range_tile_is_skipped() {
    let state = state();
    let (mut tx, rx) = tokio::io::duplex(1 << 16);
    let task = tokio::spawn(receive_loop(rx, "low", state.clone()));

    write_frame(&mut tx, &QuicPacket::video("viewer", tile(1, MAX_TILE + 1, 8)))
        .await
        .unwrap();
    write_frame(&mut tx, &QuicPacket::video("viewer", tile(0, 1, 8)))
        .await
        .unwrap();
    write_frame(&mut tx, &QuicPacket::video("viewer", tile(1, 2, 8)))
        .await
        .unwrap();
    drop(tx);

    let summary = task.await.unwrap();
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.tiles, 1);
    assert!(!summary.end_of_stream, "clean EOF without an end-of-stream frame");

    let inner = state.lock().await;
    assert_eq!(inner.buffer.len(), 1);
}
