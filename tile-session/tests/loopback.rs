//! Full client session against the reference tile server over loopback QUIC

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tile_abr::AbrAlgorithm;
use tile_session::{ClientConfig, ServerConfig, Session, TileServer};
use tile_wire::MAX_TILE;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tile-loopback-{}-{}", std::process::id(), name));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Start a server with a fresh certificate, returning it and the CA file
fn start_server(name: &str, push: bool) -> (Arc<TileServer>, PathBuf) {
    tile_quic::install_crypto_provider();
    let generated = tile_quic::generate_self_signed(vec!["localhost".to_string()]).unwrap();
    let ca_path = temp_dir(name).join("ca.pem");
    std::fs::write(&ca_path, &generated.cert_pem).unwrap();

    let quic = tile_quic::server_config(vec![generated.cert], generated.key).unwrap();
    let config = ServerConfig {
        listen: "127.0.0.1:0".to_string(),
        push,
        ..Default::default()
    };
    let server = Arc::new(TileServer::bind(config, quic).unwrap());
    let running = server.clone();
    tokio::spawn(async move { running.run().await });
    (server, ca_path)
}

fn client_config(server: &TileServer, ca_cert: PathBuf, algorithm: AbrAlgorithm) -> ClientConfig {
    ClientConfig {
        server_address: server.local_addr().unwrap().to_string(),
        ca_cert: Some(ca_cert),
        algorithm,
        segments: 4,
        // Long enough that nothing plays out during the session
        segment_duration_secs: 3600.0,
        client_id: Some("loopback".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_session_completes_every_segment() {
    let (server, ca_cert) = start_server("basic", false);
    let session = Session::new(client_config(&server, ca_cert, AbrAlgorithm::Basic)).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(30), session.run())
        .await
        .expect("session should finish")
        .unwrap();

    assert_eq!(report.client_id, "loopback");
    assert_eq!(report.segments_requested, 4);
    assert_eq!(report.segments_completed, 4);
    assert_eq!(report.segments_played, 0);
    assert_eq!(report.channel_usage, None);
    assert_eq!(
        report.bitrates.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(report
        .bitrates
        .iter()
        .all(|(_, b)| [400, 800, 1600].contains(b)));

    assert!(report.high.end_of_stream, "server echoes end-of-stream on HIGH");
    assert!(report.low.end_of_stream, "server echoes end-of-stream on LOW");
    assert_eq!(report.high.tiles, 4);
    assert_eq!(report.low.tiles, 4 * u64::from(MAX_TILE - 1));
    assert!(report.bytes > 0);

    let inner = session.state().lock().await;
    assert_eq!(inner.buffer.complete_count(), 4);
    let tile = inner.buffer.segment(1).unwrap().tile(1).unwrap();
    assert_eq!(tile.name, format!("loopback/segment1_tile1_{}", report.bitrates[0].1));

    server.close();
}

#[tokio::test]
async fn test_session_with_non_adaptive_strategy() {
    let (server, ca_cert) = start_server("bola", true);
    let session = Session::new(client_config(&server, ca_cert, AbrAlgorithm::Bola)).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(30), session.run())
        .await
        .expect("session should finish")
        .unwrap();

    assert_eq!(report.segments_completed, 4);
    assert!(report.bitrates.iter().all(|(_, b)| *b == 400));

    server.close();
}

#[tokio::test]
async fn test_played_segments_leave_the_buffer() {
    let (server, ca_cert) = start_server("playback", false);
    let config = ClientConfig {
        segment_duration_secs: 0.01,
        linger_secs: 0.2,
        link_mbps: Some(1000.0),
        ..client_config(&server, ca_cert, AbrAlgorithm::BufferOccupation)
    };
    let session = Session::new(config).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(30), session.run())
        .await
        .expect("session should finish")
        .unwrap();

    assert_eq!(report.segments_completed, 4);
    assert_eq!(report.segments_played, 4);
    let usage = report.channel_usage.expect("link capacity is configured");
    assert!(usage > 0.0);

    let inner = session.state().lock().await;
    assert_eq!(inner.buffer.base_offset(), 4);
    assert_eq!(inner.buffer.complete_count(), 0);
    assert_eq!(inner.abr.buffer_level(), 0.0);
    assert_eq!(inner.abr.history_len(), 0);

    server.close();
}
