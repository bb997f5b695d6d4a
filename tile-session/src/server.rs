//! Reference tile server
//!
//! Answers every tile request on the stream it arrived on with a synthetic
//! payload sized from the requested bitrate. Used by the `tile-server`
//! binary and the loopback tests.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tile_wire::{
    read_frame, write_frame, FrameError, QuicPacket, VideoPacket, MAX_FRAME_SIZE, MAX_TILE,
};

use crate::config::ServerConfig;
use crate::error::{ConfigError, SessionError};

/// Room left in a frame for the packet header fields
const FRAME_OVERHEAD: usize = 1024;

/// Payload bytes for one tile of `bitrate`
///
/// `bitrate * segment_duration * tile_scale` bytes per segment, split evenly
/// across the tiles.
pub fn tile_payload_len(bitrate: u32, segment_duration_secs: f64, tile_scale: f64) -> usize {
    let bytes = bitrate as f64 * segment_duration_secs * tile_scale / MAX_TILE as f64;
    (bytes.max(0.0).round() as usize).min(MAX_FRAME_SIZE - FRAME_OVERHEAD)
}

pub struct TileServer {
    endpoint: quinn::Endpoint,
    config: Arc<ServerConfig>,
}

impl TileServer {
    /// Bind the QUIC endpoint on `config.listen`
    pub fn bind(config: ServerConfig, quic: quinn::ServerConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("listen address {}: {}", config.listen, e)))?;
        let endpoint = quinn::Endpoint::server(quic, addr)?;
        Ok(Self {
            endpoint,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SessionError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Accept connections until the endpoint is closed
    pub async fn run(&self) {
        tracing::info!(addr = ?self.endpoint.local_addr().ok(), "tile server listening");

        while let Some(incoming) = self.endpoint.accept().await {
            let config = self.config.clone();
            tokio::spawn(async move {
                let conn = match incoming.await {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "handshake failed");
                        return;
                    }
                };
                let remote = conn.remote_address();
                tracing::info!(%remote, "client connected");
                if let Err(e) = serve_connection(conn, config).await {
                    tracing::warn!(%remote, error = %e, "connection ended with error");
                } else {
                    tracing::info!(%remote, "client disconnected");
                }
            });
        }
    }

    /// Stop accepting and close every connection
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"shutdown");
    }
}

async fn serve_connection(
    conn: quinn::Connection,
    config: Arc<ServerConfig>,
) -> Result<(), SessionError> {
    loop {
        let (send, recv) = match conn.accept_bi().await {
            Ok(streams) => streams,
            Err(quinn::ConnectionError::ApplicationClosed(_))
            | Err(quinn::ConnectionError::LocallyClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let config = config.clone();
        tokio::spawn(async move {
            let stream = send.id();
            match serve_stream(send, recv, &config).await {
                Ok(served) => tracing::debug!(%stream, served, "stream finished"),
                Err(e) => tracing::debug!(%stream, error = %e, "stream aborted"),
            }
        });
    }
}

/// Answer requests on one stream until the client ends it
///
/// Returns the number of tiles served.
async fn serve_stream(
    mut send: quinn::SendStream,
    mut recv: quinn::RecvStream,
    config: &ServerConfig,
) -> Result<u64, SessionError> {
    let mut served = 0;

    while let Some(body) = read_frame(&mut recv).await? {
        let packet = QuicPacket::decode(&body).map_err(FrameError::from)?;

        match packet.video {
            Some(request) => {
                if let Err(violation) = request.validate() {
                    tracing::warn!(client = %packet.stream_id, error = %violation, "ignoring request");
                } else {
                    let len = tile_payload_len(
                        request.bitrate,
                        config.segment_duration_secs,
                        config.tile_scale,
                    );
                    let response = QuicPacket {
                        stream_id: packet.stream_id.clone(),
                        end_stream: false,
                        video: Some(VideoPacket {
                            payload: Bytes::from(vec![0u8; len]),
                            ..request
                        }),
                        push_status: Some(config.push),
                    };
                    write_frame(&mut send, &response).await?;
                    served += 1;
                }
            }
            None if !packet.end_stream => {
                tracing::debug!(client = %packet.stream_id, "hello");
            }
            None => {}
        }

        if packet.end_stream {
            write_frame(&mut send, &QuicPacket::control(packet.stream_id, true)).await?;
            break;
        }
    }

    send.finish()?;
    Ok(served)
}
