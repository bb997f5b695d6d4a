//! Client session driver
//!
//! Opens the HIGH and LOW streams, requests each segment tile by tile at the
//! bitrate the ABR engine picks, and waits for the tiles to come back before
//! deciding the next segment. Complete segments are played out on a
//! [`PlaybackClock`] and evicted once consumed.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tile_metrics::{format_bytes, ConnectionStatsLogger};
use tile_wire::{write_frame, Priority, QuicPacket, VideoPacket, MAX_TILE};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::playback::PlaybackClock;
use crate::receiver::{receive_loop, ReceiveSummary};
use crate::state::SessionState;

/// Outcome of one client session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub client_id: String,
    pub segments_requested: u32,
    pub segments_completed: u32,
    /// Segments played out and evicted from the buffer
    pub segments_played: u32,
    /// (segment, bitrate) in request order
    pub bitrates: Vec<(u32, u32)>,
    /// Frame body bytes received across both streams
    pub bytes: u64,
    pub elapsed: Duration,
    pub throughput_bps: f64,
    /// Share of the configured link capacity, when one is configured
    pub channel_usage: Option<f64>,
    pub high: ReceiveSummary,
    pub low: ReceiveSummary,
}

pub struct Session {
    config: ClientConfig,
    client_id: String,
    state: Arc<SessionState>,
}

impl Session {
    pub fn new(config: ClientConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let client_id = config.resolved_client_id();
        let state = SessionState::new(&client_id, config.window_limit, &config.abr_config())?;
        Ok(Self {
            config,
            client_id,
            state: Arc::new(state),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Connect to the configured server and run the whole session
    pub async fn run(&self) -> Result<SessionReport, SessionError> {
        let client_config = tile_quic::create_client_config(self.config.ca_cert.as_deref())?;
        let remote = resolve(&self.config.server_address).await?;
        let bind = if remote.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };

        let mut endpoint = quinn::Endpoint::client(bind)?;
        endpoint.set_default_client_config(client_config);

        tracing::info!(client = %self.client_id, %remote, "connecting");
        let conn = endpoint.connect(remote, &self.config.server_name)?.await?;

        let result = self.stream(&conn).await;
        conn.close(0u32.into(), b"done");
        endpoint.wait_idle().await;
        result
    }

    /// Run the session over an established connection
    pub async fn stream(&self, conn: &quinn::Connection) -> Result<SessionReport, SessionError> {
        let (mut high_send, high_recv) = conn.open_bi().await?;
        let (mut low_send, low_recv) = conn.open_bi().await?;

        // The peer only sees a stream once something is written to it
        let hello = QuicPacket::control(&self.client_id, false);
        write_frame(&mut high_send, &hello).await?;
        write_frame(&mut low_send, &hello).await?;

        let high = tokio::spawn(receive_loop(high_recv, "high", self.state.clone()));
        let low = tokio::spawn(receive_loop(low_recv, "low", self.state.clone()));

        let started = Instant::now();
        let mut stats = ConnectionStatsLogger::new();
        let mut bitrates = Vec::with_capacity(self.config.segments as usize);
        let mut completed = 0;
        let mut playback = PlaybackClock::new(self.config.segment_duration_secs);

        for segment in 1..=self.config.segments {
            let bitrate = self.state.next_bitrate(segment).await;
            bitrates.push((segment, bitrate));

            for tile in 1..=MAX_TILE {
                let (writer, priority) = if tile == 1 {
                    (&mut high_send, Priority::High)
                } else {
                    (&mut low_send, Priority::Low)
                };
                let request = VideoPacket::request(segment, tile, priority, bitrate);
                write_frame(writer, &QuicPacket::video(&self.client_id, request)).await?;
            }

            match tokio::time::timeout(
                self.config.segment_timeout(),
                self.state.wait_for_segment(segment),
            )
            .await
            {
                Ok(true) => {
                    completed += 1;
                    playback.start(Instant::now());
                    tracing::info!(segment, bitrate, "segment complete");
                }
                Ok(false) => {
                    tracing::warn!(segment, "receive stream ended before segment completed");
                    break;
                }
                Err(_) => tracing::warn!(segment, "timed out waiting for segment"),
            }
            self.play_out(&mut playback, segment).await;
            stats.log(conn, &self.client_id);
        }

        if !self.config.linger().is_zero() {
            tokio::time::sleep(self.config.linger()).await;
            self.play_out(&mut playback, self.config.segments).await;
        }

        let bye = QuicPacket::control(&self.client_id, true);
        write_frame(&mut high_send, &bye).await?;
        write_frame(&mut low_send, &bye).await?;
        high_send.finish()?;
        low_send.finish()?;

        let grace = self.config.segment_timeout();
        let high = join_receiver(high, "high", grace).await?;
        let low = join_receiver(low, "low", grace).await?;

        let elapsed = started.elapsed();
        let (bytes, throughput_bps) = {
            let inner = self.state.lock().await;
            (inner.meter.bytes(), inner.meter.throughput_bps())
        };

        let channel_usage = self.config.channel_usage(throughput_bps);

        tracing::info!(
            client = %self.client_id,
            completed,
            requested = self.config.segments,
            played = playback.played(),
            received = %format_bytes(bytes),
            throughput_bps = throughput_bps as u64,
            channel_usage = ?channel_usage,
            "session finished"
        );

        Ok(SessionReport {
            client_id: self.client_id.clone(),
            segments_requested: self.config.segments,
            segments_completed: completed,
            segments_played: playback.played(),
            bitrates,
            bytes,
            elapsed,
            throughput_bps,
            channel_usage,
            high,
            low,
        })
    }

    /// Evict the segments the play head has passed, up to `requested`
    async fn play_out(&self, playback: &mut PlaybackClock, requested: u32) {
        if let Some(played) = playback.advance(Instant::now(), requested) {
            tracing::debug!(played, "segments played out");
            self.state.evict_through(played).await;
        }
    }
}

/// Wait for a receive loop to see end-of-stream, aborting it after `grace`
async fn join_receiver(
    mut handle: JoinHandle<ReceiveSummary>,
    label: &str,
    grace: Duration,
) -> Result<ReceiveSummary, SessionError> {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(summary) => Ok(summary?),
        Err(_) => {
            tracing::warn!(stream = label, "no end-of-stream from server, aborting receive loop");
            handle.abort();
            match handle.await {
                Ok(summary) => Ok(summary),
                Err(e) if e.is_cancelled() => Ok(ReceiveSummary::default()),
                Err(e) => Err(e.into()),
            }
        }
    }
}

async fn resolve(address: &str) -> Result<SocketAddr, SessionError> {
    tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| SessionError::Resolve(address.to_string()))
}
