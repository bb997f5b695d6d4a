//! Throughput and QUIC connection metrics
//!
//! Provides utilities for monitoring tile session throughput and QUIC
//! connection health.

use std::time::{Duration, Instant};

/// Bytes received since a starting instant
#[derive(Debug, Clone)]
pub struct ThroughputMeter {
    started: Instant,
    bytes: u64,
    frames: u64,
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            bytes: 0,
            frames: 0,
        }
    }

    /// Count one received frame of `bytes`
    pub fn record(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
        self.frames += 1;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Bits per second over the wall time since start
    pub fn throughput_bps(&self) -> f64 {
        self.throughput_bps_at(Instant::now())
    }

    /// Bits per second measured up to `now`; zero before any time has passed
    pub fn throughput_bps_at(&self, now: Instant) -> f64 {
        let secs = now.saturating_duration_since(self.started).as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 * 8.0 / secs
        } else {
            0.0
        }
    }
}

/// Fraction of a link of `link_mbps` megabits used by `throughput_bps`
pub fn channel_usage(throughput_bps: f64, link_mbps: f64) -> f64 {
    if link_mbps <= 0.0 {
        return 0.0;
    }
    throughput_bps / (1_048_576.0 * link_mbps)
}

/// Interval state for periodic connection logging
#[derive(Debug, Default)]
pub struct ConnectionStatsLogger {
    last: Option<(Instant, u64)>,
}

impl ConnectionStatsLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log RTT, congestion window, loss and byte counters for `conn`
    ///
    /// The rx rate covers the interval since the previous call.
    pub fn log(&mut self, conn: &quinn::Connection, label: &str) {
        let stats = conn.stats();
        let loss_pct = if stats.path.sent_packets > 0 {
            (stats.path.lost_packets as f64 / stats.path.sent_packets as f64) * 100.0
        } else {
            0.0
        };

        let now = Instant::now();
        let rx_bytes = stats.udp_rx.bytes;
        let rx_rate = self.last.and_then(|(at, prev)| {
            let elapsed = now.duration_since(at).as_secs_f64();
            (elapsed > 0.0).then(|| rx_bytes.saturating_sub(prev) as f64 / elapsed)
        });
        self.last = Some((now, rx_bytes));

        tracing::info!(
            conn = label,
            rtt_ms = stats.path.rtt.as_millis() as u64,
            cwnd = stats.path.cwnd,
            loss = %format!("{:.1}%", loss_pct),
            tx = %format_bytes(stats.udp_tx.bytes),
            rx = %format_bytes(rx_bytes),
            rx_rate = %rx_rate.map(format_rate).unwrap_or_else(|| "-".to_string()),
            "connection stats"
        );
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}

pub fn format_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= 1_000_000.0 {
        format!("{:.2}MB/s", bytes_per_sec / 1_000_000.0)
    } else if bytes_per_sec >= 1_000.0 {
        format!("{:.1}KB/s", bytes_per_sec / 1_000.0)
    } else {
        format!("{:.0}B/s", bytes_per_sec)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_throughput() {
        let start = Instant::now();
        let mut meter = ThroughputMeter::starting_at(start);
        meter.record(500);
        meter.record(500);
        assert_eq!(meter.bytes(), 1000);
        assert_eq!(meter.frames(), 2);

        let bps = meter.throughput_bps_at(start + Duration::from_secs(2));
        assert_eq!(bps, 4000.0);
        assert_eq!(meter.throughput_bps_at(start), 0.0);
    }

    #[test]
    fn test_channel_usage() {
        assert_eq!(channel_usage(1_048_576.0, 2.0), 0.5);
        assert_eq!(channel_usage(1000.0, 0.0), 0.0);
    }

    #[rstest]
    #[case(999, "999B")]
    #[case(1_500, "1.5KB")]
    #[case(2_300_000, "2.3MB")]
    fn test_format_bytes(#[case] bytes: u64, #[case] expected: &str) {
        assert_eq!(format_bytes(bytes), expected);
    }

    #[rstest]
    #[case(12.0, "12B/s")]
    #[case(2_500.0, "2.5KB/s")]
    #[case(1_250_000.0, "1.25MB/s")]
    fn test_format_rate(#[case] rate: f64, #[case] expected: &str) {
        assert_eq!(format_rate(rate), expected);
    }
}
