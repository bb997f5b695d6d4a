//! Adaptive bitrate decision engine
//!
//! Consumes per-tile download time and size samples and decides the bitrate
//! for the next segment using the configured [`AbrAlgorithm`].

use crate::config::{AbrAlgorithm, AbrConfig};
use crate::history::{SegmentHistory, SegmentRecord};
use crate::ladder::{BitrateLadder, LadderError};
use crate::window::SampleWindow;

/// Required headroom over the current bitrate before `basic2` steps up
pub const BASIC2_UPPER_THRESHOLD: f64 = 1.2;

/// Samples kept for `basic2`
pub const BASIC2_WINDOW: usize = 5;

/// Fraction of the buffer-scaled throughput `buffer_occupation` may use
pub const BUFFER_SAFETY_FACTOR: f64 = 0.5;

/// Samples kept for `channel_flow_rate`
pub const FLOW_WINDOW: usize = 5;

/// Per-second decay base of the flow-rate estimators
const FLOW_DECAY_BASE: f64 = 0.5;

/// Adaptive bitrate engine
///
/// One engine per client session. Samples are recorded as tiles arrive and
/// [`AbrEngine::next_bitrate`] is called before requesting each segment.
#[derive(Debug)]
pub struct AbrEngine {
    ladder: BitrateLadder,
    algorithm: AbrAlgorithm,
    segment_duration_secs: f64,
    current_bitrate: u32,
    /// `None` once `basic2` has run without samples
    average_download_time: Option<f64>,
    /// Most recent download time in seconds
    segment_download_time: f64,
    download_times: SampleWindow<f64>,
    download_sizes: SampleWindow<f64>,
    last_download_size: Option<u64>,
    flow_durations: SampleWindow<f64>,
    flow_rates: SampleWindow<f64>,
    buffer_level_secs: f64,
    history: SegmentHistory,
}

impl AbrEngine {
    /// Create an engine starting at the lowest rung of the ladder
    pub fn new(config: &AbrConfig) -> Result<Self, LadderError> {
        let ladder = BitrateLadder::new(config.bitrates.clone())?;

        if !config.algorithm.is_adaptive() {
            tracing::warn!(
                algorithm = %config.algorithm,
                "ABR strategy does not adapt, bitrate stays at {}",
                ladder.min()
            );
        }

        Ok(Self {
            current_bitrate: ladder.min(),
            ladder,
            algorithm: config.algorithm.clone(),
            segment_duration_secs: config.segment_duration_secs,
            average_download_time: Some(0.0),
            segment_download_time: 0.0,
            download_times: SampleWindow::new(BASIC2_WINDOW),
            download_sizes: SampleWindow::new(BASIC2_WINDOW),
            last_download_size: None,
            flow_durations: SampleWindow::filled(FLOW_WINDOW, 0.0),
            flow_rates: SampleWindow::filled(FLOW_WINDOW, 0.0),
            buffer_level_secs: 0.0,
            history: SegmentHistory::default(),
        })
    }

    /// Record the size in bytes of a received tile
    pub fn record_download_size(&mut self, bytes: u64) {
        self.download_sizes.push(bytes as f64);
        self.last_download_size = Some(bytes);
    }

    /// Record how long a tile of `segment` took to arrive, in seconds
    ///
    /// Also feeds the flow-rate windows when a size sample is available.
    pub fn record_download_time(&mut self, seconds: f64, segment: u32) {
        self.segment_download_time = seconds;
        self.download_times.push(seconds);
        self.history.add_download_time(segment, seconds);

        if let Some(bytes) = self.last_download_size {
            if seconds > 0.0 {
                let rate = bytes as f64 * 8.0 / seconds;
                self.flow_durations.push(seconds);
                self.flow_rates.push(rate);
            }
        }
    }

    /// Update the buffered playback time used by `buffer_occupation`
    pub fn observe_buffer_level(&mut self, seconds: f64) {
        self.buffer_level_secs = seconds.max(0.0);
    }

    /// Decide the bitrate for `segment`
    ///
    /// Always returns a ladder member for the adaptive strategies. `bola` and
    /// unknown strategies return the current bitrate unchanged.
    pub fn next_bitrate(&mut self, segment: u32) -> u32 {
        let previous = self.current_bitrate;
        let next = match self.algorithm {
            AbrAlgorithm::Basic => self.basic(segment),
            AbrAlgorithm::Basic2 => self.basic2(),
            AbrAlgorithm::BufferOccupation => self.buffer_occupation(),
            AbrAlgorithm::ChannelFlowRate => self.channel_flow_rate(),
            AbrAlgorithm::Bola | AbrAlgorithm::Unknown(_) => self.current_bitrate,
        };

        self.history.set_bitrate(segment, next);
        self.current_bitrate = next;

        if next != previous {
            tracing::debug!(
                segment,
                algorithm = %self.algorithm,
                from = previous,
                to = next,
                "bitrate changed"
            );
        }
        next
    }

    /// Running-average strategy
    ///
    /// `sigma` compares the historical average download time with the latest
    /// one: below 1 the channel got slower, at or above 1 it kept up.
    fn basic(&mut self, segment: u32) -> u32 {
        let average = self.average_download_time.unwrap_or(0.0);
        let latest = self.segment_download_time;
        let n = segment as f64;
        let updated = if average > 0.0 && segment > 0 {
            (average * (n + 1.0) + latest) / (n + 1.0)
        } else {
            latest
        };
        self.average_download_time = Some(updated);

        if latest == 0.0 {
            return self.current_bitrate;
        }
        let sigma = average / latest;

        let Some(curr) = self.ladder.position(self.current_bitrate) else {
            return self.snap_to_ladder(self.current_bitrate);
        };

        if sigma < 1.0 {
            if curr == 0 {
                return self.current_bitrate;
            }
            return if sigma < self.ladder.ratio(curr - 1, curr) {
                self.ladder.min()
            } else {
                self.ladder.rungs()[curr - 1]
            };
        }

        if self.current_bitrate >= self.ladder.max() {
            return self.current_bitrate;
        }

        // The bottom rung compares against the full span of the ladder and
        // leaves it straight for the top
        if curr == 0 {
            let span = self.ladder.ratio(self.ladder.len() - 1, 0);
            return if sigma >= span {
                self.ladder.max()
            } else {
                self.current_bitrate
            };
        }
        if sigma < self.ladder.ratio(curr - 1, curr) {
            return self.current_bitrate;
        }

        let step_ratio = self.ladder.ratio(curr + 1, curr);
        let mut rank = curr;
        while rank + 1 < self.ladder.len()
            && self.ladder.rungs()[rank] < self.ladder.max()
            && sigma < step_ratio
        {
            rank += 1;
        }
        self.ladder.rungs()[rank]
    }

    /// Windowed download-rate strategy
    fn basic2(&mut self) -> u32 {
        let Some(average) = self.download_times.mean() else {
            self.average_download_time = None;
            return self.ladder.min();
        };
        if self.download_sizes.is_empty() {
            self.average_download_time = None;
            return self.ladder.min();
        }
        self.average_download_time = Some(average);

        let elapsed = average * self.download_times.len() as f64;
        if elapsed <= 0.0 {
            return self.current_bitrate;
        }
        let download_rate = self.download_sizes.sum() * 8.0 / elapsed;

        if download_rate > self.current_bitrate as f64 * BASIC2_UPPER_THRESHOLD {
            if self.current_bitrate == self.ladder.max() {
                return self.current_bitrate;
            }
            return match self.ladder.position(self.current_bitrate) {
                Some(rank) => self.ladder.rungs()[rank + 1],
                None => self.ladder.min(),
            };
        }

        let rungs = self.ladder.rungs();
        let mut next = rungs[0];
        for (rank, &rung) in rungs.iter().enumerate().skip(1) {
            if download_rate > rung as f64 * BASIC2_UPPER_THRESHOLD {
                next = rung;
            } else {
                next = rungs[rank - 1];
                break;
            }
        }
        next
    }

    fn buffer_occupation(&self) -> u32 {
        if self.segment_duration_secs <= 0.0 {
            return self.current_bitrate;
        }
        let throughput = self.last_throughput().unwrap_or(0.0);
        let candidate = throughput
            * (self.buffer_level_secs / self.segment_duration_secs)
            * BUFFER_SAFETY_FACTOR;
        self.ladder.map_to_ladder(candidate)
    }

    fn channel_flow_rate(&self) -> u32 {
        self.ladder.map_to_ladder(self.smoothed_flow_rate())
    }

    /// Minimum of the fast and slow flow-rate estimators over the window
    ///
    /// The fast estimator decays by half per second of download time, the
    /// slow one by half per two seconds. Both start at zero in place of the
    /// oldest slot, which is never folded in.
    pub fn smoothed_flow_rate(&self) -> f64 {
        let mut fast = 0.0;
        let mut slow = 0.0;
        let samples = self.flow_durations.iter().zip(self.flow_rates.iter());
        for (duration, rate) in samples.skip(1) {
            let alpha_fast = FLOW_DECAY_BASE.powf(duration);
            let alpha_slow = FLOW_DECAY_BASE.powf(duration / 2.0);
            fast = (1.0 - alpha_fast) * rate + alpha_fast * fast;
            slow = (1.0 - alpha_slow) * rate + alpha_slow * slow;
        }
        f64::min(fast, slow)
    }

    /// Map an off-ladder bitrate back onto the ladder
    fn snap_to_ladder(&self, bitrate: u32) -> u32 {
        self.ladder.map_to_ladder(self.ladder.clamp(bitrate) as f64)
    }

    /// Most recent instantaneous flow rate in bits per second
    pub fn last_throughput(&self) -> Option<f64> {
        if self.flow_durations.newest().unwrap_or(0.0) > 0.0 {
            self.flow_rates.newest()
        } else {
            None
        }
    }

    /// Force the highest bitrate
    pub fn max_bitrate(&mut self) -> u32 {
        self.current_bitrate = self.ladder.max();
        self.current_bitrate
    }

    /// Force the lowest bitrate
    pub fn min_bitrate(&mut self) -> u32 {
        self.current_bitrate = self.ladder.min();
        self.current_bitrate
    }

    /// Replace the current bitrate from outside the engine
    ///
    /// The value does not have to be on the ladder; `basic` snaps it back on
    /// its next decision.
    pub fn override_bitrate(&mut self, bitrate: u32) {
        self.current_bitrate = bitrate;
    }

    /// Drop per-segment records for segments `<= segment`
    pub fn prune_through(&mut self, segment: u32) {
        self.history.prune_through(segment);
    }

    pub fn current_bitrate(&self) -> u32 {
        self.current_bitrate
    }

    /// Buffered playback time last observed, in seconds
    pub fn buffer_level(&self) -> f64 {
        self.buffer_level_secs
    }

    /// Running average download time, `None` when undefined
    pub fn average_download_time(&self) -> Option<f64> {
        self.average_download_time
    }

    /// Most recent download time sample in seconds
    pub fn latest_download_time(&self) -> f64 {
        self.segment_download_time
    }

    /// Bitrate decided for a segment, if still in history
    pub fn chosen_bitrate(&self, segment: u32) -> Option<u32> {
        self.history.get(segment).and_then(|r| r.chosen_bitrate)
    }

    /// Accumulated download time of a segment, if still in history
    pub fn segment_download_time(&self, segment: u32) -> Option<f64> {
        self.history.get(segment).map(|r| r.download_time_total)
    }

    pub fn segment_record(&self, segment: u32) -> Option<&SegmentRecord> {
        self.history.get(segment)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn ladder(&self) -> &BitrateLadder {
        &self.ladder
    }

    pub fn algorithm(&self) -> &AbrAlgorithm {
        &self.algorithm
    }
}
