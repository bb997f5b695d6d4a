//! Configuration types for adaptive bitrate selection

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bitrate estimation strategy
///
/// Parsed from its configuration name. Names that match no strategy become
/// [`AbrAlgorithm::Unknown`], which keeps the current bitrate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AbrAlgorithm {
    /// Running average download time compared to the latest sample
    #[default]
    Basic,

    /// Download rate over the last few samples with a 1.2x margin
    Basic2,

    /// Throughput scaled by buffered seconds per segment
    BufferOccupation,

    /// Minimum of fast and slow exponentially weighted flow rates
    ChannelFlowRate,

    /// Not implemented yet; keeps the current bitrate
    Bola,

    /// Unrecognized name; keeps the current bitrate
    Unknown(String),
}

impl AbrAlgorithm {
    pub fn name(&self) -> &str {
        match self {
            AbrAlgorithm::Basic => "basic",
            AbrAlgorithm::Basic2 => "basic2",
            AbrAlgorithm::BufferOccupation => "buffer_occupation",
            AbrAlgorithm::ChannelFlowRate => "channel_flow_rate",
            AbrAlgorithm::Bola => "bola",
            AbrAlgorithm::Unknown(name) => name,
        }
    }

    /// Whether this strategy actually adapts the bitrate
    pub fn is_adaptive(&self) -> bool {
        !matches!(self, AbrAlgorithm::Bola | AbrAlgorithm::Unknown(_))
    }
}

impl FromStr for AbrAlgorithm {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "basic" => AbrAlgorithm::Basic,
            "basic2" => AbrAlgorithm::Basic2,
            "buffer_occupation" => AbrAlgorithm::BufferOccupation,
            "channel_flow_rate" => AbrAlgorithm::ChannelFlowRate,
            "bola" => AbrAlgorithm::Bola,
            other => AbrAlgorithm::Unknown(other.to_string()),
        })
    }
}

impl From<String> for AbrAlgorithm {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(algorithm) => algorithm,
            Err(never) => match never {},
        }
    }
}

impl From<AbrAlgorithm> for String {
    fn from(value: AbrAlgorithm) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for AbrAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ABR engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbrConfig {
    /// Available bitrates, ascending
    pub bitrates: Vec<u32>,

    /// Strategy used for every decision in the session
    #[serde(default)]
    pub algorithm: AbrAlgorithm,

    /// Playback length of one segment in seconds (default: 1.0)
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: f64,
}

fn default_segment_duration() -> f64 {
    1.0
}

impl Default for AbrConfig {
    fn default() -> Self {
        Self {
            bitrates: vec![400, 800, 1600],
            algorithm: AbrAlgorithm::Basic,
            segment_duration_secs: default_segment_duration(),
        }
    }
}

impl AbrConfig {
    pub fn new(bitrates: Vec<u32>, algorithm: AbrAlgorithm) -> Self {
        Self {
            bitrates,
            algorithm,
            segment_duration_secs: default_segment_duration(),
        }
    }
}
