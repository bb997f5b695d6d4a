//! Adaptive Bitrate Control for Tiled Segment Streaming
//!
//! This crate decides which bitrate to request for each upcoming segment
//! from download time and size samples observed while tiles arrive.
//!
//! # Components
//!
//! - `config`: Engine configuration and strategy names
//! - `ladder`: The immutable, ascending bitrate ladder
//! - `window`: Fixed-capacity sample windows
//! - `history`: Per-segment download and decision records
//! - `controller`: The decision engine and its strategies
//!
//! # Strategies
//!
//! | Name | Input |
//! |------|-------|
//! | `basic` | running average download time vs. latest sample |
//! | `basic2` | download rate over the last 5 samples |
//! | `buffer_occupation` | throughput scaled by buffered seconds |
//! | `channel_flow_rate` | min of fast/slow weighted flow rates |
//! | `bola` | not implemented, keeps the current bitrate |

mod config;
mod controller;
mod history;
mod ladder;
mod window;

pub use config::{AbrAlgorithm, AbrConfig};
pub use controller::{
    AbrEngine, BASIC2_UPPER_THRESHOLD, BASIC2_WINDOW, BUFFER_SAFETY_FACTOR, FLOW_WINDOW,
};
pub use history::{SegmentHistory, SegmentRecord};
pub use ladder::{BitrateLadder, LadderError};
pub use window::SampleWindow;
