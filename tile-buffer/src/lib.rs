//! Segment/tile reassembly
//!
//! Tiles arrive on two independent streams in any order. The buffer slots
//! each tile into its segment, creating placeholder segments for gaps, and
//! exposes the segments whose every tile has arrived.
//!
//! ```text
//! segments:  [ s(base+1) | s(base+2) | ... ]   len <= window_limit
//!              ^ segments[s - 1 - base_offset]
//! ```

mod buffer;
mod segment;

pub use buffer::{ReassemblyBuffer, TileArrival};
pub use segment::{Segment, Tile};
