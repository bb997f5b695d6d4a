//! Tiled video streaming session
//!
//! A client session holds one reassembly buffer and one ABR engine behind a
//! single lock. Two receive loops, one per priority stream, insert tiles as
//! they arrive; the driver asks the engine for each segment's bitrate and
//! requests the segment's tiles across both streams.
//!
//! ```text
//! HIGH stream ──> receive_loop ─┐
//!                               ├─> SessionState { ReassemblyBuffer, AbrEngine }
//! LOW stream  ──> receive_loop ─┘                  │
//!                                                  v
//!                         Session driver ── next_bitrate ──> tile requests
//!                                │
//!                                └── PlaybackClock ── evict_through
//! ```

pub mod config;
mod error;
mod playback;
mod receiver;
mod server;
mod session;
mod state;

pub use config::{ClientConfig, ServerConfig};
pub use error::{ConfigError, SessionError};
pub use playback::PlaybackClock;
pub use receiver::{receive_loop, ReceiveSummary};
pub use server::{tile_payload_len, TileServer};
pub use session::{Session, SessionReport};
pub use state::{SessionInner, SessionState};
