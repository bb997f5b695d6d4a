//! Tiled video packet protocol for QUIC transport
//!
//! Provides serialization/deserialization of tile requests and tile payloads
//! carried over the two priority streams of a session. Every packet travels
//! inside a length-prefixed frame:
//!
//! ```text
//! [length N: u32 little-endian][N bytes: QuicPacket encoding]
//! ```
//!
//! The length header is little-endian to stay compatible with existing tile
//! servers; fields inside the packet body are big-endian and covered by a
//! CRC32 so corruption is caught before a tile reaches the reassembly buffer.
//!
//! The codec does no range checking on segment/tile numbers. Call
//! [`VideoPacket::validate`] at the receive boundary for that.

mod error;
mod framing;
mod packet;

pub use error::{DecodeError, FrameError, ProtocolViolation};
pub use framing::{encode_frame, read_frame, write_frame, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use packet::{Priority, QuicPacket, VideoPacket, MAX_STREAM_ID_LEN, MAX_TILE, PACKET_MAGIC};
