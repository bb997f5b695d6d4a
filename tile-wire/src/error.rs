use thiserror::Error;

/// Error decoding a packet body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not enough data for header or payload
    #[error("insufficient data for packet")]
    TooShort,

    #[error("bad magic byte 0x{0:02X}")]
    BadMagic(u8),

    /// CRC32 checksum mismatch (data corruption detected)
    #[error("CRC32 mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("invalid priority byte {0}")]
    InvalidPriority(u8),

    #[error("stream id is not valid UTF-8")]
    InvalidStreamId,

    /// Bytes left over after the last declared field
    #[error("{0} trailing bytes after packet")]
    TrailingBytes(usize),
}

/// Error reading or writing a length-prefixed frame
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame length {0} exceeds maximum")]
    TooLarge(usize),

    /// Stream ended partway through a frame
    #[error("stream ended mid-frame")]
    Truncated,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// A decoded tile that references a segment/tile outside the valid range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("segment numbers start at 1")]
    ZeroSegment,

    #[error("tile {tile} outside 1..={max}")]
    TileOutOfRange { tile: u16, max: u16 },
}
