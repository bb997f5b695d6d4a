use bytes::Bytes;
use crc32fast::Hasher;

use crate::error::{DecodeError, ProtocolViolation};

/// Tiles per segment
pub const MAX_TILE: u16 = 5;

/// First byte of every packet body
pub const PACKET_MAGIC: u8 = 0x51;

const FLAG_END_STREAM: u8 = 1 << 0;
const FLAG_HAS_VIDEO: u8 = 1 << 1;
const FLAG_HAS_PUSH: u8 = 1 << 2;

/// Longest stream id the u16 length field can carry, in bytes
pub const MAX_STREAM_ID_LEN: usize = u16::MAX as usize;

/// magic(1) + crc(4) + flags(1) + stream_id_len(2)
const FIXED_HEADER: usize = 8;

/// Stream class a tile is requested and delivered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Control and small tiles
    High,
    /// Bulk tile payloads
    Low,
}

impl Priority {
    fn as_byte(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Low => 1,
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Priority::High),
            1 => Ok(Priority::Low),
            other => Err(DecodeError::InvalidPriority(other)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// One tile of one segment at a chosen bitrate
///
/// Requests carry an empty payload; responses carry the tile bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPacket {
    /// Segment number (1-based)
    pub segment: u32,
    /// Tile number within the segment (1..=MAX_TILE)
    pub tile: u16,
    pub priority: Priority,
    /// Bitrate the tile was requested/encoded at
    pub bitrate: u32,
    pub payload: Bytes,
}

impl VideoPacket {
    /// Create a tile request (no payload)
    pub fn request(segment: u32, tile: u16, priority: Priority, bitrate: u32) -> Self {
        Self {
            segment,
            tile,
            priority,
            bitrate,
            payload: Bytes::new(),
        }
    }

    /// Check segment/tile numbers against the valid range
    pub fn validate(&self) -> Result<(), ProtocolViolation> {
        if self.segment == 0 {
            return Err(ProtocolViolation::ZeroSegment);
        }
        if self.tile == 0 || self.tile > MAX_TILE {
            return Err(ProtocolViolation::TileOutOfRange {
                tile: self.tile,
                max: MAX_TILE,
            });
        }
        Ok(())
    }

    /// Encoded size of the video record inside a packet body
    fn encoded_len(&self) -> usize {
        4 + 2 + 1 + 4 + 4 + self.payload.len()
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.segment.to_be_bytes());
        buf.extend_from_slice(&self.tile.to_be_bytes());
        buf.push(self.priority.as_byte());
        buf.extend_from_slice(&self.bitrate.to_be_bytes());
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
    }

    fn decode_from(cursor: &mut Cursor<'_>) -> Result<Self, DecodeError> {
        let segment = cursor.u32()?;
        let tile = cursor.u16()?;
        let priority = Priority::try_from(cursor.u8()?)?;
        let bitrate = cursor.u32()?;
        let payload_len = cursor.u32()? as usize;
        let payload = Bytes::copy_from_slice(cursor.take(payload_len)?);
        Ok(Self {
            segment,
            tile,
            priority,
            bitrate,
            payload,
        })
    }
}

/// Transport-level packet sent on either priority stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuicPacket {
    /// Client/session identifier
    pub stream_id: String,
    /// Logical end of this stream; the receiver stops reading after it
    pub end_stream: bool,
    pub video: Option<VideoPacket>,
    /// Push acknowledgement from the server
    pub push_status: Option<bool>,
}

impl QuicPacket {
    /// Packet carrying a tile request or tile payload
    pub fn video(stream_id: impl Into<String>, video: VideoPacket) -> Self {
        Self {
            stream_id: stream_id.into(),
            end_stream: false,
            video: Some(video),
            push_status: None,
        }
    }

    /// Bare packet with no video record (hello or end-of-stream)
    pub fn control(stream_id: impl Into<String>, end_stream: bool) -> Self {
        Self {
            stream_id: stream_id.into(),
            end_stream,
            video: None,
            push_status: None,
        }
    }

    /// Serialize the packet body (without the frame length header)
    ///
    /// Wire format:
    /// - 1 byte: magic (0x51)
    /// - 4 bytes: CRC32 of everything after this field (big-endian)
    /// - 1 byte: flags (bit 0 = end_stream, bit 1 = has video, bit 2 = has push)
    /// - 2 bytes: stream id length (big-endian u16), then the UTF-8 stream id
    /// - video record if present: segment u32, tile u16, priority u8,
    ///   bitrate u32, payload length u32, payload
    /// - 1 byte push status if present
    ///
    /// A stream id longer than [`MAX_STREAM_ID_LEN`] bytes is cut at the last
    /// character boundary that fits.
    pub fn encode(&self) -> Vec<u8> {
        let stream_id = wire_stream_id(&self.stream_id).as_bytes();
        let stream_id_len = stream_id.len();

        let mut flags = 0u8;
        if self.end_stream {
            flags |= FLAG_END_STREAM;
        }
        if self.video.is_some() {
            flags |= FLAG_HAS_VIDEO;
        }
        if self.push_status.is_some() {
            flags |= FLAG_HAS_PUSH;
        }

        let video_len = self.video.as_ref().map_or(0, VideoPacket::encoded_len);
        let mut body = Vec::with_capacity(3 + stream_id_len + video_len + 1);
        body.push(flags);
        body.extend_from_slice(&(stream_id_len as u16).to_be_bytes());
        body.extend_from_slice(stream_id);
        if let Some(video) = &self.video {
            video.encode_into(&mut body);
        }
        if let Some(push) = self.push_status {
            body.push(push as u8);
        }

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut buf = Vec::with_capacity(5 + body.len());
        buf.push(PACKET_MAGIC);
        buf.extend_from_slice(&crc.to_be_bytes());
        buf.extend_from_slice(&body);
        buf
    }

    /// Deserialize a packet body
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < FIXED_HEADER {
            return Err(DecodeError::TooShort);
        }
        if data[0] != PACKET_MAGIC {
            return Err(DecodeError::BadMagic(data[0]));
        }

        let mut cursor = Cursor::new(&data[1..]);
        let expected = cursor.u32()?;

        let mut hasher = Hasher::new();
        hasher.update(cursor.remaining());
        let actual = hasher.finalize();
        if actual != expected {
            return Err(DecodeError::ChecksumMismatch { expected, actual });
        }

        let flags = cursor.u8()?;
        let stream_id_len = cursor.u16()? as usize;
        let stream_id = std::str::from_utf8(cursor.take(stream_id_len)?)
            .map_err(|_| DecodeError::InvalidStreamId)?
            .to_string();

        let video = if flags & FLAG_HAS_VIDEO != 0 {
            Some(VideoPacket::decode_from(&mut cursor)?)
        } else {
            None
        };
        let push_status = if flags & FLAG_HAS_PUSH != 0 {
            Some(cursor.u8()? != 0)
        } else {
            None
        };

        let left = cursor.remaining().len();
        if left != 0 {
            return Err(DecodeError::TrailingBytes(left));
        }

        Ok(Self {
            stream_id,
            end_stream: flags & FLAG_END_STREAM != 0,
            video,
            push_status,
        })
    }
}

fn wire_stream_id(id: &str) -> &str {
    if id.len() <= MAX_STREAM_ID_LEN {
        return id;
    }
    let end = (0..=MAX_STREAM_ID_LEN)
        .rev()
        .find(|&i| id.is_char_boundary(i))
        .unwrap_or(0);
    &id[..end]
}

/// Bounds-checked big-endian reader over a byte slice
struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn remaining(&self) -> &'a [u8] {
        self.data
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.data.len() < n {
            return Err(DecodeError::TooShort);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.array()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile_response() -> QuicPacket {
        QuicPacket {
            stream_id: "c0ffee".into(),
            end_stream: false,
            video: Some(VideoPacket {
                segment: 7,
                tile: 3,
                priority: Priority::Low,
                bitrate: 1600,
                payload: Bytes::from_static(&[9, 8, 7, 6, 5]),
            }),
            push_status: Some(true),
        }
    }

    #[test]
    fn test_encode_decode_tile_response() {
        let packet = tile_response();
        let decoded = QuicPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_control_packet_has_no_video() {
        let packet = QuicPacket::control("abc", true);
        let encoded = packet.encode();
        // magic + crc + flags + len + "abc"
        assert_eq!(encoded.len(), 11);

        let decoded = QuicPacket::decode(&encoded).unwrap();
        assert!(decoded.end_stream);
        assert!(decoded.video.is_none());
        assert!(decoded.push_status.is_none());
    }

    #[test]
    fn test_long_stream_id_cut_on_char_boundary() {
        // Two bytes per char, so the u16 limit falls inside a character
        let packet = QuicPacket::control("é".repeat(40_000), true);
        let decoded = QuicPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded.stream_id.len(), MAX_STREAM_ID_LEN - 1);
        assert!(decoded.stream_id.chars().all(|c| c == 'é'));
        assert!(decoded.end_stream);

        let exact = QuicPacket::control("a".repeat(MAX_STREAM_ID_LEN), false);
        let decoded = QuicPacket::decode(&exact.encode()).unwrap();
        assert_eq!(decoded.stream_id, exact.stream_id);
    }

    #[test]
    fn test_encode_is_deterministic() {
        let packet = tile_response();
        assert_eq!(packet.encode(), packet.encode());
    }

    #[test]
    fn test_decode_too_short() {
        let result = QuicPacket::decode(&[PACKET_MAGIC, 0, 0]);
        assert!(matches!(result, Err(DecodeError::TooShort)));
    }

    #[test]
    fn test_decode_truncated_at_every_length() {
        let encoded = tile_response().encode();
        for len in 0..encoded.len() {
            assert!(
                QuicPacket::decode(&encoded[..len]).is_err(),
                "prefix of {} bytes should not decode",
                len
            );
        }
    }

    #[test]
    fn test_bad_magic() {
        let mut encoded = tile_response().encode();
        encoded[0] = 0x00;
        assert_eq!(QuicPacket::decode(&encoded), Err(DecodeError::BadMagic(0x00)));
    }

    #[test]
    fn test_crc_detects_corruption() {
        let mut encoded = tile_response().encode();
        let last = encoded.len() - 2;
        encoded[last] ^= 0xFF;
        assert!(matches!(
            QuicPacket::decode(&encoded),
            Err(DecodeError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_priority_rejected() {
        // Build a body by hand with priority byte 7
        let mut body = vec![FLAG_HAS_VIDEO, 0, 0];
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&1u16.to_be_bytes());
        body.push(7);
        body.extend_from_slice(&400u32.to_be_bytes());
        body.extend_from_slice(&0u32.to_be_bytes());

        let mut hasher = Hasher::new();
        hasher.update(&body);
        let mut data = vec![PACKET_MAGIC];
        data.extend_from_slice(&hasher.finalize().to_be_bytes());
        data.extend_from_slice(&body);

        assert_eq!(QuicPacket::decode(&data), Err(DecodeError::InvalidPriority(7)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut body = vec![0u8, 0, 0, 0xAA, 0xBB];
        let mut hasher = Hasher::new();
        hasher.update(&body);
        let mut data = vec![PACKET_MAGIC];
        data.extend_from_slice(&hasher.finalize().to_be_bytes());
        data.append(&mut body);

        assert_eq!(QuicPacket::decode(&data), Err(DecodeError::TrailingBytes(2)));
    }

    #[test]
    fn test_validate_ranges() {
        let ok = VideoPacket::request(1, MAX_TILE, Priority::High, 400);
        assert!(ok.validate().is_ok());

        let zero_segment = VideoPacket::request(0, 1, Priority::High, 400);
        assert_eq!(zero_segment.validate(), Err(ProtocolViolation::ZeroSegment));

        let tile_high = VideoPacket::request(1, MAX_TILE + 1, Priority::Low, 400);
        assert_eq!(
            tile_high.validate(),
            Err(ProtocolViolation::TileOutOfRange {
                tile: MAX_TILE + 1,
                max: MAX_TILE
            })
        );

        let tile_zero = VideoPacket::request(1, 0, Priority::Low, 400);
        assert!(tile_zero.validate().is_err());
    }
}
