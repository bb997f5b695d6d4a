//! Length-prefixed framing over any async byte stream

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use crate::packet::QuicPacket;

/// Size of the little-endian length header
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest frame body accepted from the wire
pub const MAX_FRAME_SIZE: usize = 10_000_000;

/// Encode a packet as a complete frame: length header followed by the body
pub fn encode_frame(packet: &QuicPacket) -> Vec<u8> {
    let body = packet.encode();
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&body);
    buf
}

/// Write one framed packet, returning the number of bytes written
pub async fn write_frame<W>(writer: &mut W, packet: &QuicPacket) -> Result<usize, FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(packet);
    let body_len = frame.len() - FRAME_HEADER_SIZE;
    if body_len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(body_len));
    }
    writer.write_all(&frame).await?;
    Ok(frame.len())
}

/// Read the body of the next frame
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
/// A stream that ends inside a header or body yields [`FrameError::Truncated`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(FrameError::Truncated)
            };
        }
        filled += n;
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::Truncated),
        Err(e) => Err(FrameError::Io(e)),
    }
}
