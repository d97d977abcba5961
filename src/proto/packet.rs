//! Packet framing over the TCP stream.
//!
//! Wire format: a 2-byte little-endian length prefix covering opcode plus
//! payload, then the opcode byte, then the payload. The length prefix is
//! never zero for a real packet; a zero-length frame is skipped so a
//! misbehaving peer cannot wedge the reader.

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;

/// One framed protocol unit: opcode plus opaque payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub opcode: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(opcode: u8, payload: Vec<u8>) -> Self {
        Packet { opcode, payload }
    }
}

/// Reads one packet from the stream.
///
/// Returns `Ok(None)` when the stream ends, either cleanly between frames
/// or abruptly in the middle of one. Zero-length frames are skipped.
pub async fn read_packet<R>(reader: &mut R) -> Result<Option<Packet>>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut len_buf = [0u8; 2];
        if read_full(reader, &mut len_buf).await? == 0 {
            return Ok(None);
        }

        let len = u16::from_le_bytes(len_buf) as usize;
        if len == 0 {
            debug!("skipping zero-length frame");
            continue;
        }

        let mut frame = vec![0u8; len];
        if read_full(reader, &mut frame).await? == 0 {
            return Ok(None);
        }

        let payload = frame.split_off(1);
        return Ok(Some(Packet { opcode: frame[0], payload }));
    }
}

/// Writes one packet as a single contiguous buffer.
pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = (1 + packet.payload.len()) as u16;

    let mut buf = Vec::with_capacity(2 + len as usize);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.push(packet.opcode);
    buf.extend_from_slice(&packet.payload);

    writer.write_all(&buf).await
}

/// Fills `buf` completely, returning the number of bytes read: either
/// `buf.len()` or 0 if the stream ended before the buffer was full.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut pos = 0;
    while pos < buf.len() {
        let n = reader
            .read(&mut buf[pos..])
            .await
            .map_err(|_| crate::error::FlicError::Disconnected)?;
        if n == 0 {
            return Ok(0);
        }
        pos += n;
    }
    Ok(buf.len())
}
