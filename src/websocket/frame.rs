//! Single-frame codec
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               | Masking-key, if MASK set to 1 |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use crate::{errors::WsError, server::stream::Stream};
use std::io;

pub(crate) const OPCODE_CONTINUATION: u8 = 0;
pub(crate) const OPCODE_TEXT: u8 = 1;
pub(crate) const OPCODE_BINARY: u8 = 2;
pub(crate) const OPCODE_CLOSE: u8 = 8;
pub(crate) const OPCODE_PING: u8 = 9;
pub(crate) const OPCODE_PONG: u8 = 10;

const PSIZE_3BYTE: usize = 126;
const PSIZE_9BYTE: usize = 65536;

const HEADER_SIZE_MAX: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Frame {
    pub(crate) fin: bool,
    pub(crate) compressed: bool,
    pub(crate) opcode: u8,
    pub(crate) payload: Vec<u8>,
}

/// What the reader hands back. Control frames other than close never show up.
#[derive(Debug, PartialEq)]
pub(crate) enum Incoming {
    Frame(Frame),
    /// The peer sent a close frame.
    Closed,
}

#[inline]
pub(crate) fn apply_mask(buf: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Server frame header: never masked.
pub(crate) fn encode_header(
    fin: bool,
    compressed: bool,
    opcode: u8,
    len: usize,
) -> ([u8; HEADER_SIZE_MAX], usize) {
    let mut head = [0; HEADER_SIZE_MAX];

    head[0] = (opcode & 0x0f) | if compressed { 0x40 } else { 0 } | if fin { 0x80 } else { 0 };

    let size = if len < PSIZE_3BYTE {
        head[1] = len as u8;
        2
    } else if len < PSIZE_9BYTE {
        head[1] = 126;
        head[2..4].copy_from_slice(&(len as u16).to_be_bytes());
        4
    } else {
        head[1] = 127;
        head[2..10].copy_from_slice(&(len as u64).to_be_bytes());
        10
    };

    (head, size)
}

/// Reads the next data frame.
///
/// Pings are answered with a pong carrying the same payload, pongs are
/// dropped, and the loop goes on to the next frame. A close frame ends the
/// loop with [`Incoming::Closed`]. Payloads longer than `max_len` are
/// rejected before anything is allocated.
pub(crate) async fn read_frame(stream: &mut Stream, max_len: usize) -> Result<Incoming, WsError> {
    loop {
        let mut head = [0u8; 2];
        stream.read_exact(&mut head).await?;

        let fin = head[0] & 0x80 != 0;
        let compressed = head[0] & 0x40 != 0;
        let opcode = head[0] & 0x0f;
        let masked = head[1] & 0x80 != 0;

        let len = match head[1] & 0x7f {
            126 => {
                let mut ext = [0u8; 2];
                stream.read_exact(&mut ext).await?;
                u16::from_be_bytes(ext) as u64
            }
            127 => {
                let mut ext = [0u8; 8];
                stream.read_exact(&mut ext).await?;
                u64::from_be_bytes(ext)
            }
            len => len as u64,
        };
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= max_len)
            .ok_or(WsError::FrameTooLarge(len))?;

        let mask = match masked {
            true => {
                let mut mask = [0u8; 4];
                stream.read_exact(&mut mask).await?;
                Some(mask)
            }
            false => None,
        };

        let mut payload = vec![0; len];
        stream.read_exact(&mut payload).await?;
        if let Some(mask) = mask {
            apply_mask(&mut payload, mask);
        }

        tracing::trace!(opcode, fin, compressed, len, "websocket frame");

        match opcode {
            OPCODE_CLOSE => return Ok(Incoming::Closed),
            OPCODE_PING => write_frame(stream, true, false, OPCODE_PONG, &payload).await?,
            OPCODE_PONG => {}
            _ => {
                return Ok(Incoming::Frame(Frame {
                    fin,
                    compressed,
                    opcode,
                    payload,
                }))
            }
        }
    }
}

/// Writes one unmasked frame and flushes it.
pub(crate) async fn write_frame(
    stream: &mut Stream,
    fin: bool,
    compressed: bool,
    opcode: u8,
    payload: &[u8],
) -> io::Result<()> {
    let (head, size) = encode_header(fin, compressed, opcode, payload.len());

    stream.write_all(&head[..size]).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}
