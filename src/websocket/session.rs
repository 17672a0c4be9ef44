use crate::{
    errors::{is_disconnect, WsError},
    limits::WsLimits,
    server::stream::Stream,
    websocket::frame::{self, Incoming},
};
use flate2::{Decompress, FlushDecompress, Status};

/// Outgoing messages are cut into frames of at most this many bytes.
pub(crate) const FRAGMENT_SIZE: usize = 32 * 1024;

/// Trailer stripped by permessage-deflate senders; restored before inflating.
const DEFLATE_TAIL: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// A complete, reassembled WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

/// Message-level view of an upgraded connection.
///
/// Reads reassemble fragmented messages and inflate `permessage-deflate`
/// payloads; writes fragment into 32 KiB frames and are never compressed.
///
/// The session ends through [`close`](Self::close), either called by the
/// handler or triggered by a close frame from the peer. From then on every
/// read and write fails with [`WsError::Closed`], so a loop written with `?`
/// unwinds by itself:
///
/// ```no_run
/// # use tidewire::{WebSocket, WsError};
/// async fn echo(ws: &mut WebSocket) -> Result<(), WsError> {
///     loop {
///         let text = ws.read_text().await?;
///         ws.write_text(&text).await?;
///     }
/// }
/// ```
pub struct WebSocket {
    stream: Stream,

    compression: bool,
    inflater: Option<Decompress>,
    max_message_size: usize,

    closed: bool,
    peer_closed: bool,
    on_disconnect: Vec<Box<dyn FnOnce(bool) + Send>>,
}

impl WebSocket {
    pub(crate) fn new(mut stream: Stream, compression: bool, limits: &WsLimits) -> Self {
        // Sessions are long lived; idle peers are not an error.
        stream.set_read_timeout(None);

        Self {
            stream,

            compression,
            inflater: None,
            max_message_size: limits.max_message_size,

            closed: false,
            peer_closed: false,
            on_disconnect: Vec::new(),
        }
    }

    /// `true` when `permessage-deflate` was negotiated.
    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.compression
    }

    /// `true` once the peer sent a close frame.
    #[inline]
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Registers a callback run exactly once when the session closes.
    ///
    /// The argument tells whether the peer started the close. Callbacks
    /// registered after the session closed never run.
    pub fn on_disconnect(&mut self, callback: impl FnOnce(bool) + Send + 'static) {
        self.on_disconnect.push(Box::new(callback));
    }

    pub async fn read_message(&mut self) -> Result<Message, WsError> {
        let (opcode, data) = self.read_raw().await?;

        match opcode {
            frame::OPCODE_TEXT => String::from_utf8(data)
                .map(Message::Text)
                .map_err(|_| WsError::InvalidUtf8),
            _ => Ok(Message::Binary(data)),
        }
    }

    /// Reads the next message as UTF-8, whatever its opcode.
    pub async fn read_text(&mut self) -> Result<String, WsError> {
        let (_, data) = self.read_raw().await?;
        String::from_utf8(data).map_err(|_| WsError::InvalidUtf8)
    }

    /// Reads the next message as bytes, whatever its opcode.
    pub async fn read_binary(&mut self) -> Result<Vec<u8>, WsError> {
        Ok(self.read_raw().await?.1)
    }

    #[inline]
    pub async fn write_text(&mut self, text: &str) -> Result<(), WsError> {
        self.write(frame::OPCODE_TEXT, text.as_bytes()).await
    }

    #[inline]
    pub async fn write_binary(&mut self, data: &[u8]) -> Result<(), WsError> {
        self.write(frame::OPCODE_BINARY, data).await
    }

    /// Ends the session: sends a close frame, runs the disconnect callbacks
    /// and shuts the stream down.
    ///
    /// The first call returns [`WsError::Closed`] once done, so `close().await?`
    /// unwinds the caller's loop like a close frame from the peer would. Later
    /// calls do nothing and return `Ok(())`. A peer that already went away is
    /// not reported as an error.
    pub async fn close(&mut self) -> Result<(), WsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let sent = frame::write_frame(&mut self.stream, true, false, frame::OPCODE_CLOSE, &[]).await;

        let peer = self.peer_closed;
        for callback in self.on_disconnect.drain(..) {
            callback(peer);
        }
        tracing::debug!(peer_initiated = peer, "websocket closed");

        let shut = self.stream.shutdown().await;

        match sent.and(shut) {
            Err(err) if !is_disconnect(&err) => Err(err.into()),
            _ => Err(WsError::Closed),
        }
    }
}

impl WebSocket {
    /// Reads frames until one carries FIN and returns the first frame's
    /// opcode with the joined, possibly inflated, payload.
    async fn read_raw(&mut self) -> Result<(u8, Vec<u8>), WsError> {
        if self.closed {
            return Err(WsError::Closed);
        }

        let mut opcode = None;
        let mut compressed = false;
        let mut data = Vec::new();

        loop {
            let frame = match frame::read_frame(&mut self.stream, self.max_message_size).await? {
                Incoming::Frame(frame) => frame,
                Incoming::Closed => {
                    self.peer_closed = true;
                    return Err(self.close().await.err().unwrap_or(WsError::Closed));
                }
            };

            opcode.get_or_insert(frame.opcode);
            compressed |= frame.compressed;

            if data.len() + frame.payload.len() > self.max_message_size {
                return Err(WsError::MessageTooLarge);
            }
            data.extend_from_slice(&frame.payload);

            if frame.fin {
                break;
            }
        }

        if compressed && self.compression {
            data = self.inflate(data)?;
        }

        Ok((opcode.unwrap_or(frame::OPCODE_BINARY), data))
    }

    /// Inflates one message with the session's raw-deflate context, which
    /// survives between messages for peers using context takeover.
    fn inflate(&mut self, mut data: Vec<u8>) -> Result<Vec<u8>, WsError> {
        data.extend_from_slice(&DEFLATE_TAIL);

        let max = self.max_message_size;
        let inflater = self.inflater.get_or_insert_with(|| Decompress::new(false));

        let mut out = Vec::with_capacity(data.len() * 2);
        let mut input = &data[..];

        loop {
            if out.capacity() - out.len() < 1024 {
                out.reserve(out.len().max(FRAGMENT_SIZE));
            }

            let before = inflater.total_in();
            let status = inflater.decompress_vec(input, &mut out, FlushDecompress::Sync)?;
            input = &input[(inflater.total_in() - before) as usize..];

            if out.len() > max {
                return Err(WsError::MessageTooLarge);
            }

            match status {
                Status::StreamEnd => {
                    inflater.reset(false);
                    break;
                }
                Status::BufError => break,
                Status::Ok if input.is_empty() && out.len() < out.capacity() => break,
                Status::Ok => {}
            }
        }

        Ok(out)
    }

    async fn write(&mut self, opcode: u8, payload: &[u8]) -> Result<(), WsError> {
        if self.closed {
            return Err(WsError::Closed);
        }

        if payload.is_empty() {
            frame::write_frame(&mut self.stream, true, false, opcode, &[]).await?;
            return Ok(());
        }

        let mut chunks = payload.chunks(FRAGMENT_SIZE).peekable();
        let mut opcode = opcode;

        while let Some(chunk) = chunks.next() {
            let fin = chunks.peek().is_none();
            frame::write_frame(&mut self.stream, fin, false, opcode, chunk).await?;
            opcode = frame::OPCODE_CONTINUATION;
        }

        Ok(())
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("compression", &self.compression)
            .field("closed", &self.closed)
            .field("peer_closed", &self.peer_closed)
            .finish_non_exhaustive()
    }
}
