use std::io;
use thiserror::Error as ThisError;

/// Error returned by handlers and by [`Server::launch`](crate::Server::launch).
///
/// A handler that returns `Err` ends its connection: the transport does not
/// try later routes and does not synthesize a response.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
}

/// Errors produced by a [`WebSocket`](crate::WebSocket) session.
#[derive(Debug, ThisError)]
pub enum WsError {
    /// The session is closing or already closed.
    ///
    /// This is the normal way a read/write loop learns that the peer sent a
    /// close frame or that [`close`](crate::WebSocket::close) was called.
    /// Propagate it with `?` to unwind the loop.
    #[error("websocket session closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame announced a payload larger than the configured (or addressable) limit.
    #[error("frame payload of {0} bytes exceeds the limit")]
    FrameTooLarge(u64),

    /// A reassembled or inflated message exceeded the configured limit.
    #[error("message exceeds the configured size limit")]
    MessageTooLarge,

    #[error("invalid permessage-deflate data: {0}")]
    Inflate(#[from] flate2::DecompressError),

    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
}

impl WsError {
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, WsError::Closed)
    }
}

/// Problems found while reading a request head or body.
#[derive(Debug, PartialEq)]
pub(crate) enum ErrorKind {
    LineTooLong,
    TooManyHeaders,
    BodyTooLarge,

    /// Bytes that cannot be a request head (bad request line, header without
    /// a colon, non UTF-8 head, bad `Content-Length`).
    Malformed,
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status_code:expr, $len:literal => $json:literal; )*) => {
        /// Canned response for the violation, `None` when the connection
        /// should just be dropped.
        pub(crate) const fn as_http(&self, json: bool) -> Option<&'static [u8]> {
            let response = match (json, self) {
                $(
                    (true, Self::$name) => concat!(
                        "HTTP/1.1 ", $status_code, "\r\n",
                        "connection: close\r\n",
                        "content-length: ", $len, "\r\n",
                        "content-type: application/json\r\n",
                        "\r\n",
                        $json
                    ),
                    (false, Self::$name) => concat!(
                        "HTTP/1.1 ", $status_code, "\r\n",
                        "connection: close\r\n",
                        "content-length: 0\r\n\r\n",
                    ),
                )*
                (_, Self::Malformed | Self::Io(_)) => return None,
            };

            Some(response.as_bytes())
        }
    };
}

impl ErrorKind {
    http_errors! {
        LineTooLong: "431 Request Header Fields Too Large", "66"
            => r#"{"error":"Request line or header too long","code":"LINE_TOO_LONG"}"#;
        TooManyHeaders: "431 Request Header Fields Too Large", "54"
            => r#"{"error":"Too many headers","code":"TOO_MANY_HEADERS"}"#;
        BodyTooLarge: "413 Payload Too Large", "58"
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
    }
}

impl std::error::Error for ErrorKind {}
impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

/// Errors that only mean "the peer went away".
#[inline]
pub(crate) fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
