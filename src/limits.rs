//! Server configuration: limits, timeouts and behaviour switches
//!
//! Every value here is fixed when [`ServerBuilder::build`](crate::ServerBuilder::build)
//! runs and is handed to each connection at construction. Nothing is read
//! from global state while serving.
//!
//! # Examples
//!
//! ```no_run
//! use tidewire::{handler_fn, Response, Server, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tidewire::Error> {
//!     Server::builder()
//!         .listen_on(8080, None)
//!         .register_handler("/", handler_fn(|_| Some(Response::new().text("ok"))))
//!         .server_limits(ServerLimits {
//!             max_connections: 5000,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 32,
//!             body_size: 64 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .build()
//!         .launch()
//!         .await
//! }
//! ```

use std::time::Duration;

/// Server-wide behaviour.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Maximum number of connections served at the same time (default: `1024`).
    ///
    /// Each accepted socket gets its own task. Once this many tasks are alive
    /// the accept loop stops accepting until one of them finishes, so excess
    /// clients wait in the kernel backlog.
    pub max_connections: usize,

    /// Gzip response bodies for clients that send `Accept-Encoding: gzip` (default: `false`).
    ///
    /// Also toggled by [`ServerBuilder::enable_compression`](crate::ServerBuilder::enable_compression)
    /// and [`ServerBuilder::disable_compression`](crate::ServerBuilder::disable_compression).
    /// A response can still opt out with [`Response::no_compression`](crate::Response::no_compression).
    pub compression: bool,

    /// Format of the canned responses sent when a request breaks
    /// [`ReqLimits`] (default: `true`)
    ///
    /// # Examples
    /// If `true`, then on error the server will return:
    /// ```text
    /// HTTP/1.1 413 Payload Too Large\r
    /// connection: close\r
    /// content-length: 58\r
    /// content-type: application/json\r
    /// \r
    /// {"error":"Request body too large","code":"BODY_TOO_LARGE"}
    /// ```
    /// If `false`, then on error the server will return:
    /// ```text
    /// HTTP/1.1 413 Payload Too Large\r
    /// connection: close\r
    /// content-length: 0\r
    /// \r
    /// ```
    ///
    /// Malformed requests (a request line without exactly three tokens, a header
    /// line without a colon, a bad `Content-Length`) never get a response, the
    /// connection is simply closed.
    pub json_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            compression: false,
            json_errors: true,

            _priv: (),
        }
    }
}

/// Connection-level limits and timeouts
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum time to wait for each read while receiving a request (default: `30 seconds`)
    ///
    /// Covers idle keep-alive connections too: a client that sends nothing for
    /// this long is disconnected. Upgraded WebSocket sessions are not affected.
    pub socket_read_timeout: Duration,

    /// Maximum time a single write (or flush) may take (default: `30 seconds`)
    ///
    /// Applies to HTTP responses and WebSocket frames alike.
    pub socket_write_timeout: Duration,

    /// Maximum number of requests served on one keep-alive connection (default: `1000`)
    pub max_requests_per_connection: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(30),
            socket_write_timeout: Duration::from_secs(30),
            max_requests_per_connection: 1000,

            _priv: (),
        }
    }
}

/// Request head and body size caps
///
/// | Limit          | Exceeded by                             | Response |
/// |----------------|-----------------------------------------|----------|
/// | `line_size`    | request line or any header line         | `431`    |
/// | `header_count` | number of header lines                  | `431`    |
/// | `body_size`    | the value of `Content-Length`           | `413`    |
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum length in bytes of the request line or a header line, line
    /// terminator included (default: `8192`).
    pub line_size: usize,

    /// Maximum number of header lines (default: `100`).
    pub header_count: usize,

    /// Maximum body size announced by `Content-Length` (default: `16 MiB`).
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            line_size: 8 * 1024,
            header_count: 100,
            body_size: 16 * 1024 * 1024,

            _priv: (),
        }
    }
}

/// Per-endpoint WebSocket settings, see [`WebSocketUpgrade`](crate::WebSocketUpgrade).
#[derive(Debug, Clone)]
pub struct WsLimits {
    /// Largest accepted frame payload and largest reassembled (or inflated)
    /// message, in bytes (default: `64 MiB`).
    ///
    /// A peer exceeding it gets its connection dropped.
    pub max_message_size: usize,

    /// Accept `permessage-deflate` when the client offers it (default: `true`).
    ///
    /// Only incoming messages are ever inflated. Outgoing frames are always
    /// sent uncompressed.
    pub compression: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for WsLimits {
    fn default() -> Self {
        Self {
            max_message_size: 64 * 1024 * 1024,
            compression: true,

            _priv: (),
        }
    }
}
