//! tidewire - hand-rolled HTTP/1.1 server with prefix routing and WebSockets
//!
//! A small async HTTP/1.1 server that speaks the wire protocol itself:
//! request parsing, response serialization, keep-alive, gzip, and an upgrade
//! path to a WebSocket implementation with fragmentation and
//! `permessage-deflate`.
//!
//! # Routing
//!
//! Handlers are registered under path prefixes and tried in registration
//! order. A handler answers with `Some(response)` or declines with `None`, in
//! which case the next matching route gets the request. When every route
//! declines, the client gets `404 File not found`.
//!
//! Inside a handler, [`Request::path`] is the path with the matched prefix
//! removed and [`Request::real_path`] the full one.
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use tidewire::{handler_fn, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tidewire::Error> {
//!     Server::builder()
//!         .register_handler("/", handler_fn(|_| Some(Response::new().text("Hello World!"))))
//!         .listen_on(8080, None)
//!         .build()
//!         .launch()
//!         .await
//! }
//! ```
//! Fallthrough and a WebSocket endpoint:
//! ```no_run
//! use tidewire::{handler_fn, ws_handler_fn, Response, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tidewire::Error> {
//!     Server::builder()
//!         // Only answers for known users; everything else falls through.
//!         .register_handler("/users", handler_fn(|req| match req.path() {
//!             "/alice" | "/bob" => Some(Response::new().text(format!("profile {}", req.path()))),
//!             _ => None,
//!         }))
//!         .websocket("/socket", ws_handler_fn(|ws, _| Box::pin(async move {
//!             loop {
//!                 let text = ws.read_text().await?;
//!                 ws.write_text(&text).await?;
//!             }
//!         })))
//!         .register_handler("/", handler_fn(|req| {
//!             Some(Response::new()
//!                 .status(StatusCode::NotFound)
//!                 .text(format!("nothing at {}", req.real_path())))
//!         }))
//!         .enable_compression()
//!         .listen_on(8080, None)
//!         .build()
//!         .launch()
//!         .await
//! }
//! ```
//! Advanced configuration:
//! ```no_run
//! use tidewire::{handler_fn, limits::{ConnLimits, ReqLimits, ServerLimits}, Response, Server};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tidewire::Error> {
//!     Server::builder()
//!         .register_handler("/", handler_fn(|_| Some(Response::new().text("ok"))))
//!         .server_limits(ServerLimits {
//!             max_connections: 5000,
//!             ..ServerLimits::default()
//!         })
//!         .connection_limits(ConnLimits {
//!             socket_read_timeout: Duration::from_secs(5),
//!             max_requests_per_connection: 10_000,
//!             ..ConnLimits::default()
//!         })
//!         .request_limits(ReqLimits {
//!             header_count: 32,
//!             body_size: 64 * 1024,
//!             ..ReqLimits::default()
//!         })
//!         .listen_on(8080, None)
//!         .build()
//!         .launch()
//!         .await
//! }
//! ```
//!
//! # Logging
//!
//! The crate logs through [`tracing`]: `info` when a listener starts, `debug`
//! for connection lifecycle, `trace` per request line and WebSocket frame.
//! Install any subscriber to see it.

pub(crate) mod http {
    pub(crate) mod headers;
    pub(crate) mod query;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod handler;
    pub(crate) mod router;
    pub(crate) mod server_impl;
    pub(crate) mod stream;
}
pub(crate) mod websocket {
    pub(crate) mod frame;
    pub(crate) mod session;
    pub(crate) mod upgrade;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::{Error, WsError},
    http::{
        headers::HeaderTable,
        request::Request,
        response::Response,
        types::{reason_phrase, StatusCode},
    },
    server::{
        handler::{async_handler_fn, handler_fn, AsyncFnHandler, BoxFuture, FnHandler, Handled, Handler},
        server_impl::{Server, ServerBuilder},
        stream::Socket,
    },
    websocket::{
        session::{Message, WebSocket},
        upgrade::{ws_handler_fn, WebSocketHandler, WebSocketUpgrade, WsFnHandler},
    },
};
