use crate::{
    errors::{is_disconnect, Error, ErrorKind, WsError},
    http::{request, response::Response},
    limits::{ConnLimits, ReqLimits, ServerLimits},
    server::{
        router::{Dispatch, Router},
        stream::{Io, Socket, Stream},
    },
};
use std::{io, sync::Arc};

pub(crate) type AllLimits = (ServerLimits, ConnLimits, ReqLimits);

/// State every connection task reads, frozen once the server is built.
pub(crate) struct Shared {
    pub(crate) router: Router,
    pub(crate) limits: AllLimits,
}

/// One accepted socket, served until keep-alive ends, a handler takes the
/// stream over, or the peer goes away.
pub(crate) struct HttpConnection {
    shared: Arc<Shared>,
    connection: Connection,
}

#[derive(Debug, Default)]
struct Connection {
    /// Decided by the first request and kept for the rest of the connection.
    keep_alive: Option<bool>,
    request_count: usize,
}

impl HttpConnection {
    #[inline]
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            connection: Connection::default(),
        }
    }

    /// Serves the connection to the end.
    ///
    /// Resets, broken pipes and timeouts are the normal ways for a client
    /// to leave and are not reported.
    pub(crate) async fn run<T: Io>(mut self, io: T) -> Result<(), Error> {
        let (_, conn_limits, _) = &self.shared.limits;
        let stream = Stream::new(io).with_timeouts(
            Some(conn_limits.socket_read_timeout),
            Some(conn_limits.socket_write_timeout),
        );
        let mut socket = Socket::new(stream);

        let result = self.impl_run(&mut socket).await;

        if let Some(stream) = socket.stream() {
            if stream.is_writable() {
                let _ = stream.shutdown().await;
            }
        }

        match result {
            Err(err) if is_peer_gone(&err) => {
                tracing::debug!(%err, "peer went away");
                Ok(())
            }
            result => result,
        }
    }

    async fn impl_run(&mut self, socket: &mut Socket) -> Result<(), Error> {
        let shared = self.shared.clone();
        let (server_limits, conn_limits, req_limits) = &shared.limits;

        loop {
            let Some(stream) = socket.stream() else {
                return Ok(());
            };

            let mut request = match request::parse(stream, req_limits).await {
                Ok(Some(request)) => request,
                Ok(None) => return Ok(()),
                Err(ErrorKind::Io(err)) => return Err(err.0.into()),
                Err(kind) => {
                    tracing::debug!(error = %kind, "request rejected");
                    if let Some(raw) = kind.as_http(server_limits.json_errors) {
                        stream.write_all(raw).await?;
                        stream.flush().await?;
                    }
                    return Ok(());
                }
            };

            let keep_alive = *self.connection.keep_alive.get_or_insert_with(|| {
                request
                    .header("Connection")
                    .is_some_and(|value| value.eq_ignore_ascii_case("keep-alive"))
            });

            let gzip = server_limits.compression
                && request
                    .header("Accept-Encoding")
                    .is_some_and(|value| value.split(',').any(|coding| coding.trim() == "gzip"));
            request.set_accepts_gzip(gzip);

            let mut response = match shared.router.dispatch(&mut request, socket).await? {
                Dispatch::Served(response) => response,
                Dispatch::Declined => Response::not_found(),
                Dispatch::Aborted => return Ok(()),
            };

            self.connection.request_count += 1;
            let last = !keep_alive
                || self.connection.request_count >= conn_limits.max_requests_per_connection;

            match (keep_alive, last) {
                (true, false) => response.headers_mut().set("Connection", "keep-alive"),
                (true, true) => response.headers_mut().set("Connection", "close"),
                _ => {}
            }

            if gzip {
                response.gzip()?;
            }
            if response.is_compressed() && !response.headers().contains("Content-Encoding") {
                response.headers_mut().set("Content-Encoding", "gzip");
            }

            let Some(stream) = socket.stream() else {
                return Ok(());
            };
            response.send(stream).await?;

            tracing::trace!(
                status = response.status_code(),
                path = request.real_path(),
                keep_alive,
                "response sent"
            );

            if last {
                return Ok(());
            }
        }
    }
}

fn is_peer_gone(err: &Error) -> bool {
    let io_err = match err {
        Error::Io(err) | Error::WebSocket(WsError::Io(err)) => err,
        _ => return false,
    };

    is_disconnect(io_err) || io_err.kind() == io::ErrorKind::TimedOut
}
