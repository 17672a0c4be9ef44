use crate::{
    errors::WsError,
    http::{request::Request, response::Response, types::StatusCode},
    limits::WsLimits,
    server::{
        handler::{BoxFuture, Handled, Handler},
        stream::Socket,
    },
    websocket::session::WebSocket,
};
use sha1::{Digest, Sha1};
use std::future::Future;

pub(crate) const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// `Sec-WebSocket-Accept` value for a client key.
pub(crate) fn accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WS_GUID.as_bytes());
    base64::encode(sha1.finalize())
}

/// Every `Sec-WebSocket-Extensions` offer as `(name, params)`, in order.
///
/// All header values are joined, then split on `,`; each offer splits on
/// `;` into its name and parameters.
pub(crate) fn parse_extensions<'a>(
    values: impl IntoIterator<Item = &'a String>,
) -> Vec<(String, Vec<String>)> {
    values
        .into_iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|offer| !offer.is_empty())
        .map(|offer| {
            let mut parts = offer.split(';').map(str::trim);
            let name = parts.next().unwrap_or_default().to_string();
            (name, parts.map(str::to_string).collect())
        })
        .collect()
}

/// A trait for driving an upgraded connection.
///
/// Called once per connection with the session and the request that asked
/// for the upgrade. Returning [`WsError::Closed`] is the normal way out of
/// a read loop; the session is closed afterwards in every case.
pub trait WebSocketHandler: Sync + Send + 'static {
    fn serve(
        &self,
        ws: &mut WebSocket,
        request: &Request,
    ) -> impl Future<Output = Result<(), WsError>> + Send;
}

/// Turns a closure returning a boxed future into a [`WebSocketHandler`].
///
/// ```
/// use tidewire::{ws_handler_fn, Server};
///
/// let server = Server::builder()
///     .websocket(
///         "/socket",
///         ws_handler_fn(|ws, _req| {
///             Box::pin(async move {
///                 loop {
///                     let msg = ws.read_text().await?;
///                     ws.write_text(&msg).await?;
///                 }
///             })
///         }),
///     )
///     .build();
/// ```
#[inline]
pub fn ws_handler_fn<F>(f: F) -> WsFnHandler<F>
where
    F: for<'a> Fn(&'a mut WebSocket, &'a Request) -> BoxFuture<'a, Result<(), WsError>>
        + Send
        + Sync
        + 'static,
{
    WsFnHandler(f)
}

/// See [`ws_handler_fn`].
pub struct WsFnHandler<F>(F);

impl<F> WebSocketHandler for WsFnHandler<F>
where
    F: for<'a> Fn(&'a mut WebSocket, &'a Request) -> BoxFuture<'a, Result<(), WsError>>
        + Send
        + Sync
        + 'static,
{
    fn serve(
        &self,
        ws: &mut WebSocket,
        request: &Request,
    ) -> impl Future<Output = Result<(), WsError>> + Send {
        async move { (self.0)(ws, request).await }
    }
}

/// Route handler performing the upgrade handshake.
///
/// Requests that are not `GET` with `Connection: Upgrade` are declined, so
/// other routes under the same prefix still see them. A missing
/// `Sec-WebSocket-Key` is answered with `400`.
///
/// On success the stream is taken over: the `101` response is written, the
/// [`WebSocketHandler`] runs, and the session is closed. Nothing else is
/// ever written on that connection by the HTTP side.
pub struct WebSocketUpgrade<W> {
    handler: W,
    limits: WsLimits,
}

impl<W: WebSocketHandler> WebSocketUpgrade<W> {
    #[inline]
    pub fn new(handler: W) -> Self {
        Self {
            handler,
            limits: WsLimits::default(),
        }
    }

    #[inline]
    pub fn limits(mut self, limits: WsLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Whether `permessage-deflate` offers are accepted.
    #[inline]
    pub fn compression(mut self, enabled: bool) -> Self {
        self.limits.compression = enabled;
        self
    }

    fn eligible(request: &Request) -> bool {
        request.method() == "GET"
            && request
                .header("Connection")
                .is_some_and(|value| value.eq_ignore_ascii_case("Upgrade"))
    }
}

impl<W: WebSocketHandler> Handler for WebSocketUpgrade<W> {
    async fn handle(&self, request: &Request, socket: &mut Socket) -> Handled {
        if !Self::eligible(request) {
            return Ok(None);
        }
        let Some(key) = request.header("Sec-WebSocket-Key") else {
            return Ok(Some(Response::new().status(StatusCode::BadRequest)));
        };

        let offers = parse_extensions(request.headers().get_all("Sec-WebSocket-Extensions"));
        let compression =
            self.limits.compression && offers.iter().any(|(name, _)| name == PERMESSAGE_DEFLATE);

        let mut response = Response::new().status(StatusCode::SwitchingProtocols);
        let headers = response.headers_mut();
        headers.append("Upgrade", "websocket");
        headers.append("Connection", "Upgrade");
        headers.append("Sec-WebSocket-Accept", accept_key(key));
        headers.append_opt("Sec-WebSocket-Protocol", request.header("Sec-WebSocket-Protocol"));
        headers.append_opt("Sec-WebSocket-Extensions", compression.then_some(PERMESSAGE_DEFLATE));

        let Some(mut stream) = socket.take() else {
            return Ok(None);
        };
        response.send(&mut stream).await?;

        tracing::debug!(path = request.real_path(), compression, "websocket upgraded");

        let mut ws = WebSocket::new(stream, compression, &self.limits);
        let served = self.handler.serve(&mut ws, request).await;
        let closed = ws.close().await;

        match served.and(closed) {
            Err(err) if !err.is_closed() => Err(err.into()),
            _ => Ok(None),
        }
    }
}
