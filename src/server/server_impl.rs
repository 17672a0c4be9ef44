use crate::{
    errors::Error,
    limits::{ConnLimits, ReqLimits, ServerLimits},
    server::{
        connection::{HttpConnection, Shared},
        handler::Handler,
        router::Router,
    },
    websocket::upgrade::{WebSocketHandler, WebSocketUpgrade},
};
use socket2::{Domain, Protocol, Type};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::{net::TcpListener, sync::Semaphore};

const LISTEN_BACKLOG: i32 = 1024;

/// An HTTP server: a set of listeners feeding one shared route table.
///
/// Every accepted socket gets its own task running the keep-alive loop.
/// Routes are matched by path prefix, in registration order, and a handler
/// returning `None` lets the next matching route try.
///
/// # Examples
///
/// ```no_run
/// use tidewire::{handler_fn, Response, Server};
///
/// #[tokio::main]
/// async fn main() -> Result<(), tidewire::Error> {
///     Server::builder()
///         .register_handler("/", handler_fn(|req| {
///             Some(Response::new().text(format!("You asked for {}", req.path())))
///         }))
///         .listen_on(8080, None)
///         .build()
///         .launch()
///         .await
/// }
/// ```
pub struct Server {
    listeners: Vec<TcpListener>,
    bind: Vec<SocketAddr>,
    shared: Arc<Shared>,
}

impl Server {
    /// Creates a new builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            router: Router::default(),
            listeners: Vec::new(),
            bind: Vec::new(),

            server_limits: ServerLimits::default(),
            connection_limits: ConnLimits::default(),
            request_limits: ReqLimits::default(),
        }
    }

    /// Binds every [`listen_on`](ServerBuilder::listen_on) address and
    /// serves all listeners until the process ends.
    ///
    /// # Errors
    ///
    /// Fails when an address cannot be bound, when no listener was
    /// configured at all, or when an accept loop dies.
    pub async fn launch(self) -> Result<(), Error> {
        let Server {
            mut listeners,
            bind,
            shared,
        } = self;

        for addr in bind {
            listeners.push(bind_reuse(addr)?);
        }
        if listeners.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no listener configured").into());
        }

        let permits = Arc::new(Semaphore::new(shared.limits.0.max_connections));

        let accept_loops: Vec<_> = listeners
            .into_iter()
            .map(|listener| tokio::spawn(accept_loop(listener, shared.clone(), permits.clone())))
            .collect();

        for task in accept_loops {
            task.await.map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        }

        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, permits: Arc<Semaphore>) {
    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            return;
        };

        let (stream, addr) = match listener.accept().await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, "accept failed");
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        let shared = shared.clone();
        tokio::spawn(async move {
            tracing::debug!(%addr, "connection opened");

            if let Err(err) = HttpConnection::new(shared).run(stream).await {
                tracing::warn!(%addr, %err, "connection ended with an error");
            }

            tracing::debug!(%addr, "connection closed");
            drop(permit);
        });
    }
}

/// A listening socket with `SO_REUSEADDR` set before bind.
fn bind_reuse(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    match addr.ip().is_unspecified() {
        true => tracing::info!("Listening on port {} on all interfaces", addr.port()),
        false => tracing::info!("Listening on {addr}"),
    }

    TcpListener::from_std(socket.into())
}

/// Builder for configuring and creating [`Server`] instances.
///
/// Nothing is bound until [`Server::launch`]; the builder only records
/// routes, addresses and limits.
pub struct ServerBuilder {
    router: Router,
    listeners: Vec<TcpListener>,
    bind: Vec<SocketAddr>,

    server_limits: ServerLimits,
    connection_limits: ConnLimits,
    request_limits: ReqLimits,
}

impl ServerBuilder {
    /// Appends a route. Requests whose path starts with `prefix`, segment
    /// by segment, are offered to `handler`.
    ///
    /// Registration order is matching order, so a catch-all `"/"` route
    /// registered first still lets later routes serve what it declines.
    ///
    /// # Examples
    ///
    /// ```
    /// use tidewire::{handler_fn, Response, Server};
    ///
    /// let server = Server::builder()
    ///     .register_handler("/api", handler_fn(|req| {
    ///         (req.path() == "/status").then(|| Response::new().text("up"))
    ///     }))
    ///     .register_handler("/", handler_fn(|_| Some(Response::new().text("fallback"))))
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn register_handler(mut self, prefix: &str, handler: impl Handler) -> Self {
        self.router.add(prefix, handler);
        self
    }

    /// Registers a WebSocket endpoint at `prefix`, accepting
    /// `permessage-deflate` when the client offers it.
    ///
    /// Use [`register_handler`](Self::register_handler) with a configured
    /// [`WebSocketUpgrade`] for other limits.
    #[inline(always)]
    pub fn websocket(self, prefix: &str, handler: impl WebSocketHandler) -> Self {
        self.register_handler(prefix, WebSocketUpgrade::new(handler))
    }

    /// Turns gzip on for clients sending `Accept-Encoding: gzip`.
    #[inline(always)]
    pub fn enable_compression(mut self) -> Self {
        self.server_limits.compression = true;
        self
    }

    #[inline(always)]
    pub fn disable_compression(mut self) -> Self {
        self.server_limits.compression = false;
        self
    }

    /// Adds an address to bind at launch. `None` listens on all IPv4
    /// interfaces.
    #[inline(always)]
    pub fn listen_on(mut self, port: u16, ip: Option<IpAddr>) -> Self {
        let ip = ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        self.bind.push(SocketAddr::new(ip, port));
        self
    }

    /// Adds an already bound listener.
    ///
    /// ```no_run
    /// # #[tokio::main]
    /// # async fn main() -> std::io::Result<()> {
    /// use tidewire::Server;
    /// use tokio::net::TcpListener;
    ///
    /// let listener = TcpListener::bind("127.0.0.1:0").await?;
    /// println!("serving on {}", listener.local_addr()?);
    ///
    /// let server = Server::builder().listener(listener).build();
    /// # Ok(())
    /// # }
    /// ```
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Replaces the server-wide limits, compression switch included.
    ///
    /// ```
    /// use tidewire::{limits::ServerLimits, Server};
    ///
    /// let server = Server::builder()
    ///     .server_limits(ServerLimits {
    ///         max_connections: 64,
    ///         json_errors: false,
    ///         ..ServerLimits::default()
    ///     })
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = limits;
        self
    }

    /// ```
    /// use tidewire::{limits::ConnLimits, Server};
    /// use std::time::Duration;
    ///
    /// let server = Server::builder()
    ///     .connection_limits(ConnLimits {
    ///         socket_read_timeout: Duration::from_secs(5),
    ///         max_requests_per_connection: 100,
    ///         ..ConnLimits::default()
    ///     })
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = limits;
        self
    }

    /// ```
    /// use tidewire::{limits::ReqLimits, Server};
    ///
    /// let server = Server::builder()
    ///     .request_limits(ReqLimits {
    ///         header_count: 32,
    ///         body_size: 1024 * 1024,
    ///         ..ReqLimits::default()
    ///     })
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = limits;
        self
    }

    /// Freezes the route table and limits into a [`Server`].
    #[inline]
    pub fn build(self) -> Server {
        tracing::debug!(
            routes = self.router.len(),
            compression = self.server_limits.compression,
            "server built"
        );

        Server {
            listeners: self.listeners,
            bind: self.bind,
            shared: Arc::new(Shared {
                router: self.router,
                limits: (self.server_limits, self.connection_limits, self.request_limits),
            }),
        }
    }
}
