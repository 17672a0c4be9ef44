use crate::{errors::Error, http::request::Request, http::response::Response, server::stream::Socket};
use std::{future::Future, pin::Pin};

/// What a handler produces: `Ok(Some(..))` serves the request, `Ok(None)`
/// declines it so the router keeps looking, `Err(..)` drops the connection.
pub type Handled = Result<Option<Response>, Error>;

/// A boxed `Send` future, the return type of closure handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A trait for answering requests routed to a path prefix.
///
/// Returning `Ok(None)` means "not mine": the router goes on with the next
/// route whose prefix matches, and answers `404` if none serves the request.
///
/// The [`Socket`] is only of interest to handlers that take the connection
/// over (see [`WebSocketUpgrade`](crate::WebSocketUpgrade)).
///
/// # Examples
///
/// ```
/// use tidewire::{Handled, Handler, Request, Response, Socket};
///
/// struct Greeter;
///
/// impl Handler for Greeter {
///     async fn handle(&self, req: &Request, _: &mut Socket) -> Handled {
///         match req.query("name") {
///             Some(name) => Ok(Some(Response::new().text(format!("Hello, {name}!")))),
///             None => Ok(None),
///         }
///     }
/// }
/// ```
pub trait Handler: Sync + Send + 'static {
    fn handle(
        &self,
        request: &Request,
        socket: &mut Socket,
    ) -> impl Future<Output = Handled> + Send;
}

/// Object-safe view of [`Handler`] stored in the route table.
pub(crate) trait ErasedHandler: Sync + Send + 'static {
    fn call<'a>(&'a self, request: &'a Request, socket: &'a mut Socket) -> BoxFuture<'a, Handled>;
}

impl<H: Handler> ErasedHandler for H {
    #[inline]
    fn call<'a>(&'a self, request: &'a Request, socket: &'a mut Socket) -> BoxFuture<'a, Handled> {
        Box::pin(self.handle(request, socket))
    }
}

/// Turns a synchronous closure into a [`Handler`].
///
/// ```
/// use tidewire::{handler_fn, Response};
///
/// let hello = handler_fn(|req| {
///     (req.path() == "/hello").then(|| Response::new().text("Hello, world!"))
/// });
/// ```
#[inline]
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    FnHandler(f)
}

/// See [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    async fn handle(&self, request: &Request, _: &mut Socket) -> Handled {
        Ok((self.0)(request))
    }
}

/// Turns a closure returning a boxed future into a [`Handler`].
///
/// ```
/// use tidewire::{async_handler_fn, Response};
/// use std::time::Duration;
///
/// let slow = async_handler_fn(|req| {
///     Box::pin(async move {
///         tokio::time::sleep(Duration::from_millis(10)).await;
///         Ok(Some(Response::new().text(format!("waited for {}", req.path()))))
///     })
/// });
/// ```
#[inline]
pub fn async_handler_fn<F>(f: F) -> AsyncFnHandler<F>
where
    F: for<'a> Fn(&'a Request) -> BoxFuture<'a, Handled> + Send + Sync + 'static,
{
    AsyncFnHandler(f)
}

/// See [`async_handler_fn`].
pub struct AsyncFnHandler<F>(F);

impl<F> Handler for AsyncFnHandler<F>
where
    F: for<'a> Fn(&'a Request) -> BoxFuture<'a, Handled> + Send + Sync + 'static,
{
    fn handle(
        &self,
        request: &Request,
        _: &mut Socket,
    ) -> impl Future<Output = Handled> + Send {
        (self.0)(request)
    }
}
