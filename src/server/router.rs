use crate::{
    errors::Error,
    http::{request::Request, response::Response},
    server::{
        handler::{ErasedHandler, Handler},
        stream::Socket,
    },
};

struct Route {
    prefix: Vec<String>,
    handler: Box<dyn ErasedHandler>,
}

/// Ordered `(prefix, handler)` table, built before serving and shared
/// read-only by every connection.
#[derive(Default)]
pub(crate) struct Router {
    routes: Vec<Route>,
}

/// Outcome of routing one request.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Served(Response),
    /// Every matching handler declined.
    Declined,
    /// A handler took the stream or the peer went away; write nothing.
    Aborted,
}

#[inline]
fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl Router {
    /// Appends a route. Registration order is matching order.
    pub(crate) fn add(&mut self, prefix: &str, handler: impl Handler) {
        self.routes.push(Route {
            prefix: segments(prefix).into_iter().map(str::to_string).collect(),
            handler: Box::new(handler),
        });
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.routes.len()
    }

    /// Offers the request to every route whose prefix matches, in order,
    /// until one answers.
    ///
    /// Before each call the request's path is rewritten to what follows the
    /// prefix.
    pub(crate) async fn dispatch(
        &self,
        request: &mut Request,
        socket: &mut Socket,
    ) -> Result<Dispatch, Error> {
        let real_path = request.real_path().to_string();
        let path = segments(&real_path);

        for route in &self.routes {
            let prefix = &route.prefix;
            if prefix.len() > path.len()
                || !prefix.iter().zip(&path).all(|(want, got)| want == got)
            {
                continue;
            }

            request.set_path(match prefix.is_empty() {
                true => real_path.clone(),
                false => format!("/{}", path[prefix.len()..].join("/")),
            });

            let response = route.handler.call(request, socket).await?;

            if !socket.is_open() {
                return Ok(Dispatch::Aborted);
            }
            if let Some(response) = response {
                return Ok(Dispatch::Served(response));
            }
        }

        Ok(Dispatch::Declined)
    }
}
