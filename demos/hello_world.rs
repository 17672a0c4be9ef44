use tidewire::{Handled, Handler, Request, Response, Server, Socket};
use tracing_subscriber::EnvFilter;

struct HelloWorld;

impl Handler for HelloWorld {
    async fn handle(&self, _: &Request, _: &mut Socket) -> Handled {
        Ok(Some(
            Response::new()
                .content_type("text/plain")
                .body("Hello, world!"),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), tidewire::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    Server::builder()
        .register_handler("/", HelloWorld)
        .listen_on(8080, None)
        .build()
        .launch()
        .await
}
