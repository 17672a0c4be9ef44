//! Two routes share `/`: the first only knows a few pages and declines the
//! rest, the second catches whatever is left.
//!
//! ```text
//! curl localhost:8080/about      -> served by the page table
//! curl localhost:8080/missing    -> served by the fallback
//! curl localhost:8080/api/time   -> served by the /api route
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tidewire::{async_handler_fn, handler_fn, Response, Server, StatusCode};
use tracing_subscriber::EnvFilter;

const PAGES: &[(&str, &str)] = &[
    ("/", "<h1>Home</h1>"),
    ("/about", "<h1>About</h1>"),
    ("/contact", "<h1>Contact</h1>"),
];

#[tokio::main]
async fn main() -> Result<(), tidewire::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    Server::builder()
        .register_handler(
            "/",
            handler_fn(|req| {
                let (_, page) = PAGES.iter().find(|(path, _)| *path == req.path())?;
                Some(Response::new().content_type("text/html").body(*page))
            }),
        )
        .register_handler(
            "/api",
            async_handler_fn(|req| {
                Box::pin(async move {
                    if req.path() != "/time" {
                        return Ok(None);
                    }
                    // Pretend to wait on something slow.
                    tokio::time::sleep(Duration::from_millis(20)).await;

                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs();
                    Ok(Some(
                        Response::new()
                            .content_type("application/json")
                            .body(format!(r#"{{"unix":{now}}}"#)),
                    ))
                })
            }),
        )
        .register_handler(
            "/",
            handler_fn(|req| {
                Some(
                    Response::new()
                        .status(StatusCode::NotFound)
                        .text(format!("Nothing lives at {}", req.real_path())),
                )
            }),
        )
        .enable_compression()
        .listen_on(8080, None)
        .build()
        .launch()
        .await
}
