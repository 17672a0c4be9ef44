//! Echo endpoint at `/socket`, plain HTTP everywhere else.
//!
//! Try it with `websocat ws://localhost:8080/socket`.

use tidewire::{handler_fn, ws_handler_fn, Message, Response, Server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), tidewire::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    Server::builder()
        .websocket(
            "/socket",
            ws_handler_fn(|ws, req| {
                Box::pin(async move {
                    let who = req.header("User-Agent").unwrap_or("unknown").to_string();
                    ws.on_disconnect(move |peer| {
                        tracing::info!(client = %who, peer_initiated = peer, "socket closed")
                    });

                    ws.write_text("connected, say something").await?;

                    loop {
                        match ws.read_message().await? {
                            Message::Text(text) if text == "bye" => ws.close().await?,
                            Message::Text(text) => ws.write_text(&text).await?,
                            Message::Binary(data) => ws.write_binary(&data).await?,
                        }
                    }
                })
            }),
        )
        .register_handler(
            "/",
            handler_fn(|_| Some(Response::new().text("Connect a WebSocket client to /socket"))),
        )
        .listen_on(8080, None)
        .build()
        .launch()
        .await
}
