use flate2::{read::GzDecoder, Compress, Compression, FlushCompress};
use std::{
    io::Read,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};
use tidewire::{async_handler_fn, handler_fn, ws_handler_fn, Response, Server, ServerBuilder};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing_subscriber::EnvFilter;

type Conn = BufReader<TcpStream>;

async fn start(builder: ServerBuilder) -> SocketAddr {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(builder.listener(listener).build().launch());
    addr
}

async fn connect(addr: SocketAddr) -> Conn {
    BufReader::new(TcpStream::connect(addr).await.unwrap())
}

async fn send(conn: &mut Conn, raw: &[u8]) {
    conn.get_mut().write_all(raw).await.unwrap();
}

/// Next `(head, body)` on the connection, `None` once the server hung up.
async fn read_response(conn: &mut Conn) -> Option<(String, Vec<u8>)> {
    let mut head = String::new();
    loop {
        let mut line = String::new();
        if conn.read_line(&mut line).await.unwrap() == 0 {
            return None;
        }
        head.push_str(&line);
        if line == "\r\n" {
            break;
        }
    }

    let len = header(&head, "content-length").map_or(0, |v| v.parse().unwrap());
    let mut body = vec![0; len];
    conn.read_exact(&mut body).await.unwrap();
    Some((head, body))
}

fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

async fn get(addr: SocketAddr, raw: &str) -> (String, Vec<u8>) {
    let mut conn = connect(addr).await;
    send(&mut conn, raw.as_bytes()).await;
    read_response(&mut conn).await.expect("no response")
}

#[tokio::test]
async fn fallthrough_to_catch_all() {
    let addr = start(
        Server::builder()
            .register_handler(
                "/",
                handler_fn(|req| {
                    (req.path() == "/index.html").then(|| Response::new().text("<h1>index</h1>"))
                }),
            )
            .register_handler(
                "/",
                handler_fn(|req| Some(Response::new().text(format!("fallback for {}", req.path())))),
            ),
    )
    .await;

    let (head, body) = get(addr, "GET /missing.txt HTTP/1.1\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"fallback for /missing.txt");

    let (_, body) = get(addr, "GET /index.html HTTP/1.1\r\n\r\n").await;
    assert_eq!(body, b"<h1>index</h1>");
}

#[tokio::test]
async fn prefix_is_stripped() {
    let addr = start(Server::builder().register_handler(
        "/a/b",
        handler_fn(|req| {
            Some(Response::new().text(format!(
                "{} {} {:?}",
                req.path(),
                req.real_path(),
                req.query("x")
            )))
        }),
    ))
    .await;

    #[rustfmt::skip]
    let cases = [
        ("GET /a/b/c HTTP/1.1\r\n\r\n",         "/c /a/b/c None"),
        ("GET /a/b/c?x=1%202 HTTP/1.1\r\n\r\n", "/c /a/b/c Some(\"1 2\")"),
        ("GET /a/b HTTP/1.1\r\n\r\n",           "/ /a/b None"),
    ];

    for (raw, expected) in cases {
        let (_, body) = get(addr, raw).await;
        assert_eq!(String::from_utf8(body).unwrap(), expected);
    }

    let (head, body) = get(addr, "GET /a HTTP/1.1\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert_eq!(body, b"File not found");
}

#[tokio::test]
async fn keep_alive_from_first_request() {
    let addr = start(Server::builder().register_handler(
        "/",
        handler_fn(|req| Some(Response::new().text(req.path().to_string()))),
    ))
    .await;

    let mut conn = connect(addr).await;
    send(&mut conn, b"GET /one HTTP/1.1\r\nConnection: keep-alive\r\n\r\n").await;
    let (head, body) = read_response(&mut conn).await.unwrap();
    assert_eq!(header(&head, "Connection"), Some("keep-alive"));
    assert_eq!(body, b"/one");

    send(&mut conn, b"GET /two HTTP/1.1\r\n\r\n").await;
    let (head, body) = read_response(&mut conn).await.unwrap();
    assert_eq!(header(&head, "Connection"), Some("keep-alive"));
    assert_eq!(body, b"/two");

    // Still open after a request that did not ask for keep-alive.
    send(&mut conn, b"GET /three HTTP/1.1\r\n\r\n").await;
    let (_, body) = read_response(&mut conn).await.unwrap();
    assert_eq!(body, b"/three");

    let mut once = connect(addr).await;
    send(&mut once, b"GET /x HTTP/1.1\r\n\r\n").await;
    assert!(read_response(&mut once).await.is_some());
    assert!(read_response(&mut once).await.is_none());
}

#[tokio::test]
async fn gzip_negotiated() {
    let original = "All work and no play makes Jack a dull boy. ".repeat(250)[..10_000].to_string();
    let served = original.clone();

    let addr = start(
        Server::builder()
            .register_handler("/", handler_fn(move |_| Some(Response::new().text(served.clone()))))
            .enable_compression(),
    )
    .await;

    let (head, body) = get(addr, "GET / HTTP/1.1\r\nAccept-Encoding: gzip, deflate\r\n\r\n").await;
    assert_eq!(header(&head, "Content-Encoding"), Some("gzip"));
    assert_eq!(header(&head, "Content-Length"), Some(&*body.len().to_string()));
    assert!(body.len() < 10_000);

    let mut plain = String::new();
    GzDecoder::new(&body[..]).read_to_string(&mut plain).unwrap();
    assert_eq!(plain, original);

    let (head, body) = get(addr, "GET / HTTP/1.1\r\n\r\n").await;
    assert_eq!(header(&head, "Content-Encoding"), None);
    assert_eq!(body.len(), 10_000);
}

#[tokio::test]
async fn async_handler_and_form() {
    let addr = start(Server::builder().register_handler(
        "/form",
        async_handler_fn(|req| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(Some(Response::new().text(format!(
                    "{} {} {}",
                    req.post_param("name").unwrap_or("-"),
                    req.cookie("session").unwrap_or("-"),
                    req.method(),
                ))))
            })
        }),
    ))
    .await;

    let body = "name=J%C3%B6rg+M&age=7";
    let raw = format!(
        "POST /form HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nCookie: a=1; session=xyz\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );

    let (_, body) = get(addr, &raw).await;
    assert_eq!(String::from_utf8(body).unwrap(), "Jörg M xyz POST");
}

#[tokio::test]
async fn oversized_body_rejected() {
    let addr = start(
        Server::builder()
            .register_handler("/", handler_fn(|_| Some(Response::new())))
            .request_limits(tidewire::limits::ReqLimits {
                body_size: 16,
                ..Default::default()
            }),
    )
    .await;

    let mut conn = connect(addr).await;
    send(&mut conn, b"POST / HTTP/1.1\r\nContent-Length: 17\r\n\r\n").await;

    let (head, _) = read_response(&mut conn).await.unwrap();
    assert!(head.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    assert!(read_response(&mut conn).await.is_none());
}

// WebSocket

const MASK: [u8; 4] = [0xa1, 0x02, 0x5c, 0x7e];

fn client_frame(rsv1: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 126);

    let mut out = vec![0x80 | if rsv1 { 0x40 } else { 0 } | opcode, 0x80 | payload.len() as u8];
    out.extend_from_slice(&MASK);
    out.extend(payload.iter().enumerate().map(|(i, b)| b ^ MASK[i % 4]));
    out
}

/// Reads one short unmasked server frame as `(first byte, payload)`.
async fn server_frame(conn: &mut Conn) -> (u8, Vec<u8>) {
    let mut head = [0u8; 2];
    conn.read_exact(&mut head).await.unwrap();
    assert!(head[1] < 126, "unexpected length byte {}", head[1]);

    let mut payload = vec![0; head[1] as usize];
    conn.read_exact(&mut payload).await.unwrap();
    (head[0], payload)
}

async fn handshake(conn: &mut Conn, extensions: Option<&str>) -> String {
    let mut raw = String::from(concat!(
        "GET /socket HTTP/1.1\r\n",
        "Host: localhost\r\n",
        "Connection: Upgrade\r\n",
        "Upgrade: websocket\r\n",
        "Sec-WebSocket-Version: 13\r\n",
        "Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n",
    ));
    if let Some(extensions) = extensions {
        raw.push_str(&format!("Sec-WebSocket-Extensions: {extensions}\r\n"));
    }
    raw.push_str("\r\n");

    send(conn, raw.as_bytes()).await;
    let (head, body) = read_response(conn).await.unwrap();
    assert!(body.is_empty());
    head
}

async fn echo_server(disconnects: Arc<Mutex<Vec<bool>>>) -> SocketAddr {
    start(
        Server::builder()
            .websocket(
                "/socket",
                ws_handler_fn(move |ws, _| {
                    let disconnects = disconnects.clone();
                    Box::pin(async move {
                        ws.on_disconnect(move |peer| disconnects.lock().unwrap().push(peer));
                        loop {
                            let text = ws.read_text().await?;
                            ws.write_text(&text).await?;
                        }
                    })
                }),
            )
            .register_handler("/", handler_fn(|_| Some(Response::new().text("plain http")))),
    )
    .await
}

#[tokio::test]
async fn websocket_peer_close() {
    let disconnects = Arc::new(Mutex::new(Vec::new()));
    let addr = echo_server(disconnects.clone()).await;

    let mut conn = connect(addr).await;
    let head = handshake(&mut conn, None).await;
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert_eq!(header(&head, "Sec-WebSocket-Accept"), Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo="));
    assert_eq!(header(&head, "Sec-WebSocket-Extensions"), None);

    send(&mut conn, &client_frame(false, 1, b"hello")).await;
    assert_eq!(server_frame(&mut conn).await, (0x81, b"hello".to_vec()));

    send(&mut conn, &client_frame(false, 8, &[0x03, 0xe8])).await;
    assert_eq!(server_frame(&mut conn).await, (0x88, vec![]));

    // The close frame goes out before the callbacks run and the stream is
    // shut down after them.
    let mut rest = Vec::new();
    conn.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    assert_eq!(*disconnects.lock().unwrap(), [true]);
}

#[tokio::test]
async fn websocket_deflate() {
    let addr = echo_server(Arc::new(Mutex::new(Vec::new()))).await;

    let mut conn = connect(addr).await;
    let head = handshake(&mut conn, Some("permessage-deflate; client_max_window_bits")).await;
    assert_eq!(header(&head, "Sec-WebSocket-Extensions"), Some("permessage-deflate"));

    let mut compressor = Compress::new(Compression::default(), false);
    for _ in 0..2 {
        let mut deflated = Vec::with_capacity(128);
        compressor
            .compress_vec(b"squeeze me, squeeze me", &mut deflated, FlushCompress::Sync)
            .unwrap();
        deflated.truncate(deflated.len() - 4);

        send(&mut conn, &client_frame(true, 1, &deflated)).await;
        // Replies are never compressed.
        assert_eq!(server_frame(&mut conn).await, (0x81, b"squeeze me, squeeze me".to_vec()));
    }
}

#[tokio::test]
async fn websocket_route_falls_through_for_plain_get() {
    let addr = echo_server(Arc::new(Mutex::new(Vec::new()))).await;

    let (head, body) = get(addr, "GET /socket HTTP/1.1\r\n\r\n").await;
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body, b"plain http");
}
