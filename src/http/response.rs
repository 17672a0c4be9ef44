use crate::{
    http::{headers::HeaderTable, types},
    server::stream::Stream,
};
use flate2::{write::GzEncoder, Compression};
use std::io::{self, Write};

/// An HTTP response under construction.
///
/// Built with chained calls and returned from a handler wrapped in `Some`:
///
/// ```
/// use tidewire::{Response, StatusCode};
///
/// let resp = Response::new()
///     .status(StatusCode::Created)
///     .header("Location", "/users/7")
///     .content_type("application/json")
///     .body(r#"{"id":7}"#);
///
/// assert_eq!(resp.status_code(), 201);
/// assert_eq!(resp.headers().get("location"), Some("/users/7"));
/// ```
///
/// # Serialization
///
/// ```text
/// HTTP/1.1 [CODE] SP [REASON] CRLF
/// ([NAME] ": " [VALUE] CRLF)*
/// CRLF
/// [BODY]
/// ```
///
/// Unknown codes get the reason `Unknown`. When a body is present and no
/// `Content-Length` was set, it is added from the final body length, after
/// any gzip step.
///
/// # Compression
///
/// The connection gzips the body when the client accepts it and compression
/// is enabled, unless the response is [already compressed](Self::already_compressed)
/// or [forbids it](Self::no_compression).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status: u16,
    headers: HeaderTable,
    body: Option<Vec<u8>>,

    gzipped: bool,
    no_compression: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderTable::new(),
            body: None,

            gzipped: false,
            no_compression: false,
        }
    }
}

impl Response {
    /// An empty `200 OK`.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The `404` sent when no route produced a response.
    pub(crate) fn not_found() -> Self {
        Self::new()
            .status(types::StatusCode::NotFound)
            .content_type("text/plain")
            .body("File not found")
    }

    #[inline]
    pub fn status(mut self, code: impl Into<u16>) -> Self {
        self.status = code.into();
        self
    }

    /// Appends a header. Earlier values under the same name are kept.
    #[inline]
    pub fn header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.headers.append(name, value.to_string());
        self
    }

    /// Sets `Content-Type`, replacing any previous value.
    #[inline]
    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.headers.set("Content-Type", value);
        self
    }

    #[inline]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a UTF-8 body, and `Content-Type: text/plain; charset=utf-8` when
    /// no content type was chosen yet.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        if !self.headers.contains("Content-Type") {
            self.headers.set("Content-Type", "text/plain; charset=utf-8");
        }
        self.body = Some(body.into().into_bytes());
        self
    }

    /// Marks the body as gzip data already. The server adds
    /// `Content-Encoding: gzip` and never compresses it again.
    #[inline]
    pub fn already_compressed(mut self) -> Self {
        self.gzipped = true;
        self
    }

    /// Keeps the body uncompressed whatever the client accepts.
    #[inline]
    pub fn no_compression(mut self) -> Self {
        self.no_compression = true;
        self
    }
}

// Getters
impl Response {
    #[inline(always)]
    pub fn status_code(&self) -> u16 {
        self.status
    }

    #[inline(always)]
    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    #[inline(always)]
    pub fn headers_mut(&mut self) -> &mut HeaderTable {
        &mut self.headers
    }

    #[inline]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    #[inline(always)]
    pub fn is_compressed(&self) -> bool {
        self.gzipped
    }

    #[inline(always)]
    pub fn is_compression_forbidden(&self) -> bool {
        self.no_compression
    }
}

impl Response {
    /// Gzips the body in place unless the response opted out or has no body.
    ///
    /// A `Content-Length` set before this point describes the uncompressed
    /// body and is dropped so it gets recomputed.
    pub(crate) fn gzip(&mut self) -> io::Result<()> {
        if self.gzipped || self.no_compression {
            return Ok(());
        }
        let Some(body) = &self.body else {
            return Ok(());
        };

        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::fast());
        encoder.write_all(body)?;

        self.body = Some(encoder.finish()?);
        self.gzipped = true;
        self.headers.remove("Content-Length");
        Ok(())
    }

    /// Status line and headers, blank line included.
    pub(crate) fn head(&mut self) -> Vec<u8> {
        if let Some(body) = &self.body {
            if !self.headers.contains("Content-Length") {
                self.headers.set("Content-Length", body.len().to_string());
            }
        }

        let mut head = types::status_line(self.status).into_bytes();
        for (name, value) in self.headers.iter() {
            head.extend_from_slice(name.as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");

        head
    }

    /// Writes head then body, flushing after each.
    pub(crate) async fn send(&mut self, stream: &mut Stream) -> io::Result<()> {
        let head = self.head();
        stream.write_all(&head).await?;
        stream.flush().await?;

        if let Some(body) = &self.body {
            stream.write_all(body).await?;
            stream.flush().await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod head_tests {
    use super::*;
    use crate::tools::*;

    #[test]
    fn status_line() {
        #[rustfmt::skip]
        let cases = [
            (Response::new(),                                   "HTTP/1.1 200 OK\r\n\r\n"),
            (Response::new().status(types::StatusCode::Found),  "HTTP/1.1 302 Found\r\n\r\n"),
            (Response::new().status(299u16),                    "HTTP/1.1 299 Unknown\r\n\r\n"),
        ];

        for (mut resp, expected) in cases {
            assert_eq!(str_op(&resp.head()), expected);
        }
    }

    #[test]
    fn headers_in_order() {
        let mut resp = Response::new()
            .header("X-A", 1)
            .header("Set-Cookie", "a=1")
            .header("X-B", true)
            .header("Set-Cookie", "b=2");

        assert_eq!(
            str_op(&resp.head()),
            concat!(
                "HTTP/1.1 200 OK\r\n",
                "X-A: 1\r\n",
                "Set-Cookie: a=1\r\n",
                "Set-Cookie: b=2\r\n",
                "X-B: true\r\n",
                "\r\n",
            )
        );
    }

    #[test]
    fn content_length() {
        #[rustfmt::skip]
        let cases = [
            (Response::new().body("hello"),                                "5"),
            (Response::new().body(""),                                     "0"),
            (Response::new().header("Content-Length", 3).body("hello"),    "3"),
        ];

        for (mut resp, expected) in cases {
            resp.head();
            assert_eq!(resp.headers().get("Content-Length"), Some(expected));
        }

        let mut resp = Response::new();
        resp.head();
        assert!(!resp.headers().contains("Content-Length"));
    }

    #[test]
    fn text_and_content_type() {
        let resp = Response::new().text("hi");
        assert_eq!(resp.headers().get("Content-Type"), Some("text/plain; charset=utf-8"));

        let resp = Response::new().content_type("text/html").text("<p>hi</p>");
        assert_eq!(resp.headers().get("Content-Type"), Some("text/html"));
        assert_eq!(resp.body_bytes(), Some(&b"<p>hi</p>"[..]));
    }

    #[test]
    fn not_found() {
        let mut resp = Response::not_found();
        assert_eq!(
            str_op(&resp.head()),
            "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 14\r\n\r\n"
        );
        assert_eq!(resp.body_bytes(), Some(&b"File not found"[..]));
    }
}


#[cfg(test)]
mod send_tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn head_then_body() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut stream = Stream::new(server);

        let mut resp = Response::new().content_type("text/plain").body("hello");
        resp.send(&mut stream).await.unwrap();
        drop(stream);

        let mut raw = String::new();
        client.read_to_string(&mut raw).await.unwrap();
        assert_eq!(
            raw,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 5\r\n\r\nhello"
        );
    }
}
