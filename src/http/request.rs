use crate::{
    errors::ErrorKind,
    http::{headers::HeaderTable, query},
    limits::ReqLimits,
    server::stream::Stream,
};
use memchr::memchr;
use std::{collections::HashMap, io};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A parsed HTTP/1.1 request.
///
/// # Accepted format
///
/// ```text
/// [METHOD] SP [TARGET] SP [VERSION] CRLF
/// ([NAME] ":" [VALUE] CRLF)*
/// CRLF
/// [BODY]
/// ```
///
/// - The request line must split on single spaces into exactly three tokens.
///   The method and version tokens are not interpreted.
/// - A header line splits on its first colon, the value is trimmed.
///   Repeated headers keep every value.
/// - Lines may end with `\n` or `\r\n`. The head must be valid UTF-8.
/// - A body is read only when `Content-Length` is present. Chunked bodies are
///   not supported.
///
/// Anything else ends the connection without a response.
///
/// # Derived data
///
/// | Accessor                        | Source                                                      |
/// |---------------------------------|-------------------------------------------------------------|
/// | [`real_path`](Self::real_path)  | target up to the first `?`                                  |
/// | [`query`](Self::query)          | target after the first `?`, percent-decoded                 |
/// | [`cookie`](Self::cookie)        | every `Cookie` header, split on `;` then on the first `=`   |
/// | [`post_param`](Self::post_param)| body, when `Content-Type` is `application/x-www-form-urlencoded` |
/// | [`path`](Self::path)            | `real_path` with the matched route prefix stripped          |
///
/// Repeated query, form or cookie keys keep the last value.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: String,
    target: String,
    real_path: String,
    path: String,

    query: HashMap<String, String>,
    headers: HeaderTable,
    cookies: HashMap<String, String>,
    post_params: HashMap<String, String>,

    body: Option<Vec<u8>>,
    accepts_gzip: bool,
}

impl Request {
    /// Builds a request the same way the parser does.
    ///
    /// Useful to unit test handlers without a socket.
    ///
    /// ```
    /// use tidewire::{HeaderTable, Request};
    ///
    /// let req = Request::new("GET", "/users?id=7&name=J%C3%B6rg", HeaderTable::new(), None);
    ///
    /// assert_eq!(req.real_path(), "/users");
    /// assert_eq!(req.path(), "/users");
    /// assert_eq!(req.query("id"), Some("7"));
    /// assert_eq!(req.query("name"), Some("Jörg"));
    /// ```
    pub fn new(
        method: impl Into<String>,
        target: impl Into<String>,
        headers: HeaderTable,
        body: Option<Vec<u8>>,
    ) -> Self {
        let target = target.into();

        let (real_path, query) = match memchr(b'?', target.as_bytes()) {
            Some(i) => (target[..i].to_string(), query::parse_form(&target[i + 1..])),
            None => (target.clone(), HashMap::new()),
        };

        let cookies = query::parse_cookies(headers.get_all("Cookie").iter().map(String::as_str));

        let post_params = match (&body, headers.get("Content-Type")) {
            (Some(body), Some(FORM_CONTENT_TYPE)) => {
                query::parse_form(&String::from_utf8_lossy(body))
            }
            _ => HashMap::new(),
        };

        Self {
            method: method.into(),
            path: real_path.clone(),
            target,
            real_path,

            query,
            headers,
            cookies,
            post_params,

            body,
            accepts_gzip: false,
        }
    }

    #[inline]
    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    #[inline]
    pub(crate) fn set_accepts_gzip(&mut self, value: bool) {
        self.accepts_gzip = value;
    }
}

// Public API
impl Request {
    #[inline(always)]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request target exactly as received, query included.
    #[inline(always)]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The target's path component, before any route prefix is stripped.
    #[inline(always)]
    pub fn real_path(&self) -> &str {
        &self.real_path
    }

    /// The path as seen by the current route: `/` followed by the segments
    /// left after its prefix. Equal to [`real_path`](Self::real_path) for
    /// routes registered on `/`.
    #[inline(always)]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    #[inline(always)]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// First value of the header, name matched case-insensitively.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    #[inline(always)]
    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    #[inline]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    #[inline(always)]
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    #[inline]
    pub fn post_param(&self, name: &str) -> Option<&str> {
        self.post_params.get(name).map(String::as_str)
    }

    #[inline(always)]
    pub fn post_params(&self) -> &HashMap<String, String> {
        &self.post_params
    }

    #[inline]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Whether the response to this request will be gzipped by the server:
    /// the client accepts `gzip` and compression is enabled.
    ///
    /// Handlers that cache pre-compressed bodies use this to decide whether to
    /// return them with [`Response::already_compressed`](crate::Response::already_compressed).
    #[inline(always)]
    pub fn accepts_gzip(&self) -> bool {
        self.accepts_gzip
    }
}

/// Reads the next request from `stream`.
///
/// `Ok(None)` covers every case where the connection should just end: clean
/// end of stream, a malformed head, a body cut short.
pub(crate) async fn parse(
    stream: &mut Stream,
    limits: &ReqLimits,
) -> Result<Option<Request>, ErrorKind> {
    match parse_impl(stream, limits).await {
        Err(ErrorKind::Malformed) => Ok(None),
        Err(ErrorKind::Io(err)) if err.0.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        result => result,
    }
}

async fn parse_impl(
    stream: &mut Stream,
    limits: &ReqLimits,
) -> Result<Option<Request>, ErrorKind> {
    let Some(line) = stream.read_line(limits.line_size).await? else {
        return Ok(None);
    };
    tracing::trace!(request_line = %line, "request");

    let (method, target) = match line.split(' ').collect::<Vec<_>>()[..] {
        [method, target, _version] => (method.to_string(), target.to_string()),
        _ => return Err(ErrorKind::Malformed),
    };

    let mut headers = HeaderTable::new();
    let mut count = 0;
    loop {
        let line = stream
            .read_line(limits.line_size)
            .await?
            .ok_or(ErrorKind::Malformed)?;

        if line.is_empty() {
            break;
        }

        count += 1;
        if count > limits.header_count {
            return Err(ErrorKind::TooManyHeaders);
        }

        let colon = memchr(b':', line.as_bytes()).ok_or(ErrorKind::Malformed)?;
        headers.append(&line[..colon], line[colon + 1..].trim());
    }

    let body = match headers.get("Content-Length") {
        Some(value) => {
            let len = value
                .trim()
                .parse::<usize>()
                .map_err(|_| ErrorKind::Malformed)?;
            if len > limits.body_size {
                return Err(ErrorKind::BodyTooLarge);
            }

            let mut body = vec![0; len];
            stream.read_exact(&mut body).await?;
            Some(body)
        }
        None => None,
    };

    Ok(Some(Request::new(method, target, headers, body)))
}
