use crate::errors::{is_disconnect, ErrorKind};
use std::{future::Future, io, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream},
    time::timeout,
};

/// Anything a connection can run over: a `TcpStream`, one end of
/// `tokio::io::duplex`, a `Cursor` in tests.
pub(crate) trait Io: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Io for T {}

/// Buffered byte stream of one connection.
///
/// Writes are buffered until [`flush`](Self::flush). A write that fails
/// because the peer went away marks the stream as no longer writable; the
/// connection loop checks this after every handler.
pub(crate) struct Stream {
    inner: BufStream<Box<dyn Io>>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    writable: bool,
}

impl Stream {
    /// Wraps a raw stream, without read or write deadlines.
    pub(crate) fn new<T: Io>(io: T) -> Self {
        Self {
            inner: BufStream::new(Box::new(io) as Box<dyn Io>),
            read_timeout: None,
            write_timeout: None,
            writable: true,
        }
    }

    #[inline]
    pub(crate) fn with_timeouts(mut self, read: Option<Duration>, write: Option<Duration>) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    #[inline]
    pub(crate) fn set_read_timeout(&mut self, read: Option<Duration>) {
        self.read_timeout = read;
    }

    /// `false` once a write hit a reset peer or the stream was shut down.
    #[inline]
    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    /// Reads one line and strips its `\n` or `\r\n` terminator.
    ///
    /// `Ok(None)` means the peer closed the stream before sending anything.
    /// A line without terminator at end of stream is returned as is.
    pub(crate) async fn read_line(&mut self, limit: usize) -> Result<Option<String>, ErrorKind> {
        let mut line = Vec::new();
        let mut reader = (&mut self.inner).take(limit as u64);

        let read = deadline(self.read_timeout, reader.read_until(b'\n', &mut line)).await?;
        if read == 0 {
            return Ok(None);
        }

        match line.last() {
            Some(b'\n') => {
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
            }
            _ if read >= limit => return Err(ErrorKind::LineTooLong),
            _ => {}
        }

        match simdutf8::basic::from_utf8(&line) {
            Ok(_) => Ok(String::from_utf8(line).ok()),
            Err(_) => Err(ErrorKind::Malformed),
        }
    }

    pub(crate) async fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        deadline(self.read_timeout, self.inner.read_exact(buf)).await?;
        Ok(())
    }

    pub(crate) async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let result = deadline(self.write_timeout, self.inner.write_all(bytes)).await;
        self.track(result)
    }

    pub(crate) async fn flush(&mut self) -> io::Result<()> {
        let result = deadline(self.write_timeout, self.inner.flush()).await;
        self.track(result)
    }

    /// Flushes what is buffered and closes the write side.
    pub(crate) async fn shutdown(&mut self) -> io::Result<()> {
        self.writable = false;
        deadline(self.write_timeout, self.inner.shutdown()).await
    }

    #[inline]
    fn track<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(err) = &result {
            if is_disconnect(err) {
                self.writable = false;
            }
        }
        result
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

#[inline]
async fn deadline<T, F>(limit: Option<Duration>, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match limit {
        Some(limit) => timeout(limit, fut).await?,
        None => fut.await,
    }
}

/// The connection's stream as seen by a handler.
///
/// Ordinary handlers ignore it. [`WebSocketUpgrade`](crate::WebSocketUpgrade)
/// takes the stream out of it and owns it from then on; the connection loop
/// notices the empty slot and stops without writing anything else.
#[derive(Debug)]
pub struct Socket {
    stream: Option<Stream>,
}

impl Socket {
    #[inline]
    pub(crate) fn new(stream: Stream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// `true` while the connection loop may still write a response.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.stream.as_ref().is_some_and(Stream::is_writable)
    }

    /// Takes the stream away from the HTTP connection for good.
    #[inline]
    pub(crate) fn take(&mut self) -> Option<Stream> {
        self.stream.take()
    }

    #[inline]
    pub(crate) fn stream(&mut self) -> Option<&mut Stream> {
        self.stream.as_mut()
    }
}
