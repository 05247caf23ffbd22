//! HTTP/1.1 response builder.
//!
//! Bodies are either held in memory or streamed from an open file, so large
//! static files never have to be buffered whole.

use bytes::{BufMut, BytesMut};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Headers, StatusCode};

/// A response body.
#[derive(Debug)]
pub enum Body {
    /// Fully buffered payload.
    Bytes(Vec<u8>),
    /// File contents copied to the socket after the header block.
    File { file: File, len: u64 },
}

impl Body {
    /// Length written into `Content-Length`.
    pub fn len(&self) -> u64 {
        match self {
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An HTTP/1.1 response, ready to be written to a connection.
///
/// # Examples
///
/// ```
/// use cachet::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::Ok).json(&serde_json::json!([{ "id": 1 }]));
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// assert!(text.ends_with("\r\n\r\n[{\"id\":1}]"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Bytes(Vec::new()),
            keep_alive: true,
        }
    }

    /// Appends a response header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in place, for middleware decorating a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets a text body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Body::Bytes(body.into().into_bytes());
        self
    }

    /// Serializes `value` as the body and sets `Content-Type: application/json`.
    ///
    /// A value that fails to serialize turns the whole response into a
    /// `500` with a plain-text message.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.headers.set("Content-Type", "application/json");
                self.body = Body::Bytes(body);
                self
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                Response::new(StatusCode::InternalServerError)
                    .body("failed to serialize response body")
            }
        }
    }

    /// Streams `len` bytes of `file` as the body.
    #[must_use]
    pub fn file(mut self, file: File, len: u64) -> Self {
        self.body = Body::File { file, len };
        self
    }

    /// Writes `Connection: keep-alive` or `Connection: close`.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The buffered body, or `None` when the body streams from a file.
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Bytes(bytes) => Some(bytes),
            Body::File { .. } => None,
        }
    }

    /// Serializes the status line and headers.
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` for non-empty bodies
    /// without one, the `Connection` header, and `Content-Length` last.
    fn head(&mut self) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64);
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());
        buf.put(&b"\r\n"[..]);
        buf
    }

    /// Serializes the response into wire format.
    ///
    /// File bodies are not read here; only their header block is produced.
    /// Use [`write_to`](Self::write_to) to send a response with a file body.
    pub fn into_bytes(mut self) -> BytesMut {
        let mut buf = self.head();
        if let Body::Bytes(bytes) = &self.body {
            buf.put(bytes.as_slice());
        }
        buf
    }

    /// Writes the full response, streaming file bodies from disk.
    ///
    /// # Errors
    ///
    /// Returns the first I/O error from reading the file or writing `out`.
    pub async fn write_to<W>(mut self, out: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let head = self.head();
        out.write_all(&head).await?;

        match self.body {
            Body::Bytes(bytes) => out.write_all(&bytes).await?,
            Body::File { file, len } => {
                let mut limited = tokio::io::AsyncReadExt::take(file, len);
                let copied = tokio::io::copy(&mut limited, out).await?;
                if copied < len {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("file ended after {copied} of {len} bytes"),
                    ));
                }
            }
        }
        out.flush().await
    }
}
