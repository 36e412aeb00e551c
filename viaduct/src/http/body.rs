//! Streaming message bodies.

use crate::Error;
use futures::stream::{self, BoxStream, StreamExt};
use std::fmt;
use std::sync::Mutex;

/// Content metadata for a body: a MIME type and an optional charset.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BodyType {
    pub mime: String,
    pub charset: Option<String>,
}

impl BodyType {
    pub fn new(mime: &str, charset: Option<&str>) -> Self {
        Self {
            mime: mime.to_string(),
            charset: charset.map(|c| c.to_string()),
        }
    }

    /// The `Content-Type` header value.
    ///
    pub fn header_value(&self) -> String {
        match &self.charset {
            Some(charset) => format!("{}; charset={}", self.mime, charset),
            None => self.mime.clone(),
        }
    }
}

/// A chunk stream, yielded by [`HttpBody::read()`
/// ](struct.HttpBody.html#method.read).
///
pub type BodyStream = BoxStream<'static, Result<Vec<u8>, Error>>;

/// A single-shot stream of byte chunks with content metadata.
///
/// The stream can be taken exactly once; a body is a hand-over from the
/// adapter to one consumer, not a buffer.  A known `content_length` of `0`
/// guarantees an empty stream and rules out chunked transfer.
///
pub struct HttpBody {
    stream: Mutex<Option<BodyStream>>,
    content_length: Option<usize>,
    body_type: Option<BodyType>,
}

impl HttpBody {
    /// A body that is known to be empty.
    ///
    pub fn empty() -> Self {
        Self {
            stream: Mutex::new(Some(stream::empty().boxed())),
            content_length: Some(0),
            body_type: None,
        }
    }

    /// A body over a byte buffer, delivered as one chunk.
    ///
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let content_length = Some(bytes.len());
        Self {
            stream: Mutex::new(Some(
                stream::once(async move { Ok(bytes) }).boxed(),
            )),
            content_length,
            body_type: None,
        }
    }

    /// A body over an UTF-8 string.
    ///
    pub fn from_string(text: String) -> Self {
        Self::from_bytes(text.into_bytes())
    }

    /// A body over an arbitrary chunk stream.  A `content_length` of
    /// `Some(0)` replaces the stream with the empty one, keeping the
    /// zero-length invariant regardless of what the stream would yield.
    ///
    pub fn from_stream(
        stream: BodyStream,
        content_length: Option<usize>,
    ) -> Self {
        let stream = match content_length {
            Some(0) => futures::stream::empty().boxed(),
            _ => stream,
        };
        Self {
            stream: Mutex::new(Some(stream)),
            content_length,
            body_type: None,
        }
    }

    /// The same body with content metadata attached.
    ///
    pub fn with_type(mut self, body_type: BodyType) -> Self {
        self.body_type = Some(body_type);
        self
    }

    /// The total size in bytes, when known up front.
    ///
    pub fn content_length(&self) -> Option<usize> {
        self.content_length
    }

    pub fn body_type(&self) -> Option<&BodyType> {
        self.body_type.as_ref()
    }

    /// Take the one and only consumer view of the chunk stream.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::BodyAlreadyConsumed` on every call after the first.
    ///
    pub fn read(&self) -> Result<BodyStream, Error> {
        self.stream
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take()
            .ok_or(Error::BodyAlreadyConsumed)
    }

    /// [`read()`](#method.read) and collect the whole body into one
    /// buffer.  Only for bodies known to be small; streaming consumers
    /// should drain the stream at their own pace instead.
    ///
    pub async fn read_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut stream = self.read()?;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend(chunk?);
        }
        Ok(bytes)
    }
}

impl fmt::Debug for HttpBody {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HttpBody")
            .field("content_length", &self.content_length)
            .field("body_type", &self.body_type)
            .finish_non_exhaustive()
    }
}
