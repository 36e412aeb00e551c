//! The request model.
//!
//! Requests are immutable values handed from the adapter to the handler
//! chain.  Derived requests share the original's token and body stream, so
//! middleware can override fields without breaking request identity or
//! double-reading the body.

use crate::{
    http::body::{BodyType, HttpBody},
    http::router::HttpMethod,
    Error,
};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use url::Url;

// --- HeaderMap -------------------------------------------------------------

/// A multi-valued header map with case-insensitive names.
///
/// Kept as an ordered list of pairs; header counts are small enough that
/// scanning beats hashing, and insertion order is preserved for the wire.
///
#[derive(Clone, Debug, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, keeping any previous values for the same name.
    ///
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries
            .push((name.trim().to_string(), value.trim().to_string()));
    }

    /// Set a header, replacing every previous value for the same name.
    ///
    pub fn insert(&mut self, name: &str, value: &str) {
        self.remove(name);
        self.append(name, value);
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// The first value for `name`, case insensitive.
    ///
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in insertion order.
    ///
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs in insertion order.
    ///
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// The `Content-Length` header as a number.
    ///
    /// An absent header is `Ok(None)`; a header that does not parse is an
    /// error, but only when this accessor is actually used.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidHeader`.
    ///
    pub fn content_length(&self) -> Result<Option<usize>, Error> {
        match self.get("content-length") {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                Error::invalid_header(format!(
                    "Content-Length: {}",
                    raw,
                ))
            }),
        }
    }

    /// The `Content-Type` header split into a MIME type and an optional
    /// `charset` parameter, with the same lazy failure mode as
    /// [`content_length()`](#method.content_length).
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidHeader`.
    ///
    pub fn content_type(&self) -> Result<Option<BodyType>, Error> {
        let raw = match self.get("content-type") {
            None => return Ok(None),
            Some(raw) => raw,
        };
        let mut parts = raw.split(';');
        let mime = parts.next().unwrap_or("").trim();
        if mime.is_empty() || !mime.contains('/') {
            return Err(Error::invalid_header(format!(
                "Content-Type: {}",
                raw,
            )));
        }
        let mut charset = None;
        for param in parts {
            let mut nam_val = param.trim().splitn(2, '=');
            let nam = nam_val.next().unwrap_or("").trim();
            if nam.eq_ignore_ascii_case("charset") {
                match nam_val.next() {
                    Some(val) => {
                        charset =
                            Some(val.trim().trim_matches('"').to_string());
                    }
                    None => {
                        return Err(Error::invalid_header(format!(
                            "Content-Type: {}",
                            raw,
                        )));
                    }
                }
            }
        }
        Ok(Some(BodyType {
            mime: mime.to_string(),
            charset,
        }))
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(
        iter: I,
    ) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.append(&name, &value);
        }
        map
    }
}

// --- HttpVersion -----------------------------------------------------------

/// The protocol version a request arrived with.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpVersion {
    Http10,
    Http11,
}

impl Display for HttpVersion {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Http10 => write!(f, "HTTP/1.0"),
            Self::Http11 => write!(f, "HTTP/1.1"),
        }
    }
}

// --- RequestToken ----------------------------------------------------------

/// The identity of one request instance.
///
/// Tokens are allocated from a process-wide counter, are never reused, and
/// survive [`HttpRequest::with_method()`
/// ](struct.HttpRequest.html#method.with_method)-style derivation.  All
/// request-scoped state ([`ContextProperty`
/// ](../context/struct.ContextProperty.html)) is keyed by them.
///
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RequestToken(u64);

impl RequestToken {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

// --- HttpRequest -----------------------------------------------------------

/// An immutable HTTP request.
///
/// Construction validates the URL: it must be absolute, parse cleanly, and
/// carry no fragment.  The body is shared behind an `Arc` so a derived
/// request reads the same single-shot stream.
///
#[derive(Clone, Debug)]
pub struct HttpRequest {
    method: HttpMethod,
    url: Url,
    version: HttpVersion,
    headers: HeaderMap,
    body: Arc<HttpBody>,
    token: RequestToken,
}

impl HttpRequest {
    /// Create a request with a fresh token.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidInput` when `url` is relative, does not parse, or
    /// has a fragment.
    ///
    pub fn new(
        method: HttpMethod,
        url: &str,
        version: HttpVersion,
        headers: HeaderMap,
        body: HttpBody,
    ) -> Result<Self, Error> {
        let url = Self::check_url(url)?;
        Ok(Self {
            method,
            url,
            version,
            headers,
            body: Arc::new(body),
            token: RequestToken::next(),
        })
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The raw, still percent-encoded path component.
    ///
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The first value of header `name`, case insensitive.
    ///
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &HttpBody {
        &self.body
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    /// A request like this one with another method, sharing token and
    /// body.
    ///
    pub fn with_method(&self, method: HttpMethod) -> Self {
        Self { method, ..self.clone() }
    }

    /// A request like this one with another URL, sharing token and body.
    ///
    /// <b>Errors</b>
    ///
    /// The same validation as [`new()`](#method.new).
    ///
    pub fn with_url(&self, url: &str) -> Result<Self, Error> {
        Ok(Self { url: Self::check_url(url)?, ..self.clone() })
    }

    /// A request like this one with other headers, sharing token and
    /// body.
    ///
    pub fn with_headers(&self, headers: HeaderMap) -> Self {
        Self { headers, ..self.clone() }
    }

    fn check_url(url: &str) -> Result<Url, Error> {
        let url = crate::map_error!(InvalidInput, Url::parse(url))?;
        if url.fragment().is_some() {
            return Err(Error::invalid_input(format!(
                "request URL '{}' has a fragment",
                url,
            )));
        }
        Ok(url)
    }
}
