//! The response model, built constructor-first: pick the constructor for
//! the shape of response you want, then adjust status and headers.

use crate::{
    http::body::{BodyStream, BodyType, HttpBody},
    http::request::HeaderMap,
    http::router::HttpMethod,
    Error,
};
use itertools::Itertools;
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

// --- HttpStatus ------------------------------------------------------------

/// The HTTP status codes as an `enum` that can be cast to the
/// corresponding integer:
/// ```
/// assert_eq!(viaduct::HttpStatus::Ok as u16, 200);
/// ```
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HttpStatus {
    Continue = 100,
    SwitchingProtocols = 101,
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,
    PartialContent = 206,
    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    TemporaryRedirect = 307,
    PermanentRedirect = 308,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    NotAcceptable = 406,
    RequestTimeout = 408,
    Conflict = 409,
    Gone = 410,
    LengthRequired = 411,
    PreconditionFailed = 412,
    PayloadTooLarge = 413,
    UriTooLong = 414,
    UnsupportedMediaType = 415,
    ExpectationFailed = 417,
    UnprocessableEntity = 422,
    TooManyRequests = 429,
    InternalServerError = 500,
    NotImplemented = 501,
    BadGateway = 502,
    ServiceUnavailable = 503,
    GatewayTimeout = 504,
    HttpVersionNotSupported = 505,
}

impl HttpStatus {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl Display for HttpStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", *self as u16)
    }
}

// --- HttpResponse ----------------------------------------------------------

/// To be returned from a handler.
///
/// Part of the contract to server adapters: for `1xx`, `204`, `304`, and
/// `multipart/byteranges` responses the adapter must not apply chunked
/// transfer encoding; [`forbids_chunked()`](#method.forbids_chunked) spells
/// the rule out so adapters need not re-derive it.
///
#[derive(Debug)]
pub struct HttpResponse {
    status: u16,
    headers: HeaderMap,
    body: HttpBody,
}

impl HttpResponse {
    // - - constructors  - - - - - - - - - - - - - - - - - - - - - - - - - - -

    /// Construct an empty response with status `500`.
    ///
    pub fn new() -> Self {
        Self {
            status: HttpStatus::InternalServerError.code(),
            headers: HeaderMap::new(),
            body: HttpBody::empty(),
        }
    }

    /// Construct an empty response with status `200`.
    ///
    pub fn ok() -> Self {
        Self::new().status(HttpStatus::Ok)
    }

    /// Construct a response from a vector of `u8`.
    ///
    /// The default status is `200`.
    ///
    /// The default `Content-Type` header is `application/octet-stream`.
    ///
    pub fn bytes(bytes: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/octet-stream");
        Self {
            status: HttpStatus::Ok.code(),
            headers,
            body: HttpBody::from_bytes(bytes),
        }
    }

    /// Construct a response with status `200`, a `Content-Type` header
    /// `text/plain; charset=utf-8`, and body `text`.
    ///
    pub fn plain(text: &str) -> Self {
        Self::utf8(None, "plain", text.to_string())
    }

    /// As [`plain()`](#method.plain), consuming the `String`.
    ///
    pub fn string(text: String) -> Self {
        Self::utf8(None, "plain", text)
    }

    /// Construct a response with status `200`, a `Content-Type` header
    /// `text/html; charset=utf-8`, and body `body`.
    ///
    pub fn html(body: String) -> Self {
        Self::utf8(None, "html", body)
    }

    /// Construct a response with status `200`, a `Content-Type` header
    /// `text/json; charset=utf-8`, and body `json`.
    ///
    pub fn json(json: String) -> Self {
        Self::utf8(None, "json", json)
    }

    /// Construct a response streaming `stream` with an optional known
    /// length.  Without a length, the adapter delivers the body with
    /// chunked transfer where the protocol allows it.
    ///
    pub fn stream(
        stream: BodyStream,
        content_length: Option<usize>,
    ) -> Self {
        Self {
            status: HttpStatus::Ok.code(),
            headers: HeaderMap::new(),
            body: HttpBody::from_stream(stream, content_length),
        }
    }

    /// Construct a redirect response.
    ///
    /// `url` is the url to redirect to.  The status is `303`, meaning the
    /// browser should send a `GET` request for `url`.
    ///
    pub fn redirect(url: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Location", url);
        Self {
            status: HttpStatus::SeeOther.code(),
            headers,
            body: HttpBody::empty(),
        }
    }

    /// Construct the default `404` response.
    ///
    pub fn not_found() -> Self {
        Self::utf8(
            Some(HttpStatus::NotFound),
            "plain",
            "Not Found".to_string(),
        )
    }

    /// Construct an empty `400` response.
    ///
    pub fn bad_request() -> Self {
        Self::new().status(HttpStatus::BadRequest)
    }

    /// Construct the `405` response for `allowed`, with the `Allow`
    /// header listing the sorted method names and an empty body.
    ///
    pub fn method_not_allowed(allowed: &BTreeSet<HttpMethod>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Allow",
            &allowed.iter().map(|m| m.as_str()).join(", "),
        );
        Self {
            status: HttpStatus::MethodNotAllowed.code(),
            headers,
            body: HttpBody::empty(),
        }
    }

    /// Construct the `500` response handed out when a handler fails.  The
    /// body never carries the underlying error.
    ///
    pub fn internal_server_error() -> Self {
        Self::utf8(
            Some(HttpStatus::InternalServerError),
            "plain",
            "Internal Server Error".to_string(),
        )
    }

    /// Construct a response with HTTP status `status` and a `Content-Type`
    /// header with value `text/<content_type>; charset=utf-8` from `body`.
    ///
    /// The default status is `200`.
    ///
    pub fn utf8(
        status: Option<HttpStatus>,
        content_type: &str,
        body: String,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Content-Type",
            &format!("text/{}; charset=utf-8", content_type),
        );
        Self {
            status: HttpStatus::Ok.code(),
            headers,
            body: HttpBody::from_string(body),
        }
        .status(status.unwrap_or(HttpStatus::Ok))
    }

    // - - modifiers - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    /// Substitute the status.
    ///
    pub fn status(self, status: HttpStatus) -> Self {
        // Enum statuses are >= 100 by construction.
        self.try_status(status.code()).unwrap()
    }

    /// Substitute the status by number.
    ///
    /// A `413` additionally forces `Connection: close`.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidInput` for codes below `100`.
    ///
    pub fn try_status(mut self, status: u16) -> Result<Self, Error> {
        if status < 100 {
            return Err(Error::invalid_input(format!(
                "{} is not an HTTP status code",
                status,
            )));
        }
        self.status = status;
        if status == HttpStatus::PayloadTooLarge.code() {
            self.headers.insert("Connection", "close");
        }
        Ok(self)
    }

    /// Add a header with name `nam` and value `val`.  Any previous header
    /// with the same name is kept.
    ///
    pub fn add_header(mut self, nam: &str, val: &str) -> Self {
        self.headers.append(nam, val);
        self
    }

    /// Insert a header with name `nam` and value `val`.  Any previous
    /// header with the same name (case insensitive) is replaced.
    ///
    pub fn insert_header(mut self, nam: &str, val: &str) -> Self {
        self.headers.insert(nam, val);
        self
    }

    /// Substitute `body`.
    ///
    pub fn body(mut self, body: HttpBody) -> Self {
        self.body = body;
        self
    }

    /// Attach content metadata, mirrored into the `Content-Type` header.
    ///
    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.headers
            .insert("Content-Type", &body_type.header_value());
        self.body = self.body.with_type(body_type);
        self
    }

    // - - accessors - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    pub fn get_status(&self) -> u16 {
        self.status
    }

    /// Return the value of a header with `name`, case insensitive.
    ///
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Take the body out of the response.  Meant for the adapter that
    /// writes the response; the headers and status must be read before
    /// this, since the rest of the response is gone afterwards.
    ///
    pub fn get_body(self) -> HttpBody {
        self.body
    }

    /// `true` iff the adapter writing this response must not apply
    /// chunked transfer encoding: informational statuses, `204`, `304`,
    /// and `multipart/byteranges` payloads.
    ///
    pub fn forbids_chunked(&self) -> bool {
        self.status < 200
            || self.status == HttpStatus::NoContent.code()
            || self.status == HttpStatus::NotModified.code()
            || self
                .headers
                .get("content-type")
                .map(|ct| {
                    ct.to_ascii_lowercase()
                        .starts_with("multipart/byteranges")
                })
                .unwrap_or(false)
    }
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new()
    }
}
