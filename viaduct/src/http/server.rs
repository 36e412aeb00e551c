//! Everything the core needs from an HTTP server.
//!
//! A server adapter owns the sockets and the wire format; the core only
//! sees a stream of [`ServerRequest`](struct.ServerRequest.html)s and
//! answers each one through [`respond()`
//! ](trait.HttpServer.html#tymethod.respond), or takes the transport over
//! via hijack/upgrade callbacks.  There is an in-memory implementation for
//! tests in [`test_utils`](../../test_utils/index.html).

use crate::{
    http::body::HttpBody,
    http::request::{HeaderMap, HttpVersion},
    http::response::HttpResponse,
    Error,
};
use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

// --- duplex channels -------------------------------------------------------

/// The raw transport handed to a hijack callback: a stream of incoming
/// byte chunks and a sink for outgoing ones.  Once hijacked, the adapter
/// stops interpreting the connection entirely.
///
pub struct ByteDuplex {
    pub incoming: BoxStream<'static, Result<Vec<u8>, Error>>,
    pub outgoing: mpsc::UnboundedSender<Vec<u8>>,
}

/// One frame on an upgraded connection.
///
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

/// The message-framed transport handed to an upgrade callback after a
/// protocol switch.
///
pub struct MessageDuplex {
    pub incoming: BoxStream<'static, Result<Message, Error>>,
    pub outgoing: mpsc::UnboundedSender<Message>,
}

/// A handler outcome that detaches the transport for byte-level control.
///
pub type HijackFn = Box<
    dyn FnOnce(ByteDuplex) -> BoxFuture<'static, Result<(), Error>>
        + Send,
>;

/// A handler outcome that switches the connection to a message-framed
/// protocol.
///
pub type UpgradeFn = Box<
    dyn FnOnce(MessageDuplex) -> BoxFuture<'static, Result<(), Error>>
        + Send,
>;

// --- ServerRequest ---------------------------------------------------------

/// Correlates a response with the exchange it answers, within one
/// adapter.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ExchangeId(pub u64);

/// One incoming request as delivered by an adapter: raw method text, the
/// absolute URL, version, headers, and the body stream.
///
/// The method is raw on purpose; mapping unknown methods to a `501` is
/// the app shell's decision, not the adapter's.
///
#[derive(Debug)]
pub struct ServerRequest {
    pub id: ExchangeId,
    pub method: String,
    pub url: String,
    pub version: HttpVersion,
    pub headers: HeaderMap,
    pub body: HttpBody,
}

// --- HttpServer ------------------------------------------------------------

/// The adapter contract.
///
/// An implementation bridges some concrete transport to the core.  The
/// core guarantees exactly one of [`respond()`](#tymethod.respond),
/// [`hijack()`](#tymethod.hijack), or [`connect()`](#tymethod.connect)
/// per delivered request.  Adapters must not apply chunked transfer
/// encoding where [`HttpResponse::forbids_chunked()`
/// ](../response/struct.HttpResponse.html#method.forbids_chunked) says so,
/// and report transport failures through the returned future; after a
/// response has started the core only logs such failures and moves on.
///
pub trait HttpServer: Send + Sync {
    /// The stream of incoming requests.  Requests on one stream are
    /// handled strictly one at a time; adapters wanting parallelism run
    /// one instance per worker.  The stream ends after [`close()`
    /// ](#tymethod.close).
    ///
    fn requests(&self) -> BoxStream<'_, ServerRequest>;

    /// Write `response` back for the exchange `id`.
    ///
    fn respond(
        &self,
        id: ExchangeId,
        response: HttpResponse,
    ) -> BoxFuture<'_, Result<(), Error>>;

    /// Detach the transport of exchange `id` and hand it to `callback`.
    ///
    fn hijack(
        &self,
        id: ExchangeId,
        callback: HijackFn,
    ) -> BoxFuture<'_, Result<(), Error>>;

    /// Switch the connection of exchange `id` to a message-framed
    /// protocol and hand it to `callback`.
    ///
    fn connect(
        &self,
        id: ExchangeId,
        callback: UpgradeFn,
    ) -> BoxFuture<'_, Result<(), Error>>;

    /// Stop accepting new requests and let in-flight ones drain; the
    /// [`requests()`](#tymethod.requests) stream ends once drained.
    ///
    fn close(&self) -> BoxFuture<'_, Result<(), Error>>;
}
