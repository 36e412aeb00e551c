//! An in-memory server adapter and request builders for exercising a
//! handler graph without sockets.

use crate::{
    http::app::HttpApp,
    http::body::HttpBody,
    http::request::{HeaderMap, HttpVersion},
    http::response::HttpResponse,
    http::server::{
        ByteDuplex, ExchangeId, HijackFn, HttpServer, Message,
        MessageDuplex, ServerRequest, UpgradeFn,
    },
    Error,
};
use futures::channel::mpsc;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

// --- TestRequest -----------------------------------------------------------

/// Builds one request to feed a [`TestServer`](struct.TestServer.html).
///
/// A `url` starting with `/` is completed to `http://test.local<url>`.
///
#[derive(Clone, Debug)]
pub struct TestRequest {
    method: String,
    url: String,
    version: HttpVersion,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestRequest {
    pub fn new(method: &str, url: &str) -> Self {
        let url = if url.starts_with('/') {
            format!("http://test.local{}", url)
        } else {
            url.to_string()
        };
        Self {
            method: method.to_string(),
            url,
            version: HttpVersion::Http11,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: &str) -> Self {
        Self::new("POST", url)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    pub fn version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }
}

// --- TestResponse ----------------------------------------------------------

/// A fully collected response.
///
#[derive(Clone, Debug)]
pub struct TestResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}

/// What became of one exchange pushed into a [`TestServer`
/// ](struct.TestServer.html).
///
#[derive(Clone, Debug)]
pub enum TestExchange {
    Response(TestResponse),
    Hijacked { written: Vec<Vec<u8>> },
    Upgraded { sent: Vec<Message> },
}

// --- TestServer ------------------------------------------------------------

/// An [`HttpServer`](../http/server/trait.HttpServer.html) over in-memory
/// channels.
///
/// Push requests with [`push()`](#method.push), end the intake with
/// [`close()`](../http/server/trait.HttpServer.html#tymethod.close) (the
/// queue still drains), run the app, then inspect [`exchanges()`
/// ](#method.exchanges).
///
pub struct TestServer {
    intake: Mutex<Option<mpsc::UnboundedSender<ServerRequest>>>,
    outlet: Mutex<Option<mpsc::UnboundedReceiver<ServerRequest>>>,
    exchanges: Mutex<Vec<(ExchangeId, TestExchange)>>,
    next_id: AtomicU64,
}

impl TestServer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self {
            intake: Mutex::new(Some(tx)),
            outlet: Mutex::new(Some(rx)),
            exchanges: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Enqueue a request, returning its exchange id.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::Other` after [`close()`
    /// ](../http/server/trait.HttpServer.html#tymethod.close).
    ///
    pub fn push(&self, request: TestRequest) -> Result<ExchangeId, Error> {
        let id = ExchangeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let incoming = ServerRequest {
            id,
            method: request.method,
            url: request.url,
            version: request.version,
            headers: request.headers.into_iter().collect(),
            body: HttpBody::from_bytes(request.body),
        };
        let guard = self.lock(&self.intake);
        let sender = guard
            .as_ref()
            .ok_or_else(|| Error::other("test server is closed"))?;
        crate::map_error!(Other, sender.unbounded_send(incoming))?;
        Ok(id)
    }

    /// Everything that happened, in completion order.
    ///
    pub fn exchanges(&self) -> Vec<(ExchangeId, TestExchange)> {
        self.lock(&self.exchanges).clone()
    }

    /// The collected responses, in completion order, ignoring hijacked
    /// and upgraded exchanges.
    ///
    pub fn responses(&self) -> Vec<TestResponse> {
        self.exchanges()
            .into_iter()
            .filter_map(|(_, exchange)| match exchange {
                TestExchange::Response(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    fn lock<'s, T>(&self, mutex: &'s Mutex<T>) -> std::sync::MutexGuard<'s, T> {
        mutex.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpServer for TestServer {
    fn requests(&self) -> BoxStream<'_, ServerRequest> {
        match self.lock(&self.outlet).take() {
            Some(receiver) => receiver.boxed(),
            None => stream::empty().boxed(),
        }
    }

    fn respond(
        &self,
        id: ExchangeId,
        response: HttpResponse,
    ) -> BoxFuture<'_, Result<(), Error>> {
        async move {
            let status = response.get_status();
            let headers = response.get_headers().clone();
            let body = response.get_body().read_bytes().await?;
            self.lock(&self.exchanges).push((
                id,
                TestExchange::Response(TestResponse {
                    status,
                    headers,
                    body,
                }),
            ));
            Ok(())
        }
        .boxed()
    }

    fn hijack(
        &self,
        id: ExchangeId,
        callback: HijackFn,
    ) -> BoxFuture<'_, Result<(), Error>> {
        async move {
            let (tx, rx) = mpsc::unbounded();
            callback(ByteDuplex {
                incoming: stream::empty().boxed(),
                outgoing: tx,
            })
            .await?;
            let written = rx.collect().await;
            self.lock(&self.exchanges)
                .push((id, TestExchange::Hijacked { written }));
            Ok(())
        }
        .boxed()
    }

    fn connect(
        &self,
        id: ExchangeId,
        callback: UpgradeFn,
    ) -> BoxFuture<'_, Result<(), Error>> {
        async move {
            let (tx, rx) = mpsc::unbounded();
            callback(MessageDuplex {
                incoming: stream::empty().boxed(),
                outgoing: tx,
            })
            .await?;
            let sent = rx.collect().await;
            self.lock(&self.exchanges)
                .push((id, TestExchange::Upgraded { sent }));
            Ok(())
        }
        .boxed()
    }

    fn close(&self) -> BoxFuture<'_, Result<(), Error>> {
        async move {
            // Dropping the sender ends the request stream once the
            // already queued requests have drained.
            self.lock(&self.intake).take();
            Ok(())
        }
        .boxed()
    }
}

/// Feed `requests` through `app` over a fresh [`TestServer`
/// ](struct.TestServer.html) and collect the responses in order.
///
/// Panics on setup failure; this is a test harness, not production code.
///
pub fn run_test_app(
    app: HttpApp,
    requests: Vec<TestRequest>,
) -> Vec<TestResponse> {
    let server = std::sync::Arc::new(TestServer::new());
    for request in requests {
        server.push(request).unwrap();
    }
    futures::executor::block_on(async {
        server.close().await.unwrap();
        app.run(server.clone()).await.unwrap();
    });
    server.responses()
}
