//! The app shell: glue between an adapter and the handler graph.
//!
//! An `HttpApp` is configured first (routes, middleware, fallback) and
//! then turned into a single composed handler that a request loop drives
//! against an adapter.  The composition, outermost first, is always
//! error catcher, global middleware in registration order, routing
//! middleware, and finally the router's fallback (or the default `404`).

use crate::{
    http::context,
    http::middleware::{
        catcher, pipeline, router_handler, Handler, HandlerOutcome,
        Middleware,
    },
    http::request::HttpRequest,
    http::response::{HttpResponse, HttpStatus},
    http::router::{HttpMethod, Router},
    http::server::{ExchangeId, HttpServer, ServerRequest},
    Error,
};
use futures::stream::StreamExt;
use std::sync::Arc;

/// Owns a router and global middleware, drives adapters.
///
/// Requests from one adapter stream are handled strictly one at a time;
/// parallelism comes from [`run_workers()`](#method.run_workers), where
/// each worker owns an independent adapter over the same composed handler.
/// Stopping is the adapter's job: after [`HttpServer::close()`
/// ](../server/trait.HttpServer.html#tymethod.close) the request stream
/// drains and [`run()`](#method.run) returns.
///
pub struct HttpApp {
    router: Router<Handler>,
    middleware: Vec<Middleware>,
}

impl HttpApp {
    pub fn new() -> Self {
        Self::with_router(Router::new())
    }

    pub fn with_router(router: Router<Handler>) -> Self {
        Self {
            router,
            middleware: Vec::new(),
        }
    }

    /// The router, for route configuration.
    ///
    pub fn router(&mut self) -> &mut Router<Handler> {
        &mut self.router
    }

    /// Add a global middleware, outside the routing middleware.  The
    /// first registered is the outermost after the error catcher.
    ///
    pub fn wrap(&mut self, middleware: Middleware) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Compose the full handler graph.  The result is cheap to clone and
    /// safe to share across workers.
    ///
    pub fn into_handler(self) -> Handler {
        let routed = router_handler(Arc::new(self.router));
        catcher()(pipeline(&self.middleware, routed))
    }

    /// Serve requests from `server` until its stream ends.
    ///
    pub async fn run(
        self,
        server: Arc<dyn HttpServer>,
    ) -> Result<(), Error> {
        Self::serve(server, self.into_handler()).await
    }

    /// The request loop behind [`run()`](#method.run), reusable with an
    /// externally composed handler.
    ///
    pub async fn serve(
        server: Arc<dyn HttpServer>,
        handler: Handler,
    ) -> Result<(), Error> {
        let mut requests = server.requests();
        while let Some(incoming) = requests.next().await {
            Self::serve_one(&*server, &handler, incoming).await;
        }
        Ok(())
    }

    /// Spawn `workers` OS threads, each driving an adapter from
    /// `factory` over the same handler graph, and join them all.
    ///
    /// <b>Errors</b>
    ///
    /// The first factory or worker error; a panicking worker surfaces as
    /// `Error::ThisCannotHappen`.
    ///
    pub fn run_workers<F>(
        self,
        workers: usize,
        factory: F,
    ) -> Result<(), Error>
    where
        F: Fn() -> Result<Arc<dyn HttpServer>, Error>,
    {
        let handler = self.into_handler();
        let mut threads = Vec::new();
        for n in 0..workers {
            let server = factory()?;
            let handler = handler.clone();
            let thread = std::thread::Builder::new()
                .name(format!("viaduct-worker-{}", n))
                .spawn(move || {
                    futures::executor::block_on(Self::serve(
                        server, handler,
                    ))
                });
            threads.push(crate::map_error!(Other, thread)?);
        }
        for thread in threads {
            thread.join().map_err(|_| {
                Error::this_cannot_happen("worker panicked")
            })??;
        }
        Ok(())
    }

    // - - private - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    async fn serve_one(
        server: &dyn HttpServer,
        handler: &Handler,
        incoming: ServerRequest,
    ) {
        let ServerRequest {
            id,
            method,
            url,
            version,
            headers,
            body,
        } = incoming;
        let method = match HttpMethod::try_from(method.as_str()) {
            Ok(method) => method,
            Err(e) => {
                log::debug!("unknown method: {}", e);
                Self::answer(
                    server,
                    id,
                    HttpResponse::new()
                        .status(HttpStatus::NotImplemented),
                )
                .await;
                return;
            }
        };
        let request = match HttpRequest::new(
            method, &url, version, headers, body,
        ) {
            Ok(request) => request,
            Err(e) => {
                log::debug!("unusable request URL '{}': {}", url, e);
                Self::answer(server, id, HttpResponse::bad_request())
                    .await;
                return;
            }
        };
        let token = request.token();
        match handler(request).await {
            Ok(HandlerOutcome::Response(response)) => {
                Self::answer(server, id, response).await;
            }
            Ok(HandlerOutcome::Hijack(callback)) => {
                if let Err(e) = server.hijack(id, callback).await {
                    log::error!("hijack failed: {}", e);
                }
            }
            Ok(HandlerOutcome::Upgrade(callback)) => {
                if let Err(e) = server.connect(id, callback).await {
                    log::error!("upgrade failed: {}", e);
                }
            }
            Err(e) if e.is_canceled() => {
                // The peer is gone, nothing to write.
                log::debug!("request canceled: {}", e);
            }
            Err(e) => {
                // The catcher is outermost, so this is a composition
                // mistake in a custom handler graph.
                log::error!("error escaped the handler graph: {}", e);
                Self::answer(
                    server,
                    id,
                    HttpResponse::internal_server_error(),
                )
                .await;
            }
        }
        context::release_request_state(token);
    }

    // Transport failures here mean the response may already have
    // started; nothing further can be written, so log and move on.
    async fn answer(
        server: &dyn HttpServer,
        id: ExchangeId,
        response: HttpResponse,
    ) {
        if let Err(e) = server.respond(id, response).await {
            if e.is_canceled() {
                log::debug!("peer went away while responding: {}", e);
            } else {
                log::error!("transport failure while responding: {}", e);
            }
        }
    }
}

impl Default for HttpApp {
    fn default() -> Self {
        Self::new()
    }
}
