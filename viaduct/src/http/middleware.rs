//! Handlers and their composition.
//!
//! A handler is a plain async function from request to outcome, and a
//! middleware is a function from handler to handler; composing a pipeline
//! is just function composition.  No traits to implement, no
//! thread-locals: whatever a middleware wants a handler to see travels in
//! the request or in a [`ContextProperty`
//! ](../context/struct.ContextProperty.html).

use crate::{
    http::context::ContextProperty,
    http::request::HttpRequest,
    http::response::HttpResponse,
    http::router::{LookupResult, RouteInfo, Router},
    http::server::{HijackFn, UpgradeFn},
    Error,
};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::{Arc, OnceLock};

// --- handlers --------------------------------------------------------------

/// What a handler resolves to: a response to write, or a callback taking
/// over the transport.
///
pub enum HandlerOutcome {
    /// Write this response.
    Response(HttpResponse),

    /// Detach the transport and run the callback on the raw bytes.
    Hijack(HijackFn),

    /// Switch protocols and run the callback on the message channel.
    Upgrade(UpgradeFn),
}

impl From<HttpResponse> for HandlerOutcome {
    fn from(response: HttpResponse) -> Self {
        Self::Response(response)
    }
}

/// An asynchronous function from request to outcome.
///
pub type Handler = Arc<
    dyn Fn(HttpRequest) -> BoxFuture<'static, Result<HandlerOutcome, Error>>
        + Send
        + Sync,
>;

/// A function wrapping a [`Handler`](type.Handler.html) in extra
/// behavior.
///
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Box an async function as a [`Handler`](type.Handler.html):
/// ```
/// use viaduct::{handler, HttpResponse};
///
/// let hello = handler(|_req| async move {
///     Ok(HttpResponse::plain("hello"))
/// });
/// # drop(hello);
/// ```
///
pub fn handler<F, Fut, T>(f: F) -> Handler
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
    T: Into<HandlerOutcome> + 'static,
{
    Arc::new(move |req| {
        let fut = f(req);
        async move { fut.await.map(Into::into) }.boxed()
    })
}

/// Compose `middleware` around `inner`.  The first element becomes the
/// outermost layer: it sees the request first and the result last.
///
pub fn pipeline(middleware: &[Middleware], inner: Handler) -> Handler {
    middleware.iter().rev().fold(inner, |h, mw| mw(h))
}

// --- routing middleware ----------------------------------------------------

/// The routing outcome of the current request, recorded by the routing
/// middleware before the resolved handler runs.
///
pub fn route_info() -> &'static ContextProperty<RouteInfo> {
    static ROUTE_INFO: OnceLock<ContextProperty<RouteInfo>> =
        OnceLock::new();
    ROUTE_INFO.get_or_init(ContextProperty::new)
}

/// Middleware performing the route lookup.
///
/// Per request: percent-decode the path, resolve it against the router,
/// then
/// - on a method miss answer `405` with the `Allow` header,
/// - on a path miss delegate to the wrapped `next` handler,
/// - on a match record the [`RouteInfo`
///   ](../router/struct.RouteInfo.html) under [`route_info()`
///   ](fn.route_info.html) and call the resolved handler, which already
///   carries its route middleware.
///
/// Paths that cannot be decoded or normalized are answered with `400`.
///
pub fn routing(router: Arc<Router<Handler>>) -> Middleware {
    Arc::new(move |next: Handler| {
        let router = router.clone();
        let routed: Handler = Arc::new(move |req: HttpRequest| {
            let router = router.clone();
            let next = next.clone();
            async move {
                let raw = match urlencoding::decode(req.path()) {
                    Ok(decoded) => decoded.into_owned(),
                    Err(e) => {
                        log::debug!(
                            "bad path encoding '{}': {}",
                            req.path(),
                            e,
                        );
                        return Ok(HttpResponse::bad_request().into());
                    }
                };
                let resolved =
                    match router.lookup(req.method(), &raw) {
                        Ok(resolved) => resolved,
                        Err(e) => {
                            log::debug!("path rejected '{}': {}", raw, e);
                            return Ok(
                                HttpResponse::bad_request().into(),
                            );
                        }
                    };
                match resolved {
                    LookupResult::MethodMiss { allowed } => Ok(
                        HttpResponse::method_not_allowed(&allowed).into(),
                    ),
                    LookupResult::PathMiss { .. } => next(req).await,
                    LookupResult::Match { value, route } => {
                        route_info().set(req.token(), route);
                        value(req).await
                    }
                }
            }
            .boxed()
        });
        routed
    })
}

/// The router as a handler: routing middleware wrapped around the
/// router's fallback, or the default `404` when none is set.
///
pub fn router_handler(router: Arc<Router<Handler>>) -> Handler {
    let fallback = router.fallback().cloned().unwrap_or_else(|| {
        handler(|_| async { Ok(HttpResponse::not_found()) })
    });
    routing(router)(fallback)
}

// --- error catcher ---------------------------------------------------------

/// The outermost middleware of the default app shell: converts errors
/// escaping the pipeline into responses.
///
/// `InvalidPath` and `InvalidHeader` become `400`; everything else
/// becomes a bare `500` whose body never leaks the underlying error, the
/// error goes to the log instead.  Cancellation is passed through
/// untouched so callers can tell a canceled request from a failed one.
///
pub fn catcher() -> Middleware {
    Arc::new(|inner: Handler| {
        let caught: Handler = Arc::new(move |req: HttpRequest| {
            let inner = inner.clone();
            async move {
                match inner(req).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) if e.is_canceled() => Err(e),
                    Err(
                        e @ (Error::InvalidPath(_)
                        | Error::InvalidHeader(_)),
                    ) => {
                        log::debug!("rejected request: {}", e);
                        Ok(HttpResponse::bad_request().into())
                    }
                    Err(e) => {
                        log::error!("handler failed: {}", e);
                        Ok(HttpResponse::internal_server_error().into())
                    }
                }
            }
            .boxed()
        });
        caught
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::body::HttpBody;
    use crate::http::request::{HeaderMap, HttpVersion};
    use crate::http::router::HttpMethod;
    use futures::executor::block_on;
    use std::sync::Mutex;

    fn request(method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(
            method,
            &format!("http://test.local{}", path),
            HttpVersion::Http11,
            HeaderMap::new(),
            HttpBody::empty(),
        )
        .unwrap()
    }

    fn run(h: &Handler, req: HttpRequest) -> Result<HttpResponse, Error> {
        match block_on(h(req))? {
            HandlerOutcome::Response(resp) => Ok(resp),
            _ => panic!("expected a response outcome"),
        }
    }

    fn tracing_middleware(
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    ) -> Middleware {
        Arc::new(move |inner: Handler| {
            let calls = calls.clone();
            let traced: Handler = Arc::new(move |req| {
                let inner = inner.clone();
                let calls = calls.clone();
                async move {
                    calls.lock().unwrap().push(format!("{}-pre", name));
                    let out = inner(req).await;
                    calls.lock().unwrap().push(format!("{}-post", name));
                    out
                }
                .boxed()
            });
            traced
        })
    }

    #[test]
    fn pipeline_runs_outermost_first() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let h = pipeline(
            &[
                tracing_middleware("m1", calls.clone()),
                tracing_middleware("m2", calls.clone()),
            ],
            handler(|_| async { Ok(HttpResponse::ok()) }),
        );
        run(&h, request(HttpMethod::Get, "/")).unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            ["m1-pre", "m2-pre", "m2-post", "m1-post"],
        );
    }

    #[test]
    fn routing_dispatches_and_records_route() {
        let mut router = Router::new();
        router
            .add(
                HttpMethod::Get,
                "/users/:id",
                handler(|req: HttpRequest| async move {
                    let info = route_info().get(req.token())?;
                    Ok(HttpResponse::string(format!(
                        "user {}",
                        info.parameters["id"],
                    )))
                }),
            )
            .unwrap();
        let h = router_handler(Arc::new(router));
        let req = request(HttpMethod::Get, "/users/42");
        let token = req.token();
        let resp = run(&h, req).unwrap();
        assert_eq!(resp.get_status(), 200);
        assert_eq!(
            block_on(resp.get_body().read_bytes()).unwrap(),
            b"user 42",
        );
        // Still set until the shell releases the request state.
        assert!(route_info().exists(token));
        crate::http::context::release_request_state(token);
        assert!(!route_info().exists(token));
    }

    #[test]
    fn routing_answers_method_miss_with_allow() {
        let mut router = Router::new();
        router
            .add(
                HttpMethod::Get,
                "/users/:id",
                handler(|_| async { Ok(HttpResponse::ok()) }),
            )
            .unwrap();
        let h = router_handler(Arc::new(router));
        let resp = run(&h, request(HttpMethod::Post, "/users/42")).unwrap();
        assert_eq!(resp.get_status(), 405);
        assert_eq!(resp.get_header("Allow"), Some("GET"));
    }

    #[test]
    fn routing_delegates_path_miss_to_next() {
        let mut router = Router::new();
        router
            .add(
                HttpMethod::Get,
                "/known",
                handler(|_| async { Ok(HttpResponse::ok()) }),
            )
            .unwrap();
        let next = handler(|_| async {
            Ok(HttpResponse::plain("from next"))
        });
        let h = routing(Arc::new(router))(next);
        let resp = run(&h, request(HttpMethod::Get, "/unknown")).unwrap();
        assert_eq!(
            block_on(resp.get_body().read_bytes()).unwrap(),
            b"from next",
        );
    }

    #[test]
    fn router_handler_uses_fallback_then_404() {
        let mut router: Router<Handler> = Router::new();
        router.set_fallback(handler(|_| async {
            Ok(HttpResponse::plain("custom miss"))
        }));
        let resp = run(
            &router_handler(Arc::new(router)),
            request(HttpMethod::Get, "/nope"),
        )
        .unwrap();
        assert_eq!(resp.get_status(), 200);
        let router: Router<Handler> = Router::new();
        let resp = run(
            &router_handler(Arc::new(router)),
            request(HttpMethod::Get, "/nope"),
        )
        .unwrap();
        assert_eq!(resp.get_status(), 404);
    }

    #[test]
    fn routing_rejects_undecodable_paths() {
        let router: Router<Handler> = Router::new();
        let h = router_handler(Arc::new(router));
        // %FF decodes to a byte sequence that is not UTF-8.
        let resp =
            run(&h, request(HttpMethod::Get, "/a/%FF")).unwrap();
        assert_eq!(resp.get_status(), 400);
    }

    #[test]
    fn routing_decodes_percent_escapes_before_matching() {
        let mut router = Router::new();
        router
            .add(
                HttpMethod::Get,
                "/files/:name",
                handler(|req: HttpRequest| async move {
                    let info = route_info().get(req.token())?;
                    Ok(HttpResponse::string(
                        info.parameters["name"].clone(),
                    ))
                }),
            )
            .unwrap();
        let h = router_handler(Arc::new(router));
        let resp =
            run(&h, request(HttpMethod::Get, "/files/a%20b")).unwrap();
        assert_eq!(
            block_on(resp.get_body().read_bytes()).unwrap(),
            b"a b",
        );
    }

    #[test]
    fn catcher_maps_errors_to_statuses() {
        let failing = handler(|_| async {
            Err::<HttpResponse, _>(Error::handler("boom"))
        });
        let resp =
            run(&catcher()(failing), request(HttpMethod::Get, "/"))
                .unwrap();
        assert_eq!(resp.get_status(), 500);
        assert_eq!(
            block_on(resp.get_body().read_bytes()).unwrap(),
            b"Internal Server Error",
        );

        let rejecting = handler(|_| async {
            Err::<HttpResponse, _>(Error::invalid_header("Range: x"))
        });
        let resp =
            run(&catcher()(rejecting), request(HttpMethod::Get, "/"))
                .unwrap();
        assert_eq!(resp.get_status(), 400);

        let canceled = handler(|_| async {
            Err::<HttpResponse, _>(Error::canceled("peer gone"))
        });
        let result =
            block_on(catcher()(canceled)(request(HttpMethod::Get, "/")));
        assert!(matches!(result, Err(Error::Canceled(_))));
    }
}
