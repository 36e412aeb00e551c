//! The app shell against the in-memory adapter: middleware composition,
//! handler outcomes, error conversion, shutdown, and workers.

use futures::executor::block_on;
use futures::future::FutureExt;
use futures::stream::StreamExt;
use std::sync::{Arc, Mutex};
use viaduct::test_utils::{
    run_test_app, TestExchange, TestRequest, TestServer,
};
use viaduct::{
    handler, route_info, ContextProperty, Error, Handler, HandlerOutcome,
    HttpApp, HttpMethod, HttpRequest, HttpResponse, HttpServer, Message,
    Middleware,
};

fn ok_handler(body: &'static str) -> Handler {
    handler(move |_| async move { Ok(HttpResponse::plain(body)) })
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
fn global_middleware_wraps_in_registration_order() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut app = HttpApp::new();
    app.wrap(tracing_middleware("first", calls.clone()));
    app.wrap(tracing_middleware("second", calls.clone()));
    app.router()
        .add(HttpMethod::Get, "/", ok_handler("root"))
        .unwrap();
    let responses = run_test_app(app, vec![TestRequest::get("/")]);
    assert_eq!(responses[0].body_str(), "root");
    assert_eq!(
        *calls.lock().unwrap(),
        ["first-pre", "second-pre", "second-post", "first-post"],
    );
}

#[test]
fn handler_errors_become_bare_500() {
    let mut app = HttpApp::new();
    app.router()
        .add(
            HttpMethod::Get,
            "/boom",
            handler(|_| async {
                Err::<HttpResponse, _>(Error::handler(
                    "secret database password",
                ))
            }),
        )
        .unwrap();
    let responses = run_test_app(app, vec![TestRequest::get("/boom")]);
    assert_eq!(responses[0].status, 500);
    assert_eq!(responses[0].body_str(), "Internal Server Error");
}

#[test]
fn untouched_bad_header_does_not_abort_the_request() {
    let mut app = HttpApp::new();
    app.router()
        .add(HttpMethod::Get, "/ignores", ok_handler("fine"))
        .unwrap();
    app.router()
        .add(
            HttpMethod::Get,
            "/reads",
            handler(|req: HttpRequest| async move {
                let length = req.headers().content_length()?;
                Ok(HttpResponse::string(format!("{:?}", length)))
            }),
        )
        .unwrap();
    let bogus = |url: &str| {
        TestRequest::get(url).header("Content-Length", "peanuts")
    };
    let responses = run_test_app(
        app,
        vec![bogus("/ignores"), bogus("/reads")],
    );
    assert_eq!(responses[0].status, 200);
    assert_eq!(responses[1].status, 400);
}

#[test]
fn unknown_method_gets_501() {
    let mut app = HttpApp::new();
    app.router()
        .add(HttpMethod::Get, "/", ok_handler("root"))
        .unwrap();
    let responses =
        run_test_app(app, vec![TestRequest::new("BREW", "/")]);
    assert_eq!(responses[0].status, 501);
}

#[test]
fn request_body_reaches_the_handler_once() {
    let mut app = HttpApp::new();
    app.router()
        .add(
            HttpMethod::Post,
            "/echo",
            handler(|req: HttpRequest| async move {
                let bytes = req.body().read_bytes().await?;
                // The body stream is single shot.
                assert!(matches!(
                    req.body().read(),
                    Err(Error::BodyAlreadyConsumed),
                ));
                Ok(HttpResponse::bytes(bytes))
            }),
        )
        .unwrap();
    let responses = run_test_app(
        app,
        vec![TestRequest::post("/echo").body(b"ping")],
    );
    assert_eq!(responses[0].status, 200);
    assert_eq!(responses[0].body, b"ping");
}

#[test]
fn streamed_response_reaches_the_adapter() {
    let mut app = HttpApp::new();
    app.router()
        .add(
            HttpMethod::Get,
            "/feed",
            handler(|_| async {
                let chunks = futures::stream::iter(vec![
                    Ok(b"one,".to_vec()),
                    Ok(b"two".to_vec()),
                ])
                .boxed();
                Ok(HttpResponse::stream(chunks, None))
            }),
        )
        .unwrap();
    let responses = run_test_app(app, vec![TestRequest::get("/feed")]);
    assert_eq!(responses[0].body_str(), "one,two");
}

#[test]
fn hijack_hands_the_transport_to_the_callback() {
    let mut app = HttpApp::new();
    app.router()
        .add(
            HttpMethod::Get,
            "/raw",
            handler(|_| async {
                Ok(HandlerOutcome::Hijack(Box::new(|duplex| {
                    async move {
                        viaduct::map_error!(
                            Other,
                            duplex
                                .outgoing
                                .unbounded_send(b"raw bytes".to_vec()),
                        )?;
                        Ok(())
                    }
                    .boxed()
                })))
            }),
        )
        .unwrap();
    let server = Arc::new(TestServer::new());
    server.push(TestRequest::get("/raw")).unwrap();
    block_on(async {
        server.close().await.unwrap();
        app.run(server.clone()).await.unwrap();
    });
    match &server.exchanges()[0].1 {
        TestExchange::Hijacked { written } => {
            assert_eq!(written, &[b"raw bytes".to_vec()]);
        }
        other => panic!("expected a hijack, got {:?}", other),
    }
}

#[test]
fn upgrade_hands_the_message_channel_to_the_callback() {
    let mut app = HttpApp::new();
    app.router()
        .add(
            HttpMethod::Get,
            "/ws",
            handler(|_| async {
                Ok(HandlerOutcome::Upgrade(Box::new(|duplex| {
                    async move {
                        viaduct::map_error!(
                            Other,
                            duplex.outgoing.unbounded_send(
                                Message::Text("hello".to_string()),
                            ),
                        )?;
                        Ok(())
                    }
                    .boxed()
                })))
            }),
        )
        .unwrap();
    let server = Arc::new(TestServer::new());
    server.push(TestRequest::get("/ws")).unwrap();
    block_on(async {
        server.close().await.unwrap();
        app.run(server.clone()).await.unwrap();
    });
    match &server.exchanges()[0].1 {
        TestExchange::Upgraded { sent } => {
            assert_eq!(sent, &[Message::Text("hello".to_string())]);
        }
        other => panic!("expected an upgrade, got {:?}", other),
    }
}

#[test]
fn close_drains_queued_requests_then_stops() {
    let mut app = HttpApp::new();
    app.router()
        .add(HttpMethod::Get, "/", ok_handler("served"))
        .unwrap();
    let server = Arc::new(TestServer::new());
    server.push(TestRequest::get("/")).unwrap();
    server.push(TestRequest::get("/")).unwrap();
    block_on(async {
        server.close().await.unwrap();
        // Already queued requests are still served.
        app.run(server.clone()).await.unwrap();
    });
    assert_eq!(server.responses().len(), 2);
    // New requests are refused after close.
    assert!(server.push(TestRequest::get("/")).is_err());
}

#[test]
fn request_state_is_released_after_completion() {
    let seen: Arc<Mutex<Vec<viaduct::RequestToken>>> =
        Arc::new(Mutex::new(Vec::new()));
    let marker: Arc<ContextProperty<String>> =
        Arc::new(ContextProperty::new());
    let mut app = HttpApp::new();
    let handler_seen = seen.clone();
    let handler_marker = marker.clone();
    app.router()
        .add(
            HttpMethod::Get,
            "/x/:id",
            handler(move |req: HttpRequest| {
                let seen = handler_seen.clone();
                let marker = handler_marker.clone();
                async move {
                    seen.lock().unwrap().push(req.token());
                    marker.set(req.token(), "alive".to_string());
                    // Both the routing outcome and the marker are
                    // visible while the request is in flight.
                    assert!(route_info().exists(req.token()));
                    assert_eq!(
                        marker.get(req.token())?,
                        "alive",
                    );
                    Ok(HttpResponse::ok())
                }
            }),
        )
        .unwrap();
    let responses = run_test_app(app, vec![TestRequest::get("/x/1")]);
    assert_eq!(responses[0].status, 200);
    let token = seen.lock().unwrap()[0];
    assert!(!route_info().exists(token));
    assert!(!marker.exists(token));
}

#[test]
fn workers_serve_independent_adapters() {
    let mut app = HttpApp::new();
    app.router()
        .add(HttpMethod::Get, "/", ok_handler("from worker"))
        .unwrap();
    let servers: Vec<Arc<TestServer>> = (0..3)
        .map(|_| {
            let server = Arc::new(TestServer::new());
            server.push(TestRequest::get("/")).unwrap();
            block_on(server.close()).unwrap();
            server
        })
        .collect();
    let pool = Mutex::new(servers.clone().into_iter());
    app.run_workers(3, || {
        let server = pool.lock().unwrap().next();
        server
            .map(|s| s as Arc<dyn HttpServer>)
            .ok_or_else(|| Error::other("out of adapters"))
    })
    .unwrap();
    for server in servers {
        assert_eq!(server.responses()[0].body_str(), "from worker");
    }
}
