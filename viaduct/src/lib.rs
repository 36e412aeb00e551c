pub mod error;
pub mod http;
pub mod test_utils;

pub use error::Error;
pub use http::{
    catcher, handler, pipeline, release_request_state, route_info,
    router_handler, routing, BodyStream, BodyType, ByteDuplex,
    ContextProperty, ExchangeId, Group, Handler, HandlerOutcome,
    HeaderMap, HijackFn, HttpApp, HttpBody, HttpMethod, HttpRequest,
    HttpResponse, HttpServer, HttpStatus, HttpVersion, LookupResult,
    Message, MessageDuplex, Middleware, NormalizedPath, PathCache,
    PathTrie, Pattern, PatternSegment, RequestToken, RouteInfo, Router,
    RouterConfig, ServerRequest, TrieMatch, UpgradeFn, Wrap,
    DEFAULT_CACHE_CAPACITY,
};
