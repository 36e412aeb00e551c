//! The HTTP core: routing, request/response model, middleware, and the
//! adapter-facing app shell.
//!

pub mod app;
pub mod body;
pub mod cache;
pub mod context;
pub mod middleware;
pub mod path;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod trie;

pub use app::HttpApp;
pub use body::{BodyStream, BodyType, HttpBody};
pub use cache::{PathCache, DEFAULT_CACHE_CAPACITY};
pub use context::{release_request_state, ContextProperty};
pub use middleware::{
    catcher, handler, pipeline, route_info, router_handler, routing,
    Handler, HandlerOutcome, Middleware,
};
pub use path::NormalizedPath;
pub use request::{
    HeaderMap, HttpRequest, HttpVersion, RequestToken,
};
pub use response::{HttpResponse, HttpStatus};
pub use router::{
    Group, HttpMethod, LookupResult, RouteInfo, Router, RouterConfig,
    Wrap,
};
pub use server::{
    ByteDuplex, ExchangeId, HijackFn, HttpServer, Message,
    MessageDuplex, ServerRequest, UpgradeFn,
};
pub use trie::{PathTrie, Pattern, PatternSegment, TrieMatch};
