//! Method-aware routing on top of [`PathTrie`
//! ](../trie/struct.PathTrie.html).
//!
//! The router maps `(method, pattern)` pairs to values, usually handlers,
//! and resolves raw request paths through the normalization cache.  It
//! distinguishes "no such path" from "path exists but method wrong", so
//! callers can emit a correct `405` with an `Allow` header.
//!
//! The expected lifecycle is configure, then serve: mutators take
//! `&mut self`, lookups take `&self` and are safe to run concurrently.

use crate::{
    http::cache::{PathCache, DEFAULT_CACHE_CAPACITY},
    http::path::NormalizedPath,
    http::trie::{PathTrie, Pattern},
    Error,
};
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

// --- HttpMethod ------------------------------------------------------------

/// A simple enum with the official methods.
///
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HttpMethod {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Copy for HttpMethod {}

impl HttpMethod {
    /// The canonical uppercase name, as it appears on the wire.
    ///
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Trace => "TRACE",
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for HttpMethod {
    type Error = Error;
    fn try_from(s: &str) -> Result<Self, Error> {
        match s.to_uppercase().as_str() {
            "CONNECT" => Ok(HttpMethod::Connect),
            "DELETE" => Ok(HttpMethod::Delete),
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "PATCH" => Ok(HttpMethod::Patch),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "TRACE" => Ok(HttpMethod::Trace),
            _ => Err(Error::invalid_input(format!(
                "{} is not an HTTP method",
                s,
            ))),
        }
    }
}

// --- RouterConfig ----------------------------------------------------------

/// Construction parameters for a [`Router`](struct.Router.html).
///
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Total capacity of the normalization cache, in entries.  `0`
    /// disables the cache.
    ///
    pub cache_capacity: usize,

    /// Try dynamic branches when a literal branch under-matches.
    ///
    pub backtrack: bool,

    /// When `true`, registering a `GET` route also registers its value for
    /// `HEAD` on the same path.  An explicit `HEAD` registration, before or
    /// after, always wins over the automatic one.
    ///
    pub auto_head: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            backtrack: true,
            auto_head: false,
        }
    }
}

// --- lookup results --------------------------------------------------------

/// The routing outcome attached to a request: captured parameters plus the
/// matched/remaining split of the path.
///
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RouteInfo {
    /// Captured parameters, raw decoded segment text.
    pub parameters: HashMap<String, String>,

    /// The path prefix the pattern consumed.  Equal to the whole path
    /// except for tail matches.
    pub matched: NormalizedPath,

    /// The suffix a tail consumed, empty otherwise.
    pub remaining: NormalizedPath,
}

impl RouteInfo {
    /// The captured parameter `name` deserialized from its raw text, so
    /// that numeric parameters can be fetched as numbers:
    /// ```
    /// # use viaduct::RouteInfo;
    /// # let mut info = RouteInfo::default();
    /// # info.parameters.insert("id".to_string(), "42".to_string());
    /// assert_eq!(info.param::<u32>("id"), Some(42));
    /// assert_eq!(info.param::<String>("id"), Some("42".to_string()));
    /// ```
    ///
    pub fn param<T>(&self, name: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.parameters.get(name).and_then(|s| {
            serde_json::from_str(s)
                .or_else(|_| serde_json::from_str(&format!("\"{}\"", s)))
                .ok()
        })
    }
}

/// The outcome of [`Router::lookup()`](struct.Router.html#method.lookup).
///
pub enum LookupResult<V> {
    /// A handler was resolved; `value` is already wrapped in the
    /// applicable middleware.
    Match { value: V, route: RouteInfo },

    /// No trie node was reached, the path is unknown.
    PathMiss { path: NormalizedPath },

    /// The path is known but has no value for the method.
    MethodMiss { allowed: BTreeSet<HttpMethod> },
}

// Written out so that values without `Debug`, like boxed handlers, do
// not make the result unprintable.
impl<V> fmt::Debug for LookupResult<V> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Match { route, .. } => f
                .debug_struct("Match")
                .field("route", route)
                .finish_non_exhaustive(),
            Self::PathMiss { path } => {
                f.debug_struct("PathMiss").field("path", path).finish()
            }
            Self::MethodMiss { allowed } => f
                .debug_struct("MethodMiss")
                .field("allowed", allowed)
                .finish(),
        }
    }
}

// --- Router ----------------------------------------------------------------

/// A function wrapping a routed value, typically a handler, in extra
/// behavior.  Applied by [`lookup()`](struct.Router.html#method.lookup)
/// before the value is returned.
///
pub type Wrap<V> = Arc<dyn Fn(V) -> V + Send + Sync>;

#[derive(Debug)]
struct RouterEntry<V> {
    pattern: Pattern,
    methods: HashMap<HttpMethod, V>,
    head_is_auto: bool,
}

impl<V> RouterEntry<V> {
    fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            methods: HashMap::new(),
            head_is_auto: false,
        }
    }
}

/// Routes `(method, path)` pairs to values.
///
/// Middleware registered with [`use_middleware()`
/// ](#method.use_middleware) applies to every route whose pattern starts
/// with the given prefix and is composed around the value at lookup time,
/// in registration order, outermost first.
///
pub struct Router<V> {
    trie: PathTrie<RouterEntry<V>>,
    injections: Vec<(Pattern, Wrap<V>)>,
    fallback: Option<V>,
    cache: PathCache,
    config: RouterConfig,
}

impl<V: Clone> Router<V> {
    /// A router with the default [`RouterConfig`](struct.RouterConfig.html).
    ///
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            trie: PathTrie::new(),
            injections: Vec::new(),
            fallback: None,
            cache: PathCache::new(config.cache_capacity),
            config,
        }
    }

    /// Register `value` for `method` on `pattern`.
    ///
    /// With [`auto_head`](struct.RouterConfig.html#structfield.auto_head)
    /// enabled, a `GET` registration also covers `HEAD` until an explicit
    /// `HEAD` route replaces it.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidPattern`, `Error::ParameterNameConflict`, or
    /// `Error::DuplicateRoute` when `(pattern, method)` was already added.
    ///
    pub fn add(
        &mut self,
        method: HttpMethod,
        pattern: &str,
        value: V,
    ) -> Result<(), Error> {
        self.add_compiled(method, Pattern::parse(pattern)?, value)
    }

    /// Splice every route and middleware prefix of `sub` below the
    /// literal-only `prefix`.  `sub` is consumed; its fallback handler, if
    /// any, is discarded.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidPattern` for a non-literal prefix,
    /// `Error::DuplicateRoute`/`Error::ParameterNameConflict` when rebased
    /// routes collide with existing ones.
    ///
    pub fn attach(
        &mut self,
        prefix: &str,
        sub: Router<V>,
    ) -> Result<(), Error> {
        let prefix = Pattern::parse(prefix)?;
        for (pattern, mut entry) in
            sub.trie.into_entries_under(&prefix)?
        {
            entry.pattern = pattern.clone();
            self.trie.insert(&pattern, entry)?;
        }
        for (sub_prefix, wrap) in sub.injections {
            self.injections.push((prefix.concat(&sub_prefix), wrap));
        }
        Ok(())
    }

    /// A view that prepends `prefix` to every subsequent [`add()`
    /// ](#method.add) and [`use_middleware()`](#method.use_middleware).
    ///
    pub fn group(&mut self, prefix: &str) -> Result<Group<V>, Error> {
        let prefix = Pattern::parse(prefix)?;
        Ok(Group { router: self, prefix })
    }

    /// Record `wrap` as applying to every route whose pattern starts with
    /// `prefix`.
    ///
    pub fn use_middleware(
        &mut self,
        prefix: &str,
        wrap: Wrap<V>,
    ) -> Result<(), Error> {
        let prefix = Pattern::parse(prefix)?;
        self.injections.push((prefix, wrap));
        Ok(())
    }

    /// The value served when no route matches and the router is used as a
    /// handler.  The routing middleware still reports a path miss to its
    /// `next` handler instead.
    ///
    pub fn set_fallback(&mut self, value: V) {
        self.fallback = Some(value);
    }

    pub fn fallback(&self) -> Option<&V> {
        self.fallback.as_ref()
    }

    /// Resolve `raw_path`, normalizing through the cache, with the
    /// configured backtracking mode.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::InvalidPath` when `raw_path` cannot be normalized.
    ///
    pub fn lookup(
        &self,
        method: HttpMethod,
        raw_path: &str,
    ) -> Result<LookupResult<V>, Error> {
        self.lookup_with(method, raw_path, self.config.backtrack)
    }

    /// [`lookup()`](#method.lookup) with an explicit backtracking mode.
    ///
    pub fn lookup_with(
        &self,
        method: HttpMethod,
        raw_path: &str,
        backtrack: bool,
    ) -> Result<LookupResult<V>, Error> {
        let path = self.cache.get_or_parse(raw_path)?;
        let found = match self.trie.find(&path, backtrack) {
            Some(found) => found,
            None => return Ok(LookupResult::PathMiss { path }),
        };
        let entry = found.value;
        let value = match entry.methods.get(&method) {
            Some(value) => value,
            None => {
                return Ok(LookupResult::MethodMiss {
                    allowed: entry.methods.keys().copied().collect(),
                });
            }
        };
        let mut value = value.clone();
        // Innermost last in the injection list, so wrap back to front.
        for (prefix, wrap) in self.injections.iter().rev() {
            if entry.pattern.starts_with(prefix) {
                value = wrap(value);
            }
        }
        Ok(LookupResult::Match {
            value,
            route: RouteInfo {
                parameters: found.parameters,
                matched: found.matched,
                remaining: found.remaining,
            },
        })
    }

    /// All registered routes as `(pattern, methods)` pairs in
    /// deterministic order, for diagnostics.
    ///
    pub fn routes(&self) -> Vec<(String, Vec<HttpMethod>)> {
        self.trie
            .entries()
            .iter()
            .map(|(pattern, entry)| {
                let mut methods: Vec<HttpMethod> =
                    entry.methods.keys().copied().collect();
                methods.sort();
                (pattern.to_string(), methods)
            })
            .collect()
    }

    // - - private - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

    fn add_compiled(
        &mut self,
        method: HttpMethod,
        pattern: Pattern,
        value: V,
    ) -> Result<(), Error> {
        let auto_head = self.config.auto_head;
        let entry = self
            .trie
            .value_or_insert_with(&pattern, || {
                RouterEntry::new(pattern.clone())
            })?;
        if entry.methods.contains_key(&method)
            && !(method == HttpMethod::Head && entry.head_is_auto)
        {
            return Err(Error::duplicate_route(format!(
                "{} {}",
                method, pattern,
            )));
        }
        if method == HttpMethod::Head {
            entry.head_is_auto = false;
        }
        if auto_head
            && method == HttpMethod::Get
            && !entry.methods.contains_key(&HttpMethod::Head)
        {
            entry.methods.insert(HttpMethod::Head, value.clone());
            entry.head_is_auto = true;
        }
        entry.methods.insert(method, value);
        Ok(())
    }
}

impl<V: Clone> Default for Router<V> {
    fn default() -> Self {
        Self::new()
    }
}

// --- Group -----------------------------------------------------------------

/// A borrowing view of a [`Router`](struct.Router.html) that prepends a
/// fixed prefix, returned by [`Router::group()`
/// ](struct.Router.html#method.group).
///
pub struct Group<'r, V> {
    router: &'r mut Router<V>,
    prefix: Pattern,
}

impl<'r, V: Clone> Group<'r, V> {
    /// As [`Router::add()`](struct.Router.html#method.add), under the
    /// group prefix.
    ///
    pub fn add(
        &mut self,
        method: HttpMethod,
        pattern: &str,
        value: V,
    ) -> Result<(), Error> {
        let pattern = self.prefix.concat(&Pattern::parse(pattern)?);
        self.router.add_compiled(method, pattern, value)
    }

    /// As [`Router::use_middleware()`
    /// ](struct.Router.html#method.use_middleware), under the group prefix.
    ///
    pub fn use_middleware(
        &mut self,
        prefix: &str,
        wrap: Wrap<V>,
    ) -> Result<(), Error> {
        let prefix = self.prefix.concat(&Pattern::parse(prefix)?);
        self.router.injections.push((prefix, wrap));
        Ok(())
    }

    /// A nested view with `prefix` appended to this group's prefix.
    ///
    pub fn group(&mut self, prefix: &str) -> Result<Group<V>, Error> {
        let prefix = self.prefix.concat(&Pattern::parse(prefix)?);
        Ok(Group { router: &mut *self.router, prefix })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(name: &'static str) -> Wrap<String> {
        Arc::new(move |v| format!("{}({})", name, v))
    }

    #[test]
    fn add_and_lookup() {
        let mut router = Router::new();
        router
            .add(HttpMethod::Get, "/users/:id", "show".to_string())
            .unwrap();
        match router.lookup(HttpMethod::Get, "/users/42").unwrap() {
            LookupResult::Match { value, route } => {
                assert_eq!(value, "show");
                assert_eq!(route.parameters["id"], "42");
                assert_eq!(route.param::<u32>("id"), Some(42));
                assert_eq!(route.matched.to_string(), "/users/42");
                assert!(route.remaining.is_root());
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn method_miss_lists_allowed() {
        let mut router = Router::new();
        router
            .add(HttpMethod::Get, "/users/:id", "show".to_string())
            .unwrap();
        router
            .add(HttpMethod::Delete, "/users/:id", "kill".to_string())
            .unwrap();
        match router.lookup(HttpMethod::Post, "/users/42").unwrap() {
            LookupResult::MethodMiss { allowed } => {
                assert_eq!(
                    allowed.into_iter().collect::<Vec<_>>(),
                    [HttpMethod::Delete, HttpMethod::Get],
                );
            }
            other => panic!("expected a method miss, got {:?}", other),
        }
        // Every allowed method resolves, by definition.
        for method in [HttpMethod::Get, HttpMethod::Delete] {
            assert!(matches!(
                router.lookup(method, "/users/42").unwrap(),
                LookupResult::Match { .. },
            ));
        }
    }

    #[test]
    fn path_miss_is_not_method_miss() {
        let mut router = Router::new();
        router
            .add(HttpMethod::Get, "/users/:id", "show".to_string())
            .unwrap();
        assert!(matches!(
            router.lookup(HttpMethod::Get, "/users").unwrap(),
            LookupResult::PathMiss { .. },
        ));
        assert!(matches!(
            router.lookup(HttpMethod::Get, "/nope").unwrap(),
            LookupResult::PathMiss { .. },
        ));
    }

    #[test]
    fn duplicate_method_rejected() {
        let mut router = Router::new();
        router
            .add(HttpMethod::Get, "/a", "1".to_string())
            .unwrap();
        assert!(matches!(
            router.add(HttpMethod::Get, "/a", "2".to_string()),
            Err(Error::DuplicateRoute(_)),
        ));
        router.add(HttpMethod::Post, "/a", "3".to_string()).unwrap();
    }

    #[test]
    fn invalid_path_is_an_error_not_a_miss() {
        let router: Router<String> = Router::new();
        assert!(matches!(
            router.lookup(HttpMethod::Get, "/../etc/passwd"),
            Err(Error::InvalidPath(_)),
        ));
    }

    #[test]
    fn middleware_wraps_outermost_first() {
        let mut router = Router::new();
        router.use_middleware("/", wrap("outer")).unwrap();
        router.use_middleware("/api", wrap("inner")).unwrap();
        router
            .add(HttpMethod::Get, "/api/x", "h".to_string())
            .unwrap();
        router
            .add(HttpMethod::Get, "/other", "o".to_string())
            .unwrap();
        match router.lookup(HttpMethod::Get, "/api/x").unwrap() {
            LookupResult::Match { value, .. } => {
                assert_eq!(value, "outer(inner(h))");
            }
            other => panic!("expected a match, got {:?}", other),
        }
        match router.lookup(HttpMethod::Get, "/other").unwrap() {
            LookupResult::Match { value, .. } => {
                assert_eq!(value, "outer(o)");
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn middleware_prefix_follows_pattern_not_path() {
        let mut router = Router::new();
        router.use_middleware("/users/:id", wrap("per_user")).unwrap();
        router
            .add(HttpMethod::Get, "/users/:id/posts", "p".to_string())
            .unwrap();
        router
            .add(HttpMethod::Get, "/users/all", "a".to_string())
            .unwrap();
        match router.lookup(HttpMethod::Get, "/users/7/posts").unwrap() {
            LookupResult::Match { value, .. } => {
                assert_eq!(value, "per_user(p)");
            }
            other => panic!("expected a match, got {:?}", other),
        }
        // "/users/all" matches the prefix as a path but its pattern does
        // not start with "/users/:id".
        match router.lookup(HttpMethod::Get, "/users/all").unwrap() {
            LookupResult::Match { value, .. } => assert_eq!(value, "a"),
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn group_prepends_prefix() {
        let mut router = Router::new();
        {
            let mut api = router.group("/api").unwrap();
            api.add(HttpMethod::Get, "/users", "list".to_string())
                .unwrap();
            let mut v2 = api.group("/v2").unwrap();
            v2.add(HttpMethod::Get, "/users", "list2".to_string())
                .unwrap();
            v2.use_middleware("/", wrap("v2")).unwrap();
        }
        assert!(matches!(
            router.lookup(HttpMethod::Get, "/api/users").unwrap(),
            LookupResult::Match { .. },
        ));
        match router.lookup(HttpMethod::Get, "/api/v2/users").unwrap() {
            LookupResult::Match { value, .. } => {
                assert_eq!(value, "v2(list2)");
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn attach_rebases_routes_and_middleware() {
        let mut sub = Router::new();
        sub.add(HttpMethod::Get, "/pets/:id", "pet".to_string())
            .unwrap();
        sub.use_middleware("/pets", wrap("pets")).unwrap();
        let mut router = Router::new();
        router.attach("/api", sub).unwrap();
        match router.lookup(HttpMethod::Get, "/api/pets/3").unwrap() {
            LookupResult::Match { value, route } => {
                assert_eq!(value, "pets(pet)");
                assert_eq!(route.parameters["id"], "3");
            }
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn attach_rejects_collisions() {
        let mut sub = Router::new();
        sub.add(HttpMethod::Get, "/x", "sub".to_string()).unwrap();
        let mut router = Router::new();
        router
            .add(HttpMethod::Get, "/api/x", "top".to_string())
            .unwrap();
        assert!(matches!(
            router.attach("/api", sub),
            Err(Error::DuplicateRoute(_)),
        ));
    }

    #[test]
    fn auto_head_follows_get() {
        let mut router = Router::with_config(RouterConfig {
            auto_head: true,
            ..RouterConfig::default()
        });
        router
            .add(HttpMethod::Get, "/a", "get".to_string())
            .unwrap();
        match router.lookup(HttpMethod::Head, "/a").unwrap() {
            LookupResult::Match { value, .. } => assert_eq!(value, "get"),
            other => panic!("expected a match, got {:?}", other),
        }
        // An explicit HEAD replaces the automatic one.
        router
            .add(HttpMethod::Head, "/a", "head".to_string())
            .unwrap();
        match router.lookup(HttpMethod::Head, "/a").unwrap() {
            LookupResult::Match { value, .. } => assert_eq!(value, "head"),
            other => panic!("expected a match, got {:?}", other),
        }
        // Off by default.
        let mut plain = Router::new();
        plain.add(HttpMethod::Get, "/a", "get".to_string()).unwrap();
        assert!(matches!(
            plain.lookup(HttpMethod::Head, "/a").unwrap(),
            LookupResult::MethodMiss { .. },
        ));
    }

    #[test]
    fn routes_lists_everything() {
        let mut router = Router::new();
        router.add(HttpMethod::Get, "/b", "1".to_string()).unwrap();
        router.add(HttpMethod::Post, "/b", "2".to_string()).unwrap();
        router
            .add(HttpMethod::Get, "/a/**", "3".to_string())
            .unwrap();
        assert_eq!(
            router.routes(),
            vec![
                (
                    "/a/**".to_string(),
                    vec![HttpMethod::Get],
                ),
                (
                    "/b".to_string(),
                    vec![HttpMethod::Get, HttpMethod::Post],
                ),
            ],
        );
    }
}
