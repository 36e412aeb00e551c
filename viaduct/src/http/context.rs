//! Typed, request-scoped state.
//!
//! A [`ContextProperty`](struct.ContextProperty.html) attaches one value
//! per request to the request's token, so middleware can pass typed data
//! to handlers without threading it through signatures and without any
//! possibility of name collisions: the property handle itself is the key.

use crate::{http::request::RequestToken, Error};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

type Store<T> = Arc<RwLock<HashMap<RequestToken, T>>>;

// Every property registers a clearer here so that request completion can
// release all of a token's state without knowing the property types.
struct Registry {
    clearers: Mutex<Vec<Box<dyn Fn(RequestToken) + Send + Sync>>>,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        clearers: Mutex::new(Vec::new()),
    })
}

/// Release every context value attached to `token`, across all
/// properties.  The app shell calls this when a request completes; tests
/// and custom shells should do the same.
///
pub fn release_request_state(token: RequestToken) {
    let clearers = registry()
        .clearers
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());
    for clear in clearers.iter() {
        clear(token);
    }
}

/// A typed, per-process handle mapping request tokens to values of `T`.
///
/// Distinct handles have disjoint storage even for the same `T`, and
/// clearing one property never affects another.  Values are released at
/// the latest when the request completes, via [`release_request_state()`
/// ](fn.release_request_state.html).
///
pub struct ContextProperty<T: Send + Sync + 'static> {
    values: Store<T>,
}

impl<T: Send + Sync + 'static> ContextProperty<T> {
    pub fn new() -> Self {
        let values: Store<T> = Arc::default();
        let weak: Weak<RwLock<HashMap<RequestToken, T>>> =
            Arc::downgrade(&values);
        registry()
            .clearers
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(Box::new(move |token| {
                if let Some(values) = weak.upgrade() {
                    values
                        .write()
                        .unwrap_or_else(|poison| poison.into_inner())
                        .remove(&token);
                }
            }));
        Self { values }
    }

    /// Attach `value` to `token`, replacing any previous value.
    ///
    pub fn set(&self, token: RequestToken, value: T) {
        self.write().insert(token, value);
    }

    /// `true` iff a value is attached to `token`.
    ///
    pub fn exists(&self, token: RequestToken) -> bool {
        self.read().contains_key(&token)
    }

    /// Detach and return the value attached to `token`.
    ///
    pub fn remove(&self, token: RequestToken) -> Option<T> {
        self.write().remove(&token)
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<HashMap<RequestToken, T>> {
        self.values
            .read()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<HashMap<RequestToken, T>> {
        self.values
            .write()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl<T: Clone + Send + Sync + 'static> ContextProperty<T> {
    /// The value attached to `token`.
    ///
    /// <b>Errors</b>
    ///
    /// `Error::ThisCannotHappen` when nothing is attached; asking for an
    /// unset property is a programming error, use [`get_opt()`
    /// ](#method.get_opt) when absence is expected.
    ///
    pub fn get(&self, token: RequestToken) -> Result<T, Error> {
        self.get_opt(token).ok_or_else(|| {
            Error::this_cannot_happen("context property not set")
        })
    }

    /// The value attached to `token`, or `None`.
    ///
    pub fn get_opt(&self, token: RequestToken) -> Option<T> {
        self.read().get(&token).cloned()
    }
}

impl<T: Send + Sync + 'static> Default for ContextProperty<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> RequestToken {
        RequestToken::next()
    }

    #[test]
    fn set_get_remove() {
        let prop: ContextProperty<u32> = ContextProperty::new();
        let t = token();
        assert!(!prop.exists(t));
        assert!(matches!(
            prop.get(t),
            Err(Error::ThisCannotHappen(_)),
        ));
        prop.set(t, 7);
        assert!(prop.exists(t));
        assert_eq!(prop.get(t).unwrap(), 7);
        prop.set(t, 8);
        assert_eq!(prop.get_opt(t), Some(8));
        assert_eq!(prop.remove(t), Some(8));
        assert_eq!(prop.get_opt(t), None);
    }

    #[test]
    fn distinct_handles_have_disjoint_storage() {
        let a: ContextProperty<u32> = ContextProperty::new();
        let b: ContextProperty<u32> = ContextProperty::new();
        let t = token();
        a.set(t, 1);
        b.set(t, 2);
        assert_eq!(a.get(t).unwrap(), 1);
        assert_eq!(b.get(t).unwrap(), 2);
        a.remove(t);
        assert_eq!(b.get(t).unwrap(), 2);
    }

    #[test]
    fn distinct_tokens_do_not_interfere() {
        let prop: ContextProperty<String> = ContextProperty::new();
        let (t1, t2) = (token(), token());
        prop.set(t1, "one".to_string());
        prop.set(t2, "two".to_string());
        assert_eq!(prop.get(t1).unwrap(), "one");
        assert_eq!(prop.get(t2).unwrap(), "two");
    }

    #[test]
    fn release_clears_all_properties_for_one_token() {
        let a: ContextProperty<u32> = ContextProperty::new();
        let b: ContextProperty<String> = ContextProperty::new();
        let (t, other) = (token(), token());
        a.set(t, 1);
        b.set(t, "x".to_string());
        a.set(other, 2);
        release_request_state(t);
        assert!(!a.exists(t));
        assert!(!b.exists(t));
        assert_eq!(a.get(other).unwrap(), 2);
    }
}
