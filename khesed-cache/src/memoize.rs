//! Memoized async functions.
//!
//! [`with_cache`] wraps an async function so each call first derives a key
//! from its arguments and only invokes the function on a miss.

use std::future::Future;

use khesed_core::CacheOptions;

use crate::tiered::{CacheValue, TieredCache};

/// An async function whose results are cached by argument-derived keys.
pub struct CachedFn<A, T, K, F>
where
    T: CacheValue,
{
    cache: TieredCache<T>,
    key_fn: K,
    options: CacheOptions,
    inner: F,
    _args: std::marker::PhantomData<fn(A)>,
}

/// Wrap `f` so results are cached under `key_fn(&args)` with `options`.
///
/// # Example
///
/// ```ignore
/// let members = with_cache(
///     cache.clone(),
///     |church_id: &String| CacheKey::new("members").tenant(church_id).render(),
///     CacheOptions::new().with_ttl_secs(600).with_tag("members"),
///     |church_id: String| async move { db.members_summary(&church_id).await },
/// );
///
/// let summary = members.call("c1".to_string()).await?;
/// ```
pub fn with_cache<A, T, K, F, Fut, E>(
    cache: TieredCache<T>,
    key_fn: K,
    options: CacheOptions,
    f: F,
) -> CachedFn<A, T, K, F>
where
    T: CacheValue,
    K: Fn(&A) -> String,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    CachedFn {
        cache,
        key_fn,
        options,
        inner: f,
        _args: std::marker::PhantomData,
    }
}

impl<A, T, K, F, Fut, E> CachedFn<A, T, K, F>
where
    T: CacheValue,
    K: Fn(&A) -> String,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    /// Return the cached result for `args`, calling the wrapped function on a
    /// miss. Errors from the wrapped function are returned and not cached.
    pub async fn call(&self, args: A) -> Result<T, E> {
        let key = (self.key_fn)(&args);
        self.cache
            .get_or_fetch_with(&key, self.options.clone(), || (self.inner)(args))
            .await
    }

    /// Key the given arguments would be cached under.
    pub fn key_for(&self, args: &A) -> String {
        (self.key_fn)(args)
    }

    pub fn cache(&self) -> &TieredCache<T> {
        &self.cache
    }
}
