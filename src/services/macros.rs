/// A macro to simplify result caching.
///
/// This macro checks if a ranking is present in the cache.
/// If found, it returns the cached ranking.
/// If not found, it evaluates the provided block to compute the ranking,
/// stores it in the cache, and then returns it.
///
/// # Arguments
/// * `$cache`: The cache to use for retrieval and storage. The cache must have
///   `get` and `put` methods taking a `CacheKey`.
/// * `$key`: The key to use for caching the value.
/// * `$block`: An expression returning `AppResult<Vec<RankedMovie>>`, evaluated
///   only on a cache miss.
///
/// # Example
/// ```rust,ignore
/// let ranking = cached!(self.cache, key, self.rank_similar(&bundle, idx, n, method))?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $block:expr) => {{
        // Attempt to get the ranking from cache
        if let Some(cached) = $cache.get(&$key) {
            Ok::<_, $crate::error::AppError>(cached)
        } else {
            // If not in cache, compute the ranking
            let value = ::std::sync::Arc::new($block?);
            // Store the computed ranking in cache
            $cache.put(&$key, ::std::sync::Arc::clone(&value));
            Ok(value)
        }
    }};
}
