//! Cache layer that orchestrates caching strategies with network fetching.

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::{CacheStorage, CachedResponse};
use super::traits::CacheResult;
use crate::net::{Request, Response};

/// Cache layer bound to one bucket.
///
/// Storage failures never escape this layer: a failed lookup counts as a
/// miss and a failed store is logged and skipped.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  bucket: String,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer over `bucket` in the given storage backend.
  pub fn new(storage: Arc<S>, bucket: impl Into<String>) -> Self {
    Self {
      storage,
      bucket: bucket.into(),
    }
  }

  /// Look up a stored entry, treating storage errors as a miss.
  pub fn lookup(&self, request: &Request) -> Option<CachedResponse> {
    match self.storage.match_request(&self.bucket, request) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(url = %request.url, error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Store a copy of `response` if it is a plain 200.
  fn store_if_cacheable(&self, request: &Request, response: &Response) {
    if response.status != 200 {
      debug!(url = %request.url, status = response.status, "not caching response");
      return;
    }

    // The store gets its own copy; the original goes back to the caller
    if let Err(e) = self
      .storage
      .put(&self.bucket, request, response.clone())
    {
      warn!(url = %request.url, error = %e, "failed to cache response");
    }
  }

  /// Fetch with network-first strategy.
  ///
  /// 1. Fetch from network; a 200 is stored before being returned
  /// 2. Any other status is returned as-is
  /// 3. On network failure, return the stored entry
  ///
  /// Returns `None` only when the network failed and nothing is stored.
  pub async fn network_first<F, Fut>(
    &self,
    request: &Request,
    fetcher: F,
  ) -> Option<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    match fetcher().await {
      Ok(response) => {
        self.store_if_cacheable(request, &response);
        Some(CacheResult::from_network(response))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network failed, trying cache");
        self
          .lookup(request)
          .map(|cached| CacheResult::offline(cached.response, cached.cached_at))
      }
    }
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Check cache - if present, return immediately without revalidating
  /// 2. Otherwise fetch from network; a 200 is stored before being returned
  /// 3. Any other status is returned as-is
  ///
  /// Returns `None` when the entry is missing and the network failed.
  pub async fn cache_first<F, Fut>(
    &self,
    request: &Request,
    fetcher: F,
  ) -> Option<CacheResult<Response>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Response>>,
  {
    if let Some(cached) = self.lookup(request) {
      debug!(url = %request.url, "serving from cache");
      return Some(CacheResult::from_cache(cached.response, cached.cached_at));
    }

    match fetcher().await {
      Ok(response) => {
        self.store_if_cacheable(request, &response);
        Some(CacheResult::from_network(response))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network failed with no cached entry");
        None
      }
    }
  }
}
