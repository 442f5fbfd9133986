//! The resource cache gate: lifecycle handlers around one versioned bucket.

mod classify;
mod fallback;

pub use classify::{classify, Route};
pub use fallback::{api_unavailable, Fallback};

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::cache::{CacheLayer, CacheResult, CacheStorage, KeyValueStore};
use crate::config::GateConfig;
use crate::host::Host;
use crate::net::{Network, Request, Response};
use crate::notify::{ClickAction, Notification};
use crate::sync::{self, SyncOutcome};

/// One handler per trigger the host runtime delivers.
#[allow(async_fn_in_trait)]
pub trait ServiceWorker {
  /// Store the whole manifest, or nothing.
  async fn on_install(&self) -> Result<()>;

  /// Delete every bucket but the current one. Returns the deleted names.
  async fn on_activate(&self) -> Result<Vec<String>>;

  /// Answer an outbound request. `None` means the request is not intercepted.
  async fn on_fetch(&self, request: Request) -> Option<CacheResult<Response>>;

  /// Background sync. `None` when the tag is not ours.
  async fn on_sync(&self, tag: &str) -> Option<SyncOutcome>;

  async fn on_periodic_sync(&self, tag: &str);

  async fn on_push(&self, payload: Option<&str>) -> Result<()>;

  async fn on_notification_click(&self, action: Option<&str>) -> Result<()>;
}

/// Resource cache gate.
///
/// Sits between the app's resource fetching and the network, answering
/// every intercepted GET from the bucket named by the version tag.
pub struct ResourceCacheGate<S, N, H>
where
  S: CacheStorage + KeyValueStore,
  N: Network,
  H: Host,
{
  config: GateConfig,
  storage: Arc<S>,
  cache: CacheLayer<S>,
  network: N,
  host: H,
}

impl<S, N, H> ResourceCacheGate<S, N, H>
where
  S: CacheStorage + KeyValueStore,
  N: Network,
  H: Host,
{
  pub fn new(config: GateConfig, storage: Arc<S>, network: N, host: H) -> Self {
    let cache = CacheLayer::new(Arc::clone(&storage), config.version.clone());
    Self {
      config,
      storage,
      cache,
      network,
      host,
    }
  }

  pub fn config(&self) -> &GateConfig {
    &self.config
  }

  #[cfg(test)]
  pub fn storage(&self) -> &S {
    &self.storage
  }

  async fn fetch_manifest_entry(&self, request: Request) -> Result<(Request, Response)> {
    let response = self.network.fetch(&request).await?;
    if !response.is_ok() {
      return Err(eyre!(
        "Request for {} returned {} {}",
        request.url,
        response.status,
        response.status_text
      ));
    }
    Ok((request, response))
  }

  /// Both cache and network failed for a cache-first request.
  fn fallback(&self, request: &Request) -> CacheResult<Response> {
    let fallback = Fallback::for_request(request);
    debug!(url = %request.url, ?fallback, "serving offline fallback");

    if fallback == Fallback::Document {
      let offline = Request::get(self.config.offline_page.clone());
      if let Some(page) = self.cache.lookup(&offline) {
        return CacheResult::offline(page.response, page.cached_at);
      }
    }

    CacheResult::fallback(fallback.response())
  }
}

impl<S, N, H> ServiceWorker for ResourceCacheGate<S, N, H>
where
  S: CacheStorage + KeyValueStore,
  N: Network,
  H: Host,
{
  async fn on_install(&self) -> Result<()> {
    info!(bucket = %self.config.version, "caching app shell");

    let fetches = self
      .config
      .manifest
      .iter()
      .map(|url| self.fetch_manifest_entry(Request::get(url.clone())));

    let entries = match try_join_all(fetches).await {
      Ok(entries) => entries,
      Err(e) => {
        error!(error = %e, "cache installation failed");
        return Err(e);
      }
    };

    if let Err(e) = self.storage.put_all(&self.config.version, entries) {
      error!(error = %e, "cache installation failed");
      return Err(e);
    }

    info!(count = self.config.manifest.len(), "installation complete");
    self.host.skip_waiting();
    Ok(())
  }

  async fn on_activate(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();

    for name in self.storage.bucket_names()? {
      if name != self.config.version {
        info!(bucket = %name, "deleting old cache");
        self.storage.delete_bucket(&name)?;
        deleted.push(name);
      }
    }

    info!("activation complete");
    self.host.claim_clients();
    Ok(deleted)
  }

  async fn on_fetch(&self, request: Request) -> Option<CacheResult<Response>> {
    let route = classify(&request, &self.config.bypass_schemes);
    debug!(url = %request.url, ?route, "intercepted request");

    let network = &self.network;
    let req = &request;

    let result = match route {
      Route::Bypass => return None,
      Route::NetworkFirst => self
        .cache
        .network_first(req, move || network.fetch(req))
        .await
        .unwrap_or_else(|| CacheResult::fallback(api_unavailable())),
      Route::CacheFirst => match self.cache.cache_first(req, move || network.fetch(req)).await {
        Some(result) => result,
        None => self.fallback(&request),
      },
    };

    Some(result)
  }

  async fn on_sync(&self, tag: &str) -> Option<SyncOutcome> {
    if tag != self.config.sync_tag {
      debug!(tag, "ignoring sync tag");
      return None;
    }

    info!("background sync for quiz results");
    Some(
      sync::flush_pending(
        self.storage.as_ref(),
        &self.network,
        &self.config.queue_key,
        &self.config.sync_endpoint,
      )
      .await,
    )
  }

  async fn on_periodic_sync(&self, tag: &str) {
    if tag == self.config.periodic_sync_tag {
      // Placeholder trigger; question data is refreshed by the app itself
      info!("updating question cache in background");
    } else {
      debug!(tag, "ignoring periodic sync tag");
    }
  }

  async fn on_push(&self, payload: Option<&str>) -> Result<()> {
    let notification = Notification::for_push(&self.config.notifications, payload);
    self.host.show_notification(&notification)
  }

  async fn on_notification_click(&self, action: Option<&str>) -> Result<()> {
    info!(action = action.unwrap_or(""), "notification click received");
    self.host.close_notification();

    match ClickAction::from_action(action) {
      ClickAction::OpenApp => self.host.open_window(&self.config.scope),
      ClickAction::Dismiss => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage};
  use crate::config::Config;
  use crate::testing::{HostCall, MockNetwork, RecordingHost};
  use url::Url;

  const SCOPE: &str = "http://localhost:8080/";

  type TestGate = ResourceCacheGate<SqliteStorage, MockNetwork, RecordingHost>;

  fn gate_config(version: &str, manifest: &[&str]) -> GateConfig {
    let mut config = Config::default();
    config.scope = SCOPE.to_string();
    config.cache.version = version.to_string();
    config.cache.manifest = manifest.iter().map(|s| s.to_string()).collect();
    config.gate_config().unwrap()
  }

  fn gate_with(config: GateConfig, storage: Arc<SqliteStorage>, network: MockNetwork) -> TestGate {
    ResourceCacheGate::new(config, storage, network, RecordingHost::default())
  }

  fn gate(manifest: &[&str], network: MockNetwork) -> TestGate {
    gate_with(
      gate_config("quiz-v1", manifest),
      Arc::new(SqliteStorage::in_memory().unwrap()),
      network,
    )
  }

  fn url(path: &str) -> Url {
    Url::parse(SCOPE).unwrap().join(path).unwrap()
  }

  fn get(path: &str) -> Request {
    Request::get(url(path))
  }

  fn stored(gate: &TestGate, path: &str) -> Option<Response> {
    gate
      .storage()
      .match_request("quiz-v1", &get(path))
      .unwrap()
      .map(|c| c.response)
  }

  #[tokio::test]
  async fn test_install_stores_manifest() {
    let network = MockNetwork::new()
      .respond(&url("./").to_string(), Response::text("<html>shell</html>"))
      .respond(&url("./index.html").to_string(), Response::text("<html>index</html>"));
    let gate = gate(&["./", "./index.html"], network);

    gate.on_install().await.unwrap();

    assert_eq!(stored(&gate, "./").unwrap().body_text(), "<html>shell</html>");
    assert_eq!(
      stored(&gate, "./index.html").unwrap().body_text(),
      "<html>index</html>"
    );
    assert_eq!(gate.host.calls(), vec![HostCall::SkipWaiting]);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let network = MockNetwork::new().respond(&url("./").to_string(), Response::text("shell"));
    let gate = gate(&["./", "./unreachable.png"], network);

    assert!(gate.on_install().await.is_err());

    assert!(stored(&gate, "./").is_none());
    assert!(stored(&gate, "./unreachable.png").is_none());
    assert!(gate.host.calls().is_empty());
  }

  #[tokio::test]
  async fn test_install_rejects_error_status() {
    let network = MockNetwork::new()
      .respond(&url("./").to_string(), Response::text("shell"))
      .respond(&url("./manifest.json").to_string(), Response::new(404, ""));
    let gate = gate(&["./", "./manifest.json"], network);

    assert!(gate.on_install().await.is_err());
    assert!(stored(&gate, "./").is_none());
  }

  #[tokio::test]
  async fn test_activate_deletes_stale_buckets_only() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    storage.open_bucket("quiz-v0").unwrap();
    storage.open_bucket("quiz-v1").unwrap();
    storage.open_bucket("other").unwrap();
    let gate = gate_with(gate_config("quiz-v1", &[]), storage, MockNetwork::new());

    let mut deleted = gate.on_activate().await.unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["other".to_string(), "quiz-v0".to_string()]);
    assert_eq!(
      gate.storage().bucket_names().unwrap(),
      vec!["quiz-v1".to_string()]
    );

    // Second run with the same tag has nothing left to delete
    assert!(gate.on_activate().await.unwrap().is_empty());
    assert_eq!(
      gate.host.calls(),
      vec![HostCall::ClaimClients, HostCall::ClaimClients]
    );
  }

  #[tokio::test]
  async fn test_versions_are_isolated() {
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let network = MockNetwork::new().respond(&url("./").to_string(), Response::text("v1 shell"));
    let old = gate_with(gate_config("quiz-v1", &["./"]), Arc::clone(&storage), network);
    old.on_install().await.unwrap();

    let network = MockNetwork::new().respond(&url("./").to_string(), Response::text("v2 shell"));
    let new = gate_with(gate_config("quiz-v2", &["./"]), Arc::clone(&storage), network);
    new.on_install().await.unwrap();
    new.on_activate().await.unwrap();

    assert_eq!(storage.bucket_names().unwrap(), vec!["quiz-v2".to_string()]);
    let result = new.on_fetch(get("./")).await.unwrap();
    assert_eq!(result.data.body_text(), "v2 shell");
  }

  #[tokio::test]
  async fn test_non_get_and_extensions_pass_through() {
    let gate = gate(&[], MockNetwork::new());

    let post = Request::post(url("./api/results"), b"{}".to_vec());
    assert!(gate.on_fetch(post).await.is_none());

    let ext = Request::get(Url::parse("chrome-extension://abc/content.js").unwrap());
    assert!(gate.on_fetch(ext).await.is_none());

    assert!(gate.network.requests().is_empty());
  }

  #[tokio::test]
  async fn test_api_response_cached_then_served_offline() {
    let api = url("./api/questions");
    let network = MockNetwork::new().respond(
      api.as_str(),
      Response::new(200, r#"[{"id":7}]"#).with_header("Content-Type", "application/json"),
    );
    let gate = gate(&[], network);

    let first = gate.on_fetch(Request::get(api.clone())).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(stored(&gate, "./api/questions").unwrap(), first.data);

    gate.network.go_offline();
    let second = gate.on_fetch(Request::get(api.clone())).await.unwrap();
    assert_eq!(second.source, CacheSource::Offline);
    assert_eq!(second.data, first.data);
  }

  #[tokio::test]
  async fn test_api_always_goes_to_network_first() {
    let api = url("./api/questions");
    let network = MockNetwork::new().respond(api.as_str(), Response::text("[]"));
    let gate = gate(&[], network);

    gate.on_fetch(Request::get(api.clone())).await.unwrap();
    gate.on_fetch(Request::get(api.clone())).await.unwrap();

    assert_eq!(gate.network.fetch_count(api.as_str()), 2);
  }

  #[tokio::test]
  async fn test_api_miss_while_offline_is_explicit_503() {
    let gate = gate(&[], MockNetwork::new());

    let result = gate.on_fetch(get("./api/questions")).await.unwrap();

    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.data.status, 503);
    assert_eq!(result.data.content_type(), Some("application/json"));
  }

  #[tokio::test]
  async fn test_cached_resource_never_refetched() {
    let logo = url("./logo.svg");
    let network = MockNetwork::new().respond(logo.as_str(), Response::text("<svg/>"));
    let gate = gate(&[], network);

    let first = gate.on_fetch(Request::get(logo.clone())).await.unwrap();
    assert_eq!(first.source, CacheSource::Network);

    for _ in 0..3 {
      let again = gate.on_fetch(Request::get(logo.clone())).await.unwrap();
      assert_eq!(again.source, CacheSource::Cache);
      assert_eq!(again.data, first.data);
    }
    assert_eq!(gate.network.fetch_count(logo.as_str()), 1);
  }

  #[tokio::test]
  async fn test_non_200_is_returned_uncached() {
    let page = url("./missing.html");
    let network = MockNetwork::new().respond(page.as_str(), Response::new(404, "nope"));
    let gate = gate(&[], network);

    let result = gate.on_fetch(Request::get(page)).await.unwrap();

    assert_eq!(result.data.status, 404);
    assert!(stored(&gate, "./missing.html").is_none());
  }

  #[tokio::test]
  async fn test_stylesheet_fallback_when_offline() {
    let gate = gate(&[], MockNetwork::new());

    let result = gate.on_fetch(get("./style.css")).await.unwrap();

    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.data.content_type(), Some("text/css"));
    assert_eq!(result.data.body_text(), "/* Offline - Styles not available */");
  }

  #[tokio::test]
  async fn test_document_fallback_serves_offline_page() {
    let offline = Response::new(200, "<h1>Offline</h1>").with_header("Content-Type", "text/html");
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    storage
      .put("quiz-v1", &get("./offline.html"), offline.clone())
      .unwrap();
    let gate = gate_with(gate_config("quiz-v1", &[]), storage, MockNetwork::new());

    let request = get("./").with_header("Accept", "text/html,application/xhtml+xml");
    let result = gate.on_fetch(request).await.unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, offline);
  }

  #[tokio::test]
  async fn test_document_fallback_without_offline_page() {
    let gate = gate(&[], MockNetwork::new());

    let request = get("./quiz.html").with_header("Accept", "text/html");
    let result = gate.on_fetch(request).await.unwrap();

    assert_eq!(result.data.status, 200);
    assert_eq!(
      result.data.body_text(),
      "You are offline. Please check your internet connection."
    );
  }

  #[tokio::test]
  async fn test_unknown_resource_fallback_is_503() {
    let gate = gate(&[], MockNetwork::new());

    let result = gate.on_fetch(get("./icon.png")).await.unwrap();

    assert_eq!(result.data.status, 503);
  }

  #[tokio::test]
  async fn test_sync_only_answers_its_tag() {
    let gate = gate(&[], MockNetwork::new());

    assert!(gate.on_sync("something-else").await.is_none());
    assert_eq!(
      gate.on_sync("sync-quiz-results").await,
      Some(SyncOutcome::Empty)
    );
  }

  #[tokio::test]
  async fn test_sync_delivers_queue() {
    let endpoint = url("./api/sync-results");
    let network = MockNetwork::new().respond(endpoint.as_str(), Response::new(200, "{}"));
    let gate = gate(&[], network);
    gate
      .storage()
      .set_item("pendingResults", r#"[{"id":1}]"#)
      .unwrap();

    let outcome = gate.on_sync("sync-quiz-results").await;

    assert_eq!(outcome, Some(SyncOutcome::Delivered(1)));
    assert_eq!(gate.storage().get_item("pendingResults").unwrap(), None);
  }

  #[tokio::test]
  async fn test_sync_failure_keeps_queue() {
    let gate = gate(&[], MockNetwork::new());
    gate
      .storage()
      .set_item("pendingResults", r#"[{"id":1}]"#)
      .unwrap();

    let outcome = gate.on_sync("sync-quiz-results").await;

    assert!(matches!(outcome, Some(SyncOutcome::Retained(_))));
    assert_eq!(
      gate.storage().get_item("pendingResults").unwrap().as_deref(),
      Some(r#"[{"id":1}]"#)
    );
  }

  #[tokio::test]
  async fn test_periodic_sync_touches_nothing() {
    let gate = gate(&[], MockNetwork::new());

    gate.on_periodic_sync("update-questions").await;

    assert!(gate.network.requests().is_empty());
    assert!(gate.host.calls().is_empty());
  }

  #[tokio::test]
  async fn test_push_shows_notification() {
    let gate = gate(&[], MockNetwork::new());

    gate.on_push(Some("New questions added")).await.unwrap();

    match gate.host.calls().as_slice() {
      [HostCall::ShowNotification(n)] => {
        assert_eq!(n.title, "JAMB Mastermind 300");
        assert_eq!(n.body, "New questions added");
      }
      other => panic!("unexpected host calls: {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_click_opens_app_root() {
    let gate = gate(&[], MockNetwork::new());

    gate.on_notification_click(Some("explore")).await.unwrap();
    gate.on_notification_click(None).await.unwrap();

    assert_eq!(
      gate.host.calls(),
      vec![
        HostCall::CloseNotification,
        HostCall::OpenWindow(url("./")),
        HostCall::CloseNotification,
        HostCall::OpenWindow(url("./")),
      ]
    );
  }

  #[tokio::test]
  async fn test_close_action_only_dismisses() {
    let gate = gate(&[], MockNetwork::new());

    gate.on_notification_click(Some("close")).await.unwrap();

    assert_eq!(gate.host.calls(), vec![HostCall::CloseNotification]);
  }
}
