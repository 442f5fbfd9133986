//! Deferred delivery of quiz results queued while offline.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::{error, info, warn};
use url::Url;

use crate::cache::KeyValueStore;
use crate::net::{Network, Request};

/// Result of one flush attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  /// Nothing was queued
  Empty,
  /// The whole batch was accepted and the queue cleared
  Delivered(usize),
  /// Delivery failed; the queue is untouched
  Retained(String),
}

/// Read the queued records. A missing slot is an empty queue.
pub fn read_pending<K: KeyValueStore>(store: &K, key: &str) -> Result<Vec<Value>> {
  match store.get_item(key)? {
    Some(raw) => serde_json::from_str(&raw).map_err(|e| eyre!("Failed to parse {}: {}", key, e)),
    None => Ok(Vec::new()),
  }
}

/// Append a record to the queue, returning the new queue length.
pub fn enqueue<K: KeyValueStore>(store: &K, key: &str, record: Value) -> Result<usize> {
  let mut pending = read_pending(store, key)?;
  pending.push(record);

  let raw =
    serde_json::to_string(&pending).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
  store.set_item(key, &raw)?;

  Ok(pending.len())
}

/// POST every queued record as one JSON array; clear the queue only on a 2xx.
pub async fn flush_pending<K, N>(store: &K, network: &N, key: &str, endpoint: &Url) -> SyncOutcome
where
  K: KeyValueStore,
  N: Network,
{
  match try_flush(store, network, key, endpoint).await {
    Ok(outcome) => outcome,
    Err(e) => {
      error!(error = %e, "sync failed");
      SyncOutcome::Retained(e.to_string())
    }
  }
}

async fn try_flush<K, N>(store: &K, network: &N, key: &str, endpoint: &Url) -> Result<SyncOutcome>
where
  K: KeyValueStore,
  N: Network,
{
  let pending = read_pending(store, key)?;
  if pending.is_empty() {
    return Ok(SyncOutcome::Empty);
  }

  let body =
    serde_json::to_vec(&pending).map_err(|e| eyre!("Failed to serialize {}: {}", key, e))?;
  let request =
    Request::post(endpoint.clone(), body).with_header("Content-Type", "application/json");

  let response = network.fetch(&request).await?;
  if !response.is_ok() {
    warn!(status = response.status, "sync endpoint rejected pending results");
    return Ok(SyncOutcome::Retained(format!(
      "{} {}",
      response.status, response.status_text
    )));
  }

  store.remove_item(key)?;
  info!(count = pending.len(), "pending results synced");
  Ok(SyncOutcome::Delivered(pending.len()))
}
