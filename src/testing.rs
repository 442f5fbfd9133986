//! Scripted network and recording host for tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::host::Host;
use crate::net::{Network, Request, Response};
use crate::notify::Notification;

/// Network that answers from a fixed table; unknown URLs fail like a dropped connection.
#[derive(Default)]
pub struct MockNetwork {
  routes: HashMap<String, Response>,
  offline: AtomicBool,
  requests: Mutex<Vec<Request>>,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(mut self, url: &str, response: Response) -> Self {
    self.routes.insert(url.to_string(), response);
    self
  }

  /// Fail every fetch from now on
  pub fn go_offline(&self) {
    self.offline.store(true, Ordering::SeqCst);
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }

  pub fn fetch_count(&self, url: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .count()
  }
}

impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.requests.lock().unwrap().push(request.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network is offline"));
    }
    self
      .routes
      .get(request.url.as_str())
      .cloned()
      .ok_or_else(|| eyre!("connection refused: {}", request.url))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
  SkipWaiting,
  ClaimClients,
  ShowNotification(Notification),
  CloseNotification,
  OpenWindow(Url),
}

#[derive(Default)]
pub struct RecordingHost {
  calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
  pub fn calls(&self) -> Vec<HostCall> {
    self.calls.lock().unwrap().clone()
  }

  fn record(&self, call: HostCall) {
    self.calls.lock().unwrap().push(call);
  }
}

impl Host for RecordingHost {
  fn skip_waiting(&self) {
    self.record(HostCall::SkipWaiting);
  }

  fn claim_clients(&self) {
    self.record(HostCall::ClaimClients);
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    self.record(HostCall::ShowNotification(notification.clone()));
    Ok(())
  }

  fn close_notification(&self) {
    self.record(HostCall::CloseNotification);
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    self.record(HostCall::OpenWindow(url.clone()));
    Ok(())
  }
}
