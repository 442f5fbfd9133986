//! Side effects the gate asks of the runtime hosting it.

use color_eyre::{eyre::eyre, Result};
use tracing::info;
use url::Url;

use crate::notify::Notification;

/// Host runtime services
pub trait Host: Send + Sync {
  /// Activate the new version without waiting for old clients to go away
  fn skip_waiting(&self);

  /// Take control of every in-scope client immediately
  fn claim_clients(&self);

  fn show_notification(&self, notification: &Notification) -> Result<()>;

  fn close_notification(&self);

  /// Open (or focus) a client window at `url`
  fn open_window(&self, url: &Url) -> Result<()>;
}

/// Host for the command line: logs lifecycle signals and prints
/// notifications and window requests as JSON lines on stdout.
pub struct ConsoleHost;

impl Host for ConsoleHost {
  fn skip_waiting(&self) {
    info!("skip waiting requested");
  }

  fn claim_clients(&self) {
    info!("clients claimed");
  }

  fn show_notification(&self, notification: &Notification) -> Result<()> {
    let json = serde_json::to_string(notification)
      .map_err(|e| eyre!("Failed to serialize notification: {}", e))?;
    println!("{}", json);
    Ok(())
  }

  fn close_notification(&self) {
    info!("notification closed");
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    let json = serde_json::json!({ "openWindow": url.as_str() });
    println!("{}", json);
    Ok(())
  }
}
