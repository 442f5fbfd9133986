//! Push notification descriptors and click handling.

use chrono::Utc;
use serde::Serialize;

use crate::config::NotificationConfig;

/// Notification shown for a push message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  /// Milliseconds since the Unix epoch
  pub date_of_arrival: i64,
  pub primary_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

impl Notification {
  /// Build the notification for a push, using the payload text as body.
  pub fn for_push(config: &NotificationConfig, payload: Option<&str>) -> Self {
    let action = |action: &str, title: &str| NotificationAction {
      action: action.to_string(),
      title: title.to_string(),
      icon: config.icon.clone(),
    };

    Self {
      title: config.title.clone(),
      body: payload.unwrap_or(config.default_body.as_str()).to_string(),
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: config.vibrate.clone(),
      data: NotificationData {
        date_of_arrival: Utc::now().timestamp_millis(),
        primary_key: "1".to_string(),
      },
      actions: vec![
        action(ACTION_EXPLORE, "Open App"),
        action(ACTION_CLOSE, "Close"),
      ],
    }
  }
}

/// What a notification click does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
  /// Open the application root
  OpenApp,
  /// Only dismiss the notification
  Dismiss,
}

impl ClickAction {
  /// `close` dismisses; anything else, including a click on the body, opens the app
  pub fn from_action(action: Option<&str>) -> Self {
    match action {
      Some(ACTION_CLOSE) => Self::Dismiss,
      _ => Self::OpenApp,
    }
  }
}
