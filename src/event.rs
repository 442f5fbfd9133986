use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::error;

use crate::cache::CacheResult;
use crate::gate::ServiceWorker;
use crate::net::{Request, Response};
use crate::sync::SyncOutcome;

/// Triggers delivered by the host runtime
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateEvent {
  Install,
  Activate,
  Fetch {
    request: Request,
  },
  Sync {
    tag: String,
  },
  PeriodicSync {
    tag: String,
  },
  Push {
    #[serde(default)]
    payload: Option<String>,
  },
  NotificationClick {
    #[serde(default)]
    action: Option<String>,
  },
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
  Installed,
  Activated { deleted: Vec<String> },
  /// `None` when the request was passed through untouched
  Fetched(Option<CacheResult<Response>>),
  Synced(Option<SyncOutcome>),
  PeriodicSynced,
  Notified,
  Clicked,
  /// The handler reported an error; it has already been logged
  Failed(String),
}

/// Route one event to its handler.
pub async fn dispatch<W: ServiceWorker>(worker: &W, event: GateEvent) -> EventOutcome {
  let result = match event {
    GateEvent::Install => worker.on_install().await.map(|_| EventOutcome::Installed),
    GateEvent::Activate => worker
      .on_activate()
      .await
      .map(|deleted| EventOutcome::Activated { deleted }),
    GateEvent::Fetch { request } => Ok(EventOutcome::Fetched(worker.on_fetch(request).await)),
    GateEvent::Sync { tag } => Ok(EventOutcome::Synced(worker.on_sync(&tag).await)),
    GateEvent::PeriodicSync { tag } => {
      worker.on_periodic_sync(&tag).await;
      Ok(EventOutcome::PeriodicSynced)
    }
    GateEvent::Push { payload } => worker
      .on_push(payload.as_deref())
      .await
      .map(|_| EventOutcome::Notified),
    GateEvent::NotificationClick { action } => worker
      .on_notification_click(action.as_deref())
      .await
      .map(|_| EventOutcome::Clicked),
  };

  result.unwrap_or_else(|e| {
    error!(error = %e, "event handler failed");
    EventOutcome::Failed(e.to_string())
  })
}

/// Event handler that queues host events and drives them through a worker.
///
/// Handlers run cooperatively on the calling task: up to `concurrency`
/// events are in flight at once, each suspending at network or storage
/// operations.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<GateEvent>,
  rx: mpsc::UnboundedReceiver<GateEvent>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Sender for feeding events in
  pub fn sender(&self) -> mpsc::UnboundedSender<GateEvent> {
    self.tx.clone()
  }

  /// Handle events until every sender is dropped.
  pub async fn run<W, F>(self, worker: &W, concurrency: usize, mut on_outcome: F)
  where
    W: ServiceWorker,
    F: FnMut(EventOutcome),
  {
    let Self { tx, rx } = self;
    // Only external senders keep the loop alive
    drop(tx);

    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let events = futures::stream::unfold(rx, |mut rx| async move {
      rx.recv().await.map(|event| (event, rx))
    });

    // The closure owns the last outcome sender, so `report` ends once every event is handled
    let handle = events.for_each_concurrent(concurrency.max(1), move |event| {
      let out_tx = out_tx.clone();
      async move {
        let outcome = dispatch(worker, event).await;
        let _ = out_tx.send(outcome);
      }
    });

    let report = async {
      while let Some(outcome) = out_rx.recv().await {
        on_outcome(outcome);
      }
    };

    tokio::join!(handle, report);
  }
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}
