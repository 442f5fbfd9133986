mod cache;
mod config;
mod db;
mod event;
mod gate;
mod host;
mod net;
mod notify;
mod sync;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cache::{CacheResult, CacheStorage, SqliteStorage};
use config::Config;
use db::Database;
use event::{EventHandler, EventOutcome, GateEvent};
use gate::{ResourceCacheGate, ServiceWorker};
use host::ConsoleHost;
use net::{HttpClient, Network, Request, Response};
use sync::SyncOutcome;

type Gate = ResourceCacheGate<SqliteStorage, HttpClient, ConsoleHost>;

#[derive(Parser, Debug)]
#[command(name = "quizgate")]
#[command(about = "Offline caching gate for the JAMB Mastermind quiz app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/quizgate/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Path to the cache database
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Store the static manifest in the current bucket
  Install,
  /// Delete every bucket but the current one
  Activate,
  /// Request a resource through the gate
  Fetch {
    /// Absolute URL, or a path relative to the scope
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request header, as "Name: value"
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
  },
  /// Fire a background sync
  Sync {
    #[arg(long, default_value = "sync-quiz-results")]
    tag: String,
  },
  /// Fire a periodic background sync
  PeriodicSync {
    #[arg(long, default_value = "update-questions")]
    tag: String,
  },
  /// Deliver a push message
  Push {
    payload: Option<String>,
  },
  /// Click a notification action
  Click {
    #[arg(long)]
    action: Option<String>,
  },
  /// Queue a quiz result (JSON) for the next sync
  Enqueue {
    record: String,
  },
  /// List cache buckets
  Buckets,
  /// Replay JSON-lines events from a file (or stdin)
  Run {
    #[arg(long)]
    file: Option<PathBuf>,
    /// Events handled at once
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
  },
}

/// Initialize tracing: stderr plus a daily log file in the data directory
fn init_tracing() -> Option<WorkerGuard> {
  // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quizgate=info"));

  let (appender, log_error) = match dirs::data_dir() {
    Some(dir) => match log_appender(&dir.join("quizgate").join("logs")) {
      Ok(appender) => (Some(appender), None),
      Err(e) => (None, Some(e)),
    },
    None => (None, None),
  };

  let (file_layer, guard) = match appender {
    Some(appender) => {
      let (writer, guard) = tracing_appender::non_blocking(appender);
      (
        Some(fmt::layer().with_ansi(false).with_writer(writer)),
        Some(guard),
      )
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(io::stderr))
    .with(file_layer)
    .with(filter)
    .init();

  if let Some(e) = log_error {
    warn!(error = %e, "file logging disabled");
  }

  guard
}

/// Daily rolling log file under `dir`
fn log_appender(dir: &Path) -> Result<RollingFileAppender> {
  RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix("quizgate.log")
    .build(dir)
    .map_err(|e| eyre!("Failed to open log directory {}: {}", dir.display(), e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  color_eyre::install()?;
  let _guard = init_tracing();

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let db_path = match args.db {
    Some(path) => path,
    None => config.database_path()?,
  };

  let storage = Arc::new(SqliteStorage::new(Arc::new(Database::open(&db_path)?)));
  let network = HttpClient::new()?;
  let gate = ResourceCacheGate::new(
    config.gate_config()?,
    Arc::clone(&storage),
    network.clone(),
    ConsoleHost,
  );
  info!(bucket = %gate.config().version, db = %db_path.display(), "quizgate ready");

  match args.command {
    Command::Install => gate.on_install().await?,
    Command::Activate => {
      for name in gate.on_activate().await? {
        println!("deleted {}", name);
      }
    }
    Command::Fetch {
      url,
      method,
      headers,
    } => {
      let mut request = Request::get(config.resolve(&url)?);
      request.method = method.to_ascii_uppercase();
      for header in &headers {
        let (name, value) = header
          .split_once(':')
          .ok_or_else(|| eyre!("Invalid header {:?}, expected \"Name: value\"", header))?;
        request.headers.append(name.trim(), value.trim());
      }
      fetch(&gate, &network, request).await?;
    }
    Command::Sync { tag } => match gate.on_sync(&tag).await {
      Some(outcome) => println!("{}", sync_json(&outcome)),
      None => println!("tag {} ignored", tag),
    },
    Command::PeriodicSync { tag } => gate.on_periodic_sync(&tag).await,
    Command::Push { payload } => gate.on_push(payload.as_deref()).await?,
    Command::Click { action } => gate.on_notification_click(action.as_deref()).await?,
    Command::Enqueue { record } => {
      let record: serde_json::Value =
        serde_json::from_str(&record).map_err(|e| eyre!("Invalid result JSON: {}", e))?;
      let count = sync::enqueue(storage.as_ref(), &gate.config().queue_key, record)?;
      println!("{} pending", count);
    }
    Command::Buckets => {
      for name in storage.bucket_names()? {
        let marker = if name == gate.config().version { "*" } else { " " };
        println!("{} {}", marker, name);
      }
    }
    Command::Run { file, concurrency } => match file {
      Some(path) => {
        let file = tokio::fs::File::open(&path)
          .await
          .map_err(|e| eyre!("Failed to open {}: {}", path.display(), e))?;
        replay(&gate, file, concurrency).await?
      }
      None => replay(&gate, tokio::io::stdin(), concurrency).await?,
    },
  }

  Ok(())
}

/// Send a request through the gate; bypassed requests go straight to the network.
async fn fetch(gate: &Gate, network: &HttpClient, request: Request) -> Result<()> {
  match gate.on_fetch(request.clone()).await {
    Some(result) => print_result(&result),
    None => {
      info!(url = %request.url, "not intercepted, passing through");
      let response = network.fetch(&request).await?;
      print_response("passthrough", &response);
    }
  }
  Ok(())
}

/// Feed JSON-lines events into the event handler while it runs.
async fn replay<R>(gate: &Gate, input: R, concurrency: usize) -> Result<()>
where
  R: AsyncRead + Unpin,
{
  let handler = EventHandler::new();
  let tx = handler.sender();

  let feed = async move {
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines
      .next_line()
      .await
      .map_err(|e| eyre!("Failed to read events: {}", e))?
    {
      if line.trim().is_empty() {
        continue;
      }
      match serde_json::from_str::<GateEvent>(&line) {
        Ok(event) => {
          if tx.send(event).is_err() {
            break;
          }
        }
        Err(e) => warn!(error = %e, line = %line, "skipping malformed event"),
      }
    }
    Ok::<_, color_eyre::Report>(())
  };

  let run = handler.run(gate, concurrency, |outcome| {
    println!("{}", outcome_json(&outcome));
  });

  let (fed, ()) = tokio::join!(feed, run);
  fed
}

fn print_result(result: &CacheResult<Response>) {
  println!("{}", result_json(result));
}

fn print_response(source: &str, response: &Response) {
  println!("{}", response_json(source, None, response));
}

fn result_json(result: &CacheResult<Response>) -> serde_json::Value {
  response_json(&result.source.to_string(), result.cached_at, &result.data)
}

fn response_json(
  source: &str,
  cached_at: Option<DateTime<Utc>>,
  response: &Response,
) -> serde_json::Value {
  serde_json::json!({
    "source": source,
    "cachedAt": cached_at.map(|t| t.to_rfc3339()),
    "status": response.status,
    "statusText": response.status_text,
    "headers": response.headers,
    "body": response.body_text(),
  })
}

fn sync_json(outcome: &SyncOutcome) -> serde_json::Value {
  match outcome {
    SyncOutcome::Empty => serde_json::json!({ "sync": "empty" }),
    SyncOutcome::Delivered(count) => serde_json::json!({ "sync": "delivered", "count": count }),
    SyncOutcome::Retained(error) => serde_json::json!({ "sync": "retained", "error": error }),
  }
}

/// One JSON line per handled event
fn outcome_json(outcome: &EventOutcome) -> serde_json::Value {
  match outcome {
    EventOutcome::Installed => serde_json::json!({ "event": "install" }),
    EventOutcome::Activated { deleted } => {
      serde_json::json!({ "event": "activate", "deleted": deleted })
    }
    EventOutcome::Fetched(Some(result)) => result_json(result),
    EventOutcome::Fetched(None) => serde_json::json!({ "intercepted": false }),
    EventOutcome::Synced(Some(outcome)) => sync_json(outcome),
    EventOutcome::Synced(None) => serde_json::json!({ "event": "sync", "ignored": true }),
    EventOutcome::PeriodicSynced => serde_json::json!({ "event": "periodic_sync" }),
    EventOutcome::Notified => serde_json::json!({ "event": "push" }),
    EventOutcome::Clicked => serde_json::json!({ "event": "notification_click" }),
    EventOutcome::Failed(error) => serde_json::json!({ "event": "failed", "error": error }),
  }
}
