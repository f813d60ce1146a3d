//! Line-delimited JSON host.
//!
//! Each stdin line is `{"id": .., "method": "..", "payload": ..}`. Responses
//! are written as `{"id": .., "result": ..}` or `{"id": .., "error": ".."}`,
//! interleaved with `{"event": .., "payload": ..}` lines.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config_paths::{batchname_config_dir, settings_path};
use crate::events::{ChannelSink, EventSink};
use crate::settings::AppSettings;
use crate::store::MemoryStore;
use crate::{rpc_request, AppState};

const DEFAULT_LOG_FILTER: &str = "batchname=info,batchname_lib=info";
const VERBOSE_LOG_FILTER: &str = "batchname=debug,batchname_lib=debug";

pub struct HostOptions {
    pub data_dir: Option<PathBuf>,
    pub demo: bool,
    pub verbose: bool,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    payload: Option<Value>,
}

/// Logs go to stderr; stdout carries the JSON channel.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

pub fn run(options: HostOptions) -> Result<()> {
    init_logging(options.verbose);

    let data_dir = match options.data_dir {
        Some(dir) => dir,
        None => batchname_config_dir().map_err(anyhow::Error::msg)?,
    };
    let settings = AppSettings::load(&settings_path(&data_dir));
    info!(data_dir = %data_dir.display(), ?settings, "starting host");

    // One thread: requests interleave only at await points.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    runtime.block_on(serve(settings, data_dir, options.demo))
}

async fn serve(settings: AppSettings, data_dir: PathBuf, demo: bool) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let events: Arc<dyn EventSink> = Arc::new(ChannelSink::new(tx.clone()));
    let app = Arc::new(AppState::new(settings, data_dir, events));

    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = rx.recv().await {
            let mut line = message.to_string();
            line.push('\n');
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    if demo {
        app.connect(Arc::new(MemoryStore::demo()))
            .map_err(anyhow::Error::msg)?;
        if let Err(err) = rpc_request(&app, "browser:open-path", Some(json!({ "path": "" }))).await {
            warn!("demo listing failed: {err}");
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let request: RpcEnvelope = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                let _ = tx.send(json!({ "id": Value::Null, "error": format!("Invalid request: {err}") }));
                continue;
            }
        };

        let app = Arc::clone(&app);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = match rpc_request(&app, &request.method, request.payload).await {
                Ok(result) => json!({ "id": request.id, "result": result }),
                Err(error) => json!({ "id": request.id, "error": error }),
            };
            let _ = tx.send(response);
        });
    }

    info!("stdin closed, shutting down");
    Ok(())
}
