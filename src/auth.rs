//! Credential discovery and the interactive sign-in wait.
//!
//! `authorize` only reads what is already on disk. When nothing is there the
//! host is asked to collect credentials (`InteractiveAuth::trigger`) and a
//! poller watches the token file until it appears, the wait is cancelled, or
//! the timeout elapses.

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;

use crate::config_paths::ensure_parent_dir;
use crate::events::{EventSink, EVENT_AUTH_REQUIRED};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Failed to read credentials from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid credentials in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("Failed to save credentials: {0}")]
    Write(String),
    #[error("Timed out after {0:?} waiting for sign-in")]
    TimedOut(Duration),
    #[error("Sign-in was cancelled")]
    Cancelled,
}

fn default_provider() -> String {
    "aws".to_string()
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    pub bucket: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl Credential {
    pub fn validate(&self) -> Result<(), String> {
        if self.access_key_id.trim().is_empty() || self.secret_access_key.trim().is_empty() {
            return Err("access key id and secret are required".to_string());
        }
        if self.bucket.trim().is_empty() {
            return Err("bucket is required".to_string());
        }
        if let Some(endpoint) = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            let url = Url::parse(endpoint).map_err(|err| format!("invalid endpoint: {err}"))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("unsupported endpoint scheme: {}", url.scheme()));
            }
        }
        Ok(())
    }
}

/// Returns the credential from the first token file that exists, or `None`
/// when there is none yet.
pub fn authorize(candidates: &[PathBuf]) -> Result<Option<Credential>, AuthError> {
    let Some(path) = candidates.iter().find(|path| path.is_file()) else {
        return Ok(None);
    };

    let raw = fs::read_to_string(path).map_err(|source| AuthError::Read {
        path: path.clone(),
        source,
    })?;
    let credential: Credential =
        serde_json::from_str(&raw).map_err(|err| AuthError::Invalid {
            path: path.clone(),
            reason: err.to_string(),
        })?;
    credential.validate().map_err(|reason| AuthError::Invalid {
        path: path.clone(),
        reason,
    })?;

    debug!(path = %path.display(), "loaded credentials");
    Ok(Some(credential))
}

pub fn save_credential(path: &Path, credential: &Credential) -> Result<(), AuthError> {
    credential.validate().map_err(AuthError::Write)?;
    ensure_parent_dir(path).map_err(AuthError::Write)?;
    let raw = serde_json::to_string_pretty(credential)
        .map_err(|err| AuthError::Write(err.to_string()))?;
    fs::write(path, raw)
        .map_err(|err| AuthError::Write(format!("{}: {err}", path.display())))?;
    info!(path = %path.display(), "saved credentials");
    Ok(())
}

/// Starts the out-of-band sign-in flow. Returns immediately.
pub trait InteractiveAuth: Send + Sync {
    fn trigger(&self);
}

/// Asks the shell to show its credential form; the form ends by calling
/// `auth:save`, which writes `token_path`.
pub struct EventAuthPrompt {
    events: Arc<dyn EventSink>,
    token_path: PathBuf,
}

impl EventAuthPrompt {
    pub fn new(events: Arc<dyn EventSink>, token_path: PathBuf) -> Self {
        Self { events, token_path }
    }
}

impl InteractiveAuth for EventAuthPrompt {
    fn trigger(&self) {
        self.events.emit(
            EVENT_AUTH_REQUIRED,
            json!({ "tokenPath": self.token_path.display().to_string() }),
        );
    }
}

/// Stops a running credential poller.
pub struct PollCancel(oneshot::Sender<()>);

impl PollCancel {
    pub fn cancel(self) {
        let _ = self.0.send(());
    }
}

/// Builds a poller that checks `candidates` every `every` until a credential
/// shows up. It resolves to `TimedOut` after `timeout` and to `Cancelled`
/// once the returned handle is used or dropped.
pub fn credential_poller(
    candidates: Vec<PathBuf>,
    every: Duration,
    timeout: Duration,
) -> (
    PollCancel,
    impl Future<Output = Result<Credential, AuthError>> + Send + 'static,
) {
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

    let task = async move {
        let deadline = sleep(timeout);
        tokio::pin!(deadline);
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(?timeout, "gave up waiting for credentials");
                    return Err(AuthError::TimedOut(timeout));
                }
                _ = &mut cancel_rx => return Err(AuthError::Cancelled),
                _ = ticker.tick() => match authorize(&candidates) {
                    Ok(Some(credential)) => return Ok(credential),
                    Ok(None) => {}
                    // The host may still be writing the file.
                    Err(err) => debug!("credential file not ready: {err}"),
                },
            }
        }
    };

    (PollCancel(cancel_tx), task)
}
