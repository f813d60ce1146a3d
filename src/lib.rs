pub mod auth;
pub mod batch;
pub mod browser;
pub mod config_paths;
pub mod events;
pub mod host;
pub mod navigation;
pub mod rate_limit;
pub mod selection;
pub mod settings;
pub mod store;
pub mod transform;
pub mod view;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use auth::{
    authorize, credential_poller, save_credential, AuthError, Credential, EventAuthPrompt,
    InteractiveAuth, PollCancel,
};
use batch::{BatchOutcome, BatchRenameEngine};
use browser::{Browser, BrowserError, ListOutcome, PageMove};
use config_paths::{credential_candidates, CREDENTIALS_FILE};
use events::{notify, EventSink, NotifyLevel, EVENT_AUTH_STATUS};
use navigation::{NavigationState, StateHandle};
use rate_limit::RateLimiter;
use selection::SelectionController;
use settings::AppSettings;
use store::{RemoteStore, S3Store};
use transform::{RenameTransform, TransformInput};
use view::BrowserView;

/// Components wired to one connected store. Replaced wholesale on reconnect.
pub struct Session {
    label: String,
    state: StateHandle,
    browser: Arc<Browser>,
    selection: SelectionController,
    renamer: BatchRenameEngine,
}

impl Session {
    pub fn new(store: Arc<dyn RemoteStore>, settings: &AppSettings, events: Arc<dyn EventSink>) -> Self {
        let label = store.label();
        let state = StateHandle::new(NavigationState::new(label.clone()));
        let browser = Arc::new(Browser::new(
            Arc::clone(&store),
            state.clone(),
            Arc::clone(&events),
            settings.page_size,
        ));
        let selection = SelectionController::new(state.clone(), Arc::clone(&events));
        let renamer = BatchRenameEngine::new(
            store,
            Arc::new(RateLimiter::new(settings.rename_spacing())),
            Arc::clone(&browser),
            state.clone(),
            events,
        );
        Self {
            label,
            state,
            browser,
            selection,
            renamer,
        }
    }
}

struct AuthWait {
    id: String,
    cancel: PollCancel,
}

pub struct AppState {
    settings: AppSettings,
    data_dir: PathBuf,
    events: Arc<dyn EventSink>,
    session: Mutex<Option<Arc<Session>>>,
    auth_wait: Mutex<Option<AuthWait>>,
}

impl AppState {
    pub fn new(settings: AppSettings, data_dir: PathBuf, events: Arc<dyn EventSink>) -> Self {
        Self {
            settings,
            data_dir,
            events,
            session: Mutex::new(None),
            auth_wait: Mutex::new(None),
        }
    }

    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE)
    }

    /// Wires a fresh session around `store`, dropping any previous one.
    pub fn connect(&self, store: Arc<dyn RemoteStore>) -> Result<Arc<Session>, String> {
        let session = Arc::new(Session::new(store, &self.settings, Arc::clone(&self.events)));
        *lock(&self.session)? = Some(Arc::clone(&session));
        info!(store = %session.label, "connected");
        Ok(session)
    }

    pub fn session(&self) -> Result<Arc<Session>, String> {
        lock(&self.session)?
            .clone()
            .ok_or_else(|| "Not connected. Authorize first.".to_string())
    }

    fn is_connected(&self) -> bool {
        lock(&self.session).map(|s| s.is_some()).unwrap_or(false)
    }

    fn is_waiting_for_auth(&self) -> bool {
        lock(&self.auth_wait).map(|w| w.is_some()).unwrap_or(false)
    }

    fn emit_auth_status(&self, error: Option<&str>) {
        self.events.emit(
            EVENT_AUTH_STATUS,
            json!({
                "connected": self.is_connected(),
                "pending": self.is_waiting_for_auth(),
                "error": error,
            }),
        );
    }

    fn auth_failed(&self, message: &str) {
        warn!("authorization failed: {message}");
        notify(self.events.as_ref(), NotifyLevel::Error, message);
        self.emit_auth_status(Some(message));
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>) -> Result<std::sync::MutexGuard<'a, T>, String> {
    mutex.lock().map_err(|_| "State lock poisoned".to_string())
}

fn payload_or_null(payload: Option<Value>) -> Value {
    payload.unwrap_or(Value::Null)
}

fn parse_payload<T>(payload: Value) -> Result<T, String>
where
    T: for<'de> Deserialize<'de>,
{
    serde_json::from_value(payload).map_err(|err| format!("Invalid payload: {err}"))
}

fn parse_transform(input: TransformInput) -> Result<RenameTransform, String> {
    RenameTransform::try_from(input).map_err(|err| format!("Invalid transform: {err}"))
}

fn view_json(session: &Session) -> Value {
    json!(BrowserView::from_state(&session.state.get()))
}

fn list_response(session: &Session, outcome: Result<ListOutcome, BrowserError>) -> Result<Value, String> {
    let outcome = outcome.map_err(|err| {
        warn!("{err}");
        err.to_string()
    })?;
    Ok(json!({
        "superseded": outcome == ListOutcome::Superseded,
        "view": view_json(session),
    }))
}

fn page_response(session: &Session, moved: Result<PageMove, BrowserError>) -> Result<Value, String> {
    match moved.map_err(|err| {
        warn!("{err}");
        err.to_string()
    })? {
        PageMove::Moved(outcome) => list_response(session, Ok(outcome)),
        PageMove::Unavailable => Ok(json!({ "superseded": false, "view": view_json(session) })),
    }
}

fn connect_with_credential(app: &AppState, credential: &Credential) -> Result<Arc<Session>, String> {
    let store = S3Store::from_credential(credential).map_err(|err| err.to_string())?;
    app.connect(Arc::new(store))
}

/// Asks the shell for credentials and waits for the token file in the
/// background. A newer wait cancels an older one.
fn begin_auth_wait(app: &Arc<AppState>) -> Result<(), String> {
    let (cancel, task) = credential_poller(
        credential_candidates(&app.data_dir),
        app.settings.auth_poll_interval(),
        app.settings.auth_timeout(),
    );
    let wait_id = Uuid::new_v4().to_string();
    if let Some(previous) = lock(&app.auth_wait)?.replace(AuthWait {
        id: wait_id.clone(),
        cancel,
    }) {
        previous.cancel.cancel();
    }

    EventAuthPrompt::new(Arc::clone(&app.events), app.token_path()).trigger();

    let app = Arc::clone(app);
    tokio::spawn(async move {
        let result = task.await;
        if let Ok(mut wait) = lock(&app.auth_wait) {
            if wait.as_ref().is_some_and(|current| current.id == wait_id) {
                *wait = None;
            }
        }

        match result {
            Ok(credential) => match connect_with_credential(&app, &credential) {
                Ok(session) => {
                    app.emit_auth_status(None);
                    if let Err(err) = session.browser.open_path("").await {
                        warn!("initial listing failed: {err}");
                        notify(app.events.as_ref(), NotifyLevel::Error, err.to_string());
                    }
                }
                Err(err) => app.auth_failed(&err),
            },
            Err(AuthError::Cancelled) => {}
            Err(err) => app.auth_failed(&err.to_string()),
        }
    });
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInput {
    folder_id: Option<String>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenFolderInput {
    folder_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenPathInput {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClickInput {
    index: usize,
    shift: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformPayload {
    transform: TransformInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlicePreviewInput {
    transform: Option<TransformInput>,
}

pub async fn rpc_request(
    app: &Arc<AppState>,
    method: &str,
    payload: Option<Value>,
) -> Result<Value, String> {
    let payload = payload_or_null(payload);

    match method {
        "auth:status" => Ok(json!({
            "connected": app.is_connected(),
            "pending": app.is_waiting_for_auth(),
            "tokenPaths": credential_candidates(&app.data_dir)
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>(),
        })),
        "auth:authorize" => {
            let candidates = credential_candidates(&app.data_dir);
            let credential = match authorize(&candidates) {
                Ok(credential) => credential,
                Err(err) => {
                    let message = err.to_string();
                    app.auth_failed(&message);
                    return Err(message);
                }
            };

            match credential {
                Some(credential) => {
                    let session = connect_with_credential(app, &credential).map_err(|err| {
                        app.auth_failed(&err);
                        err
                    })?;
                    app.emit_auth_status(None);
                    let listed = session.browser.open_path("").await;
                    let mut response = list_response(&session, listed)?;
                    response["connected"] = json!(true);
                    Ok(response)
                }
                None => {
                    begin_auth_wait(app)?;
                    Ok(json!({ "connected": false, "pending": true }))
                }
            }
        }
        "auth:save" => {
            let credential: Credential = parse_payload(payload)?;
            let path = app.token_path();
            save_credential(&path, &credential).map_err(|err| err.to_string())?;
            Ok(json!({ "saved": true, "path": path.display().to_string() }))
        }
        "auth:cancel" => {
            let wait = lock(&app.auth_wait)?.take();
            let cancelled = wait.is_some();
            if let Some(wait) = wait {
                wait.cancel.cancel();
            }
            app.emit_auth_status(None);
            Ok(json!({ "cancelled": cancelled }))
        }

        "browser:state" => {
            let session = app.session()?;
            Ok(view_json(&session))
        }
        "browser:list" => {
            let input: ListInput = parse_payload(payload)?;
            let session = app.session()?;
            let folder_id = input
                .folder_id
                .unwrap_or_else(|| session.state.get().current_folder().id.clone());
            let listed = session.browser.list_files(&folder_id, input.page_token).await;
            list_response(&session, listed)
        }
        "browser:open-folder" => {
            let input: OpenFolderInput = parse_payload(payload)?;
            let session = app.session()?;
            let listed = session.browser.open_folder(&input.folder_id).await;
            list_response(&session, listed)
        }
        "browser:open-path" => {
            let input: OpenPathInput = parse_payload(payload)?;
            let session = app.session()?;
            let listed = session.browser.open_path(&input.path).await;
            list_response(&session, listed)
        }
        "browser:up" => {
            let session = app.session()?;
            let listed = session.browser.go_up().await;
            list_response(&session, listed)
        }
        "browser:next" => {
            let session = app.session()?;
            let moved = session.browser.next_page().await;
            page_response(&session, moved)
        }
        "browser:prev" => {
            let session = app.session()?;
            let moved = session.browser.prev_page().await;
            page_response(&session, moved)
        }
        "browser:refresh" => {
            let session = app.session()?;
            let listed = session.browser.refresh().await;
            list_response(&session, listed)
        }
        "browser:slice-preview" => {
            let input: SlicePreviewInput = parse_payload(payload)?;
            let session = app.session()?;
            let transform = input.transform.map(parse_transform).transpose()?;
            Ok(json!(session.selection.set_preview(transform.as_ref())))
        }

        "selection:click" => {
            let input: ClickInput = parse_payload(payload)?;
            let session = app.session()?;
            let view = session
                .selection
                .click(input.index, input.shift.unwrap_or(false))
                .map_err(|err| err.to_string())?;
            Ok(json!(view))
        }
        "selection:all" => Ok(json!(app.session()?.selection.select_all())),
        "selection:none" => Ok(json!(app.session()?.selection.select_none())),

        "rename:preview" => {
            let input: TransformPayload = parse_payload(payload)?;
            let transform = parse_transform(input.transform)?;
            let session = app.session()?;
            Ok(json!(session.renamer.preview(&transform)))
        }
        "rename:apply" => {
            let input: TransformPayload = parse_payload(payload)?;
            let transform = parse_transform(input.transform)?;
            let session = app.session()?;
            match session.renamer.apply(&transform).await {
                BatchOutcome::NothingSelected => Ok(json!({ "status": "nothing-selected" })),
                BatchOutcome::Completed(report) => {
                    let status = if report.succeeded() { "completed" } else { "partial-failure" };
                    Ok(json!({ "status": status, "report": report }))
                }
            }
        }

        "settings:get" => {
            let mut value = json!(app.settings);
            value["dataDir"] = json!(app.data_dir.display().to_string());
            Ok(value)
        }

        _ => Err(format!("RPC method not implemented yet: {method}")),
    }
}
