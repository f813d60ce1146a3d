use std::sync::Arc;

use batchname_lib::auth::authorize;
use batchname_lib::events::{NotifyLevel, RecordingSink, EVENT_AUTH_REQUIRED};
use batchname_lib::settings::AppSettings;
use batchname_lib::store::{MemoryStore, StoreCall};
use batchname_lib::{rpc_request, AppState};
use serde_json::json;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    app: Arc<AppState>,
    events: Arc<RecordingSink>,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(RecordingSink::new());
    let app = Arc::new(AppState::new(
        AppSettings::default(),
        dir.path().to_path_buf(),
        events.clone(),
    ));
    Harness {
        _dir: dir,
        app,
        events,
    }
}

fn connected(keys: &[&str]) -> (Harness, Arc<MemoryStore>) {
    let harness = harness();
    let store = Arc::new(MemoryStore::with_keys("bucket", keys.iter().copied()));
    harness.app.connect(store.clone()).unwrap();
    (harness, store)
}

#[tokio::test]
async fn browsing_requires_a_session() {
    let h = harness();
    let err = rpc_request(&h.app, "browser:refresh", None).await.unwrap_err();
    assert!(err.contains("Not connected"));
}

#[tokio::test]
async fn unknown_method_is_an_error() {
    let h = harness();
    let err = rpc_request(&h.app, "objects:list", None).await.unwrap_err();
    assert!(err.contains("objects:list"));
}

#[tokio::test]
async fn open_folder_and_select_through_rpc() {
    let (h, _store) = connected(&["photos/a.jpg", "photos/b.jpg", "photos/c.jpg", "top.txt"]);

    let root = rpc_request(&h.app, "browser:open-path", Some(json!({ "path": "/" })))
        .await
        .unwrap();
    assert_eq!(root["view"]["folders"][0]["id"], "photos/");

    let opened = rpc_request(
        &h.app,
        "browser:open-folder",
        Some(json!({ "folderId": "photos/" })),
    )
    .await
    .unwrap();
    assert_eq!(opened["view"]["files"].as_array().unwrap().len(), 3);
    assert_eq!(opened["view"]["canGoUp"], true);

    rpc_request(&h.app, "selection:click", Some(json!({ "index": 0 })))
        .await
        .unwrap();
    let view = rpc_request(
        &h.app,
        "selection:click",
        Some(json!({ "index": 2, "shift": true })),
    )
    .await
    .unwrap();
    assert_eq!(view["checkedCount"], 3);
    assert_eq!(view["hasSelection"], true);

    let cleared = rpc_request(&h.app, "selection:none", None).await.unwrap();
    assert_eq!(cleared["hasSelection"], false);
}

#[tokio::test]
async fn invalid_transform_is_rejected_before_any_call() {
    let (h, store) = connected(&["abcdef.txt"]);
    rpc_request(&h.app, "browser:open-path", Some(json!({ "path": "" })))
        .await
        .unwrap();
    rpc_request(&h.app, "selection:all", None).await.unwrap();
    store.clear_calls();

    let err = rpc_request(
        &h.app,
        "rename:apply",
        Some(json!({ "transform": { "kind": "slice-delete", "start": 4, "end": 2 } })),
    )
    .await
    .unwrap_err();
    assert!(err.starts_with("Invalid transform"));
    assert!(store.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slice_rename_through_rpc() {
    let (h, store) = connected(&["abcdef.txt"]);
    rpc_request(&h.app, "browser:open-path", Some(json!({ "path": "" })))
        .await
        .unwrap();
    rpc_request(&h.app, "selection:all", None).await.unwrap();

    let transform = json!({ "kind": "slice-delete", "start": 2, "end": 4 });
    let overlay = rpc_request(
        &h.app,
        "browser:slice-preview",
        Some(json!({ "transform": transform })),
    )
    .await
    .unwrap();
    assert_eq!(overlay["files"][0]["spans"][2]["removed"], true);
    assert_eq!(overlay["files"][0]["spans"][4]["removed"], false);

    let preview = rpc_request(&h.app, "rename:preview", Some(json!({ "transform": transform })))
        .await
        .unwrap();
    assert_eq!(preview[0]["newName"], "abef.txt");

    let applied = rpc_request(&h.app, "rename:apply", Some(json!({ "transform": transform })))
        .await
        .unwrap();
    assert_eq!(applied["status"], "completed");
    assert!(store.contains("abef.txt"));
    assert!(store
        .calls()
        .contains(&StoreCall::Rename {
            entry_id: "abcdef.txt".to_string(),
            new_name: "abef.txt".to_string(),
        }));
}

#[tokio::test]
async fn rename_with_nothing_selected_is_informational() {
    let (h, store) = connected(&["a.txt"]);
    rpc_request(&h.app, "browser:open-path", Some(json!({ "path": "" })))
        .await
        .unwrap();
    store.clear_calls();

    let result = rpc_request(
        &h.app,
        "rename:apply",
        Some(json!({ "transform": { "kind": "replace", "from": "a", "to": "b" } })),
    )
    .await
    .unwrap();
    assert_eq!(result["status"], "nothing-selected");
    assert!(store.calls().is_empty());
    assert!(h.events.notifications(NotifyLevel::Error).is_empty());
}

#[tokio::test]
async fn authorize_without_credentials_asks_the_shell_and_waits() {
    let h = harness();

    let result = rpc_request(&h.app, "auth:authorize", None).await.unwrap();
    assert_eq!(result["pending"], true);
    assert_eq!(h.events.named(EVENT_AUTH_REQUIRED).len(), 1);

    let status = rpc_request(&h.app, "auth:status", None).await.unwrap();
    assert_eq!(status["pending"], true);
    assert_eq!(status["connected"], false);

    let cancelled = rpc_request(&h.app, "auth:cancel", None).await.unwrap();
    assert_eq!(cancelled["cancelled"], true);
    let status = rpc_request(&h.app, "auth:status", None).await.unwrap();
    assert_eq!(status["pending"], false);
}

#[tokio::test]
async fn saved_credentials_are_found_by_authorize() {
    let h = harness();
    let saved = rpc_request(
        &h.app,
        "auth:save",
        Some(json!({
            "provider": "minio",
            "accessKeyId": "AKIA",
            "secretAccessKey": "secret",
            "endpoint": "http://localhost:9000",
            "bucket": "photos",
        })),
    )
    .await
    .unwrap();
    assert_eq!(saved["saved"], true);

    let found = authorize(&[h.app.token_path()]).unwrap().unwrap();
    assert_eq!(found.bucket, "photos");
    assert_eq!(found.region, None);

    let err = rpc_request(
        &h.app,
        "auth:save",
        Some(json!({ "accessKeyId": "", "secretAccessKey": "", "bucket": "x" })),
    )
    .await
    .unwrap_err();
    assert!(err.contains("required"));
}

#[tokio::test]
async fn oversized_pad_length_is_rejected() {
    let (h, store) = connected(&["img3.png"]);
    rpc_request(&h.app, "browser:open-path", Some(json!({ "path": "" })))
        .await
        .unwrap();
    rpc_request(&h.app, "selection:all", None).await.unwrap();
    store.clear_calls();

    let transform = json!({ "kind": "pad-number", "targetLength": i64::MAX });
    for method in ["rename:preview", "rename:apply", "browser:slice-preview"] {
        let err = rpc_request(&h.app, method, Some(json!({ "transform": transform })))
            .await
            .unwrap_err();
        assert!(err.starts_with("Invalid transform"), "{method}: {err}");
    }
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn state_and_list_accept_unslashed_folder_ids() {
    let (h, _store) = connected(&["photos/a.jpg", "photos/b.jpg", "photos/c.jpg"]);
    rpc_request(&h.app, "browser:open-path", Some(json!({ "path": "photos" })))
        .await
        .unwrap();

    let listed = rpc_request(&h.app, "browser:list", Some(json!({ "folderId": "photos" })))
        .await
        .unwrap();
    assert_eq!(listed["view"]["files"].as_array().unwrap().len(), 3);

    let state = rpc_request(&h.app, "browser:state", None).await.unwrap();
    assert_eq!(state["path"][1]["id"], "photos/");
    assert_eq!(state["canGoUp"], true);
}
