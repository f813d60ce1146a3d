use std::sync::Arc;
use std::time::Duration;

use batchname_lib::browser::{Browser, BrowserError, ListOutcome, PageMove};
use batchname_lib::events::{NotifyLevel, RecordingSink, EVENT_RENDER};
use batchname_lib::navigation::{NavigationState, PageCursors, StateHandle};
use batchname_lib::store::{MemoryStore, RemoteStore, StoreCall};

struct Fixture {
    store: Arc<MemoryStore>,
    events: Arc<RecordingSink>,
    browser: Browser,
    state: StateHandle,
}

fn fixture<I, S>(keys: I, page_size: u16) -> Fixture
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let store = Arc::new(MemoryStore::with_keys("bucket", keys));
    let events = Arc::new(RecordingSink::new());
    let state = StateHandle::new(NavigationState::new("bucket"));
    let browser = Browser::new(
        store.clone() as Arc<dyn RemoteStore>,
        state.clone(),
        events.clone(),
        page_size,
    );
    Fixture {
        store,
        events,
        browser,
        state,
    }
}

fn file_names(state: &StateHandle) -> Vec<String> {
    state.get().files.into_iter().map(|entry| entry.name).collect()
}

fn numbered_files(count: usize) -> Vec<String> {
    (0..count).map(|n| format!("f{n}.txt")).collect()
}

#[tokio::test]
async fn first_listing_separates_folders_from_files() {
    let fx = fixture(["b.txt", "a.txt", "photos/x.jpg", "docs/", "docs/y.pdf"], 100);

    let outcome = fx.browser.open_path("").await.unwrap();
    assert_eq!(outcome, ListOutcome::Applied);

    let state = fx.state.get();
    let folders: Vec<&str> = state.folders.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(folders, ["docs", "photos"]);
    assert_eq!(file_names(&fx.state), ["a.txt", "b.txt"]);
    assert!(state.files.iter().all(|entry| !entry.checked));
    assert_eq!(state.cursors, PageCursors::default());
    assert!(!state.loading);
}

#[tokio::test]
async fn next_then_prev_returns_to_first_page() {
    let fx = fixture(numbered_files(5), 2);
    fx.browser.open_path("").await.unwrap();
    let first_page = file_names(&fx.state);
    assert_eq!(fx.state.get().cursors.next.as_deref(), Some("offset:2"));

    let moved = fx.browser.next_page().await.unwrap();
    assert_eq!(moved, PageMove::Moved(ListOutcome::Applied));
    let cursors = fx.state.get().cursors;
    assert_eq!(cursors.current.as_deref(), Some("offset:2"));
    assert_eq!(cursors.back_stack, [None]);
    assert_eq!(file_names(&fx.state), ["f2.txt", "f3.txt"]);

    fx.browser.prev_page().await.unwrap();
    let state = fx.state.get();
    assert_eq!(state.cursors.current, None);
    assert!(state.cursors.back_stack.is_empty());
    assert_eq!(file_names(&fx.state), first_page);
}

#[tokio::test]
async fn back_stack_tracks_every_visited_page() {
    let fx = fixture(numbered_files(7), 2);
    fx.browser.open_path("").await.unwrap();
    fx.browser.next_page().await.unwrap();
    fx.browser.next_page().await.unwrap();

    let cursors = fx.state.get().cursors;
    assert_eq!(cursors.current.as_deref(), Some("offset:4"));
    assert_eq!(cursors.back_stack, [None, Some("offset:2".to_string())]);

    fx.browser.prev_page().await.unwrap();
    assert_eq!(file_names(&fx.state), ["f2.txt", "f3.txt"]);
    assert!(fx.state.get().cursors.can_go_prev());
    assert!(fx.state.get().cursors.can_go_next());
}

#[tokio::test]
async fn folder_navigation_always_resets_cursors() {
    let mut keys = numbered_files(6);
    keys.extend(["sub/one.txt".to_string(), "sub/two.txt".to_string()]);
    let fx = fixture(keys, 2);

    fx.browser.open_path("").await.unwrap();
    fx.browser.next_page().await.unwrap();
    fx.browser.next_page().await.unwrap();
    assert!(!fx.state.get().cursors.back_stack.is_empty());

    fx.browser.open_folder("sub/").await.unwrap();
    let state = fx.state.get();
    // Both files of "sub/" fit on one page.
    assert_eq!(state.cursors, PageCursors::default());
    assert_eq!(state.current_folder().id, "sub/");
    assert_eq!(state.path.depth(), 2);

    fx.browser.go_up().await.unwrap();
    fx.browser.next_page().await.unwrap();
    fx.browser.go_up().await.unwrap();
    let state = fx.state.get();
    assert_eq!(state.cursors.current, None);
    assert!(state.cursors.back_stack.is_empty());
    assert_eq!(state.cursors.next.as_deref(), Some("offset:2"));
    assert!(state.path.is_root());
}

#[tokio::test]
async fn next_without_more_pages_only_informs() {
    let fx = fixture(numbered_files(2), 10);
    fx.browser.open_path("").await.unwrap();
    fx.store.clear_calls();

    assert_eq!(fx.browser.next_page().await.unwrap(), PageMove::Unavailable);
    assert_eq!(fx.browser.prev_page().await.unwrap(), PageMove::Unavailable);
    assert!(fx.store.calls().is_empty());
    assert_eq!(
        fx.events.notifications(NotifyLevel::Info),
        ["No more pages", "Already on the first page"]
    );
}

#[tokio::test]
async fn unknown_folder_is_rejected_without_fetching() {
    let fx = fixture(["a.txt"], 10);
    fx.browser.open_path("").await.unwrap();
    fx.store.clear_calls();

    let err = fx.browser.open_folder("missing/").await.unwrap_err();
    assert!(matches!(err, BrowserError::UnknownFolder(_)));
    assert!(fx.store.calls().is_empty());
}

#[tokio::test]
async fn failed_fetch_keeps_previous_page() {
    let fx = fixture(["a.txt", "broken/b.txt"], 10);
    fx.browser.open_path("").await.unwrap();
    fx.store.fail_listing_of("broken/");

    let err = fx.browser.open_folder("broken/").await.unwrap_err();
    assert!(matches!(err, BrowserError::Fetch { .. }));

    let state = fx.state.get();
    assert!(state.path.is_root());
    assert!(!state.loading);
    assert_eq!(file_names(&fx.state), ["a.txt"]);

    fx.store.heal_listing_of("broken/");
    fx.browser.open_folder("broken/").await.unwrap();
    assert_eq!(file_names(&fx.state), ["b.txt"]);
}

#[tokio::test(start_paused = true)]
async fn late_response_does_not_overwrite_newer_navigation() {
    let fx = fixture(["slow/s.txt", "fast/f.txt"], 10);
    fx.browser.open_path("").await.unwrap();
    fx.store.set_list_latency("slow/", Duration::from_millis(500));

    let (slow, fast) = tokio::join!(fx.browser.open_folder("slow/"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.browser.open_folder("fast/").await
    });

    assert_eq!(slow.unwrap(), ListOutcome::Superseded);
    assert_eq!(fast.unwrap(), ListOutcome::Applied);
    let state = fx.state.get();
    assert_eq!(state.current_folder().id, "fast/");
    assert_eq!(file_names(&fx.state), ["f.txt"]);
    assert!(!state.loading);
}

#[tokio::test]
async fn subfolders_are_listed_across_every_page() {
    let keys: Vec<String> = (0..1200).map(|n| format!("dir{n:04}/")).collect();
    let fx = fixture(keys, 50);
    fx.browser.open_path("").await.unwrap();

    assert_eq!(fx.state.get().folders.len(), 1200);
    let folder_lists = fx
        .store
        .calls()
        .into_iter()
        .filter(|call| matches!(call, StoreCall::List { page_token: Some(_), .. }))
        .count();
    assert_eq!(folder_lists, 1);
}

#[tokio::test]
async fn render_shows_loading_then_result() {
    let fx = fixture(Vec::<String>::new(), 10);
    fx.browser.open_path("").await.unwrap();

    let renders = fx.events.named(EVENT_RENDER);
    assert_eq!(renders.len(), 2);
    assert_eq!(renders[0]["loading"], true);
    assert_eq!(renders[1]["loading"], false);
    assert_eq!(renders[1]["empty"], true);
    assert_eq!(renders[1]["canGoPrev"], false);
    assert_eq!(renders[1]["canGoNext"], false);
}

#[tokio::test]
async fn list_files_in_current_folder_keeps_back_stack() {
    let fx = fixture(numbered_files(6), 2);
    fx.browser.open_path("").await.unwrap();
    fx.browser.next_page().await.unwrap();

    fx.browser
        .list_files("", Some("offset:2".to_string()))
        .await
        .unwrap();
    assert_eq!(fx.state.get().cursors.back_stack, [None]);

    fx.browser.list_files("other/", None).await.unwrap();
    let state = fx.state.get();
    assert!(state.cursors.back_stack.is_empty());
    assert_eq!(state.current_folder().id, "other/");
}

#[tokio::test]
async fn folder_ids_without_trailing_slash_name_the_same_folder() {
    let keys: Vec<String> = (0..6).map(|n| format!("photos/p{n}.jpg")).collect();
    let fx = fixture(keys, 2);
    fx.browser.open_path("photos").await.unwrap();
    fx.browser.next_page().await.unwrap();

    fx.browser
        .list_files("photos", Some("offset:4".to_string()))
        .await
        .unwrap();
    let state = fx.state.get();
    assert_eq!(state.current_folder().id, "photos/");
    assert_eq!(state.cursors.back_stack, [None]);
    assert_eq!(file_names(&fx.state), ["p4.jpg", "p5.jpg"]);
}
