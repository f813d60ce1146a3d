use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::events::{notify, EventSink, NotifyLevel};
use crate::navigation::{Entry, FolderPath, FolderRef, PageCursors, StateHandle};
use crate::store::{EntryKind, OrderKey, RemoteStore, StoreError, Token};
use crate::view;

/// Page size used when walking every page of a folder listing.
const FOLDER_LIST_PAGE_SIZE: u16 = 1000;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to list {folder:?}: {source}")]
    Fetch {
        folder: String,
        #[source]
        source: StoreError,
    },
    #[error("Folder is not in the current listing: {0}")]
    UnknownFolder(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListOutcome {
    Applied,
    /// A newer navigation was dispatched while this fetch was in flight.
    Superseded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageMove {
    Moved(ListOutcome),
    Unavailable,
}

/// Target of a listing. Path and cursors are committed together with the
/// fetched entries, so a failed fetch leaves the previous page in place.
struct ListPlan {
    path: FolderPath,
    page_token: Option<Token>,
    back_stack: Vec<Option<Token>>,
}

struct Fetched {
    folders: Vec<Entry>,
    files: Vec<Entry>,
    next_page_token: Option<Token>,
}

/// Canonical folder id for user input: `"/photos/2024"` -> `"photos/2024/"`.
fn folder_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

pub struct Browser {
    store: Arc<dyn RemoteStore>,
    state: StateHandle,
    events: Arc<dyn EventSink>,
    page_size: u16,
}

impl Browser {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        state: StateHandle,
        events: Arc<dyn EventSink>,
        page_size: u16,
    ) -> Self {
        Self {
            store,
            state,
            events,
            page_size: page_size.max(1),
        }
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Lists `folder_id` at `page_token`. Staying in the current folder keeps
    /// the back-stack; any other folder starts a fresh one.
    pub async fn list_files(
        &self,
        folder_id: &str,
        page_token: Option<Token>,
    ) -> Result<ListOutcome, BrowserError> {
        let folder_id = folder_prefix(folder_id);
        let snapshot = self.state.get();
        let plan = if snapshot.current_folder().id == folder_id {
            ListPlan {
                path: snapshot.path.clone(),
                page_token,
                back_stack: snapshot.cursors.back_stack.clone(),
            }
        } else {
            ListPlan {
                path: FolderPath::from_prefix(snapshot.path.root().clone(), &folder_id),
                page_token,
                back_stack: Vec::new(),
            }
        };
        self.run(plan).await
    }

    pub async fn open_folder(&self, folder_id: &str) -> Result<ListOutcome, BrowserError> {
        let snapshot = self.state.get();
        let folder = snapshot
            .folder_by_id(folder_id)
            .ok_or_else(|| BrowserError::UnknownFolder(folder_id.to_string()))?;

        let mut path = snapshot.path.clone();
        path.push(FolderRef::new(folder.id.clone(), folder.name.clone()));
        self.run(ListPlan {
            path,
            page_token: None,
            back_stack: Vec::new(),
        })
        .await
    }

    /// Jumps straight to a prefix such as `"photos/2024"`.
    pub async fn open_path(&self, prefix: &str) -> Result<ListOutcome, BrowserError> {
        let prefix = folder_prefix(prefix);
        let root = self.state.get().path.root().clone();
        self.run(ListPlan {
            path: FolderPath::from_prefix(root, &prefix),
            page_token: None,
            back_stack: Vec::new(),
        })
        .await
    }

    /// Pops one level (staying at the root) and lists the first page.
    pub async fn go_up(&self) -> Result<ListOutcome, BrowserError> {
        let mut path = self.state.get().path;
        path.pop();
        self.run(ListPlan {
            path,
            page_token: None,
            back_stack: Vec::new(),
        })
        .await
    }

    pub async fn next_page(&self) -> Result<PageMove, BrowserError> {
        let snapshot = self.state.get();
        let cursors = snapshot.cursors;
        let Some(next) = cursors.next.clone() else {
            notify(self.events.as_ref(), NotifyLevel::Info, "No more pages");
            return Ok(PageMove::Unavailable);
        };

        let mut back_stack = cursors.back_stack;
        // A `None` placeholder marks page one; push it only when leaving page one.
        if cursors.current.is_some() || back_stack.is_empty() {
            back_stack.push(cursors.current);
        }

        let outcome = self
            .run(ListPlan {
                path: snapshot.path,
                page_token: Some(next),
                back_stack,
            })
            .await?;
        Ok(PageMove::Moved(outcome))
    }

    pub async fn prev_page(&self) -> Result<PageMove, BrowserError> {
        let snapshot = self.state.get();
        let mut back_stack = snapshot.cursors.back_stack;
        let page_token = match back_stack.pop() {
            Some(token) => token,
            None if snapshot.cursors.current.is_some() => None,
            None => {
                notify(
                    self.events.as_ref(),
                    NotifyLevel::Info,
                    "Already on the first page",
                );
                return Ok(PageMove::Unavailable);
            }
        };

        let outcome = self
            .run(ListPlan {
                path: snapshot.path,
                page_token,
                back_stack,
            })
            .await?;
        Ok(PageMove::Moved(outcome))
    }

    /// Re-lists the current folder and page, keeping the back-stack.
    pub async fn refresh(&self) -> Result<ListOutcome, BrowserError> {
        let snapshot = self.state.get();
        self.run(ListPlan {
            path: snapshot.path,
            page_token: snapshot.cursors.current,
            back_stack: snapshot.cursors.back_stack,
        })
        .await
    }

    async fn run(&self, plan: ListPlan) -> Result<ListOutcome, BrowserError> {
        let generation = self.state.update_with(|state| {
            state.generation += 1;
            state.loading = true;
            state.generation
        });
        view::render(&self.state, self.events.as_ref());

        let folder_id = plan.path.current().id.clone();
        info!(
            folder = %folder_id,
            page = ?plan.page_token,
            generation,
            "listing folder"
        );

        let fetched = match self.fetch(&folder_id, plan.page_token.as_deref()).await {
            Ok(fetched) => fetched,
            Err(source) => {
                let still_current = self.state.update_with(|state| {
                    let current = state.generation == generation;
                    if current {
                        state.loading = false;
                    }
                    current
                });
                if still_current {
                    view::render(&self.state, self.events.as_ref());
                }
                return Err(BrowserError::Fetch {
                    folder: folder_id,
                    source,
                });
            }
        };

        let file_count = fetched.files.len();
        let applied = self.state.update_with(move |state| {
            if state.generation != generation {
                return false;
            }
            state.path = plan.path;
            state.cursors = PageCursors {
                current: plan.page_token,
                next: fetched.next_page_token,
                back_stack: plan.back_stack,
            };
            state.folders = fetched.folders;
            state.files = fetched.files;
            state.from_index = None;
            state.loading = false;
            true
        });

        if !applied {
            debug!(folder = %folder_id, generation, "discarding superseded listing");
            return Ok(ListOutcome::Superseded);
        }

        debug!(folder = %folder_id, files = file_count, "listing applied");
        view::render(&self.state, self.events.as_ref());
        Ok(ListOutcome::Applied)
    }

    async fn fetch(&self, folder_id: &str, page_token: Option<&str>) -> Result<Fetched, StoreError> {
        let folders = self.fetch_all_folders(folder_id).await?;

        let page = self
            .store
            .list_children(
                folder_id,
                OrderKey::FoldersFirstThenName,
                page_token,
                self.page_size,
            )
            .await?;

        let files = page
            .entries
            .into_iter()
            .filter(|entry| entry.kind != EntryKind::Folder)
            .map(Entry::from)
            .collect();

        Ok(Fetched {
            folders,
            files,
            next_page_token: page.next_page_token,
        })
    }

    async fn fetch_all_folders(&self, folder_id: &str) -> Result<Vec<Entry>, StoreError> {
        let mut token: Option<Token> = None;
        let mut folders = Vec::new();

        loop {
            let page = self
                .store
                .list_children(
                    folder_id,
                    OrderKey::Name,
                    token.as_deref(),
                    FOLDER_LIST_PAGE_SIZE,
                )
                .await?;

            folders.extend(
                page.entries
                    .into_iter()
                    .filter(|entry| entry.kind == EntryKind::Folder)
                    .map(Entry::from),
            );

            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(folders)
    }
}
