//! Navigation state and its single owner.
//!
//! [`StateHandle`] is shared by the browser, the selection controller and the
//! rename engine. Each reads a snapshot with `get` or mutates under one lock
//! with `update`/`update_with`; the lock is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::store::{EntryKind, RemoteEntry, Token, ROOT_FOLDER_ID};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRef {
    pub id: String,
    pub name: String,
}

impl FolderRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn root(label: impl Into<String>) -> Self {
        Self::new(ROOT_FOLDER_ID, label)
    }
}

/// Root-first folder stack. The root is always present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FolderPath(Vec<FolderRef>);

impl FolderPath {
    pub fn new(root: FolderRef) -> Self {
        Self(vec![root])
    }

    /// Builds the stack for a key prefix such as `"a/b/"`.
    pub fn from_prefix(root: FolderRef, prefix: &str) -> Self {
        let mut path = Self::new(root);
        let mut id = String::new();
        for segment in prefix.split('/').filter(|segment| !segment.is_empty()) {
            id.push_str(segment);
            id.push('/');
            path.push(FolderRef::new(id.clone(), segment));
        }
        path
    }

    pub fn current(&self) -> &FolderRef {
        // Never empty: constructors seed the root and `pop` keeps it.
        &self.0[self.0.len() - 1]
    }

    pub fn root(&self) -> &FolderRef {
        &self.0[0]
    }

    pub fn push(&mut self, folder: FolderRef) {
        self.0.push(folder);
    }

    /// Returns false at the root, which stays in place.
    pub fn pop(&mut self) -> bool {
        if self.0.len() > 1 {
            self.0.pop();
            true
        } else {
            false
        }
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    pub fn segments(&self) -> &[FolderRef] {
        &self.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursors {
    pub current: Option<Token>,
    pub next: Option<Token>,
    /// `None` entries stand for the first page.
    pub back_stack: Vec<Option<Token>>,
}

impl PageCursors {
    pub fn can_go_prev(&self) -> bool {
        self.current.is_some() || !self.back_stack.is_empty()
    }

    pub fn can_go_next(&self) -> bool {
        self.next.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub checked: bool,
    pub size: Option<i64>,
    pub modified: Option<String>,
}

impl From<RemoteEntry> for Entry {
    fn from(remote: RemoteEntry) -> Self {
        Self {
            id: remote.id,
            name: remote.name,
            kind: remote.kind,
            checked: false,
            size: remote.size,
            modified: remote.modified,
        }
    }
}

/// Character range currently highlighted by an open slice editor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlicePreview {
    pub start: usize,
    pub end: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationState {
    pub path: FolderPath,
    pub cursors: PageCursors,
    pub folders: Vec<Entry>,
    pub files: Vec<Entry>,
    pub from_index: Option<usize>,
    /// Bumped by every listing dispatch; results from older dispatches are dropped.
    pub generation: u64,
    pub loading: bool,
    pub slice_preview: Option<SlicePreview>,
}

impl NavigationState {
    pub fn new(root_label: impl Into<String>) -> Self {
        Self {
            path: FolderPath::new(FolderRef::root(root_label)),
            cursors: PageCursors::default(),
            folders: Vec::new(),
            files: Vec::new(),
            from_index: None,
            generation: 0,
            loading: false,
            slice_preview: None,
        }
    }

    pub fn current_folder(&self) -> &FolderRef {
        self.path.current()
    }

    pub fn checked_files(&self) -> Vec<Entry> {
        self.files
            .iter()
            .filter(|entry| entry.kind == EntryKind::File && entry.checked)
            .cloned()
            .collect()
    }

    pub fn has_selection(&self) -> bool {
        self.files.iter().any(|entry| entry.checked)
    }

    pub fn folder_by_id(&self, id: &str) -> Option<&Entry> {
        self.folders.iter().find(|entry| entry.id == id)
    }
}

/// Shallow patch: every `Some` field replaces the matching field wholesale.
#[derive(Clone, Debug, Default)]
pub struct StatePatch {
    pub path: Option<FolderPath>,
    pub cursors: Option<PageCursors>,
    pub folders: Option<Vec<Entry>>,
    pub files: Option<Vec<Entry>>,
    pub from_index: Option<Option<usize>>,
    pub loading: Option<bool>,
    pub slice_preview: Option<Option<SlicePreview>>,
}

#[derive(Clone)]
pub struct StateHandle {
    inner: Arc<Mutex<NavigationState>>,
}

impl StateHandle {
    pub fn new(state: NavigationState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub fn get(&self) -> NavigationState {
        self.lock().clone()
    }

    pub fn update(&self, patch: StatePatch) {
        let mut state = self.lock();
        if let Some(path) = patch.path {
            state.path = path;
        }
        if let Some(cursors) = patch.cursors {
            state.cursors = cursors;
        }
        if let Some(folders) = patch.folders {
            state.folders = folders;
        }
        if let Some(files) = patch.files {
            state.files = files;
        }
        if let Some(from_index) = patch.from_index {
            state.from_index = from_index;
        }
        if let Some(loading) = patch.loading {
            state.loading = loading;
        }
        if let Some(slice_preview) = patch.slice_preview {
            state.slice_preview = slice_preview;
        }
    }

    /// Runs a compound mutation under a single lock.
    pub fn update_with<R>(&self, mutate: impl FnOnce(&mut NavigationState) -> R) -> R {
        mutate(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, NavigationState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
