use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;

use super::{
    display_name, parent_prefix, sort_entries, validate_entry_name, ChildPage, EntryKind,
    OrderKey, RemoteEntry, RemoteStore, StoreError,
};

const TOKEN_PREFIX: &str = "offset:";

/// A call observed by [`MemoryStore`], in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    List {
        folder_id: String,
        page_token: Option<String>,
    },
    Rename {
        entry_id: String,
        new_name: String,
    },
}

#[derive(Default)]
struct MemoryInner {
    objects: BTreeMap<String, i64>,
    calls: Vec<StoreCall>,
    rename_dispatched_at: Vec<Instant>,
    failing_renames: HashSet<String>,
    failing_listings: HashSet<String>,
    list_latency: HashMap<String, Duration>,
    rename_latency: Duration,
}

/// In-process bucket with the same prefix semantics as [`super::S3Store`].
///
/// Keys ending in `/` are folder markers; any other key is a file. Pagination
/// tokens encode an offset into the ordered child list.
#[derive(Default)]
pub struct MemoryStore {
    label: String,
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    pub fn with_keys<I, S>(label: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new(label);
        for key in keys {
            store.insert(key);
        }
        store
    }

    /// Seed data used by the host binary's `--demo` mode.
    pub fn demo() -> Self {
        let mut keys: Vec<String> = (1..=42).map(|n| format!("photos/img{n}.jpg")).collect();
        keys.extend((1..=12).map(|n| format!("photos/raw/DSC_{n:04}.NEF")));
        keys.extend([
            "documents/".to_string(),
            "documents/report draft.docx".to_string(),
            "documents/report final.docx".to_string(),
            "music/track 1 - intro.mp3".to_string(),
            "music/track 2 - theme.mp3".to_string(),
            "music/track 10 - outro.mp3".to_string(),
            "readme.txt".to_string(),
            ".hidden".to_string(),
        ]);
        Self::with_keys("demo-bucket", keys)
    }

    pub fn insert(&self, key: impl Into<String>) {
        self.lock().objects.insert(key.into(), 0);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn rename_calls(&self) -> Vec<StoreCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, StoreCall::Rename { .. }))
            .cloned()
            .collect()
    }

    /// Instants at which each rename call reached the store.
    pub fn rename_dispatch_times(&self) -> Vec<Instant> {
        self.lock().rename_dispatched_at.clone()
    }

    pub fn clear_calls(&self) {
        let mut inner = self.lock();
        inner.calls.clear();
        inner.rename_dispatched_at.clear();
    }

    /// Renames of an entry currently called `old_name` will be rejected.
    pub fn fail_rename_of(&self, old_name: impl Into<String>) {
        self.lock().failing_renames.insert(old_name.into());
    }

    pub fn fail_listing_of(&self, folder_id: impl Into<String>) {
        self.lock().failing_listings.insert(folder_id.into());
    }

    pub fn heal_listing_of(&self, folder_id: &str) {
        self.lock().failing_listings.remove(folder_id);
    }

    pub fn set_list_latency(&self, folder_id: impl Into<String>, latency: Duration) {
        self.lock().list_latency.insert(folder_id.into(), latency);
    }

    pub fn set_rename_latency(&self, latency: Duration) {
        self.lock().rename_latency = latency;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn children_of(inner: &MemoryInner, folder_id: &str, order: OrderKey) -> Vec<RemoteEntry> {
        let mut folders = BTreeSet::new();
        let mut entries = Vec::new();

        for (key, size) in inner.objects.range(folder_id.to_string()..) {
            let Some(rest) = key.strip_prefix(folder_id) else {
                break;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.find('/') {
                Some(index) => {
                    folders.insert(format!("{folder_id}{}", &rest[..=index]));
                }
                None => entries.push(RemoteEntry {
                    id: key.clone(),
                    name: rest.to_string(),
                    kind: EntryKind::File,
                    size: Some(*size),
                    modified: None,
                }),
            }
        }

        entries.extend(folders.into_iter().map(|id| RemoteEntry {
            name: display_name(&id).to_string(),
            id,
            kind: EntryKind::Folder,
            size: None,
            modified: None,
        }));
        sort_entries(&mut entries, order);
        entries
    }
}

fn parse_token(token: Option<&str>) -> Result<usize, StoreError> {
    match token {
        None => Ok(0),
        Some(raw) => raw
            .strip_prefix(TOKEN_PREFIX)
            .and_then(|offset| offset.parse().ok())
            .ok_or_else(|| StoreError::InvalidToken(raw.to_string())),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn label(&self) -> String {
        self.label.clone()
    }

    async fn list_children(
        &self,
        folder_id: &str,
        order: OrderKey,
        page_token: Option<&str>,
        page_size: u16,
    ) -> Result<ChildPage, StoreError> {
        let latency = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::List {
                folder_id: folder_id.to_string(),
                page_token: page_token.map(str::to_string),
            });
            inner.list_latency.get(folder_id).copied()
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let inner = self.lock();
        if inner.failing_listings.contains(folder_id) {
            return Err(StoreError::Request(format!("listing {folder_id:?} failed")));
        }

        let offset = parse_token(page_token)?;
        let children = Self::children_of(&inner, folder_id, order);
        let page_size = usize::from(page_size.max(1));
        let end = (offset + page_size).min(children.len());
        let entries = children.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();
        let next_page_token = (end < children.len()).then(|| format!("{TOKEN_PREFIX}{end}"));

        Ok(ChildPage {
            entries,
            next_page_token,
        })
    }

    async fn rename(
        &self,
        entry_id: &str,
        new_name: &str,
        old_name: &str,
    ) -> Result<RemoteEntry, StoreError> {
        let latency = {
            let mut inner = self.lock();
            inner.calls.push(StoreCall::Rename {
                entry_id: entry_id.to_string(),
                new_name: new_name.to_string(),
            });
            inner.rename_dispatched_at.push(Instant::now());
            inner.rename_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        validate_entry_name(new_name)?;
        let mut inner = self.lock();
        if inner.failing_renames.contains(old_name) {
            return Err(StoreError::Request(format!("rename of {old_name:?} rejected")));
        }
        let Some(size) = inner.objects.get(entry_id).copied() else {
            return Err(StoreError::NotFound(entry_id.to_string()));
        };
        let new_key = format!("{}{}", parent_prefix(entry_id), new_name);
        if inner.objects.contains_key(&new_key) {
            return Err(StoreError::Conflict(new_key));
        }

        inner.objects.remove(entry_id);
        inner.objects.insert(new_key.clone(), size);

        Ok(RemoteEntry {
            id: new_key,
            name: new_name.to_string(),
            kind: EntryKind::File,
            size: Some(size),
            modified: Some(Utc::now().to_rfc3339()),
        })
    }
}
