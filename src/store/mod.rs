//! Remote object store seam.
//!
//! The browser and the rename engine only ever talk to a [`RemoteStore`].
//! Folder ids are key prefixes (`""` for the root, otherwise ending in `/`)
//! and entry ids are full keys, so both backends share one addressing model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;
mod s3;

pub use memory::{MemoryStore, StoreCall};
pub use s3::S3Store;

/// Opaque continuation marker returned by a paginated listing.
pub type Token = String;

pub const ROOT_FOLDER_ID: &str = "";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    File,
    Folder,
}

/// Ordering requested from `list_children`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderKey {
    Name,
    FoldersFirstThenName,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub kind: EntryKind,
    pub size: Option<i64>,
    pub modified: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChildPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<Token>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Remote store rejected the credentials: {0}")]
    Unauthorized(String),
    #[error("Entry not found: {0}")]
    NotFound(String),
    #[error("Entry already exists: {0}")]
    Conflict(String),
    #[error("Invalid entry name: {0:?}")]
    InvalidName(String),
    #[error("Invalid page token: {0}")]
    InvalidToken(String),
    #[error("Remote request failed: {0}")]
    Request(String),
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Human readable location, used in logs and the breadcrumb root.
    fn label(&self) -> String;

    async fn list_children(
        &self,
        folder_id: &str,
        order: OrderKey,
        page_token: Option<&str>,
        page_size: u16,
    ) -> Result<ChildPage, StoreError>;

    async fn rename(
        &self,
        entry_id: &str,
        new_name: &str,
        old_name: &str,
    ) -> Result<RemoteEntry, StoreError>;
}

/// Parent prefix of a key: `"a/b/c.txt"` -> `"a/b/"`, `"a/b/"` -> `"a/"`.
pub fn parent_prefix(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    match trimmed.rfind('/') {
        Some(index) => &key[..=index],
        None => ROOT_FOLDER_ID,
    }
}

/// Last path segment of a key without its trailing slash.
pub fn display_name(key: &str) -> &str {
    let trimmed = key.strip_suffix('/').unwrap_or(key);
    match trimmed.rfind('/') {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    }
}

pub fn validate_entry_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Stable ordering shared by both backends.
pub fn sort_entries(entries: &mut [RemoteEntry], order: OrderKey) {
    match order {
        OrderKey::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
        OrderKey::FoldersFirstThenName => entries.sort_by(|a, b| {
            let a_rank = u8::from(a.kind != EntryKind::Folder);
            let b_rank = u8::from(b.kind != EntryKind::Folder);
            a_rank.cmp(&b_rank).then_with(|| a.name.cmp(&b.name))
        }),
    }
}
