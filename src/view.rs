use serde::Serialize;

use crate::events::{emit_serialized, EventSink, EVENT_RENDER};
use crate::navigation::{FolderRef, NavigationState, SlicePreview, StateHandle};
use crate::transform::{slice_preview_spans, CharSpan};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderItem {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub checked: bool,
    pub size: Option<i64>,
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spans: Option<Vec<CharSpan>>,
}

/// Everything the shell needs to paint the browser pane.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserView {
    pub path: Vec<FolderRef>,
    pub loading: bool,
    pub folders: Vec<FolderItem>,
    pub files: Vec<FileItem>,
    pub empty: bool,
    pub can_go_up: bool,
    pub can_go_prev: bool,
    pub can_go_next: bool,
    pub has_selection: bool,
    pub checked_count: usize,
    pub slice_preview: Option<SlicePreview>,
}

impl BrowserView {
    pub fn from_state(state: &NavigationState) -> Self {
        let files: Vec<FileItem> = state
            .files
            .iter()
            .enumerate()
            .map(|(index, entry)| FileItem {
                index,
                id: entry.id.clone(),
                name: entry.name.clone(),
                checked: entry.checked,
                size: entry.size,
                modified: entry.modified.clone(),
                spans: state
                    .slice_preview
                    .map(|preview| slice_preview_spans(&entry.name, preview.start, preview.end)),
            })
            .collect();

        Self {
            path: state.path.segments().to_vec(),
            loading: state.loading,
            folders: state
                .folders
                .iter()
                .map(|entry| FolderItem {
                    id: entry.id.clone(),
                    name: entry.name.clone(),
                })
                .collect(),
            empty: files.is_empty(),
            checked_count: files.iter().filter(|file| file.checked).count(),
            files,
            can_go_up: !state.path.is_root(),
            can_go_prev: state.cursors.can_go_prev(),
            can_go_next: state.cursors.can_go_next(),
            has_selection: state.has_selection(),
            slice_preview: state.slice_preview,
        }
    }
}

pub fn render(state: &StateHandle, events: &dyn EventSink) -> BrowserView {
    let view = BrowserView::from_state(&state.get());
    emit_serialized(events, EVENT_RENDER, &view);
    view
}
