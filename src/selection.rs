use std::sync::Arc;

use thiserror::Error;

use crate::events::EventSink;
use crate::navigation::{NavigationState, SlicePreview, StateHandle, StatePatch};
use crate::transform::RenameTransform;
use crate::view::{self, BrowserView};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No file at index {index} (page has {len} files)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Applies a click on the file at `index` of the current page.
///
/// A plain click toggles one entry and moves the anchor there. A shift-click
/// checks the whole range between the anchor and `index` and leaves the
/// anchor alone; it never unchecks. Without an anchor a shift-click acts as a
/// plain click.
pub fn apply_click(
    state: &mut NavigationState,
    index: usize,
    shift: bool,
) -> Result<(), SelectionError> {
    let len = state.files.len();
    if index >= len {
        return Err(SelectionError::IndexOutOfRange { index, len });
    }

    match (shift, state.from_index) {
        (true, Some(anchor)) if anchor < len => {
            let (low, high) = (anchor.min(index), anchor.max(index));
            for entry in &mut state.files[low..=high] {
                entry.checked = true;
            }
        }
        _ => {
            state.from_index = Some(index);
            let entry = &mut state.files[index];
            entry.checked = !entry.checked;
        }
    }
    Ok(())
}

pub fn set_all(state: &mut NavigationState, checked: bool) {
    for entry in &mut state.files {
        entry.checked = checked;
    }
}

pub struct SelectionController {
    state: StateHandle,
    events: Arc<dyn EventSink>,
}

impl SelectionController {
    pub fn new(state: StateHandle, events: Arc<dyn EventSink>) -> Self {
        Self { state, events }
    }

    pub fn click(&self, index: usize, shift: bool) -> Result<BrowserView, SelectionError> {
        self.state
            .update_with(|state| apply_click(state, index, shift))?;
        Ok(self.repaint())
    }

    pub fn select_all(&self) -> BrowserView {
        self.state.update_with(|state| set_all(state, true));
        self.repaint()
    }

    pub fn select_none(&self) -> BrowserView {
        self.state.update_with(|state| set_all(state, false));
        self.repaint()
    }

    /// Opens or closes the slice overlay. Only slice transforms draw one.
    pub fn set_preview(&self, transform: Option<&RenameTransform>) -> BrowserView {
        let preview = match transform {
            Some(RenameTransform::SliceDelete { start, end }) => Some(SlicePreview {
                start: *start,
                end: *end,
            }),
            _ => None,
        };
        self.state.update(StatePatch {
            slice_preview: Some(preview),
            ..StatePatch::default()
        });
        self.repaint()
    }

    fn repaint(&self) -> BrowserView {
        view::render(&self.state, self.events.as_ref())
    }
}
