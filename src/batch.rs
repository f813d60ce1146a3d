use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::Browser;
use crate::events::{emit_serialized, notify, EventSink, NotifyLevel, EVENT_RENAME_COMPLETE};
use crate::navigation::{Entry, StateHandle};
use crate::rate_limit::RateLimiter;
use crate::store::RemoteStore;
use crate::transform::RenameTransform;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePreview {
    pub id: String,
    pub old_name: String,
    pub new_name: String,
    pub changed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamedEntry {
    pub id: String,
    pub old_name: String,
    pub new_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFailure {
    pub id: String,
    pub old_name: String,
    pub new_name: String,
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameReport {
    pub batch_id: String,
    pub renamed: Vec<RenamedEntry>,
    pub skipped: usize,
    pub failed: Vec<RenameFailure>,
}

impl RenameReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    /// No file was checked; nothing was sent.
    NothingSelected,
    Completed(RenameReport),
}

/// Old and new names for each checked file, in page order.
pub fn plan_renames(files: &[Entry], transform: &RenameTransform) -> Vec<RenamePreview> {
    files
        .iter()
        .map(|entry| {
            let new_name = transform.apply(&entry.name);
            RenamePreview {
                id: entry.id.clone(),
                changed: new_name != entry.name,
                old_name: entry.name.clone(),
                new_name,
            }
        })
        .collect()
}

/// Splits changed entries into those safe to dispatch and those whose new
/// name is already taken on the page or claimed by another entry of the batch.
/// Store renames are copy-then-delete and not atomic.
pub fn split_collisions(
    pending: Vec<RenamePreview>,
    page_names: &HashSet<String>,
) -> (Vec<RenamePreview>, Vec<RenameFailure>) {
    let mut claims: HashMap<String, usize> = HashMap::new();
    for item in &pending {
        *claims.entry(item.new_name.clone()).or_default() += 1;
    }

    let mut ready = Vec::new();
    let mut blocked = Vec::new();
    for item in pending {
        let reason = if page_names.contains(&item.new_name) {
            Some("A file with this name already exists")
        } else if claims.get(&item.new_name).copied().unwrap_or(0) > 1 {
            Some("Another file in this batch would get the same name")
        } else {
            None
        };

        match reason {
            Some(reason) => blocked.push(RenameFailure {
                id: item.id,
                old_name: item.old_name,
                new_name: item.new_name,
                error: reason.to_string(),
            }),
            None => ready.push(item),
        }
    }
    (ready, blocked)
}

pub struct BatchRenameEngine {
    store: Arc<dyn RemoteStore>,
    limiter: Arc<RateLimiter>,
    browser: Arc<Browser>,
    state: StateHandle,
    events: Arc<dyn EventSink>,
}

impl BatchRenameEngine {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        limiter: Arc<RateLimiter>,
        browser: Arc<Browser>,
        state: StateHandle,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            limiter,
            browser,
            state,
            events,
        }
    }

    pub fn preview(&self, transform: &RenameTransform) -> Vec<RenamePreview> {
        plan_renames(&self.state.get().checked_files(), transform)
    }

    /// Renames every checked file whose name the transform changes.
    ///
    /// All calls are started together and paced by the limiter; one failure
    /// does not stop the others. The current page is refreshed afterwards
    /// whatever the result, and renames that went through are not undone.
    pub async fn apply(&self, transform: &RenameTransform) -> BatchOutcome {
        let snapshot = self.state.get();
        let checked = snapshot.checked_files();
        if checked.is_empty() {
            notify(
                self.events.as_ref(),
                NotifyLevel::Info,
                "Select at least one file to rename",
            );
            return BatchOutcome::NothingSelected;
        }

        let batch_id = Uuid::new_v4().to_string();
        let plan = plan_renames(&checked, transform);
        let skipped = plan.iter().filter(|item| !item.changed).count();
        let page_names: HashSet<String> =
            snapshot.files.iter().map(|entry| entry.name.clone()).collect();
        let (pending, blocked) = split_collisions(
            plan.into_iter().filter(|item| item.changed).collect(),
            &page_names,
        );
        for item in &blocked {
            warn!(batch = %batch_id, entry = %item.id, new_name = %item.new_name, "{}", item.error);
        }

        info!(
            batch = %batch_id,
            transform = %transform.describe(),
            pending = pending.len(),
            skipped,
            blocked = blocked.len(),
            "starting batch rename"
        );

        let results = join_all(pending.into_iter().map(|item| async move {
            let result = self
                .limiter
                .run(|| self.store.rename(&item.id, &item.new_name, &item.old_name))
                .await;
            (item, result)
        }))
        .await;

        let mut renamed = Vec::new();
        let mut failed = blocked;
        for (item, result) in results {
            match result {
                Ok(_) => renamed.push(RenamedEntry {
                    id: item.id,
                    old_name: item.old_name,
                    new_name: item.new_name,
                }),
                Err(err) => {
                    warn!(batch = %batch_id, entry = %item.id, "rename failed: {err}");
                    failed.push(RenameFailure {
                        id: item.id,
                        old_name: item.old_name,
                        new_name: item.new_name,
                        error: err.to_string(),
                    });
                }
            }
        }

        let report = RenameReport {
            batch_id,
            renamed,
            skipped,
            failed,
        };
        self.report(&report);

        if let Err(err) = self.browser.refresh().await {
            warn!(batch = %report.batch_id, "refresh after rename failed: {err}");
            notify(
                self.events.as_ref(),
                NotifyLevel::Error,
                format!("Could not refresh the listing: {err}"),
            );
        }

        BatchOutcome::Completed(report)
    }

    fn report(&self, report: &RenameReport) {
        emit_serialized(self.events.as_ref(), EVENT_RENAME_COMPLETE, report);

        let events = self.events.as_ref();
        if !report.succeeded() {
            notify(
                events,
                NotifyLevel::Error,
                format!(
                    "{} of {} renames failed",
                    report.failed.len(),
                    report.failed.len() + report.renamed.len()
                ),
            );
        } else if report.renamed.is_empty() {
            notify(events, NotifyLevel::Info, "No file names were changed");
        } else {
            notify(
                events,
                NotifyLevel::Success,
                format!("Renamed {} files", report.renamed.len()),
            );
        }
    }
}
