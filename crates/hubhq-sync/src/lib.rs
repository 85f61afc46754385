//! Scheduled passes that move contacts between a hub's HQ sheets, the
//! national contact list, the event platform and the hub's CRM committee.
//!
//! Every pass walks a set of hubs. A hub that fails is written to the errors
//! table and skipped; the remaining hubs still run.

use chrono::{DateTime, NaiveDate, Utc};
use hubhq_core::hub::Hub;
use hubhq_core::reconcile::MergeIssue;
use hubhq_core::CoreError;
use hubhq_storage::{ErrorEntry, HubStore, StorageError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

pub mod attendance;
pub mod committee;
pub mod compile;
pub mod forms;
pub mod national;
pub mod setup;
pub mod sink;
pub mod source;

use sink::CommitteeSink;
use source::SourceProvider;

/// Names written to the `script` column of the errors table.
pub mod script {
    pub const ATTENDANCE: &str = "attendance_sync";
    pub const FORMS: &str = "forms_sync";
    pub const NATIONAL: &str = "national_sync";
    pub const COMMITTEE: &str = "committee_sync";
    pub const RETRY: &str = "committee_retry";
    pub const COMPILE: &str = "member_compile";
    pub const SETUP: &str = "hub_setup";
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("record error: {0}")]
    Core(#[from] CoreError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no event attendance associated with hub email {0}")]
    NoAttendance(String),
    #[error("committee rejected upsert: {0}")]
    Rejected(String),
}

/// A failed hub: the error plus a short note on which step broke.
#[derive(Debug)]
pub struct HubFailure {
    pub note: String,
    pub error: SyncError,
}

pub(crate) trait NoteExt<T> {
    fn note(self, note: &str) -> Result<T, HubFailure>;
}

impl<T, E> NoteExt<T> for Result<T, E>
where
    E: Into<SyncError>,
{
    fn note(self, note: &str) -> Result<T, HubFailure> {
        self.map_err(|err| HubFailure {
            note: note.to_string(),
            error: err.into(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub hub: String,
    pub script: &'static str,
    pub matched: usize,
    pub appended: usize,
    /// Rows that need a human to look at them. Each one also lands in the
    /// errors table.
    pub issues: Vec<String>,
}

impl SyncReport {
    pub fn new(hub: &str, script: &'static str) -> Self {
        Self {
            hub: hub.to_string(),
            script,
            ..Self::default()
        }
    }

    pub(crate) fn absorb_issues(&mut self, issues: &[MergeIssue]) {
        self.issues
            .extend(issues.iter().map(|issue| issue.describe()));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub script: &'static str,
    pub reports: Vec<SyncReport>,
    pub errored_hubs: Vec<String>,
}

impl PassSummary {
    pub fn is_clean(&self) -> bool {
        self.errored_hubs.is_empty()
    }

    pub fn matched(&self) -> usize {
        self.reports.iter().map(|report| report.matched).sum()
    }

    pub fn appended(&self) -> usize {
        self.reports.iter().map(|report| report.appended).sum()
    }
}

/// Everything a pass reads from or writes to.
pub struct SyncContext<'a> {
    pub store: &'a HubStore,
    pub source: &'a dyn SourceProvider,
    pub sink: &'a dyn CommitteeSink,
    pub now: DateTime<Utc>,
}

impl SyncContext<'_> {
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }

    pub(crate) fn log_error(
        &self,
        script: &'static str,
        hub: &str,
        error: &str,
        detail: &str,
        note: &str,
    ) -> Result<(), SyncError> {
        self.store.log_error(&ErrorEntry {
            date: self.today(),
            script: script.to_string(),
            hub: hub.to_string(),
            error: error.to_string(),
            detail: detail.to_string(),
            note: note.to_string(),
        })?;
        Ok(())
    }
}

/// Runs `pass` once per hub. Failures go to the errors table and the loop
/// moves on; only a failure to record a failure aborts the pass.
pub(crate) fn run_hubs<F>(
    ctx: &SyncContext<'_>,
    script: &'static str,
    hubs: &[Hub],
    mut pass: F,
) -> Result<PassSummary, SyncError>
where
    F: FnMut(&Hub) -> Result<SyncReport, HubFailure>,
{
    let mut summary = PassSummary {
        script,
        ..PassSummary::default()
    };

    for hub in hubs {
        match pass(hub) {
            Ok(report) => {
                for issue in &report.issues {
                    warn!(event = "row_issue", script, hub = hub.name(), issue = %issue);
                    ctx.log_error(script, hub.name(), issue, "", "Row needs review")?;
                }
                info!(
                    event = "hub_synced",
                    script,
                    hub = hub.name(),
                    matched = report.matched,
                    appended = report.appended,
                    issues = report.issues.len()
                );
                summary.reports.push(report);
            }
            Err(failure) => {
                warn!(
                    event = "hub_failed",
                    script,
                    hub = hub.name(),
                    note = %failure.note,
                    error = %failure.error
                );
                ctx.log_error(
                    script,
                    hub.name(),
                    &failure.error.to_string(),
                    &format!("{:?}", failure.error),
                    &format!("{} for {}", failure.note, hub.name()),
                )?;
                summary.errored_hubs.push(hub.name().to_string());
            }
        }
    }

    if summary.is_clean() {
        info!(event = "pass_complete", script, "completed without issue for all hubs");
    } else {
        warn!(
            event = "pass_complete",
            script,
            errored = summary.errored_hubs.len(),
            "{} errored hubs",
            summary.errored_hubs.len()
        );
    }
    Ok(summary)
}
