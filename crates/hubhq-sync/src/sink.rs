use crate::SyncError;
use hubhq_core::committee::CommitteeUpsert;
use hubhq_core::hub::HubProfile;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Receives find-or-create upserts for a hub's CRM committee.
pub trait CommitteeSink {
    fn upsert(&self, hub: &HubProfile, payload: &CommitteeUpsert) -> Result<(), SyncError>;
}

#[derive(Serialize)]
struct OutboxLine<'a> {
    hub: &'a str,
    hub_email: &'a str,
    payload: &'a CommitteeUpsert,
}

/// Appends each accepted upsert as one JSON line to `<dir>/<hub_name>.jsonl`.
#[derive(Debug, Clone)]
pub struct OutboxSink {
    dir: PathBuf,
}

impl OutboxSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn outbox_path(&self, hub: &HubProfile) -> PathBuf {
        self.dir.join(format!("{}.jsonl", hub.hub_name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CommitteeSink for OutboxSink {
    fn upsert(&self, hub: &HubProfile, payload: &CommitteeUpsert) -> Result<(), SyncError> {
        validate_upsert(payload)?;

        let io_err = |source: std::io::Error| SyncError::Io {
            path: self.dir.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;

        let path = self.outbox_path(hub);
        let line = serde_json::to_string(&OutboxLine {
            hub: &hub.hub_name,
            hub_email: &hub.hub_email,
            payload,
        })
        .map_err(|source| SyncError::Snapshot {
            path: path.clone(),
            source,
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SyncError::Io {
                path: path.clone(),
                source,
            })?;
        writeln!(file, "{line}").map_err(|source| SyncError::Io { path, source })?;
        Ok(())
    }
}

/// The committee refuses people it cannot key: no email, or one without a
/// mailbox and domain.
pub fn validate_upsert(payload: &CommitteeUpsert) -> Result<(), SyncError> {
    let email = payload
        .emails
        .first()
        .map(|entry| entry.email.trim())
        .unwrap_or_default();
    match email.split_once('@') {
        Some((mailbox, domain)) if !mailbox.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(SyncError::Rejected(format!("invalid email {email:?}"))),
    }
}
