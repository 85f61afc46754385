use crate::SyncError;
use hubhq_core::attendance::Participation;
use hubhq_core::compile::SubmissionSheet;
use hubhq_core::hub::HubProfile;
use hubhq_core::RecordSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const PARTICIPATIONS_FILE: &str = "participations.json";
pub const INTEREST_FORM_FILE: &str = "interest_form.json";
pub const DATA_ENTRY_FILE: &str = "data_entry.json";
pub const NATIONAL_FILE: &str = "national.json";
pub const CORRECTIONS_FILE: &str = "retry.json";

/// A hand-corrected contact queued for another committee upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectedContact {
    pub hub: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub zip: String,
}

/// Where the passes read incoming data from.
pub trait SourceProvider {
    /// Raw event signups; filtering to the hub's own events happens later.
    fn participations(&self, hub: &HubProfile) -> Result<Vec<Participation>, SyncError>;
    fn interest_form(&self, hub: &HubProfile) -> Result<Option<SubmissionSheet>, SyncError>;
    fn data_entry(&self, hub: &HubProfile) -> Result<Option<SubmissionSheet>, SyncError>;
    /// National-list contacts near the hub, `date_joined` in warehouse format.
    fn national_candidates(&self, hub: &HubProfile) -> Result<RecordSet, SyncError>;
    fn upsert_corrections(&self) -> Result<Vec<CorrectedContact>, SyncError>;
}

/// JSON snapshots laid out as `<root>/<hub_name>/<file>`, with corrections
/// at `<root>/retry.json`. A missing file reads as no data.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn hub_dir(&self, hub: &HubProfile) -> PathBuf {
        self.root.join(&hub.hub_name)
    }

    fn hub_file<T: DeserializeOwned>(
        &self,
        hub: &HubProfile,
        file: &str,
    ) -> Result<Option<T>, SyncError> {
        read_snapshot(&self.hub_dir(hub).join(file))
    }
}

impl SourceProvider for DirectorySource {
    fn participations(&self, hub: &HubProfile) -> Result<Vec<Participation>, SyncError> {
        Ok(self
            .hub_file(hub, PARTICIPATIONS_FILE)?
            .unwrap_or_default())
    }

    fn interest_form(&self, hub: &HubProfile) -> Result<Option<SubmissionSheet>, SyncError> {
        self.hub_file(hub, INTEREST_FORM_FILE)
    }

    fn data_entry(&self, hub: &HubProfile) -> Result<Option<SubmissionSheet>, SyncError> {
        self.hub_file(hub, DATA_ENTRY_FILE)
    }

    fn national_candidates(&self, hub: &HubProfile) -> Result<RecordSet, SyncError> {
        Ok(self.hub_file(hub, NATIONAL_FILE)?.unwrap_or_default())
    }

    fn upsert_corrections(&self) -> Result<Vec<CorrectedContact>, SyncError> {
        Ok(read_snapshot(&self.root.join(CORRECTIONS_FILE))?.unwrap_or_default())
    }
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SyncError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SyncError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| SyncError::Snapshot {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::profile;
    use hubhq_core::layout::field;
    use tempfile::tempdir;

    #[test]
    fn missing_files_read_as_empty() {
        let dir = tempdir().expect("tempdir");
        let source = DirectorySource::new(dir.path());
        let hub = profile("Philly");

        assert!(source.participations(&hub).expect("participations").is_empty());
        assert!(source.interest_form(&hub).expect("form").is_none());
        assert!(source.national_candidates(&hub).expect("national").is_empty());
        assert!(source.upsert_corrections().expect("corrections").is_empty());
    }

    #[test]
    fn reads_hub_snapshots() {
        let dir = tempdir().expect("tempdir");
        let source = DirectorySource::new(dir.path());
        let hub = profile("Philly");
        fs::create_dir_all(source.hub_dir(&hub)).expect("hub dir");
        fs::write(
            source.hub_dir(&hub).join(NATIONAL_FILE),
            r#"[{"vanid": 101, "email": "nat@example.org", "date_joined": "2026-05-01 10:00:00"}]"#,
        )
        .expect("write national");
        fs::write(
            source.hub_dir(&hub).join(INTEREST_FORM_FILE),
            r#"{"header": ["Timestamp", "First", "Last", "Email"], "rows": [["", "Ana", "", "ana@example.org"]]}"#,
        )
        .expect("write form");
        fs::write(
            dir.path().join(CORRECTIONS_FILE),
            r#"[{"hub": "Philly", "email": "ana@example.org", "zip": "19104"}]"#,
        )
        .expect("write corrections");

        let national = source.national_candidates(&hub).expect("national");
        assert_eq!(national.as_slice()[0].get(field::VANID), "101");
        let form = source.interest_form(&hub).expect("form").expect("present");
        assert_eq!(form.rows.len(), 1);
        assert_eq!(source.upsert_corrections().expect("corrections")[0].zip, "19104");
    }

    #[test]
    fn malformed_snapshot_names_the_file() {
        let dir = tempdir().expect("tempdir");
        let source = DirectorySource::new(dir.path());
        let hub = profile("Philly");
        fs::create_dir_all(source.hub_dir(&hub)).expect("hub dir");
        fs::write(source.hub_dir(&hub).join(PARTICIPATIONS_FILE), "{not json").expect("write");

        let err = source.participations(&hub).expect_err("malformed");
        assert!(matches!(err, SyncError::Snapshot { .. }));
        assert!(err.to_string().contains(PARTICIPATIONS_FILE));
    }
}
