use crate::layout::{field, ContactSource};
use crate::status::{derive_status, MemberStatus, StatusInputs, StatusThresholds};
use crate::timefmt::format_sheet_timestamp;
use crate::{Record, RecordSet};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    Keep,
    Recompute {
        thresholds: StatusThresholds,
        now: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlankKeys {
    /// Incoming rows without an email are dropped.
    Skip,
    /// Incoming rows without an email can never match, so they are appended.
    Append,
}

/// Marks national-list contacts that re-enter through a hub source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPolicy {
    pub claimed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    /// Destination fields replaced by the incoming value on a match.
    pub overwrite: Vec<&'static str>,
    /// Destination fields blanked on rows without a match.
    pub clear_on_miss: Vec<&'static str>,
    pub status: StatusPolicy,
    /// Values written onto every appended record, replacing what it carried.
    pub append_overrides: Vec<(&'static str, String)>,
    /// Values filled into blank fields of appended records.
    pub append_defaults: Vec<(&'static str, String)>,
    pub claim: Option<ClaimPolicy>,
    pub blank_keys: BlankKeys,
}

impl MergePolicy {
    pub fn new(overwrite: Vec<&'static str>) -> Self {
        Self {
            overwrite,
            clear_on_miss: Vec::new(),
            status: StatusPolicy::Keep,
            append_overrides: vec![(field::STATUS, MemberStatus::HotLead.label().to_string())],
            append_defaults: Vec::new(),
            claim: None,
            blank_keys: BlankKeys::Skip,
        }
    }

    pub fn with_status(mut self, status: StatusPolicy) -> Self {
        self.status = status;
        self
    }

    pub fn with_clear_on_miss(mut self, fields: Vec<&'static str>) -> Self {
        self.clear_on_miss = fields;
        self
    }

    pub fn with_source(self, source: ContactSource) -> Self {
        self.with_append_default(field::SOURCE, source.label())
    }

    pub fn with_append_default(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.append_defaults.push((field, value.into()));
        self
    }

    pub fn with_claim(mut self, claim: ClaimPolicy) -> Self {
        self.claim = Some(claim);
        self
    }

    pub fn with_blank_keys(mut self, blank_keys: BlankKeys) -> Self {
        self.blank_keys = blank_keys;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub position: usize,
    pub record: Record,
    pub matched: bool,
    pub claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeIssue {
    /// Status derivation fell through every band; the row carries the error
    /// label until the data is fixed.
    StatusUndetermined { position: usize, email: String },
    InvalidDateJoined {
        position: usize,
        email: String,
        value: String,
    },
}

impl MergeIssue {
    pub fn describe(&self) -> String {
        match self {
            MergeIssue::StatusUndetermined { position, email } => format!(
                "status could not be determined for {email} (row {position}): signups exceed the event threshold but last signup recency is missing"
            ),
            MergeIssue::InvalidDateJoined {
                position,
                email,
                value,
            } => format!("unparseable date_joined {value:?} for {email} (row {position})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// One entry per destination record, in destination order.
    pub updates: Vec<RowUpdate>,
    pub appended: RecordSet,
    pub issues: Vec<MergeIssue>,
}

impl MergeOutcome {
    pub fn matched_count(&self) -> usize {
        self.updates.iter().filter(|update| update.matched).count()
    }

    pub fn claimed_count(&self) -> usize {
        self.updates.iter().filter(|update| update.claimed).count()
    }

    pub fn updated_records(&self) -> impl Iterator<Item = &Record> {
        self.updates.iter().map(|update| &update.record)
    }
}

/// Incoming records indexed by email, last write wins, remembering where each
/// email was first seen so leftovers come out in source order.
struct IncomingIndex {
    slots: Vec<Option<Record>>,
    by_email: HashMap<String, usize>,
}

impl IncomingIndex {
    fn build(incoming: RecordSet, blank_keys: BlankKeys) -> Self {
        let mut index = Self {
            slots: Vec::new(),
            by_email: HashMap::new(),
        };
        for record in incoming {
            if record.email().is_empty() {
                if blank_keys == BlankKeys::Append {
                    index.slots.push(Some(record));
                }
                continue;
            }
            match index.by_email.get(record.email()) {
                Some(&slot) => index.slots[slot] = Some(record),
                None => {
                    index
                        .by_email
                        .insert(record.email().to_string(), index.slots.len());
                    index.slots.push(Some(record));
                }
            }
        }
        index
    }

    fn take(&mut self, email: &str) -> Option<Record> {
        if email.is_empty() {
            return None;
        }
        let slot = self.by_email.remove(email)?;
        self.slots[slot].take()
    }

    fn into_remaining(self) -> impl Iterator<Item = Record> {
        self.slots.into_iter().flatten()
    }
}

pub fn reconcile(destination: &RecordSet, incoming: RecordSet, policy: &MergePolicy) -> MergeOutcome {
    let mut index = IncomingIndex::build(incoming, policy.blank_keys);
    let mut outcome = MergeOutcome::default();

    for (position, existing) in destination.iter().enumerate() {
        let mut record = existing.clone();
        let mut claimed = false;
        let matched = match index.take(existing.email()) {
            Some(update) => {
                for name in &policy.overwrite {
                    record.set(*name, update.get(name));
                }
                if let Some(claim) = &policy.claim {
                    claimed = mark_claimed(&mut record, claim);
                }
                true
            }
            None => {
                for name in &policy.clear_on_miss {
                    record.set(*name, "");
                }
                false
            }
        };

        if let StatusPolicy::Recompute { thresholds, now } = &policy.status {
            apply_status(&mut record, position, thresholds, *now, &mut outcome.issues);
        }

        outcome.updates.push(RowUpdate {
            position,
            record,
            matched,
            claimed,
        });
    }

    outcome.appended = index
        .into_remaining()
        .map(|mut record| {
            for (name, value) in &policy.append_overrides {
                record.set(*name, value.as_str());
            }
            for (name, value) in &policy.append_defaults {
                record.set_if_blank(name, value);
            }
            record
        })
        .collect();
    outcome
}

/// Incoming records whose email is not already present in `existing`, in
/// incoming order. Records without an email never match and are kept.
pub fn new_by_key(existing: &RecordSet, incoming: RecordSet) -> RecordSet {
    let known = existing
        .emails()
        .filter(|email| !email.is_empty())
        .collect::<HashSet<&str>>();
    let mut seen = HashSet::new();
    incoming
        .into_iter()
        .filter(|record| {
            let email = record.email();
            email.is_empty() || (!known.contains(email) && seen.insert(email.to_string()))
        })
        .collect()
}

fn mark_claimed(record: &mut Record, claim: &ClaimPolicy) -> bool {
    let from_national = record.get(field::SOURCE) == ContactSource::NationalEmailList.label();
    if from_national && record.is_blank(field::DATE_CLAIMED) {
        record.set(field::DATE_CLAIMED, format_sheet_timestamp(claim.claimed_at));
        return true;
    }
    false
}

fn apply_status(
    record: &mut Record,
    position: usize,
    thresholds: &StatusThresholds,
    now: DateTime<Utc>,
    issues: &mut Vec<MergeIssue>,
) {
    let inputs = match StatusInputs::from_record(record, now) {
        Ok(inputs) => inputs,
        Err(_) => {
            issues.push(MergeIssue::InvalidDateJoined {
                position,
                email: record.email().to_string(),
                value: record.get(field::DATE_JOINED).to_string(),
            });
            return;
        }
    };

    let status = derive_status(&inputs, thresholds);
    if status.is_error() {
        issues.push(MergeIssue::StatusUndetermined {
            position,
            email: record.email().to_string(),
        });
    }
    record.set(field::STATUS, status.label());
}
