use crate::{run_hubs, script, HubFailure, NoteExt, PassSummary, SyncContext, SyncError, SyncReport};
use chrono::{DateTime, Duration, Utc};
use hubhq_core::hub::{Hub, HubState};
use hubhq_core::layout::field;
use hubhq_core::reconcile::new_by_key;
use hubhq_core::timefmt::parse_joined;
use hubhq_core::{Record, RecordSet};
use hubhq_storage::Sheet;

/// Candidates added within this many seconds of the newest row are assumed
/// to be on the sheet already.
pub const NEWER_THAN_SLACK_SECS: i64 = 60;

/// New national-list contacts onto every scheduled hub's
/// "Contacts From National" sheet.
pub fn run(ctx: &SyncContext<'_>) -> Result<PassSummary, SyncError> {
    let hubs = ctx.store.hubs_in_state(HubState::Scheduled)?;
    run_hubs(ctx, script::NATIONAL, &hubs, |hub| sync_hub(ctx, hub))
}

pub fn sync_hub(ctx: &SyncContext<'_>, hub: &Hub) -> Result<SyncReport, HubFailure> {
    let existing = ctx
        .store
        .load_sheet(hub.name(), Sheet::NationalContacts)
        .note("Error reading Contacts From National")?;
    let cutoff = last_added(&existing)
        .note("Error reading last date added on Contacts From National")?
        .map(|last| last + Duration::seconds(NEWER_THAN_SLACK_SECS));

    let candidates = ctx
        .source
        .national_candidates(&hub.profile)
        .note("Issue querying national contacts")?;

    let mut report = SyncReport::new(hub.name(), script::NATIONAL);
    let mut newer = RecordSet::new();
    for candidate in candidates {
        if candidate.email().is_empty() && candidate.is_blank(field::PHONE) {
            continue;
        }
        match parse_joined(candidate.get(field::DATE_JOINED)) {
            Ok(joined) if cutoff.map_or(true, |cutoff| joined > cutoff) => newer.push(candidate),
            Ok(_) => {}
            Err(err) => report.issues.push(format!(
                "skipped national contact {}: {err}",
                describe(&candidate)
            )),
        }
    }

    let fresh = new_by_key(&existing, newer);
    report.appended = ctx
        .store
        .append_rows(hub.name(), Sheet::NationalContacts, &fresh)
        .note("Issue pushing new contacts to Contacts From National")?;
    Ok(report)
}

fn last_added(existing: &RecordSet) -> Result<Option<DateTime<Utc>>, SyncError> {
    match existing.as_slice().last() {
        Some(last) => Ok(Some(parse_joined(last.get(field::DATE_JOINED))?)),
        None => Ok(None),
    }
}

fn describe(record: &Record) -> String {
    if record.email().is_empty() {
        format!("vanid {}", record.get(field::VANID))
    } else {
        record.email().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{now, store_with, MemorySource, RecordingSink};

    fn candidate(vanid: &str, email: &str, phone: &str, joined: &str) -> Record {
        let mut record = Record::new(email);
        record.set(field::VANID, vanid);
        record.set(field::PHONE, phone);
        record.set(field::DATE_JOINED, joined);
        record
    }

    #[test]
    fn appends_only_contacts_newer_than_the_sheet() {
        let store = store_with(&[("Philly", HubState::Scheduled)]);
        store
            .append_rows(
                "Philly",
                Sheet::NationalContacts,
                &RecordSet::from(vec![
                    candidate("1", "known@example.org", "", "2026-05-01 08:00:00"),
                    candidate("2", "last@example.org", "", "2026-05-10 08:00:00"),
                ]),
            )
            .expect("seed national");

        let mut source = MemorySource::default();
        source.national.insert(
            "Philly".to_string(),
            RecordSet::from(vec![
                candidate("2", "last@example.org", "", "2026-05-10 08:00:30"),
                candidate("3", "known@example.org", "", "2026-05-12 08:00:00"),
                candidate("4", "new@example.org", "", "2026-05-12 09:00:00"),
                candidate("5", "", "2155550134", "2026-05-13 09:00:00"),
                candidate("6", "", "", "2026-05-13 09:00:00"),
                candidate("7", "bad@example.org", "", "sometime"),
            ]),
        );
        let sink = RecordingSink::default();
        let ctx = SyncContext {
            store: &store,
            source: &source,
            sink: &sink,
            now: now(),
        };

        let summary = run(&ctx).expect("run pass");
        let report = &summary.reports[0];
        assert_eq!(report.appended, 2);
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].contains("bad@example.org"));

        let sheet = store
            .load_sheet("Philly", Sheet::NationalContacts)
            .expect("load national");
        let vanids = sheet
            .iter()
            .map(|record| record.get(field::VANID).to_string())
            .collect::<Vec<_>>();
        assert_eq!(vanids, vec!["1", "2", "4", "5"]);
        assert_eq!(store.errors(Some("Philly")).expect("errors").len(), 1);
    }

    #[test]
    fn empty_sheet_takes_every_reachable_candidate() {
        let store = store_with(&[("Philly", HubState::Scheduled)]);
        let mut source = MemorySource::default();
        source.national.insert(
            "Philly".to_string(),
            RecordSet::from(vec![
                candidate("1", "a@example.org", "", "2020-01-01 00:00:00"),
                candidate("2", "a@example.org", "", "2020-01-02 00:00:00"),
            ]),
        );
        let sink = RecordingSink::default();
        let ctx = SyncContext {
            store: &store,
            source: &source,
            sink: &sink,
            now: now(),
        };

        let summary = run(&ctx).expect("run pass");
        assert_eq!(summary.appended(), 1);
    }

    #[test]
    fn source_failure_is_recorded_per_hub() {
        let store = store_with(&[("Philly", HubState::Scheduled)]);
        let source = MemorySource {
            broken_hubs: vec!["Philly".to_string()],
            ..MemorySource::default()
        };
        let sink = RecordingSink::default();
        let ctx = SyncContext {
            store: &store,
            source: &source,
            sink: &sink,
            now: now(),
        };

        let summary = run(&ctx).expect("run pass");
        assert_eq!(summary.errored_hubs, vec!["Philly".to_string()]);
        let errors = store.errors(None).expect("errors");
        assert_eq!(errors[0].script, script::NATIONAL);
        assert!(errors[0].error.contains("source offline"));
    }
}
