use crate::{run_hubs, script, HubFailure, NoteExt, PassSummary, SyncContext, SyncError, SyncReport};
use hubhq_core::compile::{compile_submissions, SubmissionLayout, SubmissionSheet};
use hubhq_core::hub::{Hub, HubState};
use hubhq_core::layout::{field, ContactSource};
use hubhq_core::reconcile::{reconcile, ClaimPolicy, MergePolicy};
use hubhq_core::timefmt::format_sheet_timestamp;
use hubhq_storage::Sheet;
use tracing::debug;

/// One submission sheet and the HQ column its compiled text lands in.
struct FormSheet {
    source: ContactSource,
    layout: SubmissionLayout,
    update_note: &'static str,
    append_note: &'static str,
    /// Data entry rows are typed in by hand and often lack a timestamp.
    stamp_appends: bool,
}

impl FormSheet {
    fn interest_form() -> Self {
        Self {
            source: ContactSource::InterestForm,
            layout: SubmissionLayout::interest_form(),
            update_note: "Error while updating form response column",
            append_note: "Error adding new Interest Form contacts",
            stamp_appends: false,
        }
    }

    fn data_entry() -> Self {
        Self {
            source: ContactSource::DataEntrySheet,
            layout: SubmissionLayout::data_entry(),
            update_note: "Error while updating data entry data column",
            append_note: "Error adding new Data Entry Sheet contacts",
            stamp_appends: true,
        }
    }
}

/// Interest form then data entry sheet into every scheduled hub's HQ and its
/// Unrestricted mirror.
pub fn run(ctx: &SyncContext<'_>) -> Result<PassSummary, SyncError> {
    let hubs = ctx.store.hubs_in_state(HubState::Scheduled)?;
    run_hubs(ctx, script::FORMS, &hubs, |hub| sync_hub(ctx, hub))
}

pub fn sync_hub(ctx: &SyncContext<'_>, hub: &Hub) -> Result<SyncReport, HubFailure> {
    let mut report = SyncReport::new(hub.name(), script::FORMS);

    let interest = ctx
        .source
        .interest_form(&hub.profile)
        .note("Error reading Interest Form")?;
    if let Some(sheet) = interest {
        apply_sheet(ctx, hub, &sheet, &FormSheet::interest_form(), &mut report)?;
    }

    // HQ is reloaded inside apply_sheet so interest form appends are matched
    // by the data entry sheet.
    let data_entry = ctx
        .source
        .data_entry(&hub.profile)
        .note("Error reading Data Entry Sheet")?;
    if let Some(sheet) = data_entry {
        apply_sheet(ctx, hub, &sheet, &FormSheet::data_entry(), &mut report)?;
    }

    Ok(report)
}

fn apply_sheet(
    ctx: &SyncContext<'_>,
    hub: &Hub,
    sheet: &SubmissionSheet,
    form: &FormSheet,
    report: &mut SyncReport,
) -> Result<(), HubFailure> {
    let compiled = compile_submissions(sheet, &form.layout);
    debug!(
        event = "submissions_compiled",
        hub = hub.name(),
        source = %form.source,
        rows = sheet.rows.len(),
        contacts = compiled.len()
    );

    let hq = ctx
        .store
        .load_sheet(hub.name(), Sheet::HubHq)
        .note("Error reading Hub HQ")?;

    let output = form.layout.output_field;
    let mut policy = MergePolicy::new(vec![output])
        .with_clear_on_miss(vec![output])
        .with_claim(ClaimPolicy {
            claimed_at: ctx.now,
        })
        .with_source(form.source);
    if form.stamp_appends {
        policy = policy.with_append_default(field::DATE_JOINED, format_sheet_timestamp(ctx.now));
    }
    let outcome = reconcile(&hq, compiled, &policy);

    let hq_fields = [output, field::DATE_CLAIMED];
    let mirror_fields = [output];
    ctx.store
        .write_fields_across(
            hub.name(),
            &outcome.updates,
            &[(Sheet::HubHq, &hq_fields[..]), (Sheet::Unrestricted, &mirror_fields[..])],
        )
        .note(form.update_note)?;
    ctx.store
        .append_rows_across(hub.name(), &[Sheet::HubHq, Sheet::Unrestricted], &outcome.appended)
        .note(form.append_note)?;

    report.matched += outcome.matched_count();
    report.appended += outcome.appended.len();
    report.absorb_issues(&outcome.issues);
    if outcome.claimed_count() > 0 {
        debug!(event = "contacts_claimed", hub = hub.name(), claimed = outcome.claimed_count());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{now, store_with, MemorySource, RecordingSink};
    use hubhq_core::compile::TOO_MUCH_DATA;
    use hubhq_core::{Record, RecordSet};

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn header() -> Vec<String> {
        cells(&[
            "Timestamp",
            "First Name",
            "Last Name",
            "Email",
            "Phone",
            "Zipcode",
            "Birth Year",
            "Why did you join?",
        ])
    }

    fn seeded_store() -> hubhq_storage::HubStore {
        let store = store_with(&[("Philly", HubState::Scheduled)]);
        let mut national = Record::new("nat@example.org");
        national.set(field::SOURCE, ContactSource::NationalEmailList.label());
        national.set(field::DATA_ENTRY_DATA, "Stale: yes\n");
        let mut stale = Record::new("stale@example.org");
        stale.set(field::INTEREST_FORM_RESPONSES, "Old: answer\n");
        let rows = RecordSet::from(vec![national, stale]);
        store
            .append_rows("Philly", Sheet::HubHq, &rows)
            .expect("seed hq");
        store
            .append_rows("Philly", Sheet::Unrestricted, &rows)
            .expect("seed unrestricted");
        store
    }

    #[test]
    fn compiles_both_sheets_into_hq_and_mirror() {
        let store = seeded_store();
        let mut source = MemorySource::default();
        source.interest_forms.insert(
            "Philly".to_string(),
            SubmissionSheet {
                header: header(),
                rows: vec![
                    cells(&["05/01/2026 09:00:00", "Nat", "", "nat@example.org", "", "", "", "climate"]),
                    cells(&["05/02/2026 09:00:00", "Ana", "", "ana@example.org", "", "", "", "friends"]),
                    cells(&["05/03/2026 09:00:00", "Ana", "", "ana@example.org", "", "", "", "jobs"]),
                ],
            },
        );
        source.data_entry.insert(
            "Philly".to_string(),
            SubmissionSheet {
                header: header(),
                rows: vec![
                    cells(&["", "Ana", "", "ana@example.org", "", "", "", "met at rally"]),
                    cells(&["", "Cy", "", "cy@example.org", "", "", "", "canvass"]),
                ],
            },
        );
        let sink = RecordingSink::default();
        let ctx = SyncContext {
            store: &store,
            source: &source,
            sink: &sink,
            now: now(),
        };

        let summary = run(&ctx).expect("run pass");
        assert!(summary.is_clean());
        let report = &summary.reports[0];
        // Interest form: nat matched, ana appended. Data entry: ana matched, cy appended.
        assert_eq!(report.matched, 2);
        assert_eq!(report.appended, 2);

        let hq = store.load_sheet("Philly", Sheet::HubHq).expect("load hq");
        let rows = hq.as_slice();
        let emails = hq.emails().collect::<Vec<_>>();
        assert_eq!(
            emails,
            vec!["nat@example.org", "stale@example.org", "ana@example.org", "cy@example.org"]
        );

        assert_eq!(rows[0].get(field::INTEREST_FORM_RESPONSES), "Why did you join?: climate\n");
        assert_eq!(rows[0].get(field::DATE_CLAIMED), "06/01/2026 12:00:00");
        assert_eq!(rows[0].get(field::DATA_ENTRY_DATA), "");
        assert_eq!(rows[1].get(field::INTEREST_FORM_RESPONSES), "");
        assert_eq!(
            rows[2].get(field::INTEREST_FORM_RESPONSES),
            "Why did you join?: friends, jobs\n"
        );
        assert_eq!(rows[2].get(field::DATA_ENTRY_DATA), "Why did you join?: met at rally\n");
        assert_eq!(rows[2].get(field::SOURCE), "Interest Form");
        assert_eq!(rows[2].get(field::DATE_JOINED), "05/02/2026 09:00:00");
        assert_eq!(rows[3].get(field::SOURCE), "Data Entry Sheet");
        assert_eq!(rows[3].get(field::DATE_JOINED), "06/01/2026 12:00:00");

        let mirror = store.load_sheet("Philly", Sheet::Unrestricted).expect("load mirror");
        assert_eq!(mirror.len(), 4);
        assert_eq!(
            mirror.as_slice()[0].get(field::INTEREST_FORM_RESPONSES),
            "Why did you join?: climate\n"
        );
        assert_eq!(mirror.as_slice()[0].get(field::DATE_CLAIMED), "");
    }

    #[test]
    fn wide_submissions_collapse_to_placeholder() {
        let store = store_with(&[("Philly", HubState::Scheduled)]);
        let mut wide_header = header();
        let mut row = cells(&["05/01/2026 09:00:00", "Ana", "Reyes", "ana@example.org", "555", "19104", "1999"]);
        for idx in 0..8 {
            wide_header.push(format!("Question {idx}"));
            row.push(format!("answer {idx}"));
        }
        let mut source = MemorySource::default();
        source.interest_forms.insert(
            "Philly".to_string(),
            SubmissionSheet {
                header: wide_header,
                rows: vec![row],
            },
        );
        let sink = RecordingSink::default();
        let ctx = SyncContext {
            store: &store,
            source: &source,
            sink: &sink,
            now: now(),
        };

        run(&ctx).expect("run pass");
        let hq = store.load_sheet("Philly", Sheet::HubHq).expect("load hq");
        assert_eq!(hq.as_slice()[0].get(field::INTEREST_FORM_RESPONSES), TOO_MUCH_DATA);
    }

    #[test]
    fn shifted_mirror_fails_only_that_hub() {
        let store = store_with(&[("Philly", HubState::Scheduled), ("Boston", HubState::Scheduled)]);
        store
            .append_rows(
                "Philly",
                Sheet::HubHq,
                &RecordSet::from(vec![Record::new("ana@example.org")]),
            )
            .expect("seed hq");
        store
            .append_rows(
                "Philly",
                Sheet::Unrestricted,
                &RecordSet::from(vec![Record::new("someone-else@example.org")]),
            )
            .expect("seed mirror");

        let form = SubmissionSheet {
            header: header(),
            rows: vec![cells(&["", "Ana", "", "ana@example.org", "", "", "", "yes"])],
        };
        let mut source = MemorySource::default();
        source.interest_forms.insert("Philly".to_string(), form.clone());
        source.interest_forms.insert("Boston".to_string(), form);
        let sink = RecordingSink::default();
        let ctx = SyncContext {
            store: &store,
            source: &source,
            sink: &sink,
            now: now(),
        };

        let summary = run(&ctx).expect("run pass");
        assert_eq!(summary.errored_hubs, vec!["Philly".to_string()]);
        let errors = store.errors(Some("Philly")).expect("errors");
        assert!(errors[0].note.starts_with("Error while updating form response column"));
        let philly = store.load_sheet("Philly", Sheet::HubHq).expect("load hq");
        assert_eq!(philly.as_slice()[0].get(field::INTEREST_FORM_RESPONSES), "");
        assert_eq!(store.row_count("Boston", Sheet::HubHq).expect("count"), 1);
    }
}
