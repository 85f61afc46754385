use crate::{run_hubs, script, HubFailure, NoteExt, PassSummary, SyncContext, SyncError, SyncReport};
use hubhq_core::attendance::{summaries_to_records, summarize_participations};
use hubhq_core::hub::{Hub, HubState};
use hubhq_core::layout::{field, ContactSource};
use hubhq_core::reconcile::new_by_key;
use hubhq_core::status::MemberStatus;
use hubhq_core::timefmt::{format_sheet_timestamp, parse_joined};
use hubhq_core::{Record, RecordSet};
use hubhq_storage::Sheet;
use std::collections::HashSet;
use tracing::info;

/// Seeds the HQ of every hub still in set-up from the national list and its
/// event history, then moves it onto the schedule. Hubs that fail stay in
/// set-up and are tried again next run.
pub fn run(ctx: &SyncContext<'_>) -> Result<PassSummary, SyncError> {
    let hubs = ctx.store.hubs_in_state(HubState::SetUp)?;
    if hubs.is_empty() {
        info!(event = "setup_idle", "no hubs waiting for set up");
    }
    let summary = run_hubs(ctx, script::SETUP, &hubs, |hub| setup_hub(ctx, hub))?;
    info!(
        event = "setup_complete",
        succeeded = summary.reports.len(),
        "Set up succeeded for {} hub(s)",
        summary.reports.len()
    );
    Ok(summary)
}

pub fn setup_hub(ctx: &SyncContext<'_>, hub: &Hub) -> Result<SyncReport, HubFailure> {
    let candidates = ctx
        .source
        .national_candidates(&hub.profile)
        .note("Issue querying national contacts")?;
    let participations = ctx
        .source
        .participations(&hub.profile)
        .note("Issue querying event attendance")?;

    let summaries = summarize_participations(&participations, &hub.profile.hub_email);
    let attendees = summaries_to_records(&summaries, ctx.today());
    let attendee_emails = attendees.emails().collect::<HashSet<_>>();

    let reachable = candidates
        .into_iter()
        .filter(|record| !record.email().is_empty() || !record.is_blank(field::PHONE))
        .collect::<RecordSet>();

    let mut seed = RecordSet::new();
    for candidate in &reachable {
        if attendee_emails.contains(candidate.email()) {
            continue;
        }
        seed.push(national_hq_row(candidate));
    }
    for attendee in &attendees {
        let mut record = attendee.clone();
        stamp_new(&mut record, ContactSource::Mobilize);
        seed.push(record);
    }

    let hq = ctx
        .store
        .load_sheet(hub.name(), Sheet::HubHq)
        .note("Error reading Hub HQ")?;
    let fresh = new_by_key(&hq, seed);
    ctx.store
        .append_rows_across(hub.name(), &[Sheet::HubHq, Sheet::Unrestricted], &fresh)
        .note("Error appending new contacts")?;

    let national_sheet = ctx
        .store
        .load_sheet(hub.name(), Sheet::NationalContacts)
        .note("Error reading Contacts From National")?;
    ctx.store
        .append_rows(
            hub.name(),
            Sheet::NationalContacts,
            &new_by_key(&national_sheet, reachable),
        )
        .note("Error seeding Contacts From National")?;

    ctx.store
        .set_hub_state(hub.name(), HubState::Scheduled)
        .note("Error moving hub to scheduled")?;

    let mut report = SyncReport::new(hub.name(), script::SETUP);
    report.appended = fresh.len();
    Ok(report)
}

fn national_hq_row(candidate: &Record) -> Record {
    let mut record = candidate.clone();
    if let Ok(joined) = parse_joined(candidate.get(field::DATE_JOINED)) {
        record.set(field::DATE_JOINED, format_sheet_timestamp(joined));
    }
    stamp_new(&mut record, ContactSource::NationalEmailList);
    record
}

fn stamp_new(record: &mut Record, source: ContactSource) {
    record.set_if_blank(field::STATUS, MemberStatus::HotLead.label());
    record.set_if_blank(field::SOURCE, source.label());
}
