use crate::{run_hubs, script, HubFailure, NoteExt, PassSummary, SyncContext, SyncError, SyncReport};
use hubhq_core::attendance::{summaries_to_records, summarize_participations};
use hubhq_core::hub::{Hub, HubState};
use hubhq_core::layout::{field, ContactSource, ACTIVITY_FIELDS};
use hubhq_core::reconcile::{reconcile, MergePolicy, StatusPolicy};
use hubhq_storage::Sheet;
use tracing::debug;

/// Event signups into every scheduled hub's HQ: activity columns refreshed,
/// status recomputed, first-time attendees appended.
pub fn run(ctx: &SyncContext<'_>) -> Result<PassSummary, SyncError> {
    let hubs = ctx.store.hubs_in_state(HubState::Scheduled)?;
    run_hubs(ctx, script::ATTENDANCE, &hubs, |hub| sync_hub(ctx, hub))
}

pub fn sync_hub(ctx: &SyncContext<'_>, hub: &Hub) -> Result<SyncReport, HubFailure> {
    let participations = ctx
        .source
        .participations(&hub.profile)
        .note("Error reading event participations")?;
    let summaries = summarize_participations(&participations, &hub.profile.hub_email);
    if summaries.is_empty() {
        return Err(SyncError::NoAttendance(hub.profile.hub_email.clone()))
            .note("No event attendance associated with hub email");
    }
    debug!(
        event = "attendance_summarized",
        hub = hub.name(),
        participations = participations.len(),
        contacts = summaries.len()
    );

    let incoming = summaries_to_records(&summaries, ctx.today());
    let hq = ctx
        .store
        .load_sheet(hub.name(), Sheet::HubHq)
        .note("Error reading Hub HQ")?;

    let policy = MergePolicy::new(ACTIVITY_FIELDS.to_vec())
        .with_status(StatusPolicy::Recompute {
            thresholds: hub.thresholds,
            now: ctx.now,
        })
        .with_source(ContactSource::Mobilize);
    let outcome = reconcile(&hq, incoming, &policy);

    let mut written = ACTIVITY_FIELDS.to_vec();
    written.push(field::STATUS);
    ctx.store
        .write_fields(hub.name(), Sheet::HubHq, &outcome.updates, &written)
        .note("Error applying event sign up updates")?;
    ctx.store
        .append_rows(hub.name(), Sheet::HubHq, &outcome.appended)
        .note("Error appending new event attendees")?;

    let mut report = SyncReport::new(hub.name(), script::ATTENDANCE);
    report.matched = outcome.matched_count();
    report.appended = outcome.appended.len();
    report.absorb_issues(&outcome.issues);
    Ok(report)
}
