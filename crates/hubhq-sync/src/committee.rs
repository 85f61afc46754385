use crate::source::CorrectedContact;
use crate::{run_hubs, script, HubFailure, NoteExt, PassSummary, SyncContext, SyncError, SyncReport};
use hubhq_core::committee::CommitteeContact;
use hubhq_core::hub::{Hub, HubState};
use hubhq_core::layout::field;
use hubhq_core::timefmt::parse_joined;
use hubhq_core::RecordSet;
use hubhq_storage::{Sheet, UpsertErrorEntry};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// HQ contacts who joined since each scheduled hub's last successful sync
/// are upserted to the hub's committee.
///
/// In the reports `matched` counts contacts selected for upsert and
/// `appended` counts upserts the committee accepted.
pub fn run(ctx: &SyncContext<'_>) -> Result<PassSummary, SyncError> {
    let hubs = ctx.store.hubs_in_state(HubState::Scheduled)?;
    let summary = run_hubs(ctx, script::COMMITTEE, &hubs, |hub| sync_hub(ctx, hub))?;
    log_upsert_totals(&summary);
    Ok(summary)
}

pub fn sync_hub(ctx: &SyncContext<'_>, hub: &Hub) -> Result<SyncReport, HubFailure> {
    let last_sync = ctx
        .store
        .last_committee_sync(hub.name())
        .note("Error reading committee sync control table")?;
    let hq = ctx
        .store
        .load_sheet(hub.name(), Sheet::HubHq)
        .note("Error reading Hub HQ")?;

    let mut report = SyncReport::new(hub.name(), script::COMMITTEE);
    let selected = match last_sync {
        Some(last_sync) => {
            let mut selected = RecordSet::new();
            for record in &hq {
                match parse_joined(record.get(field::DATE_JOINED)) {
                    Ok(joined) if joined > last_sync => selected.push(record.clone()),
                    Ok(_) => {}
                    Err(err) => report
                        .issues
                        .push(format!("not upserted {}: {err}", record.email())),
                }
            }
            selected
        }
        None => {
            ctx.log_error(
                script::COMMITTEE,
                hub.name(),
                "no committee sync recorded",
                "",
                "No record of hub in control table, could be hubs first run",
            )
            .note("Error writing errors table")?;
            hq
        }
    };

    report.matched = selected.len();
    for record in &selected {
        let contact = CommitteeContact::from_record(record);
        if upsert_contact(ctx, hub, &contact)? {
            report.appended += 1;
        }
    }

    ctx.store
        .record_committee_sync(hub.name(), ctx.now)
        .note("Error updating committee sync control table")?;
    Ok(report)
}

/// Corrected contacts from earlier failed upserts, tried again against their
/// hub's committee. The corrections replace every pending failure of a hub,
/// so those are closed out and contacts that fail again are logged anew.
pub fn retry(ctx: &SyncContext<'_>) -> Result<PassSummary, SyncError> {
    let corrections = ctx.source.upsert_corrections()?;
    let mut by_hub: BTreeMap<String, Vec<CorrectedContact>> = BTreeMap::new();
    for contact in corrections {
        by_hub.entry(contact.hub.clone()).or_default().push(contact);
    }

    let mut hubs = Vec::new();
    let mut unknown = Vec::new();
    for name in by_hub.keys() {
        match ctx.store.hub(name)? {
            Some(hub) => hubs.push(hub),
            None => {
                warn!(event = "retry_unknown_hub", hub = %name);
                ctx.log_error(
                    script::RETRY,
                    name,
                    "hub is not registered",
                    "",
                    "Corrected contacts reference an unknown hub",
                )?;
                unknown.push(name.clone());
            }
        }
    }

    let mut summary = run_hubs(ctx, script::RETRY, &hubs, |hub| {
        let contacts = by_hub.get(hub.name()).map(Vec::as_slice).unwrap_or_default();
        retry_hub(ctx, hub, contacts)
    })?;
    summary.errored_hubs.extend(unknown);
    log_upsert_totals(&summary);
    Ok(summary)
}

fn retry_hub(
    ctx: &SyncContext<'_>,
    hub: &Hub,
    contacts: &[CorrectedContact],
) -> Result<SyncReport, HubFailure> {
    let superseded = ctx
        .store
        .pending_upsert_errors(Some(hub.name()))
        .note("Error reading committee upsert errors")?
        .into_iter()
        .filter_map(|entry| entry.id)
        .collect::<Vec<_>>();
    ctx.store
        .mark_upsert_retried(&superseded, ctx.now)
        .note("Error updating committee upsert errors")?;

    let mut report = SyncReport::new(hub.name(), script::RETRY);
    report.matched = contacts.len();
    for corrected in contacts {
        let contact = CommitteeContact {
            first_name: corrected.first_name.clone(),
            last_name: corrected.last_name.clone(),
            email: corrected.email.clone(),
            phone: corrected.phone.clone(),
            zip: corrected.zip.clone(),
        };
        if upsert_contact(ctx, hub, &contact)? {
            report.appended += 1;
        }
    }
    Ok(report)
}

/// Returns whether the committee accepted the contact. A refusal is logged
/// to the upsert errors table and is not a hub failure.
fn upsert_contact(
    ctx: &SyncContext<'_>,
    hub: &Hub,
    contact: &CommitteeContact,
) -> Result<bool, HubFailure> {
    let payload = contact.to_upsert();
    match ctx.sink.upsert(&hub.profile, &payload) {
        Ok(()) => Ok(true),
        Err(err) => {
            warn!(
                event = "upsert_error",
                hub = hub.name(),
                email = %contact.email,
                error = %err
            );
            ctx.store
                .log_upsert_error(&UpsertErrorEntry {
                    id: None,
                    date: ctx.today(),
                    hub: hub.name().to_string(),
                    first_name: contact.first_name.clone(),
                    last_name: contact.last_name.clone(),
                    email: contact.email.clone(),
                    phone: payload
                        .phones
                        .first()
                        .map(|phone| phone.phone_number.clone())
                        .unwrap_or_default(),
                    zip: payload
                        .addresses
                        .first()
                        .map(|address| address.zip_or_postal_code.clone())
                        .unwrap_or_default(),
                    error: err.to_string(),
                })
                .note("Error writing committee upsert errors")?;
            Ok(false)
        }
    }
}

fn log_upsert_totals(summary: &PassSummary) {
    let failed = summary.matched().saturating_sub(summary.appended());
    if failed == 0 {
        info!(
            event = "upserts_complete",
            script = summary.script,
            "All contacts were subscribed to the correct committees without errors"
        );
    } else {
        warn!(
            event = "upserts_complete",
            script = summary.script,
            failed,
            "{failed} errored contacts"
        );
    }
}
