use crate::{run_hubs, script, NoteExt, PassSummary, SyncContext, SyncError, SyncReport};
use hubhq_core::hub::HubState;
use hubhq_core::Record;
use hubhq_storage::Sheet;
use tracing::info;

/// Stacks every scheduled hub's HQ into the members table, replacing what was
/// there. A hub whose HQ cannot be read is left out of this run.
pub fn run(ctx: &SyncContext<'_>) -> Result<PassSummary, SyncError> {
    let hubs = ctx.store.hubs_in_state(HubState::Scheduled)?;
    let mut members: Vec<(String, Record)> = Vec::new();

    let summary = run_hubs(ctx, script::COMPILE, &hubs, |hub| {
        let hq = ctx
            .store
            .load_sheet(hub.name(), Sheet::HubHq)
            .note("Error reading Hub HQ")?;
        let mut report = SyncReport::new(hub.name(), script::COMPILE);
        report.appended = hq.len();
        members.extend(hq.into_iter().map(|record| (hub.name().to_string(), record)));
        Ok(report)
    })?;

    let written = ctx.store.replace_members(&members)?;
    info!(event = "members_compiled", hubs = summary.reports.len(), members = written);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{now, store_with, MemorySource, RecordingSink};
    use hubhq_core::RecordSet;

    #[test]
    fn replaces_members_with_every_scheduled_hq() {
        let store = store_with(&[
            ("Philly", HubState::Scheduled),
            ("Boston", HubState::Scheduled),
            ("Denver", HubState::SetUp),
        ]);
        for (hub, emails) in [
            ("Philly", vec!["a@example.org", "b@example.org"]),
            ("Boston", vec!["c@example.org"]),
            ("Denver", vec!["d@example.org"]),
        ] {
            let rows = emails.into_iter().map(Record::new).collect::<RecordSet>();
            store.append_rows(hub, Sheet::HubHq, &rows).expect("seed hq");
        }
        store
            .replace_members(&[("Gone".to_string(), Record::new("old@example.org"))])
            .expect("stale members");

        let source = MemorySource::default();
        let sink = RecordingSink::default();
        let ctx = SyncContext {
            store: &store,
            source: &source,
            sink: &sink,
            now: now(),
        };

        let summary = run(&ctx).expect("run pass");
        assert_eq!(summary.appended(), 3);

        let members = store.members().expect("members");
        let hubs = members
            .iter()
            .map(|(hub, record)| format!("{hub}:{}", record.email()))
            .collect::<Vec<_>>();
        assert_eq!(
            hubs,
            vec!["Boston:c@example.org", "Philly:a@example.org", "Philly:b@example.org"]
        );
    }
}
