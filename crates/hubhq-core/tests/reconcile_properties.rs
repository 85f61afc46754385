//! Property tests for reconciliation, concatenation and status derivation.

use chrono::Duration;
use hubhq_core::compile::{concatenate_fields, SubmissionLayout};
use hubhq_core::layout::{field, ACTIVITY_FIELDS};
use hubhq_core::reconcile::{reconcile, MergePolicy};
use hubhq_core::status::{derive_status, MemberStatus, StatusInputs, StatusThresholds};
use hubhq_core::{Record, RecordSet};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn record(email: &str, signups: u32) -> Record {
    let mut record = Record::new(email);
    record.set(field::TOTAL_SIGNUPS, signups.to_string());
    record
}

/// Distinct local parts, split into a destination half and an incoming half.
fn arb_disjoint_emails() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
    prop::collection::btree_set("[a-z]{1,8}", 0..24).prop_flat_map(|names| {
        let names = names.into_iter().collect::<Vec<_>>();
        let len = names.len();
        (Just(names), 0..=len).prop_map(|(names, split)| {
            let emails = names
                .iter()
                .map(|name| format!("{name}@example.org"))
                .collect::<Vec<_>>();
            (emails[..split].to_vec(), emails[split..].to_vec())
        })
    })
}

fn arb_status_label() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        MemberStatus::ActiveMember,
        MemberStatus::InactiveMember,
        MemberStatus::NeverGotInvolved,
        MemberStatus::ProspectiveNewMember,
        MemberStatus::ErrorState,
    ])
    .prop_map(|status| status.label().to_string())
}

proptest! {
    #[test]
    fn disjoint_keys_update_nothing_and_append_everything(
        (dest_emails, incoming_emails) in arb_disjoint_emails(),
        signups in 0u32..50,
        incoming_status in prop::option::of(arb_status_label()),
    ) {
        let destination = dest_emails
            .iter()
            .map(|email| record(email, signups))
            .collect::<RecordSet>();
        let incoming = incoming_emails
            .iter()
            .map(|email| {
                let mut contact = record(email, signups + 1);
                if let Some(label) = &incoming_status {
                    contact.set(field::STATUS, label.as_str());
                }
                contact
            })
            .collect::<RecordSet>();

        let outcome = reconcile(&destination, incoming.clone(), &MergePolicy::new(ACTIVITY_FIELDS.to_vec()));

        prop_assert_eq!(outcome.matched_count(), 0);
        prop_assert_eq!(
            outcome.updated_records().cloned().collect::<Vec<_>>(),
            destination.into_vec()
        );
        prop_assert_eq!(outcome.appended.len(), incoming.len());
        for (appended, sent) in outcome.appended.iter().zip(incoming.iter()) {
            let mut expected = sent.clone();
            expected.set(field::STATUS, MemberStatus::HotLead.label());
            prop_assert_eq!(appended, &expected);
        }
    }

    #[test]
    fn fully_matching_keys_append_nothing(
        names in prop::collection::btree_set("[a-z]{1,8}", 1..24),
        seed in any::<u64>(),
    ) {
        let emails = names
            .iter()
            .map(|name| format!("{name}@example.org"))
            .collect::<Vec<_>>();
        let destination = emails.iter().map(|email| record(email, 1)).collect::<RecordSet>();
        let mut shuffled = emails.clone();
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        let incoming = shuffled.iter().map(|email| record(email, 7)).collect::<RecordSet>();

        let outcome = reconcile(&destination, incoming, &MergePolicy::new(ACTIVITY_FIELDS.to_vec()));

        prop_assert!(outcome.appended.is_empty());
        prop_assert_eq!(outcome.updates.len(), destination.len());
        prop_assert_eq!(outcome.matched_count(), destination.len());
        for (position, update) in outcome.updates.iter().enumerate() {
            prop_assert_eq!(update.position, position);
            prop_assert_eq!(update.record.email(), destination.as_slice()[position].email());
            prop_assert_eq!(update.record.get(field::TOTAL_SIGNUPS), "7");
        }
    }

    #[test]
    fn concatenation_preserves_column_order(
        labels in prop::collection::btree_set("[A-Z][a-z]{2,6}", 1..6),
        values in prop::collection::vec("[a-z0-9]{1,5}", 6),
    ) {
        let layout = SubmissionLayout::interest_form();
        let labels = labels.into_iter().collect::<Vec<_>>();
        let mut header = vec![String::new(); layout.boundary];
        header.extend(labels.iter().cloned());
        let mut row = vec![String::new(); layout.boundary];
        row[3] = "x@example.org".to_string();
        row.extend(values.iter().take(labels.len()).cloned());

        let text = concatenate_fields(&header, &row, &layout);

        let mut last = 0usize;
        for label in &labels {
            let needle = format!("{label}: ");
            let found = text[last..].find(&needle);
            prop_assert!(found.is_some(), "{} missing from {:?}", label, text);
            last += found.unwrap_or(0) + needle.len();
        }
    }

    #[test]
    fn status_is_total_and_error_free_with_complete_metrics(
        age_days in 0i64..2_000,
        signups in 0u32..200,
        days_since_last_signup in 0i64..2_000,
        event_threshold in 0u32..50,
        inactivity_days in 0i64..400,
    ) {
        let inputs = StatusInputs {
            age: Duration::days(age_days),
            signups,
            days_since_last_signup: Some(days_since_last_signup),
        };
        let thresholds = StatusThresholds { event_threshold, inactivity_days };
        let status = derive_status(&inputs, &thresholds);

        prop_assert!(!status.is_error());
        let expected = if age_days <= 7 {
            MemberStatus::HotLead
        } else if age_days <= 60 {
            MemberStatus::ProspectiveNewMember
        } else if signups > event_threshold && days_since_last_signup < inactivity_days {
            MemberStatus::ActiveMember
        } else if signups > event_threshold {
            MemberStatus::InactiveMember
        } else {
            MemberStatus::NeverGotInvolved
        };
        prop_assert_eq!(status, expected);
    }
}

#[test]
fn error_state_is_reachable_only_without_recency() {
    let thresholds = StatusThresholds::default();
    let mut reached = BTreeSet::new();
    for age_days in [0, 7, 8, 60, 61, 365] {
        for signups in [0, 1, 2, 10] {
            for last in [None, Some(0), Some(59), Some(60), Some(900)] {
                let status = derive_status(
                    &StatusInputs {
                        age: Duration::days(age_days),
                        signups,
                        days_since_last_signup: last,
                    },
                    &thresholds,
                );
                if status.is_error() {
                    assert!(last.is_none() && age_days > 60 && signups > 1);
                }
                reached.insert(status.code());
            }
        }
    }
    assert_eq!(reached.len(), 6);
}
