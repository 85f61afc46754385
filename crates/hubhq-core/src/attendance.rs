use crate::layout::field;
use crate::timefmt::{format_day, format_sheet_timestamp};
use crate::{Record, RecordSet};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One event signup as exported by the event platform. A participation can be
/// exported several times; the most recently created copy wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    pub participation_id: String,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub event_id: String,
    #[serde(default)]
    pub event_creator_email: String,
    #[serde(default)]
    pub attended: bool,
    pub start_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSummary {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub joined: DateTime<Utc>,
    pub total_signups: u32,
    pub total_attendances: u32,
    pub first_signup: NaiveDate,
    pub first_attendance: Option<NaiveDate>,
    pub last_signup: NaiveDate,
    pub last_attendance: Option<NaiveDate>,
}

impl AttendanceSummary {
    fn start(participation: &Participation) -> Self {
        let attended = participation.attended.then_some(participation.start_date);
        Self {
            email: participation.email.clone(),
            first_name: participation.first_name.clone(),
            last_name: participation.last_name.clone(),
            phone: participation.phone.clone(),
            joined: participation.created_date,
            total_signups: 1,
            total_attendances: u32::from(participation.attended),
            first_signup: participation.start_date,
            first_attendance: attended,
            last_signup: participation.start_date,
            last_attendance: attended,
        }
    }

    fn absorb(&mut self, participation: &Participation) {
        self.first_name = max_text(&self.first_name, &participation.first_name);
        self.last_name = max_text(&self.last_name, &participation.last_name);
        self.phone = max_text(&self.phone, &participation.phone);
        self.joined = self.joined.min(participation.created_date);
        self.total_signups += 1;
        self.first_signup = self.first_signup.min(participation.start_date);
        self.last_signup = self.last_signup.max(participation.start_date);
        if participation.attended {
            self.total_attendances += 1;
            let day = participation.start_date;
            self.first_attendance = Some(self.first_attendance.map_or(day, |d| d.min(day)));
            self.last_attendance = Some(self.last_attendance.map_or(day, |d| d.max(day)));
        }
    }

    /// Hub HQ row fields for this contact, recency measured in whole days to
    /// `today`.
    pub fn to_record(&self, today: NaiveDate) -> Record {
        let mut record = Record::new(self.email.clone());
        record.set(field::FIRST_NAME, self.first_name.clone());
        record.set(field::LAST_NAME, self.last_name.clone());
        record.set(field::PHONE, self.phone.clone());
        record.set(field::DATE_JOINED, format_sheet_timestamp(self.joined));
        record.set(field::TOTAL_SIGNUPS, self.total_signups.to_string());
        record.set(field::TOTAL_ATTENDANCES, self.total_attendances.to_string());
        record.set(field::FIRST_SIGNUP, format_day(self.first_signup));
        record.set(
            field::FIRST_ATTENDANCE,
            self.first_attendance.map(format_day).unwrap_or_default(),
        );
        record.set(
            field::DAYS_SINCE_LAST_SIGNUP,
            (today - self.last_signup).num_days().to_string(),
        );
        record.set(
            field::DAYS_SINCE_LAST_ATTENDANCE,
            self.last_attendance
                .map(|day| (today - day).num_days().to_string())
                .unwrap_or_default(),
        );
        record
    }
}

/// Per-email attendance summaries for the events created by `hub_email`
/// (compared case-insensitively), ordered by when each person first signed
/// up.
pub fn summarize_participations(
    participations: &[Participation],
    hub_email: &str,
) -> Vec<AttendanceSummary> {
    let hub_email = hub_email.trim().to_lowercase();
    let mut latest: BTreeMap<&str, &Participation> = BTreeMap::new();
    for participation in participations {
        if participation.event_creator_email.trim().to_lowercase() != hub_email {
            continue;
        }
        latest
            .entry(participation.participation_id.as_str())
            .and_modify(|current| {
                if participation.created_date > current.created_date {
                    *current = participation;
                }
            })
            .or_insert(participation);
    }

    let mut by_email: HashMap<&str, AttendanceSummary> = HashMap::new();
    for participation in latest.values() {
        if participation.email.trim().is_empty() {
            continue;
        }
        by_email
            .entry(participation.email.as_str())
            .and_modify(|summary| summary.absorb(participation))
            .or_insert_with(|| AttendanceSummary::start(participation));
    }

    let mut summaries = by_email.into_values().collect::<Vec<_>>();
    summaries.sort_by(|a, b| a.joined.cmp(&b.joined).then_with(|| a.email.cmp(&b.email)));
    summaries
}

pub fn summaries_to_records(summaries: &[AttendanceSummary], today: NaiveDate) -> RecordSet {
    summaries
        .iter()
        .map(|summary| summary.to_record(today))
        .collect()
}

fn max_text(current: &str, candidate: &str) -> String {
    if candidate > current {
        candidate.to_string()
    } else {
        current.to_string()
    }
}
