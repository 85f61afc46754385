use crate::layout::field;
use crate::timefmt::parse_joined;
use crate::{CoreError, Record};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const HOT_LEAD_DAYS: i64 = 7;
pub const PROSPECTIVE_DAYS: i64 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberStatus {
    HotLead,
    ProspectiveNewMember,
    ActiveMember,
    InactiveMember,
    NeverGotInvolved,
    ErrorState,
}

impl MemberStatus {
    /// Label written into the sheet's status column.
    pub fn label(&self) -> &'static str {
        match self {
            MemberStatus::HotLead => "HOT LEAD",
            MemberStatus::ProspectiveNewMember => "Prospective/New Member",
            MemberStatus::ActiveMember => "Active Member",
            MemberStatus::InactiveMember => "Inactive Member",
            MemberStatus::NeverGotInvolved => "Never got involved",
            MemberStatus::ErrorState => "Error (contact hub support)",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            MemberStatus::HotLead => "HOT_LEAD",
            MemberStatus::ProspectiveNewMember => "PROSPECTIVE_NEW_MEMBER",
            MemberStatus::ActiveMember => "ACTIVE_MEMBER",
            MemberStatus::InactiveMember => "INACTIVE_MEMBER",
            MemberStatus::NeverGotInvolved => "NEVER_GOT_INVOLVED",
            MemberStatus::ErrorState => "ERROR_STATE",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MemberStatus::ErrorState)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MemberStatus {
    type Err = CoreError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['_', '/'], " ");
        match normalized.as_str() {
            "hot lead" => Ok(MemberStatus::HotLead),
            "prospective new member" => Ok(MemberStatus::ProspectiveNewMember),
            "active member" => Ok(MemberStatus::ActiveMember),
            "inactive member" => Ok(MemberStatus::InactiveMember),
            "never got involved" => Ok(MemberStatus::NeverGotInvolved),
            "error state" | "error (contact hub support)" => Ok(MemberStatus::ErrorState),
            _ => Err(CoreError::UnknownStatus(input.to_string())),
        }
    }
}

/// Per-hub thresholds from the hub settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusThresholds {
    /// Signups a person needs beyond this count to be considered a member.
    pub event_threshold: u32,
    /// Days without a signup before a member is considered inactive.
    pub inactivity_days: i64,
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            event_threshold: 1,
            inactivity_days: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInputs {
    pub age: Duration,
    pub signups: u32,
    pub days_since_last_signup: Option<i64>,
}

impl StatusInputs {
    /// Reads the activity metrics off a Hub HQ row. A blank signup count reads
    /// as zero; a blank or non-numeric recency reads as unknown.
    pub fn from_record(record: &Record, now: DateTime<Utc>) -> Result<Self, CoreError> {
        let joined = parse_joined(record.get(field::DATE_JOINED))?;
        let signups = parse_count(record.get(field::TOTAL_SIGNUPS)).unwrap_or(0);
        let days_since_last_signup = parse_days(record.get(field::DAYS_SINCE_LAST_SIGNUP));
        Ok(Self {
            age: now - joined,
            signups,
            days_since_last_signup,
        })
    }
}

pub fn derive_status(inputs: &StatusInputs, thresholds: &StatusThresholds) -> MemberStatus {
    let hot_lead = Duration::days(HOT_LEAD_DAYS);
    let prospective = Duration::days(PROSPECTIVE_DAYS);
    let member = inputs.signups > thresholds.event_threshold;

    if inputs.age <= hot_lead {
        MemberStatus::HotLead
    } else if inputs.age <= prospective {
        MemberStatus::ProspectiveNewMember
    } else if member {
        match inputs.days_since_last_signup {
            Some(days) if days < thresholds.inactivity_days => MemberStatus::ActiveMember,
            Some(_) => MemberStatus::InactiveMember,
            None => MemberStatus::ErrorState,
        }
    } else {
        MemberStatus::NeverGotInvolved
    }
}

fn parse_count(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    trimmed
        .parse::<u32>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(|v| v.max(0.0) as u32))
}

fn parse_days(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(|v| v as i64))
}
