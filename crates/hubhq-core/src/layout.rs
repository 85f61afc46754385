use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod field {
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const EMAIL: &str = crate::EMAIL_FIELD;
    pub const PHONE: &str = "phone";
    pub const STATUS: &str = "status";
    pub const DATE_JOINED: &str = "date_joined";
    pub const TOTAL_SIGNUPS: &str = "total_signups";
    pub const TOTAL_ATTENDANCES: &str = "total_attendances";
    pub const FIRST_SIGNUP: &str = "first_signup";
    pub const FIRST_ATTENDANCE: &str = "first_attendance";
    pub const DAYS_SINCE_LAST_SIGNUP: &str = "days_since_last_signup";
    pub const DAYS_SINCE_LAST_ATTENDANCE: &str = "days_since_last_attendance";
    pub const INTEREST_FORM_RESPONSES: &str = "interest_form_responses";
    pub const DATA_ENTRY_DATA: &str = "data_entry_data";
    pub const ZIPCODE: &str = "zipcode";
    pub const BIRTHYEAR: &str = "birthyear";
    pub const SOURCE: &str = "source";
    pub const DATE_CLAIMED: &str = "date_claimed";
    pub const VANID: &str = "vanid";
    pub const AGE: &str = "age";
}

pub const HQ_COLUMNS: [&str; 18] = [
    field::FIRST_NAME,
    field::LAST_NAME,
    field::EMAIL,
    field::PHONE,
    field::STATUS,
    field::DATE_JOINED,
    field::TOTAL_SIGNUPS,
    field::TOTAL_ATTENDANCES,
    field::FIRST_SIGNUP,
    field::FIRST_ATTENDANCE,
    field::DAYS_SINCE_LAST_SIGNUP,
    field::DAYS_SINCE_LAST_ATTENDANCE,
    field::INTEREST_FORM_RESPONSES,
    field::DATA_ENTRY_DATA,
    field::ZIPCODE,
    field::BIRTHYEAR,
    field::SOURCE,
    field::DATE_CLAIMED,
];

pub const UNRESTRICTED_COLUMNS: [&str; 9] = [
    field::FIRST_NAME,
    field::LAST_NAME,
    field::EMAIL,
    field::PHONE,
    field::DATE_JOINED,
    field::INTEREST_FORM_RESPONSES,
    field::DATA_ENTRY_DATA,
    field::ZIPCODE,
    field::BIRTHYEAR,
];

pub const NATIONAL_COLUMNS: [&str; 7] = [
    field::VANID,
    field::FIRST_NAME,
    field::LAST_NAME,
    field::EMAIL,
    field::PHONE,
    field::DATE_JOINED,
    field::AGE,
];

/// Fields owned by the event-attendance pass.
pub const ACTIVITY_FIELDS: [&str; 6] = [
    field::TOTAL_SIGNUPS,
    field::TOTAL_ATTENDANCES,
    field::FIRST_SIGNUP,
    field::FIRST_ATTENDANCE,
    field::DAYS_SINCE_LAST_SIGNUP,
    field::DAYS_SINCE_LAST_ATTENDANCE,
];

/// Leading columns of an interest form or data entry sheet. Everything to
/// the right of `birthyear` is free text compiled into one cell.
pub const SUBMISSION_BASE_COLUMNS: [&str; 7] = [
    field::DATE_JOINED,
    field::FIRST_NAME,
    field::LAST_NAME,
    field::EMAIL,
    field::PHONE,
    field::ZIPCODE,
    field::BIRTHYEAR,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    Mobilize,
    InterestForm,
    DataEntrySheet,
    NationalEmailList,
}

impl ContactSource {
    pub fn label(&self) -> &'static str {
        match self {
            ContactSource::Mobilize => "Mobilize",
            ContactSource::InterestForm => "Interest Form",
            ContactSource::DataEntrySheet => "Data Entry Sheet",
            ContactSource::NationalEmailList => "National Email List",
        }
    }
}

impl fmt::Display for ContactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ContactSource {
    type Err = CoreError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "mobilize" => Ok(ContactSource::Mobilize),
            "interest form" => Ok(ContactSource::InterestForm),
            "data entry sheet" | "data entry" => Ok(ContactSource::DataEntrySheet),
            "national email list" | "national" => Ok(ContactSource::NationalEmailList),
            _ => Err(CoreError::UnknownSource(input.to_string())),
        }
    }
}
