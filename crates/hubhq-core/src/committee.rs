use crate::layout::field;
use crate::Record;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const PHONE_DIGITS: usize = 10;
const ZIP_DIGITS: usize = 5;

fn non_digits() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^0-9]").expect("valid regex"))
}

/// Digits only, keeping the last ten so country codes fall away.
pub fn normalize_phone(raw: &str) -> String {
    let digits = non_digits().replace_all(raw, "");
    let start = digits.len().saturating_sub(PHONE_DIGITS);
    digits[start..].to_string()
}

/// Digits only, keeping the first five so ZIP+4 collapses to the ZIP.
pub fn normalize_zip(raw: &str) -> String {
    let digits = non_digits().replace_all(raw, "");
    digits.chars().take(ZIP_DIGITS).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeEmail {
    pub email: String,
    #[serde(rename = "isSubscribed")]
    pub is_subscribed: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeAddress {
    #[serde(rename = "zipOrPostalCode")]
    pub zip_or_postal_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteePhone {
    #[serde(rename = "phoneNumber")]
    pub phone_number: String,
}

/// Find-or-create payload for a person in a hub's CRM committee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeUpsert {
    pub first_name: String,
    pub last_name: String,
    pub emails: Vec<CommitteeEmail>,
    pub addresses: Vec<CommitteeAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phones: Vec<CommitteePhone>,
}

/// The contact fields a committee upsert is built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeContact {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub zip: String,
}

impl CommitteeContact {
    pub fn from_record(record: &Record) -> Self {
        Self {
            first_name: record.get(field::FIRST_NAME).trim().to_string(),
            last_name: record.get(field::LAST_NAME).trim().to_string(),
            email: record.email().trim().to_string(),
            phone: record.get(field::PHONE).to_string(),
            zip: record.get(field::ZIPCODE).to_string(),
        }
    }

    pub fn to_upsert(&self) -> CommitteeUpsert {
        let phone = normalize_phone(&self.phone);
        CommitteeUpsert {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            emails: vec![CommitteeEmail {
                email: self.email.clone(),
                is_subscribed: "true".to_string(),
            }],
            addresses: vec![CommitteeAddress {
                zip_or_postal_code: normalize_zip(&self.zip),
            }],
            phones: if phone.is_empty() {
                Vec::new()
            } else {
                vec![CommitteePhone {
                    phone_number: phone,
                }]
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_phone_and_zip() {
        assert_eq!(normalize_phone("+1 (215) 555-0134"), "2155550134");
        assert_eq!(normalize_phone("555-0134"), "5550134");
        assert_eq!(normalize_phone("n/a"), "");
        assert_eq!(normalize_zip("19104-2231"), "19104");
        assert_eq!(normalize_zip(" 0210"), "0210");
    }

    #[test]
    fn upsert_payload_matches_committee_wire_shape() {
        let mut record = Record::new("ana@example.org");
        record.set(field::FIRST_NAME, "Ana");
        record.set(field::LAST_NAME, "Reyes");
        record.set(field::PHONE, "1-215-555-0134");
        record.set(field::ZIPCODE, "19104-2231");

        let payload = serde_json::to_value(CommitteeContact::from_record(&record).to_upsert())
            .expect("serialize payload");
        assert_eq!(
            payload,
            json!({
                "firstName": "Ana",
                "lastName": "Reyes",
                "emails": [{"email": "ana@example.org", "isSubscribed": "true"}],
                "addresses": [{"zipOrPostalCode": "19104"}],
                "phones": [{"phoneNumber": "2155550134"}],
            })
        );
    }

    #[test]
    fn omits_phones_when_missing() {
        let payload = CommitteeContact {
            email: "bo@example.org".to_string(),
            ..CommitteeContact::default()
        }
        .to_upsert();
        let value = serde_json::to_value(payload).expect("serialize payload");
        assert!(value.get("phones").is_none());
    }
}
