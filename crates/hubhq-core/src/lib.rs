use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod attendance;
pub mod committee;
pub mod compile;
pub mod hub;
pub mod layout;
pub mod reconcile;
pub mod status;
pub mod timefmt;

pub const EMAIL_FIELD: &str = "email";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("record is missing an `email` field")]
    MissingEmail,
    #[error("unsupported value for field {field}: {kind}")]
    UnsupportedValue { field: String, kind: &'static str },
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    #[error("unknown contact source: {0}")]
    UnknownSource(String),
}

/// One contact row keyed by field name. Every record carries an email, which
/// may be empty for rows that can only be reached by phone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, Value>", into = "BTreeMap<String, String>")]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(email: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(EMAIL_FIELD.to_string(), email.into());
        Self { fields }
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, CoreError>
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect::<BTreeMap<String, String>>();
        if !fields.contains_key(EMAIL_FIELD) {
            return Err(CoreError::MissingEmail);
        }
        Ok(Self { fields })
    }

    /// Builds a record from a positional row. Cells past the end of a short
    /// row read as empty.
    pub fn from_row(columns: &[&str], row: &[String]) -> Result<Self, CoreError> {
        Self::from_pairs(
            columns
                .iter()
                .enumerate()
                .map(|(idx, column)| (*column, row.get(idx).cloned().unwrap_or_default())),
        )
    }

    pub fn to_row(&self, columns: &[&str]) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.get(column).to_string())
            .collect()
    }

    pub fn email(&self) -> &str {
        self.get(EMAIL_FIELD)
    }

    pub fn get(&self, field: &str) -> &str {
        self.fields.get(field).map(String::as_str).unwrap_or("")
    }

    pub fn is_blank(&self, field: &str) -> bool {
        self.get(field).trim().is_empty()
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn set_if_blank(&mut self, field: &str, value: &str) {
        if self.is_blank(field) {
            self.set(field, value);
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn populated_count(&self) -> usize {
        self.fields.values().filter(|value| !value.is_empty()).count()
    }
}

impl TryFrom<BTreeMap<String, Value>> for Record {
    type Error = CoreError;

    fn try_from(raw: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        let mut fields = BTreeMap::new();
        for (key, value) in raw {
            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Array(_) => {
                    return Err(CoreError::UnsupportedValue {
                        field: key,
                        kind: "array",
                    })
                }
                Value::Object(_) => {
                    return Err(CoreError::UnsupportedValue {
                        field: key,
                        kind: "object",
                    })
                }
            };
            fields.insert(key, text);
        }
        if !fields.contains_key(EMAIL_FIELD) {
            return Err(CoreError::MissingEmail);
        }
        Ok(Self { fields })
    }
}

impl From<Record> for BTreeMap<String, String> {
    fn from(record: Record) -> Self {
        record.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.email().is_empty() {
            f.write_str("<no email>")
        } else {
            f.write_str(self.email())
        }
    }
}

/// Ordered records from one source. Position is meaningful for destination
/// sets: it is the row a bulk write lands on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }

    pub fn emails(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(Record::email)
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.records
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<T: IntoIterator<Item = Record>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
