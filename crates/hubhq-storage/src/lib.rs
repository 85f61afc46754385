use chrono::{DateTime, NaiveDate, Utc};
use hubhq_core::hub::{Hub, HubProfile, HubState};
use hubhq_core::layout::{HQ_COLUMNS, NATIONAL_COLUMNS, UNRESTRICTED_COLUMNS};
use hubhq_core::reconcile::RowUpdate;
use hubhq_core::status::StatusThresholds;
use hubhq_core::timefmt::DAY;
use hubhq_core::{Record, RecordSet};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use thiserror::Error;

pub const HUB_SCHEMA_VERSION: i64 = 2;
/// Error text and detail columns are capped like the warehouse table they
/// replace.
pub const ERROR_TEXT_LIMIT: usize = 999;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("unknown hub: {0}")]
    UnknownHub(String),
    #[error(
        "row {position} of {sheet} for hub {hub} holds {found:?}, update expected {expected:?}"
    )]
    PositionMismatch {
        hub: String,
        sheet: &'static str,
        position: usize,
        expected: String,
        found: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sheet {
    HubHq,
    Unrestricted,
    NationalContacts,
}

impl Sheet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sheet::HubHq => "hub_hq",
            Sheet::Unrestricted => "unrestricted",
            Sheet::NationalContacts => "national_contacts",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Sheet::HubHq => &HQ_COLUMNS,
            Sheet::Unrestricted => &UNRESTRICTED_COLUMNS,
            Sheet::NationalContacts => &NATIONAL_COLUMNS,
        }
    }
}

/// One row of the hub errors table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub date: NaiveDate,
    pub script: String,
    pub hub: String,
    pub error: String,
    pub detail: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertErrorEntry {
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub hub: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub zip: String,
    pub error: String,
}

pub struct HubStore {
    conn: Connection,
}

impl HubStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let mut current = self.schema_version()?;
        if current > HUB_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: HUB_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_hub_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
            current = 1;
        }

        if current < 2 {
            let sql = include_str!("../migrations/0002_upsert_retry.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 2", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    /// Inserts a hub or refreshes its profile. An existing hub keeps its
    /// state and thresholds.
    pub fn register_hub(
        &self,
        profile: &HubProfile,
        state: HubState,
        thresholds: StatusThresholds,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let existed = self.hub(&profile.hub_name)?.is_some();
        self.conn.execute(
            "
            INSERT INTO hubs (
                hub_name,
                hub_email,
                spreadsheet_id,
                zipcode,
                search_radius,
                state,
                event_threshold,
                inactivity_days,
                registered_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(hub_name) DO UPDATE SET
                hub_email=excluded.hub_email,
                spreadsheet_id=excluded.spreadsheet_id,
                zipcode=excluded.zipcode,
                search_radius=excluded.search_radius
            ",
            params![
                profile.hub_name,
                profile.hub_email,
                profile.spreadsheet_id,
                profile.zipcode,
                i64::from(profile.search_radius),
                state.as_str(),
                i64::from(thresholds.event_threshold),
                thresholds.inactivity_days,
                now.to_rfc3339(),
            ],
        )?;
        Ok(!existed)
    }

    pub fn hub(&self, hub_name: &str) -> Result<Option<Hub>, StorageError> {
        let hub = self
            .conn
            .query_row(
                "
                SELECT hub_name, hub_email, spreadsheet_id, zipcode, search_radius,
                       state, event_threshold, inactivity_days
                FROM hubs
                WHERE hub_name = ?1
                ",
                [hub_name],
                hub_from_row,
            )
            .optional()?;
        Ok(hub)
    }

    pub fn hubs_in_state(&self, state: HubState) -> Result<Vec<Hub>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT hub_name, hub_email, spreadsheet_id, zipcode, search_radius,
                   state, event_threshold, inactivity_days
            FROM hubs
            WHERE state = ?1
            ORDER BY registered_at ASC, hub_name ASC
            ",
        )?;
        let rows = statement.query_map([state.as_str()], hub_from_row)?;

        let mut hubs = Vec::new();
        for row in rows {
            hubs.push(row?);
        }
        Ok(hubs)
    }

    pub fn set_hub_state(&self, hub_name: &str, state: HubState) -> Result<(), StorageError> {
        let changes = self.conn.execute(
            "UPDATE hubs SET state = ?2 WHERE hub_name = ?1",
            params![hub_name, state.as_str()],
        )?;
        if changes == 0 {
            return Err(StorageError::UnknownHub(hub_name.to_string()));
        }
        Ok(())
    }

    pub fn set_thresholds(
        &self,
        hub_name: &str,
        thresholds: StatusThresholds,
    ) -> Result<(), StorageError> {
        let changes = self.conn.execute(
            "UPDATE hubs SET event_threshold = ?2, inactivity_days = ?3 WHERE hub_name = ?1",
            params![
                hub_name,
                i64::from(thresholds.event_threshold),
                thresholds.inactivity_days
            ],
        )?;
        if changes == 0 {
            return Err(StorageError::UnknownHub(hub_name.to_string()));
        }
        Ok(())
    }

    pub fn thresholds(&self, hub_name: &str) -> Result<StatusThresholds, StorageError> {
        self.hub(hub_name)?
            .map(|hub| hub.thresholds)
            .ok_or_else(|| StorageError::UnknownHub(hub_name.to_string()))
    }

    pub fn load_sheet(&self, hub_name: &str, sheet: Sheet) -> Result<RecordSet, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT fields_json
            FROM sheet_rows
            WHERE hub_name = ?1 AND sheet = ?2
            ORDER BY position ASC
            ",
        )?;
        let rows = statement.query_map(params![hub_name, sheet.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut records = RecordSet::new();
        for row in rows {
            records.push(record_from_json(&row?)?);
        }
        Ok(records)
    }

    pub fn row_count(&self, hub_name: &str, sheet: Sheet) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sheet_rows WHERE hub_name = ?1 AND sheet = ?2",
            params![hub_name, sheet.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Appends below the last row. Only the sheet's own columns are kept.
    pub fn append_rows(
        &self,
        hub_name: &str,
        sheet: Sheet,
        records: &RecordSet,
    ) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let appended = insert_rows(&tx, hub_name, sheet, records)?;
        tx.commit()?;
        Ok(appended)
    }

    /// Positional bulk write of the named fields. Each update must land on the
    /// row holding the same email it was computed from.
    pub fn write_fields(
        &self,
        hub_name: &str,
        sheet: Sheet,
        updates: &[RowUpdate],
        fields: &[&str],
    ) -> Result<usize, StorageError> {
        self.write_fields_across(hub_name, updates, &[(sheet, fields)])
    }

    /// `write_fields` against several sheets in one transaction, so a sheet
    /// and its mirror either both take the updates or neither does.
    pub fn write_fields_across(
        &self,
        hub_name: &str,
        updates: &[RowUpdate],
        targets: &[(Sheet, &[&str])],
    ) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut written = 0usize;
        for (sheet, fields) in targets {
            written += update_rows(&tx, hub_name, *sheet, updates, fields)?;
        }
        tx.commit()?;
        Ok(written)
    }

    /// `append_rows` onto several sheets in one transaction.
    pub fn append_rows_across(
        &self,
        hub_name: &str,
        sheets: &[Sheet],
        records: &RecordSet,
    ) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        for sheet in sheets {
            insert_rows(&tx, hub_name, *sheet, records)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Drops the sheet's rows and loads `records` in their place. Nothing
    /// changes when any row fails to insert.
    pub fn replace_sheet(
        &self,
        hub_name: &str,
        sheet: Sheet,
        records: &RecordSet,
    ) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM sheet_rows WHERE hub_name = ?1 AND sheet = ?2",
            params![hub_name, sheet.as_str()],
        )?;
        let written = insert_rows(&tx, hub_name, sheet, records)?;
        tx.commit()?;
        Ok(written)
    }

    pub fn log_error(&self, entry: &ErrorEntry) -> Result<i64, StorageError> {
        self.conn.execute(
            "
            INSERT INTO hub_hq_errors (date, script, hub, error, detail, other_messages)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                entry.date.format(DAY).to_string(),
                entry.script,
                entry.hub,
                truncate(&entry.error),
                truncate(&entry.detail),
                entry.note,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn errors(&self, hub_name: Option<&str>) -> Result<Vec<ErrorEntry>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT date, script, hub, error, detail, other_messages
            FROM hub_hq_errors
            WHERE ?1 IS NULL OR hub = ?1
            ORDER BY id ASC
            ",
        )?;
        let rows = statement.query_map([hub_name], |row| {
            Ok(ErrorEntry {
                date: parse_day(row, 0)?,
                script: row.get(1)?,
                hub: row.get(2)?,
                error: row.get(3)?,
                detail: row.get(4)?,
                note: row.get(5)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn error_count(&self) -> Result<i64, StorageError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM hub_hq_errors", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn record_committee_sync(
        &self,
        hub_name: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO committee_sync_control (hub, synced_at) VALUES (?1, ?2)",
            params![hub_name, synced_at.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn last_committee_sync(
        &self,
        hub_name: &str,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let stamps = {
            let mut statement = self
                .conn
                .prepare("SELECT synced_at FROM committee_sync_control WHERE hub = ?1")?;
            let rows = statement.query_map([hub_name], |row| row.get::<_, String>(0))?;
            let mut stamps = Vec::new();
            for row in rows {
                stamps.push(parse_timestamp(row?)?);
            }
            stamps
        };
        Ok(stamps.into_iter().max())
    }

    pub fn log_upsert_error(&self, entry: &UpsertErrorEntry) -> Result<i64, StorageError> {
        self.conn.execute(
            "
            INSERT INTO committee_upsert_errors (
                date, hub, first_name, last_name, email, phone, zip, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                entry.date.format(DAY).to_string(),
                entry.hub,
                entry.first_name,
                entry.last_name,
                entry.email,
                entry.phone,
                entry.zip,
                truncate(&entry.error),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Upsert failures not yet retried, oldest first.
    pub fn pending_upsert_errors(
        &self,
        hub_name: Option<&str>,
    ) -> Result<Vec<UpsertErrorEntry>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT id, date, hub, first_name, last_name, email, phone, zip, error
            FROM committee_upsert_errors
            WHERE retried_at IS NULL AND (?1 IS NULL OR hub = ?1)
            ORDER BY id ASC
            ",
        )?;
        let rows = statement.query_map([hub_name], upsert_error_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Every upsert failure logged on or after `since`, retried or not.
    pub fn upsert_errors_since(&self, since: NaiveDate) -> Result<Vec<UpsertErrorEntry>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT id, date, hub, first_name, last_name, email, phone, zip, error
            FROM committee_upsert_errors
            WHERE date >= ?1
            ORDER BY id ASC
            ",
        )?;
        let rows = statement.query_map([since.format(DAY).to_string()], upsert_error_from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn mark_upsert_retried(
        &self,
        ids: &[i64],
        retried_at: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0usize;
        {
            let mut update = tx.prepare(
                "UPDATE committee_upsert_errors SET retried_at = ?2 WHERE id = ?1 AND retried_at IS NULL",
            )?;
            for id in ids {
                changed += update.execute(params![id, retried_at.to_rfc3339()])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Drops the compiled members table contents and reloads it.
    pub fn replace_members(&self, members: &[(String, Record)]) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM hub_members", [])?;
        {
            let mut insert = tx.prepare(
                "
                INSERT INTO hub_members (hub, position, email, fields_json)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )?;
            for (position, (hub, record)) in members.iter().enumerate() {
                insert.execute(params![
                    hub,
                    position as i64,
                    record.email(),
                    record_to_json(record)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(members.len())
    }

    pub fn members(&self) -> Result<Vec<(String, Record)>, StorageError> {
        let mut statement = self
            .conn
            .prepare("SELECT hub, fields_json FROM hub_members ORDER BY position ASC")?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut members = Vec::new();
        for row in rows {
            let (hub, fields_json) = row?;
            members.push((hub, record_from_json(&fields_json)?));
        }
        Ok(members)
    }

    pub fn member_count(&self) -> Result<i64, StorageError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM hub_members", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn hub_from_row(row: &Row<'_>) -> rusqlite::Result<Hub> {
    let state: String = row.get(5)?;
    let state = state.parse::<HubState>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
        )
    })?;
    Ok(Hub {
        profile: HubProfile {
            hub_name: row.get(0)?,
            hub_email: row.get(1)?,
            spreadsheet_id: row.get(2)?,
            zipcode: row.get(3)?,
            search_radius: row.get::<_, i64>(4)?.max(0) as u32,
        },
        state,
        thresholds: StatusThresholds {
            event_threshold: row.get::<_, i64>(6)?.max(0) as u32,
            inactivity_days: row.get(7)?,
        },
    })
}

fn upsert_error_from_row(row: &Row<'_>) -> rusqlite::Result<UpsertErrorEntry> {
    Ok(UpsertErrorEntry {
        id: Some(row.get(0)?),
        date: parse_day(row, 1)?,
        hub: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        zip: row.get(7)?,
        error: row.get(8)?,
    })
}

fn update_rows(
    tx: &Transaction<'_>,
    hub_name: &str,
    sheet: Sheet,
    updates: &[RowUpdate],
    fields: &[&str],
) -> Result<usize, StorageError> {
    let mut select = tx.prepare(
        "
        SELECT fields_json
        FROM sheet_rows
        WHERE hub_name = ?1 AND sheet = ?2 AND position = ?3
        ",
    )?;
    let mut update = tx.prepare(
        "
        UPDATE sheet_rows
        SET fields_json = ?4
        WHERE hub_name = ?1 AND sheet = ?2 AND position = ?3
        ",
    )?;

    let mut written = 0usize;
    for row_update in updates {
        let position = row_update.position as i64;
        let stored: Option<String> = select
            .query_row(params![hub_name, sheet.as_str(), position], |row| row.get(0))
            .optional()?;
        let Some(stored) = stored else {
            continue;
        };
        let mut current = record_from_json(&stored)?;
        if current.email() != row_update.record.email() {
            return Err(StorageError::PositionMismatch {
                hub: hub_name.to_string(),
                sheet: sheet.as_str(),
                position: row_update.position,
                expected: row_update.record.email().to_string(),
                found: current.email().to_string(),
            });
        }
        for field in fields {
            current.set(*field, row_update.record.get(field));
        }
        update.execute(params![
            hub_name,
            sheet.as_str(),
            position,
            record_to_json(&current)?
        ])?;
        written += 1;
    }
    Ok(written)
}

fn insert_rows(
    tx: &Transaction<'_>,
    hub_name: &str,
    sheet: Sheet,
    records: &RecordSet,
) -> Result<usize, StorageError> {
    let next: i64 = tx.query_row(
        "
        SELECT COALESCE(MAX(position) + 1, 0)
        FROM sheet_rows
        WHERE hub_name = ?1 AND sheet = ?2
        ",
        params![hub_name, sheet.as_str()],
        |row| row.get(0),
    )?;
    let mut insert = tx.prepare(
        "
        INSERT INTO sheet_rows (hub_name, sheet, position, email, fields_json)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
    )?;
    for (offset, record) in records.iter().enumerate() {
        let projected = project(record, sheet)?;
        insert.execute(params![
            hub_name,
            sheet.as_str(),
            next + offset as i64,
            projected.email(),
            record_to_json(&projected)?,
        ])?;
    }
    Ok(records.len())
}

fn project(record: &Record, sheet: Sheet) -> Result<Record, StorageError> {
    let columns = sheet.columns();
    Record::from_pairs(
        columns
            .iter()
            .map(|column| (*column, record.get(column).to_string())),
    )
    .map_err(|err| StorageError::Serialization(err.to_string()))
}

fn record_to_json(record: &Record) -> Result<String, StorageError> {
    serde_json::to_string(record).map_err(|err| StorageError::Serialization(err.to_string()))
}

fn record_from_json(value: &str) -> Result<Record, StorageError> {
    serde_json::from_str(value).map_err(|err| StorageError::Serialization(err.to_string()))
}

fn parse_day(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let value: String = row.get(idx)?;
    NaiveDate::parse_from_str(&value, DAY).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}

fn truncate(value: &str) -> String {
    value.chars().take(ERROR_TEXT_LIMIT).collect()
}
