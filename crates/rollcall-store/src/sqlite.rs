//! SQLite-backed [`AttendanceStore`].

use crate::db::{self, DbError};
use chrono::{DateTime, NaiveDate, Utc};
use rollcall_core::{
    AttendanceRecord, AttendanceStore, MarkSource, NewPerson, Person, PersonId, ReportRow, Signature, StoreError,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

const PERSON_SELECT_SQL: &str = "SELECT
    id,
    display_name,
    external_id,
    signature,
    photo_ref,
    created_at
FROM persons";

/// Roster and attendance tables in one SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Ok(Self { conn: db::open_db(path)? })
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self { conn: db::open_db_in_memory()? })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(Box::new(err))
}

fn is_constraint(err: &rusqlite::Error, extended_code: i32) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.extended_code == extended_code)
}

fn corrupt(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| corrupt(column, format!("bad timestamp {value:?}: {e}")))
}

fn parse_person_row(row: &Row<'_>) -> rusqlite::Result<Person> {
    let blob: Vec<u8> = row.get(3)?;
    let reference_signature = Signature::from_le_bytes(&blob).map_err(|e| corrupt(3, e.to_string()))?;
    let created_at: String = row.get(5)?;

    Ok(Person {
        id: PersonId(row.get(0)?),
        display_name: row.get(1)?,
        external_id: row.get(2)?,
        reference_signature,
        photo_ref: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn parse_report_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    let source: String = row.get(3)?;
    let recorded_at: String = row.get(4)?;

    Ok(ReportRow {
        display_name: row.get(0)?,
        external_id: row.get(1)?,
        present: row.get(2)?,
        source: MarkSource::parse(&source).ok_or_else(|| corrupt(3, format!("bad source {source:?}")))?,
        recorded_at: parse_timestamp(4, &recorded_at)?,
    })
}

fn map_read_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::FromSqlConversionFailure(_, _, cause) => StoreError::Corrupt(cause.to_string()),
        other => backend(other),
    }
}

impl AttendanceStore for SqliteStore {
    fn external_id_exists(&self, external_id: &str) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM persons WHERE external_id = ?1);",
                [external_id],
                |row| row.get(0),
            )
            .map_err(backend)
    }

    fn insert_person(&mut self, person: &NewPerson) -> Result<Person, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO persons (display_name, external_id, signature, photo_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                person.display_name,
                person.external_id,
                person.reference_signature.to_le_bytes(),
                person.photo_ref,
                person.created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => {}
            Err(err) if is_constraint(&err, rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                return Err(StoreError::DuplicateExternalId(person.external_id.clone()));
            }
            Err(err) => return Err(backend(err)),
        }

        let id = PersonId(self.conn.last_insert_rowid());
        tracing::debug!(person_id = %id, external_id = %person.external_id, "person row inserted");

        Ok(Person {
            id,
            display_name: person.display_name.clone(),
            external_id: person.external_id.clone(),
            reference_signature: person.reference_signature.clone(),
            photo_ref: person.photo_ref.clone(),
            created_at: person.created_at,
        })
    }

    fn list_persons(&self) -> Result<Vec<Person>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PERSON_SELECT_SQL} ORDER BY id;"))
            .map_err(backend)?;
        let rows = stmt.query_map([], parse_person_row).map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_read_error)
    }

    fn find_person_by_external_id(&self, external_id: &str) -> Result<Option<Person>, StoreError> {
        self.conn
            .query_row(
                &format!("{PERSON_SELECT_SQL} WHERE external_id = ?1;"),
                [external_id],
                parse_person_row,
            )
            .optional()
            .map_err(map_read_error)
    }

    fn upsert_attendance(&mut self, records: &[AttendanceRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction().map_err(backend)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO attendance (id, person_id, date, present, source, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (person_id, date) DO UPDATE SET
                        present = excluded.present,
                        source = excluded.source,
                        recorded_at = excluded.recorded_at;",
                )
                .map_err(backend)?;

            for record in records {
                stmt.execute(params![
                    record.id.to_string(),
                    record.person_id.0,
                    record.date.format(DATE_FORMAT).to_string(),
                    record.present,
                    record.source.as_str(),
                    record.recorded_at.to_rfc3339(),
                ])
                .map_err(|err| {
                    if is_constraint(&err, rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) {
                        StoreError::UnknownPerson(record.person_id)
                    } else {
                        backend(err)
                    }
                })?;
            }
        }
        // Dropping `tx` on an early return rolls the whole batch back.
        tx.commit().map_err(backend)?;

        tracing::debug!(records = records.len(), "attendance batch committed");
        Ok(())
    }

    fn attendance_report(&self, date: NaiveDate) -> Result<Vec<ReportRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.display_name, p.external_id, a.present, a.source, a.recorded_at
                 FROM attendance a
                 JOIN persons p ON p.id = a.person_id
                 WHERE a.date = ?1
                 ORDER BY p.display_name, p.external_id;",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map([date.format(DATE_FORMAT).to_string()], parse_report_row)
            .map_err(backend)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_read_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::SIGNATURE_DIM;

    fn signature(axis: usize) -> Signature {
        let mut values = vec![0.0; SIGNATURE_DIM];
        values[axis] = 0.5;
        Signature::new(values).unwrap()
    }

    fn new_person(name: &str, external_id: &str) -> NewPerson {
        NewPerson {
            display_name: name.into(),
            external_id: external_id.into(),
            reference_signature: signature(external_id.len()),
            photo_ref: Some(format!("students/{external_id}.png")),
            created_at: Utc::now(),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
    }

    fn record(person: PersonId, present: bool) -> AttendanceRecord {
        AttendanceRecord::new(person, day(), present, MarkSource::Photo, Utc::now())
    }

    #[test]
    fn test_insert_and_list_roundtrip() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let inserted = store.insert_person(&new_person("Ada", "R1")).unwrap();

        let roster = store.list_persons().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, inserted.id);
        assert_eq!(roster[0].reference_signature, inserted.reference_signature);
        assert_eq!(roster[0].photo_ref.as_deref(), Some("students/R1.png"));
        assert_eq!(roster[0].created_at.timestamp(), inserted.created_at.timestamp());
    }

    #[test]
    fn test_duplicate_external_id_conflicts() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_person(&new_person("Ada", "R1")).unwrap();

        let err = store.insert_person(&new_person("Bob", "R1")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateExternalId(ref id) if id == "R1"));
        assert_eq!(store.list_persons().unwrap().len(), 1);
        assert!(store.external_id_exists("R1").unwrap());
        assert!(!store.external_id_exists("R2").unwrap());
    }

    #[test]
    fn test_find_by_external_id() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_person(&new_person("Ada", "R1")).unwrap();
        assert_eq!(store.find_person_by_external_id("R1").unwrap().unwrap().display_name, "Ada");
        assert!(store.find_person_by_external_id("R2").unwrap().is_none());
    }

    #[test]
    fn test_upsert_keeps_one_row_per_day() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let ada = store.insert_person(&new_person("Ada", "R1")).unwrap();

        store.upsert_attendance(&[record(ada.id, false)]).unwrap();
        let first_id: String = store
            .connection()
            .query_row("SELECT id FROM attendance;", [], |row| row.get(0))
            .unwrap();

        store.upsert_attendance(&[record(ada.id, true)]).unwrap();

        let rows = store.attendance_report(day()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].present);
        let kept_id: String = store
            .connection()
            .query_row("SELECT id FROM attendance;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(kept_id, first_id);
    }

    #[test]
    fn test_upsert_unknown_person_rolls_back_batch() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let ada = store.insert_person(&new_person("Ada", "R1")).unwrap();

        let err = store
            .upsert_attendance(&[record(ada.id, true), record(PersonId(404), true)])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownPerson(PersonId(404))));
        assert!(store.attendance_report(day()).unwrap().is_empty());
    }

    #[test]
    fn test_report_empty_day() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.attendance_report(day()).unwrap().is_empty());
    }

    #[test]
    fn test_report_joins_and_orders() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let zoe = store.insert_person(&new_person("Zoe", "R1")).unwrap();
        let ada = store.insert_person(&new_person("Ada", "R22")).unwrap();
        store.upsert_attendance(&[record(zoe.id, true), record(ada.id, false)]).unwrap();

        let rows = store.attendance_report(day()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].external_id.as_str(), rows[0].present), ("R22", false));
        assert_eq!((rows[1].external_id.as_str(), rows[1].present), ("R1", true));
        assert_eq!(rows[1].source, MarkSource::Photo);
    }

    #[test]
    fn test_corrupt_signature_surfaces() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .connection()
            .execute(
                "INSERT INTO persons (display_name, external_id, signature, created_at)
                 VALUES ('Ada', 'R1', x'0000', '2024-01-10T08:00:00+00:00');",
                [],
            )
            .unwrap();
        assert!(matches!(store.list_persons().unwrap_err(), StoreError::Corrupt(_)));
    }
}
