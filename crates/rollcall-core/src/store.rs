//! Storage seam between the engine and a persistence backend.

use crate::model::{AttendanceRecord, NewPerson, Person, PersonId, ReportRow};
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("external id already registered: {0}")]
    DuplicateExternalId(String),
    #[error("unknown person: {0}")]
    UnknownPerson(PersonId),
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
    #[error("storage backend: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Roster and attendance persistence.
///
/// Implementations enforce `external_id` uniqueness and at most one
/// attendance row per (person, date).
pub trait AttendanceStore {
    fn external_id_exists(&self, external_id: &str) -> Result<bool, StoreError>;

    /// Insert a person, failing with [`StoreError::DuplicateExternalId`] on conflict.
    fn insert_person(&mut self, person: &NewPerson) -> Result<Person, StoreError>;

    /// Full roster in id order.
    fn list_persons(&self) -> Result<Vec<Person>, StoreError>;

    fn find_person_by_external_id(&self, external_id: &str) -> Result<Option<Person>, StoreError>;

    /// Insert or replace the (person, date) rows of `records` atomically.
    fn upsert_attendance(&mut self, records: &[AttendanceRecord]) -> Result<(), StoreError>;

    /// Records for `date` joined with roster identity, ordered by name then external id.
    fn attendance_report(&self, date: NaiveDate) -> Result<Vec<ReportRow>, StoreError>;
}
