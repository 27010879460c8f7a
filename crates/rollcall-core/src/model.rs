//! Roster and attendance records.

use crate::types::Signature;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Storage-assigned roster identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub i64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered roster member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub display_name: String,
    pub external_id: String,
    pub reference_signature: Signature,
    /// Locator of the archived registration photo, if one was kept.
    pub photo_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A person about to be inserted; storage assigns the id.
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub display_name: String,
    pub external_id: String,
    pub reference_signature: Signature,
    pub photo_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How an attendance decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkSource {
    /// Matched against a class photo.
    Photo,
    /// Entered by hand.
    Manual,
}

impl MarkSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkSource::Photo => "photo",
            MarkSource::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "photo" => Some(MarkSource::Photo),
            "manual" => Some(MarkSource::Manual),
            _ => None,
        }
    }
}

/// One presence decision for one person on one day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub person_id: PersonId,
    pub date: NaiveDate,
    pub present: bool,
    pub source: MarkSource,
    pub recorded_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn new(
        person_id: PersonId,
        date: NaiveDate,
        present: bool,
        source: MarkSource,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            person_id,
            date,
            present,
            source,
            recorded_at,
        }
    }
}

/// Outcome of a reconciliation run or a manual marking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub date: NaiveDate,
    pub present_count: usize,
    pub total_count: usize,
}

impl AttendanceSummary {
    pub fn from_records(date: NaiveDate, records: &[AttendanceRecord]) -> Self {
        Self {
            date,
            present_count: records.iter().filter(|r| r.present).count(),
            total_count: records.len(),
        }
    }

    pub fn absent_count(&self) -> usize {
        self.total_count - self.present_count
    }
}

/// A report line: roster identity joined with that day's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub display_name: String,
    pub external_id: String,
    pub present: bool,
    pub source: MarkSource,
    pub recorded_at: DateTime<Utc>,
}

impl ReportRow {
    pub fn status(&self) -> &'static str {
        if self.present {
            "Present"
        } else {
            "Absent"
        }
    }
}

/// Head counts over a day's report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
}

impl ReportSummary {
    pub fn from_rows(rows: &[ReportRow]) -> Self {
        let present = rows.iter().filter(|r| r.present).count();
        Self {
            total: rows.len(),
            present,
            absent: rows.len() - present,
        }
    }
}
