//! Read-only attendance reports.

use crate::archive::PhotoArchive;
use crate::encoder::FaceEncoder;
use crate::engine::AttendanceEngine;
use crate::error::AttendanceError;
use crate::model::ReportRow;
use crate::store::AttendanceStore;
use chrono::NaiveDate;

/// Attendance for `date` joined with roster identity. Empty when nothing was recorded.
pub fn daily_report<S: AttendanceStore>(store: &S, date: NaiveDate) -> Result<Vec<ReportRow>, AttendanceError> {
    let rows = store.attendance_report(date)?;
    tracing::debug!(%date, rows = rows.len(), "report loaded");
    Ok(rows)
}

impl<E, S, A> AttendanceEngine<E, S, A>
where
    E: FaceEncoder,
    S: AttendanceStore,
    A: PhotoArchive,
{
    pub fn report(&self, date: NaiveDate) -> Result<Vec<ReportRow>, AttendanceError> {
        daily_report(&self.store, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportSummary;
    use crate::testing::{face_photo, harness};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_report_without_runs_is_empty() {
        let mut engine = harness();
        engine.register("Ada", "R1", &face_photo(&[1])).unwrap();
        assert!(engine.report(day(10)).unwrap().is_empty());
    }

    #[test]
    fn test_report_only_includes_requested_date() {
        let mut engine = harness();
        engine.register("Ada", "R1", &face_photo(&[1])).unwrap();
        engine.reconcile(&face_photo(&[1]), day(10)).unwrap();
        engine.reconcile(&face_photo(&[]), day(11)).unwrap();

        let rows = engine.report(day(11)).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].present);
    }

    #[test]
    fn test_report_sorted_by_name() {
        let mut engine = harness();
        engine.register("Zoe", "R1", &face_photo(&[1])).unwrap();
        engine.register("Ada", "R2", &face_photo(&[2])).unwrap();
        engine.reconcile(&face_photo(&[1]), day(10)).unwrap();

        let rows = daily_report(engine.store(), day(10)).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.display_name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Zoe"]);
        assert_eq!(ReportSummary::from_rows(&rows), ReportSummary { total: 2, present: 1, absent: 1 });
    }
}
