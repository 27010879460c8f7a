//! Attendance reconciliation: one presence decision per roster member per day.

use crate::archive::{ArtifactKind, PhotoArchive};
use crate::encoder::FaceEncoder;
use crate::engine::AttendanceEngine;
use crate::error::AttendanceError;
use crate::matcher::Matcher;
use crate::model::{AttendanceRecord, AttendanceSummary, MarkSource, Person};
use crate::photo::Photo;
use crate::store::AttendanceStore;
use crate::types::Signature;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::time::Instant;

/// Decide presence for every roster member, in roster order.
///
/// Costs `roster.len() × detected.len()` comparisons at most.
pub fn reconcile_roster<M: Matcher>(
    roster: &[Person],
    detected: &[Signature],
    matcher: &M,
    date: NaiveDate,
    recorded_at: DateTime<Utc>,
) -> Vec<AttendanceRecord> {
    roster
        .iter()
        .map(|person| {
            let present = matcher.any_match(&person.reference_signature, detected);
            tracing::debug!(external_id = %person.external_id, present, "roster member reconciled");
            AttendanceRecord::new(person.id, date, present, MarkSource::Photo, recorded_at)
        })
        .collect()
}

/// Mark attendance by hand: listed external ids present, everyone else absent.
///
/// Unknown ids are rejected before anything is written.
pub fn mark_manual_attendance<S: AttendanceStore>(
    store: &mut S,
    date: NaiveDate,
    present_external_ids: &[String],
) -> Result<AttendanceSummary, AttendanceError> {
    let roster = store.list_persons()?;

    let wanted: HashSet<&str> = present_external_ids.iter().map(|id| id.trim()).collect();
    let known: HashSet<&str> = roster.iter().map(|p| p.external_id.as_str()).collect();
    if let Some(unknown) = wanted.iter().find(|id| !known.contains(*id)) {
        return Err(AttendanceError::UnknownExternalId(unknown.to_string()));
    }

    let recorded_at = Utc::now();
    let records: Vec<AttendanceRecord> = roster
        .iter()
        .map(|p| {
            let present = wanted.contains(p.external_id.as_str());
            AttendanceRecord::new(p.id, date, present, MarkSource::Manual, recorded_at)
        })
        .collect();

    if !records.is_empty() {
        store.upsert_attendance(&records)?;
    }

    let summary = AttendanceSummary::from_records(date, &records);
    tracing::info!(%date, present = summary.present_count, total = summary.total_count, "manual attendance recorded");
    Ok(summary)
}

impl<E, S, A> AttendanceEngine<E, S, A>
where
    E: FaceEncoder,
    S: AttendanceStore,
    A: PhotoArchive,
{
    /// Mark attendance for `date` from a class photo.
    ///
    /// A photo without faces still marks everyone absent. Records are upserted
    /// as one batch, so a rerun for the same date replaces the earlier decisions.
    pub fn reconcile(&mut self, photo: &Photo, date: NaiveDate) -> Result<AttendanceSummary, AttendanceError> {
        let started_at = Instant::now();

        let detected: Vec<Signature> = self
            .encoder
            .encode_all(photo.image())?
            .into_iter()
            .map(|face| face.signature)
            .collect();

        let roster = self.store.list_persons()?;
        if roster.is_empty() {
            tracing::info!(%date, faces = detected.len(), "empty roster, nothing to reconcile");
            return Ok(AttendanceSummary { date, present_count: 0, total_count: 0 });
        }

        let records = reconcile_roster(&roster, &detected, &self.matcher, date, Utc::now());

        let artifact = if self.config.archive_class_photos {
            let stem = format!("class_{}", date.format("%Y%m%d"));
            self.archive.store(ArtifactKind::ClassPhoto, &stem, photo)?
        } else {
            None
        };

        if let Err(err) = self.store.upsert_attendance(&records) {
            self.discard_artifact(artifact.as_ref());
            tracing::warn!(%date, error = %err, "attendance batch rejected");
            return Err(err.into());
        }

        let summary = AttendanceSummary::from_records(date, &records);
        tracing::info!(
            %date,
            faces = detected.len(),
            present = summary.present_count,
            total = summary.total_count,
            duration_ms = started_at.elapsed().as_millis() as u64,
            "attendance reconciled"
        );
        Ok(summary)
    }

    /// Mark attendance by hand. See [`mark_manual_attendance`].
    pub fn mark_manual(
        &mut self,
        date: NaiveDate,
        present_external_ids: &[String],
    ) -> Result<AttendanceSummary, AttendanceError> {
        mark_manual_attendance(&mut self.store, date, present_external_ids)
    }
}
