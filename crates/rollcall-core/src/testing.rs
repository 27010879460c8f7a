//! In-memory collaborators for engine tests.

use crate::archive::{ArchiveError, ArtifactKind, ArtifactRef, PhotoArchive};
use crate::encoder::{EncoderError, FaceEncoder};
use crate::engine::{AttendanceEngine, EngineConfig};
use crate::model::{AttendanceRecord, NewPerson, Person, PersonId, ReportRow};
use crate::photo::Photo;
use crate::store::{AttendanceStore, StoreError};
use crate::types::{EncodedFace, FaceLocation, Signature, SIGNATURE_DIM};
use chrono::NaiveDate;
use image::{Rgb, RgbImage};
use std::cell::RefCell;

pub(crate) fn signature_for(face: u8) -> Signature {
    let mut values = vec![0.0; SIGNATURE_DIM];
    values[face as usize % SIGNATURE_DIM] = 1.0;
    Signature::new(values).unwrap()
}

/// One pixel per face; the red channel carries the face id, 0 means background.
pub(crate) fn face_photo(faces: &[u8]) -> Photo {
    let mut image = RgbImage::new(faces.len().max(1) as u32, 1);
    for (x, &face) in faces.iter().enumerate() {
        image.put_pixel(x as u32, 0, Rgb([face, 0, 0]));
    }
    Photo::from_image("photo.png", image)
}

/// Reads the faces [`face_photo`] painted.
pub(crate) struct FakeEncoder;

impl FaceEncoder for FakeEncoder {
    fn encode_all(&mut self, image: &RgbImage) -> Result<Vec<EncodedFace>, EncoderError> {
        Ok(image
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] != 0)
            .map(|(x, _, p)| EncodedFace {
                location: FaceLocation {
                    x: x as f32,
                    y: 0.0,
                    width: 1.0,
                    height: 1.0,
                    confidence: 1.0,
                    landmarks: None,
                },
                signature: signature_for(p[0]),
            })
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub persons: Vec<Person>,
    pub attendance: Vec<AttendanceRecord>,
    /// Answer "no" to every existence pre-check.
    pub blind_precheck: bool,
    /// Reject every attendance write.
    pub fail_writes: bool,
}

impl AttendanceStore for MemoryStore {
    fn external_id_exists(&self, external_id: &str) -> Result<bool, StoreError> {
        Ok(!self.blind_precheck && self.persons.iter().any(|p| p.external_id == external_id))
    }

    fn insert_person(&mut self, person: &NewPerson) -> Result<Person, StoreError> {
        if self.persons.iter().any(|p| p.external_id == person.external_id) {
            return Err(StoreError::DuplicateExternalId(person.external_id.clone()));
        }
        let stored = Person {
            id: PersonId(self.persons.len() as i64 + 1),
            display_name: person.display_name.clone(),
            external_id: person.external_id.clone(),
            reference_signature: person.reference_signature.clone(),
            photo_ref: person.photo_ref.clone(),
            created_at: person.created_at,
        };
        self.persons.push(stored.clone());
        Ok(stored)
    }

    fn list_persons(&self) -> Result<Vec<Person>, StoreError> {
        Ok(self.persons.clone())
    }

    fn find_person_by_external_id(&self, external_id: &str) -> Result<Option<Person>, StoreError> {
        Ok(self.persons.iter().find(|p| p.external_id == external_id).cloned())
    }

    fn upsert_attendance(&mut self, records: &[AttendanceRecord]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("writes disabled".into()));
        }
        if let Some(orphan) = records.iter().find(|r| !self.persons.iter().any(|p| p.id == r.person_id)) {
            return Err(StoreError::UnknownPerson(orphan.person_id));
        }
        for record in records {
            match self
                .attendance
                .iter_mut()
                .find(|r| r.person_id == record.person_id && r.date == record.date)
            {
                Some(existing) => {
                    existing.present = record.present;
                    existing.source = record.source;
                    existing.recorded_at = record.recorded_at;
                }
                None => self.attendance.push(record.clone()),
            }
        }
        Ok(())
    }

    fn attendance_report(&self, date: NaiveDate) -> Result<Vec<ReportRow>, StoreError> {
        let mut rows: Vec<ReportRow> = self
            .attendance
            .iter()
            .filter(|r| r.date == date)
            .filter_map(|r| {
                let person = self.persons.iter().find(|p| p.id == r.person_id)?;
                Some(ReportRow {
                    display_name: person.display_name.clone(),
                    external_id: person.external_id.clone(),
                    present: r.present,
                    source: r.source,
                    recorded_at: r.recorded_at,
                })
            })
            .collect();
        rows.sort_by(|a, b| (&a.display_name, &a.external_id).cmp(&(&b.display_name, &b.external_id)));
        Ok(rows)
    }
}

/// Archive that remembers artifact names instead of writing files.
#[derive(Default)]
pub(crate) struct RecordingArchive {
    kept: RefCell<Vec<String>>,
}

impl RecordingArchive {
    pub fn kept(&self) -> Vec<String> {
        self.kept.borrow().clone()
    }
}

impl PhotoArchive for RecordingArchive {
    fn store(&self, kind: ArtifactKind, stem: &str, _photo: &Photo) -> Result<Option<ArtifactRef>, ArchiveError> {
        let dir = match kind {
            ArtifactKind::Registration => "students",
            ArtifactKind::ClassPhoto => "class_photos",
        };
        let name = format!("{dir}/{stem}");
        self.kept.borrow_mut().push(name.clone());
        Ok(Some(ArtifactRef(name)))
    }

    fn discard(&self, artifact: &ArtifactRef) -> Result<(), ArchiveError> {
        let mut kept = self.kept.borrow_mut();
        if let Some(pos) = kept.iter().position(|k| *k == artifact.0) {
            kept.remove(pos);
        }
        Ok(())
    }
}

pub(crate) type Harness = AttendanceEngine<FakeEncoder, MemoryStore, RecordingArchive>;

pub(crate) fn harness() -> Harness {
    AttendanceEngine::new(FakeEncoder, MemoryStore::default(), RecordingArchive::default(), EngineConfig::default())
}
