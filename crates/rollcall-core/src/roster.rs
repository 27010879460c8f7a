//! Roster registration.

use crate::archive::{ArtifactKind, PhotoArchive};
use crate::encoder::FaceEncoder;
use crate::engine::AttendanceEngine;
use crate::error::AttendanceError;
use crate::model::{NewPerson, Person, PersonId};
use crate::photo::Photo;
use crate::store::AttendanceStore;
use chrono::Utc;

impl<E, S, A> AttendanceEngine<E, S, A>
where
    E: FaceEncoder,
    S: AttendanceStore,
    A: PhotoArchive,
{
    /// Register a roster member from a single reference photo.
    ///
    /// The archived photo is removed again if anything after archiving fails,
    /// so a failed registration leaves neither a person nor an artifact behind.
    pub fn register(
        &mut self,
        display_name: &str,
        external_id: &str,
        photo: &Photo,
    ) -> Result<PersonId, AttendanceError> {
        let display_name = display_name.trim();
        let external_id = external_id.trim();
        if display_name.is_empty() {
            return Err(AttendanceError::MissingField("display_name"));
        }
        if external_id.is_empty() {
            return Err(AttendanceError::MissingField("external_id"));
        }

        if self.store.external_id_exists(external_id)? {
            tracing::info!(external_id, "registration rejected: external id taken");
            return Err(AttendanceError::DuplicateExternalId(external_id.to_string()));
        }

        let artifact = self.archive.store(ArtifactKind::Registration, external_id, photo)?;

        let signature = match self.encoder.encode_single(photo.image(), self.config.primary_face) {
            Ok(signature) => signature,
            Err(err) => {
                self.discard_artifact(artifact.as_ref());
                tracing::info!(external_id, error = %err, "registration failed during encoding");
                return Err(err.into());
            }
        };

        let new_person = NewPerson {
            display_name: display_name.to_string(),
            external_id: external_id.to_string(),
            reference_signature: signature,
            photo_ref: artifact.as_ref().map(|a| a.0.clone()),
            created_at: Utc::now(),
        };

        match self.store.insert_person(&new_person) {
            Ok(person) => {
                tracing::info!(external_id, person_id = %person.id, "person registered");
                Ok(person.id)
            }
            Err(err) => {
                self.discard_artifact(artifact.as_ref());
                Err(err.into())
            }
        }
    }

    /// Full roster snapshot.
    pub fn list_all(&self) -> Result<Vec<Person>, AttendanceError> {
        Ok(self.store.list_persons()?)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::EngineConfig;
    use crate::error::AttendanceError;
    use crate::testing::{face_photo, harness, FakeEncoder, MemoryStore, RecordingArchive};
    use crate::AttendanceEngine;

    #[test]
    fn test_register_assigns_id_and_archives() {
        let mut engine = harness();
        let id = engine.register("Ada Lovelace", "R1", &face_photo(&[1])).unwrap();

        let roster = engine.list_all().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, id);
        assert_eq!(roster[0].external_id, "R1");
        assert_eq!(roster[0].photo_ref.as_deref(), Some("students/R1"));
        assert_eq!(engine.archive.kept(), vec!["students/R1".to_string()]);
    }

    #[test]
    fn test_register_no_face_leaves_nothing() {
        let mut engine = harness();
        let err = engine.register("Nobody", "R9", &face_photo(&[])).unwrap_err();

        assert!(matches!(err, AttendanceError::NoFaceDetected));
        assert!(engine.list_all().unwrap().is_empty());
        assert!(engine.archive.kept().is_empty());
    }

    #[test]
    fn test_register_duplicate_external_id() {
        let mut engine = harness();
        engine.register("Ada", "R1", &face_photo(&[1])).unwrap();
        let err = engine.register("Someone Else", "R1", &face_photo(&[2])).unwrap_err();

        assert!(matches!(err, AttendanceError::DuplicateExternalId(ref id) if id == "R1"));
        assert_eq!(engine.list_all().unwrap().len(), 1);
        assert_eq!(engine.archive.kept().len(), 1);
    }

    #[test]
    fn test_register_insert_conflict_discards_artifact() {
        // Store that misses the pre-check but rejects on insert.
        let store = MemoryStore { blind_precheck: true, ..MemoryStore::default() };
        let mut engine = AttendanceEngine::new(FakeEncoder, store, RecordingArchive::default(), EngineConfig::default());
        engine.register("Ada", "R1", &face_photo(&[1])).unwrap();

        let err = engine.register("Ada again", "R1", &face_photo(&[1])).unwrap_err();
        assert!(matches!(err, AttendanceError::DuplicateExternalId(_)));
        assert_eq!(engine.archive.kept().len(), 1);
    }

    #[test]
    fn test_register_requires_fields() {
        let mut engine = harness();
        assert!(matches!(
            engine.register("  ", "R1", &face_photo(&[1])),
            Err(AttendanceError::MissingField("display_name"))
        ));
        assert!(matches!(
            engine.register("Ada", "", &face_photo(&[1])),
            Err(AttendanceError::MissingField("external_id"))
        ));
    }

    #[test]
    fn test_register_multi_face_photo_uses_first() {
        let mut engine = harness();
        engine.register("Ada", "R1", &face_photo(&[3, 4])).unwrap();
        let person = &engine.list_all().unwrap()[0];
        assert_eq!(person.reference_signature, crate::testing::signature_for(3));
    }
}
