use crate::archive::{ArtifactRef, PhotoArchive};
use crate::encoder::{FaceEncoder, PrimaryFacePolicy};
use crate::error::AttendanceError;
use crate::matcher::{EuclideanMatcher, DEFAULT_MATCH_THRESHOLD};
use crate::photo::{Photo, DEFAULT_MAX_PHOTO_BYTES};
use crate::store::AttendanceStore;
use crate::types::EncodedFace;
use serde::{Deserialize, Serialize};

/// Tunables injected into the engine at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum Euclidean signature distance accepted as the same person.
    pub match_threshold: f32,
    /// Face a multi-face registration photo contributes.
    pub primary_face: PrimaryFacePolicy,
    /// Upload size limit for photos.
    pub max_photo_bytes: usize,
    /// Keep class photos alongside the records they produced.
    pub archive_class_photos: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            primary_face: PrimaryFacePolicy::default(),
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
            archive_class_photos: true,
        }
    }
}

/// Owns the encoder and collaborators behind registration, reconciliation and reporting.
///
/// Calls are expected one at a time; nothing here serializes concurrent writers.
pub struct AttendanceEngine<E, S, A> {
    pub(crate) encoder: E,
    pub(crate) store: S,
    pub(crate) archive: A,
    pub(crate) matcher: EuclideanMatcher,
    pub(crate) config: EngineConfig,
}

impl<E, S, A> AttendanceEngine<E, S, A>
where
    E: FaceEncoder,
    S: AttendanceStore,
    A: PhotoArchive,
{
    pub fn new(encoder: E, store: S, archive: A, config: EngineConfig) -> Self {
        tracing::debug!(?config, "attendance engine configured");
        Self {
            encoder,
            store,
            archive,
            matcher: EuclideanMatcher::new(config.match_threshold),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validate and decode an upload against the configured size limit.
    pub fn decode_photo(&self, file_name: &str, bytes: Vec<u8>) -> Result<Photo, AttendanceError> {
        Ok(Photo::decode(file_name, bytes, self.config.max_photo_bytes)?)
    }

    /// Faces the encoder finds in a photo, without touching storage.
    pub fn detect(&mut self, photo: &Photo) -> Result<Vec<EncodedFace>, AttendanceError> {
        Ok(self.encoder.encode_all(photo.image())?)
    }

    /// Best-effort removal of an artifact left by a failed operation.
    pub(crate) fn discard_artifact(&self, artifact: Option<&ArtifactRef>) {
        let Some(artifact) = artifact else {
            return;
        };
        match self.archive.discard(artifact) {
            Ok(()) => tracing::debug!(artifact = %artifact.0, "artifact discarded"),
            Err(err) => tracing::warn!(artifact = %artifact.0, error = %err, "failed to discard artifact"),
        }
    }
}
