use crate::archive::ArchiveError;
use crate::encoder::EncoderError;
use crate::photo::PhotoError;
use crate::store::StoreError;
use thiserror::Error;

/// Failures surfaced by [`AttendanceEngine`](crate::AttendanceEngine) operations.
#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("invalid photo: {0}")]
    InvalidFormat(#[from] PhotoError),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("no face detected in the photo")]
    NoFaceDetected,
    #[error("external id already registered: {0}")]
    DuplicateExternalId(String),
    #[error("no roster member with external id {0}")]
    UnknownExternalId(String),
    #[error("face encoding failed: {0}")]
    Encoder(#[source] EncoderError),
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[source] StoreError),
    #[error("photo archive: {0}")]
    Archive(#[from] ArchiveError),
}

impl From<EncoderError> for AttendanceError {
    fn from(err: EncoderError) -> Self {
        match err {
            EncoderError::NoFaceDetected => Self::NoFaceDetected,
            other => Self::Encoder(other),
        }
    }
}

impl From<StoreError> for AttendanceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateExternalId(id) => Self::DuplicateExternalId(id),
            other => Self::PersistenceFailure(other),
        }
    }
}
