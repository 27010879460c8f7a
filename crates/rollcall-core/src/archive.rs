//! Archival of uploaded photos.

use crate::photo::Photo;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive i/o at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode photo for archiving: {0}")]
    Encode(#[from] image::ImageError),
}

/// What an archived photo was used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Registration,
    ClassPhoto,
}

/// Opaque locator of an archived photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef(pub String);

/// Write-once photo storage.
pub trait PhotoArchive {
    /// Persist `photo`; `stem` seeds the artifact name. `None` when nothing was kept.
    fn store(&self, kind: ArtifactKind, stem: &str, photo: &Photo) -> Result<Option<ArtifactRef>, ArchiveError>;

    /// Remove an artifact whose operation failed.
    fn discard(&self, artifact: &ArtifactRef) -> Result<(), ArchiveError>;
}

/// Archive that keeps nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchive;

impl PhotoArchive for NoArchive {
    fn store(&self, _kind: ArtifactKind, _stem: &str, _photo: &Photo) -> Result<Option<ArtifactRef>, ArchiveError> {
        Ok(None)
    }

    fn discard(&self, _artifact: &ArtifactRef) -> Result<(), ArchiveError> {
        Ok(())
    }
}
