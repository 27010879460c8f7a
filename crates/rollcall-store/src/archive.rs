//! On-disk photo archive.
//!
//! Registration photos land in `<root>/students/`, class photos in
//! `<root>/class_photos/`. File names are `<stem>_<digest>.<ext>`, where the
//! digest is a short SHA-256 prefix of the archived bytes. Files are created
//! exclusively; when the name is taken (the same photo stored again under the
//! same stem) a `-<n>` suffix is appended, so an artifact is never overwritten
//! and discarding one never removes another.

use image::ImageFormat;
use rollcall_core::{ArchiveError, ArtifactKind, ArtifactRef, Photo, PhotoArchive};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fs::OpenOptions;
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};

const DIGEST_HEX_LEN: usize = 12;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Photo archive rooted at a directory. Artifact refs are paths relative to the root.
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of an archived artifact.
    pub fn resolve(&self, artifact: &ArtifactRef) -> PathBuf {
        self.root.join(&artifact.0)
    }
}

fn subdir(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Registration => "students",
        ArtifactKind::ClassPhoto => "class_photos",
    }
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "photo".to_string()
    } else {
        cleaned
    }
}

fn short_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .take(DIGEST_HEX_LEN / 2)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn photo_bytes(photo: &Photo) -> Result<Cow<'_, [u8]>, ArchiveError> {
    if let Some(bytes) = photo.original_bytes() {
        return Ok(Cow::Borrowed(bytes));
    }
    let mut out = Cursor::new(Vec::new());
    photo.image().write_to(&mut out, ImageFormat::Png)?;
    Ok(Cow::Owned(out.into_inner()))
}

fn io_error(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl PhotoArchive for DirectoryArchive {
    fn store(&self, kind: ArtifactKind, stem: &str, photo: &Photo) -> Result<Option<ArtifactRef>, ArchiveError> {
        let bytes = photo_bytes(photo)?;
        let base = format!("{}_{}", sanitize_stem(stem), short_digest(&bytes));

        let dir = self.root.join(subdir(kind));
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{base}.{}", photo.extension())
            } else {
                format!("{base}-{attempt}.{}", photo.extension())
            };
            let path = dir.join(&name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_error(&path, e)),
            };
            if let Err(e) = file.write_all(&bytes) {
                drop(file);
                let _ = std::fs::remove_file(&path);
                return Err(io_error(&path, e));
            }

            let relative = format!("{}/{}", subdir(kind), name);
            tracing::debug!(artifact = %relative, bytes = bytes.len(), "photo archived");
            return Ok(Some(ArtifactRef(relative)));
        }

        Err(io_error(
            &dir.join(&base),
            std::io::Error::new(ErrorKind::AlreadyExists, "no free artifact name"),
        ))
    }

    fn discard(&self, artifact: &ArtifactRef) -> Result<(), ArchiveError> {
        let path = self.resolve(artifact);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(artifact = %artifact.0, "archived photo discarded");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}
