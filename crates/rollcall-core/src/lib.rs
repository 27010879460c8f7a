//! rollcall-core: Face-signature roster and attendance reconciliation.
//!
//! Faces are found with SCRFD and summarized as 128-d ResNet signatures,
//! both running via ONNX Runtime. Storage and photo archiving sit behind
//! the [`AttendanceStore`] and [`PhotoArchive`] traits.

pub mod alignment;
pub mod archive;
pub mod detector;
pub mod encoder;
mod engine;
mod error;
pub mod matcher;
pub mod model;
pub mod photo;
pub mod reconcile;
pub mod recognizer;
pub mod report;
mod roster;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveError, ArtifactKind, ArtifactRef, NoArchive, PhotoArchive};
pub use detector::FaceDetector;
pub use encoder::{select_primary_face, EncoderError, FaceEncoder, OnnxFaceEncoder, PrimaryFacePolicy};
pub use engine::{AttendanceEngine, EngineConfig};
pub use error::AttendanceError;
pub use matcher::{is_match, EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use model::{
    AttendanceRecord, AttendanceSummary, MarkSource, NewPerson, Person, PersonId, ReportRow, ReportSummary,
};
pub use photo::{Photo, PhotoError};
pub use recognizer::FaceRecognizer;
pub use reconcile::{mark_manual_attendance, reconcile_roster};
pub use report::daily_report;
pub use store::{AttendanceStore, StoreError};
pub use types::{EncodedFace, FaceLocation, Signature, SIGNATURE_DIM};

use std::path::PathBuf;

/// Default data directory: `$XDG_DATA_HOME/rollcall`, falling back to `~/.local/share`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

/// Default directory holding the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    default_data_dir().join("models")
}
