//! rollcall-store: SQLite roster/attendance storage and the on-disk photo archive.

pub mod archive;
pub mod db;
pub mod sqlite;

pub use archive::DirectoryArchive;
pub use db::{latest_version, open_db, open_db_in_memory, DbError};
pub use sqlite::SqliteStore;
