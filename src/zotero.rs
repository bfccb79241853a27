//! Read-only metadata extraction from a Zotero SQLite database.
//!
//! Collections are resolved to their member items and each item is joined
//! with its title, creators, date and attachment key. Nothing is ever written
//! back; the database is opened with `SQLITE_OPEN_READ_ONLY`.
//!
//! The free functions open and close their own connection per call. Use
//! `ZoteroStore` directly to run several lookups on one connection.

mod record;
mod store;


use std::path::{Path, PathBuf};

use thiserror::Error;

pub use record::{ItemRecord, extract_year};
pub use store::{DATE_FIELD_ID, TITLE_FIELD_ID, ZoteroStore};

/// Errors produced while reading a Zotero database.
#[derive(Debug, Error)]
pub enum ZoteroError {
    /// The database file does not exist
    #[error("Zotero database not found at: {}", .0.display())]
    NotFound(PathBuf),

    /// SQLite failed to open or query the database
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Returns the sorted, deduplicated collection names of the database at `path`.
///
/// # Errors
///
/// Returns `ZoteroError::NotFound` if `path` does not exist.
pub fn list_collections(path: impl AsRef<Path>) -> Result<Vec<String>, ZoteroError> {
    ZoteroStore::open(path)?.list_collections()
}

/// Returns the item records of the named collection in the database at `path`.
///
/// An unknown collection name yields an empty list.
///
/// # Errors
///
/// Returns `ZoteroError::NotFound` if `path` does not exist.
pub fn get_collection_items(
    path: impl AsRef<Path>,
    collection_name: &str,
    require_attachment: bool,
) -> Result<Vec<ItemRecord>, ZoteroError> {
    ZoteroStore::open(path)?.get_collection_items(collection_name, require_attachment)
}

/// Gets the default Zotero database location, `~/Zotero/zotero.sqlite`.
///
/// Returns `None` if the home directory cannot be determined.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("Zotero").join("zotero.sqlite"))
}
